use ci_deploy_core::error::DeployError;
use ci_deploy_core::job::{find_artifact, JobOutcome, PipelineJob};
use ci_deploy_core::log;
use ci_deploy_core::packaging::read_zip_entry;
use ci_deploy_core::params::{web_stack_parameters, DeployParams};
use ci_deploy_core::stack::{
    blocked_message, start_create_or_update, stack_status, StackAction, StackOps, StackParameter,
    StackPhase,
};
use serde_json::json;

use crate::adapters::artifact_store::{download_artifact, ArtifactStore};

const COMPONENT: &str = "deploy_stage";

/// First invocation starts a create or update of the web stack and asks the
/// pipeline to call back; continuation invocations check on that stack
/// until it settles.
pub fn handle_deploy_job(
    job: &PipelineJob,
    stacks: &impl StackOps,
    store: &impl ArtifactStore,
) -> JobOutcome {
    log::info(
        COMPONENT,
        "job_started",
        json!({
            "job_id": job.id.clone(),
            "continuation": job.data.is_continuation(),
        }),
    );
    match run_deploy(job, stacks, store) {
        Ok(outcome) => outcome,
        Err(error) => {
            log::error(
                COMPONENT,
                "function_failed",
                json!({ "job_id": job.id.clone(), "error": error.message() }),
            );
            JobOutcome::function_exception(&error)
        }
    }
}

fn run_deploy(
    job: &PipelineJob,
    stacks: &impl StackOps,
    store: &impl ArtifactStore,
) -> Result<JobOutcome, DeployError> {
    let data = &job.data;
    let params = DeployParams::from_job(data)?;
    log::info(COMPONENT, "user_parameters", json!(params));

    if data.is_continuation() {
        return check_stack_update_status(&job.id, stacks, &params.web_stack_name);
    }

    let template_artifact = find_artifact(&data.input_artifacts, &params.template_artifact)?;
    let archive = download_artifact(store, template_artifact)?;
    let template = read_zip_entry(&archive, &params.template_file)?;
    let stack_params = web_stack_parameters(&params, &data.input_artifacts)?;

    start_update_or_create(
        &job.id,
        stacks,
        &params.web_stack_name,
        &template,
        &stack_params,
    )
}

pub fn start_update_or_create(
    job_id: &str,
    stacks: &impl StackOps,
    stack_name: &str,
    template: &str,
    params: &[StackParameter],
) -> Result<JobOutcome, DeployError> {
    Ok(
        match start_create_or_update(stacks, stack_name, template, params)? {
            StackAction::Created => JobOutcome::continue_later(job_id, "Stack create started"),
            StackAction::Updated => JobOutcome::continue_later(job_id, "Stack update started"),
            StackAction::Unchanged => JobOutcome::succeeded("There were no stack updates"),
            StackAction::Blocked(status) => JobOutcome::failed(blocked_message(&status)),
        },
    )
}

/// One status check per invocation; the pipeline keeps calling back while
/// the outcome is a continuation.
pub fn check_stack_update_status(
    job_id: &str,
    stacks: &impl StackOps,
    stack_name: &str,
) -> Result<JobOutcome, DeployError> {
    let status = stack_status(stacks, stack_name)?;
    log::info(
        COMPONENT,
        "stack_status_checked",
        json!({ "stack": stack_name, "status": status.as_str() }),
    );

    Ok(match status.phase() {
        StackPhase::Succeeded => JobOutcome::succeeded("Stack update complete"),
        StackPhase::InProgress => {
            JobOutcome::continue_later(job_id, "Stack update still in progress")
        }
        StackPhase::Failed => JobOutcome::failed(format!("Update failed: {status}")),
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use ci_deploy_core::job::continuation_token;
    use ci_deploy_core::packaging::zip_directory;
    use ci_deploy_core::stack::UpdateOutcome;
    use ci_deploy_core::testing::ScriptedStacks;
    use serde_json::{json, Value};

    use super::*;
    use crate::adapters::artifact_store::testing::MemoryArtifacts;
    use crate::handlers::fixtures::{artifact, job};

    const TEMPLATE_KEY: &str = "a4tp/TemplateAr/template.zip";

    fn deploy_params() -> Value {
        json!({
            "build_artifact": "BuildArtifact",
            "vpc_id": "vpc-123",
            "subnet_id_a": "subnet-a",
            "appname": "a4tp",
            "keyname": "ops",
            "web_stack_name": "a4tp-web",
            "template_artifact": "TemplateArtifact",
            "template_file": "web.template"
        })
    }

    fn deploy_job(continuation: Option<&str>) -> PipelineJob {
        job(
            deploy_params(),
            vec![
                artifact("TemplateArtifact", TEMPLATE_KEY),
                artifact("BuildArtifact", "a4tp/BuildArtif/build.zip"),
            ],
            vec![],
            continuation,
        )
    }

    fn seeded_store() -> MemoryArtifacts {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("web.template"), "{\"Resources\":{}}").expect("write");
        let store = MemoryArtifacts::new();
        store.seed(
            "pipeline-artifacts",
            TEMPLATE_KEY,
            zip_directory(dir.path()).expect("zip"),
        );
        store
    }

    #[test]
    fn missing_stack_is_created_and_continued() {
        let stacks = ScriptedStacks::new();
        let outcome = handle_deploy_job(&deploy_job(None), &stacks, &seeded_store());

        assert_eq!(
            outcome,
            JobOutcome::continue_later("job-42", "Stack create started")
        );
        assert_eq!(stacks.calls(), vec!["create:a4tp-web:6".to_string()]);
        let params = stacks.params_for("a4tp-web");
        assert_eq!(
            params[5],
            StackParameter::new("BuildKey", "a4tp/BuildArtif/build.zip")
        );
    }

    #[test]
    fn existing_stack_is_updated_and_continued() {
        let stacks = ScriptedStacks::new();
        stacks.script("a4tp-web", &[Some("UPDATE_COMPLETE")]);

        let outcome = handle_deploy_job(&deploy_job(None), &stacks, &seeded_store());
        assert_eq!(outcome.message(), "Stack update started");
        assert_eq!(outcome.kind(), "continuation");
        assert_eq!(stacks.calls(), vec!["update:a4tp-web:6".to_string()]);
    }

    #[test]
    fn unchanged_stack_succeeds_immediately() {
        let stacks = ScriptedStacks::new();
        stacks.script("a4tp-web", &[Some("CREATE_COMPLETE")]);
        stacks.set_update_outcome(Ok(UpdateOutcome::NoChanges));

        let outcome = handle_deploy_job(&deploy_job(None), &stacks, &seeded_store());
        assert_eq!(outcome, JobOutcome::succeeded("There were no stack updates"));
    }

    #[test]
    fn busy_stack_fails_without_update() {
        let stacks = ScriptedStacks::new();
        stacks.script("a4tp-web", &[Some("UPDATE_IN_PROGRESS")]);

        let outcome = handle_deploy_job(&deploy_job(None), &stacks, &seeded_store());
        assert_eq!(
            outcome,
            JobOutcome::failed("Stack cannot be updated when status is: UPDATE_IN_PROGRESS")
        );
        assert!(stacks.calls().is_empty());
    }

    #[test]
    fn update_errors_become_function_exceptions() {
        let stacks = ScriptedStacks::new();
        stacks.script("a4tp-web", &[Some("UPDATE_COMPLETE")]);
        stacks.set_update_outcome(Err("Template format error".to_string()));

        let outcome = handle_deploy_job(&deploy_job(None), &stacks, &seeded_store());
        assert_eq!(
            outcome,
            JobOutcome::failed(
                "Function exception: Error updating CloudFormation stack \"a4tp-web\": Template format error"
            )
        );
    }

    #[test]
    fn missing_template_file_fails_the_job() {
        let stacks = ScriptedStacks::new();
        let mut params = deploy_params();
        params["template_file"] = Value::from("cfn/other.template");
        let job = job(
            params,
            vec![
                artifact("TemplateArtifact", TEMPLATE_KEY),
                artifact("BuildArtifact", "a4tp/BuildArtif/build.zip"),
            ],
            vec![],
            None,
        );

        let outcome = handle_deploy_job(&job, &stacks, &seeded_store());
        assert_eq!(
            outcome,
            JobOutcome::failed(
                "Function exception: There is no item named 'cfn/other.template' in the archive"
            )
        );
        assert!(stacks.calls().is_empty());
    }

    #[test]
    fn continuation_reports_progress_until_complete() {
        let stacks = ScriptedStacks::new();
        stacks.script(
            "a4tp-web",
            &[Some("UPDATE_IN_PROGRESS"), Some("UPDATE_COMPLETE")],
        );
        let token = continuation_token("job-41");
        let store = MemoryArtifacts::new();

        let first = handle_deploy_job(&deploy_job(Some(&token)), &stacks, &store);
        assert_eq!(
            first,
            JobOutcome::continue_later("job-42", "Stack update still in progress")
        );

        let second = handle_deploy_job(&deploy_job(Some(&token)), &stacks, &store);
        assert_eq!(second, JobOutcome::succeeded("Stack update complete"));
        assert!(stacks.calls().is_empty());
    }

    #[test]
    fn continuation_reports_rollback_as_failure() {
        let stacks = ScriptedStacks::new();
        stacks.script("a4tp-web", &[Some("UPDATE_ROLLBACK_COMPLETE")]);
        let token = continuation_token("job-41");

        let outcome =
            handle_deploy_job(&deploy_job(Some(&token)), &stacks, &MemoryArtifacts::new());
        assert_eq!(
            outcome,
            JobOutcome::failed("Update failed: UPDATE_ROLLBACK_COMPLETE")
        );
    }

    #[test]
    fn continuation_for_vanished_stack_is_an_exception() {
        let token = continuation_token("job-41");
        let outcome = handle_deploy_job(
            &deploy_job(Some(&token)),
            &ScriptedStacks::new(),
            &MemoryArtifacts::new(),
        );
        assert_eq!(
            outcome,
            JobOutcome::failed("Function exception: Stack with id a4tp-web does not exist")
        );
    }
}
