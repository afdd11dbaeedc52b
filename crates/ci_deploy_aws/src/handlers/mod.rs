pub mod build;
pub mod deploy;

use ci_deploy_core::error::DeployError;
use ci_deploy_core::job::{job_id_of, JobOutcome, PipelineJob};
use ci_deploy_core::stack::StackOps;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapters::artifact_store::ArtifactStore;
use crate::adapters::job_reporter::{report_outcome, JobReporter};

/// Environment variable that overrides the stage picked from `_HANDLER`.
pub const STAGE_OVERRIDE_ENV: &str = "PIPELINE_STAGE";

/// Which stage a `pipeline_stage` invocation performs. Both stages ship in
/// one binary; the function's configured handler name picks the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Build,
    Deploy,
}

impl PipelineStage {
    /// Accepts `build`/`deploy`, optionally qualified (`bootstrap.deploy`).
    pub fn from_handler(handler: &str) -> Result<Self, String> {
        let name = handler.rsplit('.').next().unwrap_or(handler).trim();
        match name.to_ascii_lowercase().as_str() {
            "build" => Ok(Self::Build),
            "deploy" => Ok(Self::Deploy),
            _ => Err(format!(
                "unknown pipeline stage handler '{handler}', expected 'build' or 'deploy'"
            )),
        }
    }

    pub fn component(self) -> &'static str {
        match self {
            Self::Build => "build_stage",
            Self::Deploy => "deploy_stage",
        }
    }
}

/// Runs one stage invocation and reports its outcome to the pipeline. An
/// error means the outcome could not be reported.
pub fn run_stage(
    stage: PipelineStage,
    job: &PipelineJob,
    stacks: &impl StackOps,
    store: &impl ArtifactStore,
    reporter: &impl JobReporter,
) -> Result<StageResponse, String> {
    let outcome = match stage {
        PipelineStage::Build => build::handle_build_job(job, store),
        PipelineStage::Deploy => deploy::handle_deploy_job(job, stacks, store),
    };
    report_outcome(reporter, stage.component(), &job.id, &outcome)?;
    Ok(StageResponse::new(&job.id, &outcome))
}

/// Fails a job whose stage never got to run.
pub fn report_failure(
    stage: PipelineStage,
    job_id: &str,
    error: &DeployError,
    reporter: &impl JobReporter,
) -> Result<StageResponse, String> {
    let outcome = JobOutcome::function_exception(error);
    report_outcome(reporter, stage.component(), job_id, &outcome)?;
    Ok(StageResponse::new(job_id, &outcome))
}

/// Fails the job behind an event that did not decode. Without a job id
/// nobody is waiting on the invocation, so the decode error is returned.
pub fn report_undecodable_event(
    stage: PipelineStage,
    payload: &Value,
    error: &DeployError,
    reporter: &impl JobReporter,
) -> Result<StageResponse, String> {
    match job_id_of(payload) {
        Some(job_id) => report_failure(stage, job_id, error, reporter),
        None => Err(error.message().to_string()),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageResponse {
    pub status: String,
    pub job_id: String,
    pub outcome: String,
    pub message: String,
}

impl StageResponse {
    pub fn new(job_id: &str, outcome: &JobOutcome) -> Self {
        Self {
            status: "Complete.".to_string(),
            job_id: job_id.to_string(),
            outcome: outcome.kind().to_string(),
            message: outcome.message().to_string(),
        }
    }
}


#[cfg(test)]
mod tests {
    use ci_deploy_core::job::{decode_event, previous_job_id};
    use ci_deploy_core::testing::ScriptedStacks;
    use serde_json::json;

    use super::*;
    use crate::adapters::artifact_store::testing::MemoryArtifacts;
    use crate::adapters::job_reporter::testing::RecordingReporter;

    #[test]
    fn resolves_stage_from_handler_name() {
        assert_eq!(PipelineStage::from_handler("build"), Ok(PipelineStage::Build));
        assert_eq!(
            PipelineStage::from_handler("bootstrap.Deploy"),
            Ok(PipelineStage::Deploy)
        );
        assert!(PipelineStage::from_handler("lambdaupdate.lambda_handler").is_err());
    }

    #[test]
    fn response_mirrors_outcome() {
        let response = StageResponse::new("job-1", &JobOutcome::succeeded("Stack update complete"));
        assert_eq!(response.status, "Complete.");
        assert_eq!(response.outcome, "success");
        assert_eq!(response.message, "Stack update complete");
    }

    #[test]
    fn deploy_continuation_is_reported_with_token() {
        let stacks = ScriptedStacks::new();
        stacks.script("a4tp-web", &[Some("UPDATE_IN_PROGRESS")]);
        let reporter = RecordingReporter::new();
        let token = ci_deploy_core::job::continuation_token("job-41");
        let job = fixtures::job(
            json!({
                "build_artifact": "BuildArtifact",
                "vpc_id": "vpc-123",
                "subnet_id_a": "subnet-a",
                "appname": "a4tp",
                "keyname": "ops",
                "web_stack_name": "a4tp-web",
                "template_artifact": "TemplateArtifact",
                "template_file": "web.template"
            }),
            vec![],
            vec![],
            Some(&token),
        );

        let response = run_stage(
            PipelineStage::Deploy,
            &job,
            &stacks,
            &MemoryArtifacts::new(),
            &reporter,
        )
        .expect("report should succeed");

        assert_eq!(response.outcome, "continuation");
        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        let sent_token = reports[0]
            .strip_prefix("continue:job-42:")
            .expect("continuation report");
        assert_eq!(previous_job_id(sent_token), Some("job-42".to_string()));
    }

    #[test]
    fn build_failure_is_reported_as_job_failure() {
        let reporter = RecordingReporter::new();
        let job = fixtures::job(json!({}), vec![], vec![], None);

        let response = run_stage(
            PipelineStage::Build,
            &job,
            &ScriptedStacks::new(),
            &MemoryArtifacts::new(),
            &reporter,
        )
        .expect("report should succeed");

        assert_eq!(response.outcome, "failure");
        assert_eq!(
            reporter.reports(),
            vec![
                "failure:job-42:Function exception: Your UserParameters JSON must include source_artifact"
                    .to_string()
            ]
        );
    }

    #[test]
    fn undecodable_event_with_job_id_fails_that_job() {
        let reporter = RecordingReporter::new();
        let payload = json!({ "CodePipeline.job": { "id": "job-7", "data": "oops" } });
        let error = decode_event(payload.clone()).expect_err("data is not an object");

        let response = report_undecodable_event(PipelineStage::Deploy, &payload, &error, &reporter)
            .expect("report should succeed");

        assert_eq!(response.job_id, "job-7");
        assert_eq!(response.outcome, "failure");
        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        assert!(reports[0]
            .starts_with("failure:job-7:Function exception: Malformed CodePipeline job event:"));
    }

    #[test]
    fn undecodable_event_without_job_id_is_an_error() {
        let reporter = RecordingReporter::new();
        let payload = json!({ "Records": [] });
        let error = decode_event(payload.clone()).expect_err("not a pipeline event");

        let message = report_undecodable_event(PipelineStage::Build, &payload, &error, &reporter)
            .expect_err("nothing to report against");

        assert!(message.starts_with("Malformed CodePipeline job event:"));
        assert!(reporter.reports().is_empty());
    }
}
