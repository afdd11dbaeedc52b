use std::path::{Component, Path, PathBuf};

use ci_deploy_core::error::DeployError;
use ci_deploy_core::job::{find_artifact, JobOutcome, PipelineJob};
use ci_deploy_core::log;
use ci_deploy_core::packaging::{copy_tree, extract_zip, zip_directory};
use ci_deploy_core::params::BuildParams;
use serde_json::json;
use tempfile::TempDir;

use crate::adapters::artifact_store::{download_artifact, upload_artifact, ArtifactStore};

const COMPONENT: &str = "build_stage";

/// Directory inside the source artifact that holds the deployable site.
pub const SOURCE_SUBDIR: &str = "src";
pub const BUILD_COMPLETE_MESSAGE: &str = "Built code and template";

/// Builds the source artifact into the build artifact and extracts the
/// template directory into the template artifact. Never fails: errors become
/// a failed job outcome for the pipeline.
pub fn handle_build_job(job: &PipelineJob, store: &impl ArtifactStore) -> JobOutcome {
    log::info(COMPONENT, "job_started", json!({ "job_id": job.id.clone() }));
    match run_build(job, store) {
        Ok(message) => JobOutcome::succeeded(message),
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

fn run_build(job: &PipelineJob, store: &impl ArtifactStore) -> Result<String, DeployError> {
    let data = &job.data;
    let params = BuildParams::from_job(data)?;
    log::info(COMPONENT, "user_parameters", json!(params));

    let source_artifact = find_artifact(&data.input_artifacts, &params.source_artifact)?;
    let build_artifact = find_artifact(&data.output_artifacts, &params.build_artifact)?;
    let template_artifact = find_artifact(&data.output_artifacts, &params.template_artifact)?;
    let template_subdir = relative_subdir(&params.template_subdir_path)?;

    let source_dir = scratch_dir("source")?;
    extract_zip(
        &download_artifact(store, source_artifact)?,
        source_dir.path(),
    )?;

    let build_dir = scratch_dir("build")?;
    perform_build(&source_dir.path().join(SOURCE_SUBDIR), build_dir.path())?;
    upload_artifact(store, build_artifact, &zip_directory(build_dir.path())?)?;

    let template_dir = source_dir.path().join(template_subdir);
    upload_artifact(store, template_artifact, &zip_directory(&template_dir)?)?;

    log::info(
        COMPONENT,
        "artifacts_uploaded",
        json!({
            "build_artifact": build_artifact.name.clone(),
            "template_artifact": template_artifact.name.clone(),
        }),
    );
    Ok(BUILD_COMPLETE_MESSAGE.to_string())
}

/// The build itself: the site is static, so building is copying `src` into
/// the output tree.
pub fn perform_build(src_dir: &Path, dest_dir: &Path) -> Result<(), DeployError> {
    if !src_dir.is_dir() {
        return Err(DeployError::new(format!(
            "Source artifact has no '{SOURCE_SUBDIR}' directory"
        )));
    }
    copy_tree(src_dir, dest_dir)
}

fn relative_subdir(raw: &str) -> Result<PathBuf, DeployError> {
    let path = Path::new(raw.trim());
    let escapes = path
        .components()
        .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(DeployError::new(format!(
            "template_subdir_path must be relative to the source root, got '{raw}'"
        )));
    }
    Ok(path.to_path_buf())
}

fn scratch_dir(purpose: &str) -> Result<TempDir, DeployError> {
    tempfile::Builder::new()
        .prefix(&format!("{COMPONENT}-{purpose}-"))
        .tempdir()
        .map_err(|error| DeployError::new(format!("Failed to create temp directory: {error}")))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use ci_deploy_core::packaging::read_zip_entry;
    use serde_json::{json, Value};

    use super::*;
    use crate::adapters::artifact_store::testing::MemoryArtifacts;
    use crate::handlers::fixtures::{artifact, job};

    fn build_params() -> Value {
        json!({
            "source_artifact": "SourceArtifact",
            "build_artifact": "BuildArtifact",
            "template_artifact": "TemplateArtifact",
            "template_subdir_path": "cfn"
        })
    }

    fn build_job(params: Value) -> PipelineJob {
        job(
            params,
            vec![artifact("SourceArtifact", "a4tp/SourceArti/src.zip")],
            vec![
                artifact("BuildArtifact", "a4tp/BuildArtif/build.zip"),
                artifact("TemplateArtifact", "a4tp/TemplateAr/template.zip"),
            ],
            None,
        )
    }

    fn source_zip(with_src: bool) -> Vec<u8> {
        let dir = tempfile::tempdir().expect("tempdir");
        if with_src {
            fs::create_dir_all(dir.path().join("src/static")).expect("mkdir");
            fs::write(dir.path().join("src/index.html"), "Automation for the People")
                .expect("write");
            fs::write(dir.path().join("src/static/app.css"), "body {}").expect("write");
        }
        fs::create_dir_all(dir.path().join("cfn")).expect("mkdir");
        fs::write(dir.path().join("cfn/web.template"), "{\"Resources\":{}}").expect("write");
        fs::write(dir.path().join("README.md"), "docs").expect("write");
        zip_directory(dir.path()).expect("zip")
    }

    #[test]
    fn publishes_build_and_template_artifacts() {
        let store = MemoryArtifacts::new();
        store.seed("pipeline-artifacts", "a4tp/SourceArti/src.zip", source_zip(true));

        let outcome = handle_build_job(&build_job(build_params()), &store);
        assert_eq!(outcome, JobOutcome::succeeded(BUILD_COMPLETE_MESSAGE));

        let build = store
            .body("pipeline-artifacts", "a4tp/BuildArtif/build.zip")
            .expect("build artifact uploaded");
        assert_eq!(
            read_zip_entry(&build, "index.html").expect("site root"),
            "Automation for the People"
        );
        assert_eq!(
            read_zip_entry(&build, "static/app.css").expect("nested asset"),
            "body {}"
        );
        assert!(read_zip_entry(&build, "README.md").is_err());

        let template = store
            .body("pipeline-artifacts", "a4tp/TemplateAr/template.zip")
            .expect("template artifact uploaded");
        assert_eq!(
            read_zip_entry(&template, "web.template").expect("template file"),
            "{\"Resources\":{}}"
        );
    }

    #[test]
    fn source_without_src_directory_fails_the_job() {
        let store = MemoryArtifacts::new();
        store.seed("pipeline-artifacts", "a4tp/SourceArti/src.zip", source_zip(false));

        let outcome = handle_build_job(&build_job(build_params()), &store);
        assert_eq!(
            outcome,
            JobOutcome::failed("Function exception: Source artifact has no 'src' directory")
        );
        assert!(store
            .body("pipeline-artifacts", "a4tp/BuildArtif/build.zip")
            .is_none());
    }

    #[test]
    fn missing_parameter_fails_before_touching_storage() {
        let store = MemoryArtifacts::new();
        let mut params = build_params();
        params
            .as_object_mut()
            .expect("object")
            .remove("template_subdir_path");

        let outcome = handle_build_job(&build_job(params), &store);
        assert_eq!(
            outcome,
            JobOutcome::failed(
                "Function exception: Your UserParameters JSON must include template_subdir_path"
            )
        );
    }

    #[test]
    fn template_path_cannot_escape_source_tree() {
        assert!(relative_subdir("cfn").is_ok());
        assert!(relative_subdir("").is_ok());
        assert!(relative_subdir("../etc").is_err());
        assert!(relative_subdir("/etc").is_err());
    }
}
