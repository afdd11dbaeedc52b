//! Contracts for CodePipeline job invocations and the results reported back.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::DeployError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodePipelineEvent {
    #[serde(rename = "CodePipeline.job")]
    pub job: PipelineJob,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineJob {
    pub id: String,
    pub data: JobData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobData {
    pub action_configuration: ActionConfiguration,
    #[serde(default)]
    pub input_artifacts: Vec<Artifact>,
    #[serde(default)]
    pub output_artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_credentials: Option<ArtifactCredentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,
}

impl JobData {
    pub fn credentials(&self) -> Result<&ArtifactCredentials, DeployError> {
        self.artifact_credentials
            .as_ref()
            .ok_or_else(|| DeployError::new("Job data is missing artifactCredentials"))
    }

    pub fn is_continuation(&self) -> bool {
        self.continuation_token.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionConfiguration {
    pub configuration: ActionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionSettings {
    #[serde(rename = "FunctionName", default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(rename = "UserParameters", default, skip_serializing_if = "Option::is_none")]
    pub user_parameters: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub location: ArtifactLocation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactLocation {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(rename = "s3Location")]
    pub s3_location: S3Location,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct S3Location {
    pub bucket_name: String,
    pub object_key: String,
}

/// Short-lived credentials scoped to the pipeline's artifact bucket.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
}

impl std::fmt::Debug for ArtifactCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactCredentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct ContinuationState {
    previous_job_id: String,
}

/// What a stage handler tells the pipeline once it is done with an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded {
        message: String,
    },
    Failed {
        message: String,
    },
    /// Report success with a continuation token so the pipeline invokes the
    /// stage again later.
    Continue {
        message: String,
        continuation_token: String,
    },
}

impl JobOutcome {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self::Succeeded {
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    pub fn continue_later(job_id: &str, message: impl Into<String>) -> Self {
        Self::Continue {
            message: message.into(),
            continuation_token: continuation_token(job_id),
        }
    }

    pub fn function_exception(error: &DeployError) -> Self {
        Self::failed(format!("Function exception: {error}"))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Succeeded { message }
            | Self::Failed { message }
            | Self::Continue { message, .. } => message,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "success",
            Self::Failed { .. } => "failure",
            Self::Continue { .. } => "continuation",
        }
    }
}

pub fn continuation_token(job_id: &str) -> String {
    serde_json::to_string(&ContinuationState {
        previous_job_id: job_id.to_string(),
    })
    .unwrap_or_else(|_| json!({ "previous_job_id": job_id }).to_string())
}

/// Job id of the invocation that started a continuation chain, if the token
/// is one of ours.
pub fn previous_job_id(token: &str) -> Option<String> {
    serde_json::from_str::<ContinuationState>(token)
        .ok()
        .map(|state| state.previous_job_id)
}

pub fn decode_event(event: Value) -> Result<CodePipelineEvent, DeployError> {
    serde_json::from_value(event)
        .map_err(|error| DeployError::new(format!("Malformed CodePipeline job event: {error}")))
}

/// Best-effort job id lookup for events that fail to decode, so the failure
/// can still be reported to the pipeline.
pub fn job_id_of(event: &Value) -> Option<&str> {
    event
        .get("CodePipeline.job")
        .and_then(|job| job.get("id"))
        .and_then(Value::as_str)
}

pub fn find_artifact<'a>(
    artifacts: &'a [Artifact],
    name: &str,
) -> Result<&'a Artifact, DeployError> {
    artifacts
        .iter()
        .find(|artifact| artifact.name == name)
        .ok_or_else(|| {
            DeployError::new(format!("Input artifact named \"{name}\" not found in event"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Value {
        json!({
            "CodePipeline.job": {
                "id": "11111111-abcd-1111-abcd-111111abcdef",
                "accountId": "111111111111",
                "data": {
                    "actionConfiguration": {
                        "configuration": {
                            "FunctionName": "a4tp-deploy",
                            "UserParameters": "{\"web_stack_name\":\"a4tp-web\"}"
                        }
                    },
                    "inputArtifacts": [
                        {
                            "location": {
                                "s3Location": {
                                    "bucketName": "codepipeline-artifacts",
                                    "objectKey": "a4tp/TemplateAr/abc.zip"
                                },
                                "type": "S3"
                            },
                            "revision": null,
                            "name": "TemplateArtifact"
                        }
                    ],
                    "outputArtifacts": [],
                    "artifactCredentials": {
                        "secretAccessKey": "secret",
                        "sessionToken": "token",
                        "accessKeyId": "AKIAEXAMPLE"
                    }
                }
            }
        })
    }

    #[test]
    fn decodes_pipeline_event() {
        let event = decode_event(sample_event()).expect("event should decode");
        assert_eq!(event.job.id, "11111111-abcd-1111-abcd-111111abcdef");
        assert_eq!(event.job.data.continuation_token, None);
        assert_eq!(
            event.job.data.input_artifacts[0].location.s3_location.bucket_name,
            "codepipeline-artifacts"
        );
        assert_eq!(
            event
                .job
                .data
                .artifact_credentials
                .expect("credentials present")
                .access_key_id,
            "AKIAEXAMPLE"
        );
    }

    #[test]
    fn job_id_survives_malformed_data() {
        let event = json!({"CodePipeline.job": {"id": "job-1", "data": "oops"}});
        assert!(decode_event(event.clone()).is_err());
        assert_eq!(job_id_of(&event), Some("job-1"));
    }

    #[test]
    fn continuation_token_round_trips_job_id() {
        let outcome = JobOutcome::continue_later("job-1", "Stack update started");
        let JobOutcome::Continue {
            continuation_token, ..
        } = &outcome
        else {
            panic!("expected continuation");
        };
        assert_eq!(previous_job_id(continuation_token), Some("job-1".to_string()));
        assert_eq!(outcome.kind(), "continuation");
        assert_eq!(outcome.message(), "Stack update started");
    }

    #[test]
    fn missing_artifact_is_named() {
        let event = decode_event(sample_event()).expect("event should decode");
        let error = find_artifact(&event.job.data.input_artifacts, "BuildArtifact")
            .expect_err("artifact is absent");
        assert_eq!(
            error.message(),
            "Input artifact named \"BuildArtifact\" not found in event"
        );
    }

    #[test]
    fn credentials_are_not_leaked_by_debug() {
        let event = decode_event(sample_event()).expect("event should decode");
        let rendered = format!("{:?}", event.job.data.artifact_credentials);
        assert!(!rendered.contains("secret"));
        assert!(!rendered.contains("token"));
    }
}
