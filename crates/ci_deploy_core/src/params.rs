use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::CiSettings;
use crate::error::DeployError;
use crate::job::{find_artifact, Artifact, JobData};
use crate::stack::StackParameter;

pub const BUILD_REQUIRED_PARAMETERS: [&str; 4] = [
    "source_artifact",
    "build_artifact",
    "template_artifact",
    "template_subdir_path",
];

pub const DEPLOY_REQUIRED_PARAMETERS: [&str; 8] = [
    "build_artifact",
    "vpc_id",
    "subnet_id_a",
    "appname",
    "keyname",
    "web_stack_name",
    "template_artifact",
    "template_file",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildParams {
    pub source_artifact: String,
    pub build_artifact: String,
    pub template_artifact: String,
    pub template_subdir_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeployParams {
    pub build_artifact: String,
    pub vpc_id: String,
    pub subnet_id_a: String,
    pub appname: String,
    pub keyname: String,
    pub web_stack_name: String,
    pub template_artifact: String,
    pub template_file: String,
}

impl BuildParams {
    pub fn from_job(data: &JobData) -> Result<Self, DeployError> {
        decode_user_params(
            data.action_configuration.configuration.user_parameters.as_deref(),
            &BUILD_REQUIRED_PARAMETERS,
        )
    }
}

impl DeployParams {
    pub fn from_job(data: &JobData) -> Result<Self, DeployError> {
        decode_user_params(
            data.action_configuration.configuration.user_parameters.as_deref(),
            &DEPLOY_REQUIRED_PARAMETERS,
        )
    }
}

/// Decodes the action's `UserParameters` JSON and checks every required key
/// is present as a string before deserializing into `T`.
pub fn decode_user_params<T: DeserializeOwned>(
    raw: Option<&str>,
    required: &[&str],
) -> Result<T, DeployError> {
    let decoded: Map<String, Value> = raw
        .and_then(|text| serde_json::from_str(text).ok())
        .ok_or_else(|| DeployError::new("UserParameters could not be decoded as JSON"))?;

    for key in required {
        match decoded.get(*key) {
            None => {
                return Err(DeployError::new(format!(
                    "Your UserParameters JSON must include {key}"
                )))
            }
            Some(Value::String(_)) => {}
            Some(_) => {
                return Err(DeployError::new(format!(
                    "UserParameters value for {key} must be a string"
                )))
            }
        }
    }

    serde_json::from_value(Value::Object(decoded))
        .map_err(|error| DeployError::new(format!("Invalid UserParameters: {error}")))
}

pub fn ci_stack_parameters(
    settings: &CiSettings,
    bucket_name: &str,
    lambda_key: &str,
    lambda_version: &str,
) -> Vec<StackParameter> {
    vec![
        StackParameter::new("AppName", &settings.app_name),
        StackParameter::new("BuildBucket", bucket_name),
        StackParameter::new("LambdaKey", lambda_key),
        StackParameter::new("LambdaLatestVersion", lambda_version),
        StackParameter::new("GitHubUser", &settings.github_user),
        StackParameter::new("GitHubToken", &settings.github_token),
        StackParameter::new("GitHubRepoName", &settings.github_repo),
        StackParameter::new("GitHubBranchName", &settings.github_branch),
        StackParameter::new("WebStackName", &settings.web_stack_name),
        StackParameter::new("KeyName", &settings.key_name),
    ]
}

/// Web stack parameters; the build location comes from the build artifact
/// the pipeline handed to this invocation.
pub fn web_stack_parameters(
    params: &DeployParams,
    input_artifacts: &[Artifact],
) -> Result<Vec<StackParameter>, DeployError> {
    let build = find_artifact(input_artifacts, &params.build_artifact)?;
    Ok(vec![
        StackParameter::new("VPC", &params.vpc_id),
        StackParameter::new("PublicSubnetA", &params.subnet_id_a),
        StackParameter::new("AppName", &params.appname),
        StackParameter::new("KeyName", &params.keyname),
        StackParameter::new("BuildBucket", &build.location.s3_location.bucket_name),
        StackParameter::new("BuildKey", &build.location.s3_location.object_key),
    ])
}
