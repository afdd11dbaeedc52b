use crate::error::DeployError;

pub const DEFAULT_APP_NAME: &str = "a4tp";
pub const DEFAULT_GITHUB_REPO: &str = "aws-ci-demo";
pub const DEFAULT_GITHUB_BRANCH: &str = "master";
pub const LAMBDA_PACKAGE_KEY: &str = "Lambdas.zip";

pub fn default_ci_stack_name(app_name: &str) -> String {
    format!("{app_name}-ci")
}

pub fn default_web_stack_name(app_name: &str) -> String {
    format!("{app_name}-web")
}

/// CI stack name, honouring an explicit override.
pub fn ci_stack_name(app_name: &str, configured: Option<&str>) -> String {
    non_blank(configured)
        .map(str::to_string)
        .unwrap_or_else(|| default_ci_stack_name(app_name))
}

/// Raw provisioning configuration as gathered from flags and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionInputs {
    pub app_name: String,
    pub region: Option<String>,
    pub ci_stack_name: Option<String>,
    pub web_stack_name: Option<String>,
    pub key_name: Option<String>,
    pub github_user: Option<String>,
    pub github_token: Option<String>,
    pub github_repo: Option<String>,
    pub github_branch: Option<String>,
}

impl Default for ProvisionInputs {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            region: None,
            ci_stack_name: None,
            web_stack_name: None,
            key_name: None,
            github_user: None,
            github_token: None,
            github_repo: None,
            github_branch: None,
        }
    }
}

/// Validated settings for standing up the CI stack.
#[derive(Clone, PartialEq, Eq)]
pub struct CiSettings {
    pub app_name: String,
    pub region: String,
    pub ci_stack_name: String,
    pub web_stack_name: String,
    pub key_name: String,
    pub github_user: String,
    pub github_token: String,
    pub github_repo: String,
    pub github_branch: String,
}

impl std::fmt::Debug for CiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CiSettings")
            .field("app_name", &self.app_name)
            .field("region", &self.region)
            .field("ci_stack_name", &self.ci_stack_name)
            .field("web_stack_name", &self.web_stack_name)
            .field("key_name", &self.key_name)
            .field("github_user", &self.github_user)
            .field("github_repo", &self.github_repo)
            .field("github_branch", &self.github_branch)
            .finish_non_exhaustive()
    }
}

impl ProvisionInputs {
    pub fn validate(self) -> Result<CiSettings, DeployError> {
        let app_name = self.app_name.trim().to_string();
        if app_name.is_empty() {
            return Err(DeployError::new("APP_NAME cannot be empty"));
        }

        let region = required(
            self.region,
            "you must configure the AWS region (perhaps via the AWS_DEFAULT_REGION env var) before running this script",
        )?;
        let key_name = required(
            self.key_name,
            "you must set the AWS_EC2_KEYNAME env var before running this script",
        )?;
        let github_user = required(
            self.github_user,
            "you must set the GITHUB_USERNAME env var before running this script",
        )?;
        let github_token = required(
            self.github_token,
            "you must set the GITHUB_OAUTH_TOKEN env var before running this script",
        )?;

        Ok(CiSettings {
            ci_stack_name: ci_stack_name(&app_name, self.ci_stack_name.as_deref()),
            web_stack_name: non_blank(self.web_stack_name.as_deref())
                .map(str::to_string)
                .unwrap_or_else(|| default_web_stack_name(&app_name)),
            github_repo: non_blank(self.github_repo.as_deref())
                .unwrap_or(DEFAULT_GITHUB_REPO)
                .to_string(),
            github_branch: non_blank(self.github_branch.as_deref())
                .unwrap_or(DEFAULT_GITHUB_BRANCH)
                .to_string(),
            app_name,
            region,
            key_name,
            github_user,
            github_token,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn required(value: Option<String>, message: &str) -> Result<String, DeployError> {
    non_blank(value.as_deref())
        .map(str::to_string)
        .ok_or_else(|| DeployError::new(message))
}
