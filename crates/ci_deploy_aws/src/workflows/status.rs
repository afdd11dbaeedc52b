use ci_deploy_core::error::DeployError;
use ci_deploy_core::probe::{site_is_serving, site_url, SiteProbe};
use ci_deploy_core::stack::{require_output, stack_exists, stack_outputs, StackOps};

use super::WEB_STACK_NAME_OUTPUT;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteStatus {
    CiStackMissing,
    WebStackMissing,
    Serving { url: String },
    NotServing { url: String },
}

impl SiteStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Serving { .. })
    }

    /// The one line shown to the operator.
    pub fn summary(&self) -> &'static str {
        match self {
            Self::CiStackMissing => "CI stack not found",
            Self::WebStackMissing => "Web stack not found",
            Self::Serving { .. } => "OK",
            Self::NotServing { .. } => "NOT OK",
        }
    }
}

pub fn check_status(
    stacks: &impl StackOps,
    probe: &impl SiteProbe,
    ci_stack_name: &str,
) -> Result<SiteStatus, DeployError> {
    if !stack_exists(stacks, ci_stack_name)? {
        return Ok(SiteStatus::CiStackMissing);
    }

    let ci_outputs = stack_outputs(stacks, ci_stack_name)?;
    let Some(web_stack_name) = ci_outputs.get(WEB_STACK_NAME_OUTPUT) else {
        return Ok(SiteStatus::WebStackMissing);
    };
    if !stack_exists(stacks, web_stack_name)? {
        return Ok(SiteStatus::WebStackMissing);
    }

    let web_outputs = stack_outputs(stacks, web_stack_name)?;
    let url = site_url(require_output(&web_outputs, "BalancerDNSName")?);
    Ok(if site_is_serving(probe, &url) {
        SiteStatus::Serving { url }
    } else {
        SiteStatus::NotServing { url }
    })
}
