//! Operator workflows behind the `ci` binary. Each one drives the service
//! seams only, so they run unchanged against the in-memory fakes.

pub mod provision;
pub mod status;
pub mod terminate;

use ci_deploy_core::error::DeployError;
use ci_deploy_core::poll::PollOutcome;

/// Turns a finished wait into an error unless the stack succeeded.
pub(crate) fn require_success(
    outcome: PollOutcome,
    label: &str,
    verb: &str,
) -> Result<(), DeployError> {
    match outcome {
        PollOutcome::Succeeded => Ok(()),
        PollOutcome::Failed(status) => Err(DeployError::new(format!(
            "{label} stack {verb} failed: current status {status}"
        ))),
        PollOutcome::TimedOut => Err(DeployError::new(format!(
            "Timed out waiting for {label} stack {verb}"
        ))),
    }
}

/// Name of the web stack recorded in the CI stack's outputs.
pub(crate) const WEB_STACK_NAME_OUTPUT: &str = "WebStackName";
