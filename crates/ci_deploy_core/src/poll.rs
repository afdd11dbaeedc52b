use std::thread;
use std::time::{Duration, Instant};

use serde_json::json;

use crate::error::DeployError;
use crate::log;
use crate::stack::{StackOps, StackPhase, StackStatus};

pub const STACK_POLL_INTERVAL: Duration = Duration::from_secs(15);
pub const STACK_POLL_TIMEOUT: Duration = Duration::from_secs(600);
pub const SITE_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const SITE_POLL_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub const fn stacks() -> Self {
        Self::new(STACK_POLL_INTERVAL, STACK_POLL_TIMEOUT)
    }

    pub const fn site() -> Self {
        Self::new(SITE_POLL_INTERVAL, SITE_POLL_TIMEOUT)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Succeeded,
    Failed(StackStatus),
    TimedOut,
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Runs `attempt` until it yields a value, sleeping `policy.interval` between
/// attempts. Returns `Ok(None)` once `policy.timeout` has elapsed without a
/// value; errors from `attempt` end the wait immediately.
pub fn poll_until<T>(
    policy: &PollPolicy,
    mut attempt: impl FnMut() -> Result<Option<T>, DeployError>,
) -> Result<Option<T>, DeployError> {
    let started_at = Instant::now();
    loop {
        if let Some(value) = attempt()? {
            return Ok(Some(value));
        }
        if started_at.elapsed() >= policy.timeout {
            return Ok(None);
        }
        thread::sleep(policy.interval);
    }
}

/// Waits for a create/update to settle. `label` names the stack for humans
/// ("CI", "web") and `verb` the operation ("create", "update", "deploy").
pub fn wait_for_stack_success(
    stacks: &impl StackOps,
    stack_name: &str,
    label: &str,
    verb: &str,
    policy: &PollPolicy,
) -> Result<PollOutcome, DeployError> {
    let outcome = poll_until(policy, || {
        let status = crate::stack::stack_status(stacks, stack_name)?;
        Ok(match status.phase() {
            StackPhase::Succeeded => Some(PollOutcome::Succeeded),
            StackPhase::Failed => Some(PollOutcome::Failed(status)),
            StackPhase::InProgress => None,
        })
    })?
    .unwrap_or(PollOutcome::TimedOut);

    match &outcome {
        PollOutcome::Succeeded => log::info(
            "poller",
            "stack_succeeded",
            json!({
                "stack": stack_name,
                "message": format!("{label} stack successfully {verb}d"),
            }),
        ),
        PollOutcome::Failed(status) => log::error(
            "poller",
            "stack_failed",
            json!({
                "stack": stack_name,
                "status": status.as_str(),
                "message": format!("{label} stack {verb} failed: current status {status}"),
            }),
        ),
        PollOutcome::TimedOut => log::error(
            "poller",
            "stack_timed_out",
            json!({
                "stack": stack_name,
                "timeout_secs": policy.timeout.as_secs(),
                "message": format!("Timed out waiting for {label} stack {verb}"),
            }),
        ),
    }

    Ok(outcome)
}

pub fn wait_for_stack_existence(
    stacks: &impl StackOps,
    stack_name: &str,
    policy: &PollPolicy,
) -> Result<bool, DeployError> {
    log::info("poller", "awaiting_stack", json!({ "stack": stack_name }));
    let appeared = poll_until(policy, || {
        Ok(crate::stack::stack_exists(stacks, stack_name)?.then_some(()))
    })?
    .is_some();

    if !appeared {
        log::error(
            "poller",
            "stack_never_appeared",
            json!({
                "stack": stack_name,
                "timeout_secs": policy.timeout.as_secs(),
            }),
        );
    }
    Ok(appeared)
}

pub fn wait_for_stack_deletion(
    stacks: &impl StackOps,
    stack_name: &str,
    policy: &PollPolicy,
) -> Result<PollOutcome, DeployError> {
    let outcome = poll_until(policy, || {
        let Some(description) = stacks.describe(stack_name).map_err(DeployError::new)? else {
            return Ok(Some(PollOutcome::Succeeded));
        };
        Ok(match description.status {
            StackStatus::DeleteComplete => Some(PollOutcome::Succeeded),
            StackStatus::DeleteFailed => Some(PollOutcome::Failed(description.status)),
            _ => None,
        })
    })?
    .unwrap_or(PollOutcome::TimedOut);

    log::info(
        "poller",
        "stack_deletion_finished",
        json!({
            "stack": stack_name,
            "outcome": format!("{outcome:?}"),
        }),
    );
    Ok(outcome)
}
