use std::collections::BTreeMap;

use serde_json::json;

use crate::error::DeployError;
use crate::log;

pub const NO_UPDATES_MESSAGE: &str = "No updates are to be performed.";
const MISSING_STACK_FRAGMENT: &str = "does not exist";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackStatus {
    CreateInProgress,
    CreateComplete,
    CreateFailed,
    RollbackInProgress,
    RollbackComplete,
    UpdateInProgress,
    UpdateCompleteCleanupInProgress,
    UpdateComplete,
    UpdateRollbackInProgress,
    UpdateRollbackCompleteCleanupInProgress,
    UpdateRollbackComplete,
    DeleteInProgress,
    DeleteComplete,
    DeleteFailed,
    Other(String),
}

/// Where a create/update currently stands, as far as a waiter cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackPhase {
    Succeeded,
    InProgress,
    Failed,
}

impl StackStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "CREATE_IN_PROGRESS" => Self::CreateInProgress,
            "CREATE_COMPLETE" => Self::CreateComplete,
            "CREATE_FAILED" => Self::CreateFailed,
            "ROLLBACK_IN_PROGRESS" => Self::RollbackInProgress,
            "ROLLBACK_COMPLETE" => Self::RollbackComplete,
            "UPDATE_IN_PROGRESS" => Self::UpdateInProgress,
            "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS" => Self::UpdateCompleteCleanupInProgress,
            "UPDATE_COMPLETE" => Self::UpdateComplete,
            "UPDATE_ROLLBACK_IN_PROGRESS" => Self::UpdateRollbackInProgress,
            "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS" => {
                Self::UpdateRollbackCompleteCleanupInProgress
            }
            "UPDATE_ROLLBACK_COMPLETE" => Self::UpdateRollbackComplete,
            "DELETE_IN_PROGRESS" => Self::DeleteInProgress,
            "DELETE_COMPLETE" => Self::DeleteComplete,
            "DELETE_FAILED" => Self::DeleteFailed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::CreateInProgress => "CREATE_IN_PROGRESS",
            Self::CreateComplete => "CREATE_COMPLETE",
            Self::CreateFailed => "CREATE_FAILED",
            Self::RollbackInProgress => "ROLLBACK_IN_PROGRESS",
            Self::RollbackComplete => "ROLLBACK_COMPLETE",
            Self::UpdateInProgress => "UPDATE_IN_PROGRESS",
            Self::UpdateCompleteCleanupInProgress => "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS",
            Self::UpdateComplete => "UPDATE_COMPLETE",
            Self::UpdateRollbackInProgress => "UPDATE_ROLLBACK_IN_PROGRESS",
            Self::UpdateRollbackCompleteCleanupInProgress => {
                "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS"
            }
            Self::UpdateRollbackComplete => "UPDATE_ROLLBACK_COMPLETE",
            Self::DeleteInProgress => "DELETE_IN_PROGRESS",
            Self::DeleteComplete => "DELETE_COMPLETE",
            Self::DeleteFailed => "DELETE_FAILED",
            Self::Other(raw) => raw,
        }
    }

    pub fn phase(&self) -> StackPhase {
        match self {
            Self::CreateComplete | Self::UpdateComplete => StackPhase::Succeeded,
            Self::CreateInProgress
            | Self::RollbackInProgress
            | Self::UpdateInProgress
            | Self::UpdateCompleteCleanupInProgress
            | Self::UpdateRollbackInProgress
            | Self::UpdateRollbackCompleteCleanupInProgress => StackPhase::InProgress,
            _ => StackPhase::Failed,
        }
    }

    /// Statuses from which the service accepts a new update.
    pub fn is_updatable(&self) -> bool {
        matches!(
            self,
            Self::CreateComplete
                | Self::RollbackComplete
                | Self::UpdateComplete
                | Self::UpdateRollbackComplete
        )
    }
}

impl std::fmt::Display for StackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackParameter {
    pub key: String,
    pub value: String,
}

impl StackParameter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackDescription {
    pub name: String,
    pub status: StackStatus,
    pub outputs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Started,
    NoChanges,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackAction {
    Created,
    Updated,
    Unchanged,
    /// The stack exists but its status does not accept updates.
    Blocked(StackStatus),
}

impl StackAction {
    /// Whether the service is now working on the stack and a waiter is needed.
    pub fn started(&self) -> bool {
        matches!(self, Self::Created | Self::Updated)
    }
}

pub fn blocked_message(status: &StackStatus) -> String {
    format!("Stack cannot be updated when status is: {status}")
}

/// Calls against the orchestration service.
///
/// `describe` returns `Ok(None)` when the service says the stack does not
/// exist; `update` maps the "no updates" rejection to
/// [`UpdateOutcome::NoChanges`]. Implementations should classify service
/// messages with [`is_missing_stack_message`] and [`is_no_updates_message`].
pub trait StackOps {
    fn describe(&self, name: &str) -> Result<Option<StackDescription>, String>;

    fn create(&self, name: &str, template: &str, params: &[StackParameter])
        -> Result<(), String>;

    fn update(
        &self,
        name: &str,
        template: &str,
        params: &[StackParameter],
    ) -> Result<UpdateOutcome, String>;

    fn delete(&self, name: &str) -> Result<(), String>;
}

pub fn is_missing_stack_message(message: &str) -> bool {
    message.contains(MISSING_STACK_FRAGMENT)
}

pub fn is_no_updates_message(message: &str) -> bool {
    message == NO_UPDATES_MESSAGE
}

pub fn stack_exists(stacks: &impl StackOps, name: &str) -> Result<bool, DeployError> {
    Ok(stacks.describe(name).map_err(DeployError::new)?.is_some())
}

pub fn describe_existing(
    stacks: &impl StackOps,
    name: &str,
) -> Result<StackDescription, DeployError> {
    stacks
        .describe(name)
        .map_err(DeployError::new)?
        .ok_or_else(|| DeployError::new(format!("Stack with id {name} does not exist")))
}

pub fn stack_status(stacks: &impl StackOps, name: &str) -> Result<StackStatus, DeployError> {
    Ok(describe_existing(stacks, name)?.status)
}

pub fn stack_outputs(
    stacks: &impl StackOps,
    name: &str,
) -> Result<BTreeMap<String, String>, DeployError> {
    Ok(describe_existing(stacks, name)?.outputs)
}

pub fn require_output<'a>(
    outputs: &'a BTreeMap<String, String>,
    key: &str,
) -> Result<&'a str, DeployError> {
    outputs
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| DeployError::new(format!("Stack output '{key}' is missing")))
}

pub fn update_stack(
    stacks: &impl StackOps,
    name: &str,
    template: &str,
    params: &[StackParameter],
) -> Result<UpdateOutcome, DeployError> {
    log::info("stack", "update_requested", json!({ "stack": name }));
    stacks.update(name, template, params).map_err(|error| {
        DeployError::new(format!(
            "Error updating CloudFormation stack \"{name}\": {error}"
        ))
    })
}

pub fn create_stack(
    stacks: &impl StackOps,
    name: &str,
    template: &str,
    params: &[StackParameter],
) -> Result<(), DeployError> {
    log::info("stack", "create_requested", json!({ "stack": name }));
    stacks.create(name, template, params).map_err(|error| {
        DeployError::new(format!(
            "Error creating CloudFormation stack \"{name}\": {error}"
        ))
    })
}

/// Updates the stack when it exists and is in a state that accepts updates,
/// creates it when it does not exist. Returns as soon as the service accepts
/// the request; waiting is the caller's business.
pub fn start_create_or_update(
    stacks: &impl StackOps,
    name: &str,
    template: &str,
    params: &[StackParameter],
) -> Result<StackAction, DeployError> {
    let Some(existing) = stacks.describe(name).map_err(DeployError::new)? else {
        create_stack(stacks, name, template, params)?;
        return Ok(StackAction::Created);
    };

    if !existing.status.is_updatable() {
        log::warn(
            "stack",
            "update_blocked",
            json!({ "stack": name, "status": existing.status.as_str() }),
        );
        return Ok(StackAction::Blocked(existing.status));
    }

    match update_stack(stacks, name, template, params)? {
        UpdateOutcome::Started => Ok(StackAction::Updated),
        UpdateOutcome::NoChanges => Ok(StackAction::Unchanged),
    }
}
