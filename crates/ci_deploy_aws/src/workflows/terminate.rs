use std::io::{BufRead, Write};

use ci_deploy_core::error::DeployError;
use ci_deploy_core::log;
use ci_deploy_core::poll::{wait_for_stack_deletion, PollPolicy};
use ci_deploy_core::stack::{stack_exists, stack_outputs, StackOps};
use serde_json::json;

use super::{require_success, WEB_STACK_NAME_OUTPUT};

const COMPONENT: &str = "terminate";

/// Asks the operator to confirm; anything but a literal `yes` declines.
pub fn user_confirms(input: &mut impl BufRead, output: &mut impl Write) -> Result<bool, String> {
    writeln!(
        output,
        "Are you sure you want to terminate the app and all its AWS resources?"
    )
    .map_err(|error| error.to_string())?;
    write!(output, "Enter 'yes' to terminate: ").map_err(|error| error.to_string())?;
    output.flush().map_err(|error| error.to_string())?;

    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .map_err(|error| error.to_string())?;
    Ok(answer.trim_end_matches(&['\r', '\n'][..]) == "yes")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    CiStackMissing,
    /// Stacks deleted, in deletion order.
    Deleted(Vec<String>),
}

/// Deletes the web stack named by the CI stack (when it still exists) and
/// then the CI stack, waiting for each deletion to finish. The build bucket
/// is left alone.
pub fn terminate(
    stacks: &impl StackOps,
    ci_stack_name: &str,
    policy: &PollPolicy,
) -> Result<Termination, DeployError> {
    if !stack_exists(stacks, ci_stack_name)? {
        return Ok(Termination::CiStackMissing);
    }

    let ci_outputs = stack_outputs(stacks, ci_stack_name)?;
    let mut deleted = Vec::new();
    match ci_outputs.get(WEB_STACK_NAME_OUTPUT) {
        Some(web_stack) if stack_exists(stacks, web_stack)? => {
            delete_and_wait(stacks, web_stack, "web", policy)?;
            deleted.push(web_stack.clone());
        }
        Some(web_stack) => log::info(
            COMPONENT,
            "web_stack_already_gone",
            json!({ "stack": web_stack }),
        ),
        None => log::warn(
            COMPONENT,
            "web_stack_not_found",
            json!({ "ci_stack": ci_stack_name }),
        ),
    }

    delete_and_wait(stacks, ci_stack_name, "CI", policy)?;
    deleted.push(ci_stack_name.to_string());
    Ok(Termination::Deleted(deleted))
}

fn delete_and_wait(
    stacks: &impl StackOps,
    stack_name: &str,
    label: &str,
    policy: &PollPolicy,
) -> Result<(), DeployError> {
    log::info(COMPONENT, "terminating_stack", json!({ "stack": stack_name }));
    stacks.delete(stack_name).map_err(|error| {
        DeployError::new(format!(
            "Error deleting CloudFormation stack \"{stack_name}\": {error}"
        ))
    })?;
    require_success(
        wait_for_stack_deletion(stacks, stack_name, policy)?,
        label,
        "delete",
    )
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use ci_deploy_core::testing::ScriptedStacks;

    use super::*;

    fn instant_policy() -> PollPolicy {
        PollPolicy::new(Duration::ZERO, Duration::from_secs(60))
    }

    fn confirm(answer: &str) -> (bool, String) {
        let mut output = Vec::new();
        let confirmed =
            user_confirms(&mut Cursor::new(answer.as_bytes()), &mut output).expect("prompt");
        (confirmed, String::from_utf8(output).expect("utf8 prompt"))
    }

    #[test]
    fn only_literal_yes_confirms() {
        let (confirmed, prompt) = confirm("yes\n");
        assert!(confirmed);
        assert!(prompt.ends_with("Enter 'yes' to terminate: "));

        assert!(!confirm("y\n").0);
        assert!(!confirm("YES\n").0);
        assert!(!confirm(" yes\n").0);
        assert!(!confirm("").0);
    }

    #[test]
    fn deletes_web_stack_before_ci_stack() {
        let stacks = ScriptedStacks::new();
        stacks.script(
            "a4tp-ci",
            &[
                Some("CREATE_COMPLETE"),
                Some("CREATE_COMPLETE"),
                Some("DELETE_IN_PROGRESS"),
                None,
            ],
        );
        stacks.script(
            "a4tp-web",
            &[Some("UPDATE_COMPLETE"), Some("DELETE_IN_PROGRESS"), None],
        );
        stacks.set_outputs("a4tp-ci", &[("WebStackName", "a4tp-web")]);

        let termination =
            terminate(&stacks, "a4tp-ci", &instant_policy()).expect("terminate should succeed");
        assert_eq!(
            termination,
            Termination::Deleted(vec!["a4tp-web".to_string(), "a4tp-ci".to_string()])
        );
        assert_eq!(
            stacks.calls(),
            vec!["delete:a4tp-web".to_string(), "delete:a4tp-ci".to_string()]
        );
    }

    #[test]
    fn missing_web_stack_still_removes_ci_stack() {
        let stacks = ScriptedStacks::new();
        stacks.script(
            "a4tp-ci",
            &[Some("CREATE_COMPLETE"), Some("CREATE_COMPLETE"), Some("DELETE_COMPLETE")],
        );
        stacks.set_outputs("a4tp-ci", &[("WebStackName", "a4tp-web")]);

        let termination =
            terminate(&stacks, "a4tp-ci", &instant_policy()).expect("terminate should succeed");
        assert_eq!(termination, Termination::Deleted(vec!["a4tp-ci".to_string()]));
        assert_eq!(stacks.calls(), vec!["delete:a4tp-ci".to_string()]);
    }

    #[test]
    fn missing_ci_stack_deletes_nothing() {
        let stacks = ScriptedStacks::new();
        let termination =
            terminate(&stacks, "a4tp-ci", &instant_policy()).expect("terminate should succeed");
        assert_eq!(termination, Termination::CiStackMissing);
        assert!(stacks.calls().is_empty());
    }

    #[test]
    fn failed_deletion_is_an_error() {
        let stacks = ScriptedStacks::new();
        stacks.script(
            "a4tp-ci",
            &[Some("CREATE_COMPLETE"), Some("CREATE_COMPLETE"), Some("DELETE_FAILED")],
        );

        let error = terminate(&stacks, "a4tp-ci", &instant_policy()).expect_err("delete failed");
        assert_eq!(
            error.message(),
            "CI stack delete failed: current status DELETE_FAILED"
        );
    }

    #[test]
    fn describe_failure_aborts_before_deleting() {
        let stacks = ScriptedStacks::new();
        stacks.fail_describe("a4tp-ci", "Rate exceeded");

        let error = terminate(&stacks, "a4tp-ci", &instant_policy()).expect_err("throttled");
        assert_eq!(error.message(), "Rate exceeded");
        assert!(stacks.calls().is_empty());
    }
}
