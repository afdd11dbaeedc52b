use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_cloudformation::types::{Capability, Parameter, Stack};
use ci_deploy_core::stack::{
    is_missing_stack_message, is_no_updates_message, StackDescription, StackOps, StackParameter,
    StackStatus, UpdateOutcome,
};

use super::block_on;

#[derive(Clone)]
pub struct CloudFormationStacks {
    client: aws_sdk_cloudformation::Client,
}

impl CloudFormationStacks {
    pub fn new(client: aws_sdk_cloudformation::Client) -> Self {
        Self { client }
    }
}

impl StackOps for CloudFormationStacks {
    fn describe(&self, name: &str) -> Result<Option<StackDescription>, String> {
        let client = self.client.clone();
        let stack_name = name.to_string();
        let result =
            block_on(async move { client.describe_stacks().stack_name(stack_name).send().await });

        match result {
            Ok(output) => Ok(output
                .stacks()
                .first()
                .map(|stack| to_description(name, stack))),
            Err(error) => {
                let message = error
                    .as_service_error()
                    .and_then(ProvideErrorMetadata::message)
                    .unwrap_or_default();
                if is_missing_stack_message(message) {
                    Ok(None)
                } else {
                    Err(format!(
                        "failed to describe stack {name}: {}",
                        DisplayErrorContext(&error)
                    ))
                }
            }
        }
    }

    fn create(
        &self,
        name: &str,
        template: &str,
        params: &[StackParameter],
    ) -> Result<(), String> {
        let client = self.client.clone();
        let stack_name = name.to_string();
        let template_body = template.to_string();
        let parameters = to_parameters(params);

        block_on(async move {
            client
                .create_stack()
                .stack_name(stack_name)
                .template_body(template_body)
                .set_parameters(Some(parameters))
                .capabilities(Capability::CapabilityIam)
                .send()
                .await
        })
        .map(|_| ())
        .map_err(|error| format!("{}", DisplayErrorContext(&error)))
    }

    fn update(
        &self,
        name: &str,
        template: &str,
        params: &[StackParameter],
    ) -> Result<UpdateOutcome, String> {
        let client = self.client.clone();
        let stack_name = name.to_string();
        let template_body = template.to_string();
        let parameters = to_parameters(params);

        let result = block_on(async move {
            client
                .update_stack()
                .stack_name(stack_name)
                .template_body(template_body)
                .set_parameters(Some(parameters))
                .capabilities(Capability::CapabilityIam)
                .send()
                .await
        });

        match result {
            Ok(_) => Ok(UpdateOutcome::Started),
            Err(error) => {
                let no_updates = error
                    .as_service_error()
                    .and_then(ProvideErrorMetadata::message)
                    .is_some_and(is_no_updates_message);
                if no_updates {
                    Ok(UpdateOutcome::NoChanges)
                } else {
                    Err(format!("{}", DisplayErrorContext(&error)))
                }
            }
        }
    }

    fn delete(&self, name: &str) -> Result<(), String> {
        let client = self.client.clone();
        let stack_name = name.to_string();

        block_on(async move { client.delete_stack().stack_name(stack_name).send().await })
            .map(|_| ())
            .map_err(|error| {
                format!(
                    "failed to delete stack {name}: {}",
                    DisplayErrorContext(&error)
                )
            })
    }
}

fn to_description(requested_name: &str, stack: &Stack) -> StackDescription {
    let status = stack
        .stack_status()
        .map(|status| StackStatus::parse(status.as_str()))
        .unwrap_or_else(|| StackStatus::Other("UNKNOWN".to_string()));

    let outputs = stack
        .outputs()
        .iter()
        .filter_map(|output| {
            Some((
                output.output_key()?.to_string(),
                output.output_value()?.to_string(),
            ))
        })
        .collect();

    StackDescription {
        name: requested_name.to_string(),
        status,
        outputs,
    }
}

fn to_parameters(params: &[StackParameter]) -> Vec<Parameter> {
    params
        .iter()
        .map(|param| {
            Parameter::builder()
                .parameter_key(&param.key)
                .parameter_value(&param.value)
                .build()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_parameters_in_order() {
        let converted = to_parameters(&[
            StackParameter::new("VPC", "vpc-1"),
            StackParameter::new("AppName", "a4tp"),
        ]);
        assert_eq!(converted[0].parameter_key(), Some("VPC"));
        assert_eq!(converted[1].parameter_value(), Some("a4tp"));
    }
}
