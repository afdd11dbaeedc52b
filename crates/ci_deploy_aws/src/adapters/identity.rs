use aws_sdk_sts::error::DisplayErrorContext;

use super::block_on;

/// Account id of the credentials in use.
pub fn caller_account_id(client: &aws_sdk_sts::Client) -> Result<String, String> {
    let client = client.clone();
    let identity = block_on(async move { client.get_caller_identity().send().await })
        .map_err(|error| {
            format!(
                "Unable to retrieve AWS account ID: {}",
                DisplayErrorContext(&error)
            )
        })?;

    identity
        .account()
        .map(str::to_string)
        .ok_or_else(|| "Unable to retrieve AWS account ID: response had no account".to_string())
}
