use aws_sdk_codepipeline::error::DisplayErrorContext;
use aws_sdk_codepipeline::types::{FailureDetails, FailureType};

use super::block_on;
use super::job_reporter::JobReporter;

#[derive(Clone)]
pub struct CodePipelineReporter {
    client: aws_sdk_codepipeline::Client,
}

impl CodePipelineReporter {
    pub fn new(client: aws_sdk_codepipeline::Client) -> Self {
        Self { client }
    }
}

impl JobReporter for CodePipelineReporter {
    fn put_job_success(
        &self,
        job_id: &str,
        continuation_token: Option<&str>,
    ) -> Result<(), String> {
        let client = self.client.clone();
        let job = job_id.to_string();
        let token = continuation_token.map(str::to_string);

        block_on(async move {
            client
                .put_job_success_result()
                .job_id(job)
                .set_continuation_token(token)
                .send()
                .await
        })
        .map(|_| ())
        .map_err(|error| {
            format!(
                "failed to put job success for {job_id}: {}",
                DisplayErrorContext(&error)
            )
        })
    }

    fn put_job_failure(&self, job_id: &str, message: &str) -> Result<(), String> {
        let details = FailureDetails::builder()
            .r#type(FailureType::JobFailed)
            .message(message)
            .build()
            .map_err(|error| format!("invalid failure details: {error}"))?;
        let client = self.client.clone();
        let job = job_id.to_string();

        block_on(async move {
            client
                .put_job_failure_result()
                .job_id(job)
                .failure_details(details)
                .send()
                .await
        })
        .map(|_| ())
        .map_err(|error| {
            format!(
                "failed to put job failure for {job_id}: {}",
                DisplayErrorContext(&error)
            )
        })
    }
}
