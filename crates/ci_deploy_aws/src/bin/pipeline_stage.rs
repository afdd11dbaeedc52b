use aws_config::SdkConfig;
use ci_deploy_aws::adapters::cloudformation::CloudFormationStacks;
use ci_deploy_aws::adapters::codepipeline::CodePipelineReporter;
use ci_deploy_aws::adapters::s3::S3Store;
use ci_deploy_aws::handlers::{
    report_failure, report_undecodable_event, run_stage, PipelineStage, StageResponse,
    STAGE_OVERRIDE_ENV,
};
use ci_deploy_core::job::decode_event;
use ci_deploy_core::log;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::{json, Value};

fn configured_stage() -> Result<PipelineStage, Error> {
    let handler = std::env::var(STAGE_OVERRIDE_ENV)
        .or_else(|_| std::env::var("_HANDLER"))
        .map_err(|_| Error::from(format!("_HANDLER or {STAGE_OVERRIDE_ENV} must be configured")))?;
    PipelineStage::from_handler(&handler).map_err(Error::from)
}

async fn handle_request(
    event: LambdaEvent<Value>,
    sdk_config: &SdkConfig,
    stage: PipelineStage,
) -> Result<StageResponse, Error> {
    let reporter = CodePipelineReporter::new(aws_sdk_codepipeline::Client::new(sdk_config));

    let event = match decode_event(event.payload.clone()) {
        Ok(decoded) => decoded,
        Err(error) => {
            return report_undecodable_event(stage, &event.payload, &error, &reporter)
                .map_err(Error::from)
        }
    };
    let job = event.job;

    let store = match job.data.credentials() {
        Ok(credentials) => S3Store::for_artifacts(sdk_config, credentials),
        Err(error) => {
            return report_failure(stage, &job.id, &error, &reporter).map_err(Error::from)
        }
    };
    let stacks = CloudFormationStacks::new(aws_sdk_cloudformation::Client::new(sdk_config));

    run_stage(stage, &job, &stacks, &store, &reporter).map_err(Error::from)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let stage = configured_stage()?;
    let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    log::info(
        stage.component(),
        "runtime_started",
        json!({ "region": sdk_config.region().map(|region| region.to_string()) }),
    );

    let sdk_config = &sdk_config;
    lambda_runtime::run(service_fn(move |event| async move {
        handle_request(event, sdk_config, stage).await
    }))
    .await
}
