use std::path::Path;
use std::time::Duration;

use ci_deploy_core::bucket::{build_bucket_name, ensure_bucket, BucketStore};
use ci_deploy_core::config::{CiSettings, LAMBDA_PACKAGE_KEY};
use ci_deploy_core::error::DeployError;
use ci_deploy_core::log;
use ci_deploy_core::packaging::{upload_package, zip_directory};
use ci_deploy_core::params::ci_stack_parameters;
use ci_deploy_core::poll::{wait_for_stack_existence, wait_for_stack_success, PollPolicy};
use ci_deploy_core::probe::{site_is_serving, site_url, wait_for_site, SiteProbe};
use ci_deploy_core::stack::{
    require_output, stack_outputs, start_create_or_update, StackAction, StackOps,
};
use serde_json::json;

use super::{require_success, WEB_STACK_NAME_OUTPUT};

const COMPONENT: &str = "provision";

/// How long each phase of provisioning may take and how often it is polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub stacks: PollPolicy,
    pub site: PollPolicy,
    pub bucket: PollPolicy,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            stacks: PollPolicy::stacks(),
            site: PollPolicy::site(),
            bucket: PollPolicy::new(Duration::from_secs(5), Duration::from_secs(100)),
        }
    }
}

pub struct ProvisionRequest<'a> {
    pub settings: &'a CiSettings,
    pub account_id: &'a str,
    pub ci_template: &'a str,
    /// Directory whose contents become the Lambda package.
    pub lambda_dir: &'a Path,
}

/// Milestones worth telling the operator about while provisioning waits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionEvent {
    PipelineRunning {
        application_source: String,
        pipeline_url: String,
    },
    WebStackDeployed {
        application_build: String,
        site_url: String,
    },
    AwaitingSite {
        url: String,
    },
}

impl std::fmt::Display for ProvisionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PipelineRunning {
                application_source,
                pipeline_url,
            } => write!(
                f,
                "Deploying code from {application_source}\nVisit {pipeline_url} to view pipeline state"
            ),
            Self::WebStackDeployed {
                application_build,
                site_url,
            } => write!(
                f,
                "The deployed build is {application_build}\nVisit your website at {site_url}"
            ),
            Self::AwaitingSite { url } => write!(
                f,
                "The AutoScaling group may still be launching. Waiting for the balancer to return the expected web page...\nQuerying {url}"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub bucket: String,
    pub lambda_version: String,
    pub ci_action: StackAction,
    pub application_source: String,
    pub pipeline_url: String,
    pub web_stack_name: String,
    pub application_build: String,
    pub site_url: String,
}

/// Stands up (or refreshes) the CI stack, then follows the pipeline it
/// creates until the web stack is deployed and the site answers. `notify`
/// hears each milestone before the wait that follows it.
pub fn provision(
    request: &ProvisionRequest<'_>,
    stacks: &impl StackOps,
    buckets: &impl BucketStore,
    probe: &impl SiteProbe,
    pacing: &Pacing,
    notify: &dyn Fn(&ProvisionEvent),
) -> Result<ProvisionReport, DeployError> {
    let settings = request.settings;
    let bucket = build_bucket_name(&settings.app_name, &settings.region, request.account_id);

    log::info(COMPONENT, "ensuring_bucket", json!({ "bucket": bucket.clone() }));
    ensure_bucket(buckets, &bucket, &settings.region, &pacing.bucket)?;

    let package = zip_directory(request.lambda_dir)?;
    let lambda_version = upload_package(buckets, &bucket, LAMBDA_PACKAGE_KEY, &package)?;

    let params = ci_stack_parameters(settings, &bucket, LAMBDA_PACKAGE_KEY, &lambda_version);
    let ci_stack = settings.ci_stack_name.as_str();
    let ci_action = start_create_or_update(stacks, ci_stack, request.ci_template, &params)?;
    match &ci_action {
        StackAction::Blocked(status) => {
            return Err(DeployError::new(format!(
                "CI stack cannot be updated when status is: {status}"
            )))
        }
        StackAction::Created => require_success(
            wait_for_stack_success(stacks, ci_stack, "CI", "create", &pacing.stacks)?,
            "CI",
            "create",
        )?,
        StackAction::Updated => require_success(
            wait_for_stack_success(stacks, ci_stack, "CI", "update", &pacing.stacks)?,
            "CI",
            "update",
        )?,
        StackAction::Unchanged => {
            log::info(COMPONENT, "ci_stack_unchanged", json!({ "stack": ci_stack }))
        }
    }

    let ci_outputs = stack_outputs(stacks, ci_stack)?;
    let application_source = require_output(&ci_outputs, "ApplicationSource")?.to_string();
    let pipeline_url = require_output(&ci_outputs, "CodePipelineURL")?.to_string();
    let web_stack_name = require_output(&ci_outputs, WEB_STACK_NAME_OUTPUT)?.to_string();
    log::info(
        COMPONENT,
        "pipeline_running",
        json!({
            "application_source": application_source.clone(),
            "pipeline_url": pipeline_url.clone(),
        }),
    );
    notify(&ProvisionEvent::PipelineRunning {
        application_source: application_source.clone(),
        pipeline_url: pipeline_url.clone(),
    });

    if !wait_for_stack_existence(stacks, &web_stack_name, &pacing.stacks)? {
        return Err(DeployError::new(format!(
            "Timed out waiting for stack {web_stack_name} to appear"
        )));
    }
    require_success(
        wait_for_stack_success(stacks, &web_stack_name, "web", "deploy", &pacing.stacks)?,
        "web",
        "deploy",
    )?;

    let web_outputs = stack_outputs(stacks, &web_stack_name)?;
    let application_build = require_output(&web_outputs, "ApplicationBuild")?.to_string();
    let url = site_url(require_output(&web_outputs, "BalancerDNSName")?);
    notify(&ProvisionEvent::WebStackDeployed {
        application_build: application_build.clone(),
        site_url: url.clone(),
    });

    if !site_is_serving(probe, &url) {
        log::info(COMPONENT, "awaiting_site", json!({ "url": url.clone() }));
        notify(&ProvisionEvent::AwaitingSite { url: url.clone() });
        if !wait_for_site(probe, &url, &pacing.site) {
            return Err(DeployError::new(format!(
                "Waited {}s for {url} without seeing the expected page",
                pacing.site.timeout.as_secs()
            )));
        }
    }

    Ok(ProvisionReport {
        bucket,
        lambda_version,
        ci_action,
        application_source,
        pipeline_url,
        web_stack_name,
        application_build,
        site_url: url,
    })
}
