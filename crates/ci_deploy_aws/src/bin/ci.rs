use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use aws_config::SdkConfig;
use ci_deploy_aws::adapters::cloudformation::CloudFormationStacks;
use ci_deploy_aws::adapters::http_probe::HttpSiteProbe;
use ci_deploy_aws::adapters::identity::caller_account_id;
use ci_deploy_aws::adapters::s3::S3Store;
use ci_deploy_aws::workflows::provision::{provision, Pacing, ProvisionRequest};
use ci_deploy_aws::workflows::status::check_status;
use ci_deploy_aws::workflows::terminate::{terminate, user_confirms, Termination};
use ci_deploy_core::config::{ci_stack_name, ProvisionInputs, DEFAULT_APP_NAME};
use ci_deploy_core::log;
use ci_deploy_core::poll::PollPolicy;
use clap::{Args, Parser, Subcommand};
use serde_json::json;

#[derive(Parser)]
#[command(
    name = "ci",
    about = "Provision, inspect and tear down the CI pipeline and the web stack it deploys"
)]
struct Cli {
    /// Application name; prefixes stack and bucket names
    #[arg(long, env = "APP_NAME", default_value = DEFAULT_APP_NAME, global = true)]
    app_name: String,
    /// CI stack name (default: <app-name>-ci)
    #[arg(long, env = "CI_STACK_NAME", global = true)]
    ci_stack_name: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update the CI stack, then wait for the site to come up
    Provision(ProvisionArgs),
    /// Print OK when the deployed site serves the expected page
    Status,
    /// Delete the web and CI stacks (the build bucket is kept)
    Terminate {
        /// Skip the interactive confirmation
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args)]
struct ProvisionArgs {
    #[arg(long, env = "WEB_STACK_NAME")]
    web_stack_name: Option<String>,
    /// EC2 key pair for the web instances
    #[arg(long, env = "AWS_EC2_KEYNAME")]
    key_name: Option<String>,
    #[arg(long, env = "GITHUB_USERNAME")]
    github_user: Option<String>,
    #[arg(long, env = "GITHUB_OAUTH_TOKEN", hide_env_values = true)]
    github_token: Option<String>,
    #[arg(long, env = "GITHUB_REPO_NAME")]
    github_repo: Option<String>,
    #[arg(long, env = "GITHUB_BRANCH_NAME")]
    github_branch: Option<String>,
    /// CloudFormation template for the CI stack
    #[arg(long, default_value = "cfn/ci.template")]
    ci_template: PathBuf,
    /// Directory holding the Lambda `bootstrap` (see `cargo xtask lambda-package`)
    #[arg(long, default_value = "dist/lambda")]
    lambda_dir: PathBuf,
}

fn run_provision(
    cli: &Cli,
    args: &ProvisionArgs,
    sdk_config: &SdkConfig,
) -> Result<ExitCode, String> {
    let settings = ProvisionInputs {
        app_name: cli.app_name.clone(),
        region: sdk_config.region().map(|region| region.to_string()),
        ci_stack_name: cli.ci_stack_name.clone(),
        web_stack_name: args.web_stack_name.clone(),
        key_name: args.key_name.clone(),
        github_user: args.github_user.clone(),
        github_token: args.github_token.clone(),
        github_repo: args.github_repo.clone(),
        github_branch: args.github_branch.clone(),
    }
    .validate()
    .map_err(|error| error.to_string())?;

    let account_id = caller_account_id(&aws_sdk_sts::Client::new(sdk_config))?;
    let ci_template = fs::read_to_string(&args.ci_template).map_err(|error| {
        format!(
            "failed to read CI template '{}': {error}",
            args.ci_template.display()
        )
    })?;

    let request = ProvisionRequest {
        settings: &settings,
        account_id: &account_id,
        ci_template: &ci_template,
        lambda_dir: &args.lambda_dir,
    };
    provision(
        &request,
        &CloudFormationStacks::new(aws_sdk_cloudformation::Client::new(sdk_config)),
        &S3Store::new(aws_sdk_s3::Client::new(sdk_config)),
        &HttpSiteProbe::new()?,
        &Pacing::default(),
        &|event| println!("{event}"),
    )
    .map_err(|error| error.to_string())?;
    Ok(ExitCode::SUCCESS)
}

fn run_status(cli: &Cli, sdk_config: &SdkConfig) -> Result<ExitCode, String> {
    let stack_name = ci_stack_name(&cli.app_name, cli.ci_stack_name.as_deref());
    let status = check_status(
        &CloudFormationStacks::new(aws_sdk_cloudformation::Client::new(sdk_config)),
        &HttpSiteProbe::new()?,
        &stack_name,
    )
    .map_err(|error| error.to_string())?;

    println!("{}", status.summary());
    Ok(if status.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn run_terminate(cli: &Cli, yes: bool, sdk_config: &SdkConfig) -> Result<ExitCode, String> {
    if !yes && !user_confirms(&mut io::stdin().lock(), &mut io::stdout())? {
        return Ok(ExitCode::SUCCESS);
    }

    let stack_name = ci_stack_name(&cli.app_name, cli.ci_stack_name.as_deref());
    let termination = terminate(
        &CloudFormationStacks::new(aws_sdk_cloudformation::Client::new(sdk_config)),
        &stack_name,
        &PollPolicy::stacks(),
    )
    .map_err(|error| error.to_string())?;

    match termination {
        Termination::CiStackMissing => {
            println!("CI stack not found");
            Ok(ExitCode::FAILURE)
        }
        Termination::Deleted(stacks) => {
            for stack in stacks {
                println!("Terminated stack {stack}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

    let result = match &cli.command {
        Commands::Provision(args) => run_provision(&cli, args, &sdk_config),
        Commands::Status => run_status(&cli, &sdk_config),
        Commands::Terminate { yes } => run_terminate(&cli, *yes, &sdk_config),
    };

    match result {
        Ok(code) => code,
        Err(error) => {
            log::error("ci", "command_failed", json!({ "error": error.clone() }));
            eprintln!("{error}");
            ExitCode::FAILURE
        }
    }
}
