use std::fs;
use std::path::{Path, PathBuf};
use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the CI deployment workspace",
    long_about = "A unified CLI for packaging the pipeline stage Lambda, running CI\n\
                  checks, and driving the operator `ci` binary."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build `pipeline_stage` and stage it as `bootstrap` in the Lambda package directory
    LambdaPackage(PackageArgs),
    /// Run CI checks (fmt, clippy, tests)
    Ci,
    /// Package the Lambda, then provision the CI stack with it
    Deploy(PackageArgs),
    /// Report whether the deployed site is serving
    Status,
    /// Tear down the web and CI stacks after confirmation
    Terminate,
}

#[derive(clap::Args)]
struct PackageArgs {
    /// Compilation target triple for the Lambda binary
    #[arg(long, default_value = "x86_64-unknown-linux-gnu")]
    target: String,
    /// Build profile used for the binary
    #[arg(value_enum, long, default_value_t = BuildProfile::Release)]
    profile: BuildProfile,
    /// Directory the `ci provision` command zips and uploads
    #[arg(long, default_value = "dist/lambda")]
    out_dir: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum BuildProfile {
    Debug,
    Release,
}

impl BuildProfile {
    fn dir_name(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }

    fn as_cargo_flag(self) -> Option<&'static str> {
        match self {
            Self::Debug => None,
            Self::Release => Some("--release"),
        }
    }
}

const WORKSPACE_PACKAGES: [&str; 2] = ["ci_deploy_core", "ci_deploy_aws"];

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("error: {message}");
    exit(1);
}

fn cargo(args: &[&str]) -> ExitStatus {
    eprintln!("+ cargo {}", args.join(" "));
    Command::new("cargo")
        .args(args)
        .status()
        .unwrap_or_else(|error| fail(format!("failed to execute cargo: {error}")))
}

fn run_cargo(args: &[&str]) {
    let status = cargo(args);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn run_ci_binary(args: &[&str]) {
    let mut cargo_args = vec!["run", "-p", "ci_deploy_aws", "--bin", "ci", "--"];
    cargo_args.extend_from_slice(args);
    run_cargo(&cargo_args);
}

fn ensure_rust_target_installed(target: &str) {
    let output = Command::new("rustup")
        .args(["target", "list", "--installed"])
        .output();

    let output = match output {
        Ok(value) => value,
        Err(error) => {
            eprintln!(
                "warning: failed to run `rustup target list --installed` ({error}); continuing without target preflight"
            );
            return;
        }
    };

    let installed = String::from_utf8_lossy(&output.stdout);
    if output.status.success() && !installed.lines().any(|line| line.trim() == target) {
        fail(format!(
            "required rust target `{target}` is not installed. install it with `rustup target add {target}` and re-run `cargo run -p xtask -- lambda-package`"
        ));
    }
}

fn binary_name(bin_name: &str, target: &str) -> String {
    if target.contains("windows") {
        format!("{bin_name}.exe")
    } else {
        bin_name.to_string()
    }
}

fn stage_bootstrap(binary_path: &Path, out_dir: &Path) -> PathBuf {
    if !binary_path.exists() {
        fail(format!(
            "expected lambda binary at '{}'",
            binary_path.display()
        ));
    }
    fs::create_dir_all(out_dir).unwrap_or_else(|error| {
        fail(format!("failed to create '{}': {error}", out_dir.display()))
    });

    let bootstrap = out_dir.join("bootstrap");
    fs::copy(binary_path, &bootstrap).unwrap_or_else(|error| {
        fail(format!("failed to copy lambda binary: {error}"))
    });
    make_executable(&bootstrap);
    bootstrap
}

#[cfg(unix)]
fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap_or_else(|error| {
        fail(format!("failed to chmod '{}': {error}", path.display()))
    });
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) {}

fn package_lambda(args: &PackageArgs) {
    ensure_rust_target_installed(&args.target);

    step("Build pipeline_stage lambda binary");
    let mut cargo_args = vec![
        "build",
        "-p",
        "ci_deploy_aws",
        "--target",
        args.target.as_str(),
        "--bin",
        "pipeline_stage",
    ];
    if let Some(flag) = args.profile.as_cargo_flag() {
        cargo_args.push(flag);
    }
    run_cargo(&cargo_args);

    step("Stage lambda package directory");
    let target_dir = Path::new("target")
        .join(&args.target)
        .join(args.profile.dir_name());
    let bootstrap = stage_bootstrap(
        &target_dir.join(binary_name("pipeline_stage", &args.target)),
        &args.out_dir,
    );

    eprintln!("\nStaged lambda bootstrap:\n- {}", bootstrap.display());
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_check() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&[
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ]);

    for package in WORKSPACE_PACKAGES {
        step(&format!("Test {package}"));
        run_cargo(&["test", "-p", package, "--all-features"]);
    }
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::LambdaPackage(args) => package_lambda(&args),
        Commands::Ci => ci_check(),
        Commands::Deploy(args) => {
            package_lambda(&args);
            step("Provision CI stack");
            let lambda_dir = args.out_dir.display().to_string();
            run_ci_binary(&["provision", "--lambda-dir", &lambda_dir]);
        }
        Commands::Status => run_ci_binary(&["status"]),
        Commands::Terminate => run_ci_binary(&["terminate"]),
    }
}
