//! Binary entry point for the onctl CLI.

use std::io::{self, Write};
use std::process;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use onctl::deploy::RegistryHeuristic;
use onctl::{
    ApplyError, ApplyRequest, ConfigError, DeployError, DeployOptions, Deployer, ExecutorError,
    ImageSource, OnctlConfig, PipelineConfig, PipelineError, PipelineExecutor,
    ProcessCommandRunner, RemoteShell, SessionTarget, SshConnector, SshSession, StaticProvider,
    apply_script, local_fs,
};

mod cli;

use cli::{ApplyCommand, Cli, Command, DeployCommand, HostArgs, PipelineArgs, SourceArg};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Executor(Box<ExecutorError>),
    #[error("apply failed: {0}")]
    Apply(Box<ApplyError>),
    #[error("deploy failed: {0}")]
    Deploy(Box<DeployError>),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "onctl=debug" } else { "onctl=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli.command {
        Command::Validate(args) => validate_pipeline(&args),
        Command::Plan(args) => plan_pipeline(&args),
        Command::Pipeline(args) => run_pipeline(&args).await,
        Command::Apply(args) => run_apply(&args),
        Command::Deploy(args) => run_deploy(&args).await,
    }
}

fn validate_pipeline(args: &PipelineArgs) -> Result<i32, CliError> {
    let pipeline = PipelineConfig::load(Utf8Path::new(&args.file))?;
    let plan = pipeline.plan()?;
    writeln!(
        io::stdout(),
        "{} is valid: {} targets, {} steps",
        args.file,
        pipeline.targets.len(),
        plan.len()
    )
    .ok();
    Ok(0)
}

fn plan_pipeline(args: &PipelineArgs) -> Result<i32, CliError> {
    let plan = PipelineConfig::load(Utf8Path::new(&args.file))?.plan()?;
    let mut stdout = io::stdout().lock();
    for (position, step) in (1_usize..).zip(&plan) {
        writeln!(
            stdout,
            "{position}. {} ({} on {})",
            step.name, step.step_type, step.target
        )
        .ok();
    }
    Ok(0)
}

async fn run_pipeline(args: &PipelineArgs) -> Result<i32, CliError> {
    let config = load_config()?;
    let pipeline = PipelineConfig::load(Utf8Path::new(&args.file))?;
    let provider = StaticProvider::from_pipeline(&pipeline, &config.ssh_user, config.ssh_port);
    let executor = PipelineExecutor::new(
        &config,
        provider,
        SshConnector::new(config.connect_timeout()),
    );
    let report = executor
        .execute(&pipeline)
        .await
        .map_err(|err| CliError::Executor(Box::new(err)))?;
    writeln!(
        io::stdout(),
        "completed {} steps: {}",
        report.completed.len(),
        report.completed.join(", ")
    )
    .ok();
    Ok(0)
}

fn run_apply(args: &ApplyCommand) -> Result<i32, CliError> {
    let config = load_config()?;
    let mut session = open_session(&args.host, &config);
    let request = ApplyRequest {
        script: local_path(&args.script),
        dot_env: args.dot_env.as_deref().map(local_path),
        vars: args.vars.clone(),
    };
    let outcome = apply_script(&mut session, &request);
    session.close();
    let run = outcome.map_err(|err| CliError::Apply(Box::new(err)))?;
    writeln!(
        io::stdout(),
        "{} ran in {}; log at {}",
        run.script_name,
        run.directory,
        run.log_file
    )
    .ok();
    Ok(0)
}

async fn run_deploy(args: &DeployCommand) -> Result<i32, CliError> {
    let config = load_config()?;
    let registry = args.source.map_or_else(RegistryHeuristic::default, |source| {
        RegistryHeuristic::Assume(match source {
            SourceArg::Hub => ImageSource::Hub,
            SourceArg::Local => ImageSource::Local,
        })
    });
    let deployer = Deployer::new(ProcessCommandRunner, &config)
        .with_registry(registry)
        .with_progress(!args.no_progress);
    let options = DeployOptions {
        image: args.image.clone(),
        env: args.env.clone(),
        name: args.name.clone(),
        publish: args.publish.clone(),
    };

    let mut session = open_session(&args.host, &config);
    let outcome = deployer.deploy(&mut session, &options).await;
    session.close();
    let deployment = outcome.map_err(|err| CliError::Deploy(Box::new(err)))?;
    writeln!(
        io::stdout(),
        "container {} running {} on {} ({:?})",
        deployment.container_id,
        options.image,
        args.host.host,
        deployment.image_transfer
    )
    .ok();
    Ok(0)
}

fn load_config() -> Result<OnctlConfig, CliError> {
    let config = OnctlConfig::load_without_cli_args()?;
    config.validate()?;
    Ok(config)
}

fn open_session(host: &HostArgs, config: &OnctlConfig) -> SshSession {
    let key = host
        .key
        .as_deref()
        .unwrap_or(&config.ssh_private_key_file);
    SshSession::new(
        SessionTarget {
            username: host.user.clone().unwrap_or_else(|| config.ssh_user.clone()),
            ip_address: host.host,
            ssh_port: host.port.unwrap_or(config.ssh_port),
        },
        local_path(key),
        config.connect_timeout(),
    )
}

fn local_path(path: &str) -> Utf8PathBuf {
    Utf8PathBuf::from(local_fs::expand_tilde(path))
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "error: {err}").ok();
}
