//! Command-line interface definitions for the `onctl` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page. It
//! must not depend on the library crate.

use std::net::IpAddr;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Top-level CLI for the `onctl` binary.
#[derive(Debug, Parser)]
#[command(
    name = "onctl",
    about = "Provision and configure remote VMs with dependency-ordered pipelines over SSH",
    version,
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Log debug output. `RUST_LOG` takes precedence when set.
    #[arg(short, long, global = true)]
    pub(crate) verbose: bool,
    /// Operation to perform.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Subcommands understood by `onctl`.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Check a pipeline file for naming, reference and cycle errors.
    #[command(name = "validate")]
    Validate(PipelineArgs),
    /// Print the order in which a pipeline's steps would run.
    #[command(name = "plan")]
    Plan(PipelineArgs),
    /// Execute every step of a pipeline.
    #[command(name = "pipeline")]
    Pipeline(PipelineArgs),
    /// Upload a script into a fresh apply directory and run it.
    #[command(name = "apply")]
    Apply(ApplyCommand),
    /// Ship a container image to a host and start it.
    #[command(name = "deploy")]
    Deploy(DeployCommand),
}

/// Arguments shared by commands reading a pipeline file.
#[derive(Debug, Args)]
pub(crate) struct PipelineArgs {
    /// Pipeline YAML file.
    #[arg(value_name = "FILE")]
    pub(crate) file: String,
}

/// Connection flags for commands addressing one host.
#[derive(Debug, Args)]
pub(crate) struct HostArgs {
    /// Host address.
    #[arg(long, value_name = "IP")]
    pub(crate) host: IpAddr,
    /// SSH port; defaults to the configured `ssh_port`.
    #[arg(long, value_name = "PORT")]
    pub(crate) port: Option<u16>,
    /// Login user; defaults to the configured `ssh_user`.
    #[arg(long, value_name = "USER")]
    pub(crate) user: Option<String>,
    /// Private key; defaults to the configured `ssh_private_key_file`.
    #[arg(long, value_name = "PATH")]
    pub(crate) key: Option<String>,
}

/// Arguments for `onctl apply`.
#[derive(Debug, Args)]
pub(crate) struct ApplyCommand {
    /// Target host.
    #[command(flatten)]
    pub(crate) host: HostArgs,
    /// Dot-env file uploaded as `.env` and sourced before the script runs.
    #[arg(long = "dot-env", value_name = "PATH")]
    pub(crate) dot_env: Option<String>,
    /// Variable exported for the script; repeatable.
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub(crate) vars: Vec<String>,
    /// Local script to run.
    #[arg(value_name = "SCRIPT")]
    pub(crate) script: String,
}

/// Image source override for `onctl deploy`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum SourceArg {
    /// Pull on the host from a registry.
    Hub,
    /// Save locally and upload.
    Local,
}

/// Arguments for `onctl deploy`.
#[derive(Debug, Args)]
pub(crate) struct DeployCommand {
    /// Target host.
    #[command(flatten)]
    pub(crate) host: HostArgs,
    /// Image reference.
    #[arg(long, value_name = "IMAGE")]
    pub(crate) image: String,
    /// Container name; an existing container with this name is replaced.
    #[arg(long, value_name = "NAME")]
    pub(crate) name: Option<String>,
    /// Container environment entry; repeatable.
    #[arg(short = 'e', long = "env", value_name = "KEY=VALUE")]
    pub(crate) env: Vec<String>,
    /// Port publication in `docker run -p` syntax; repeatable.
    #[arg(short = 'p', long = "publish", value_name = "SPEC")]
    pub(crate) publish: Vec<String>,
    /// Skip the registry probe and use this source.
    #[arg(long, value_enum, value_name = "SOURCE")]
    pub(crate) source: Option<SourceArg>,
    /// Do not draw the upload progress bar.
    #[arg(long)]
    pub(crate) no_progress: bool,
}
