//! Core library for the onctl provisioning tool.
//!
//! onctl reads a pipeline of typed steps (create, upload, download, apply)
//! bound to named targets, orders them by their declared dependencies and
//! runs them over SSH. It also ships containers to hosts: architecture
//! checks, registry pulls or save-and-upload transfers, and a verified
//! `docker run`.

pub mod apply;
pub mod config;
pub mod deploy;
pub mod executor;
pub mod local;
pub mod local_fs;
pub mod pipeline;
pub mod provider;
pub mod readiness;
pub mod session;
pub mod test_support;

pub use apply::{ApplyError, ApplyRequest, ApplyRun, apply_script};
pub use config::{ConfigError, OnctlConfig};
pub use deploy::{DeployError, DeployOptions, Deployer, Deployment, ImageSource};
pub use executor::{
    Connector, ExecutionReport, ExecutorError, PipelineExecutor, SshConnector, StepError,
};
pub use local::{CommandOutput, CommandRunner, LocalCommandError, ProcessCommandRunner};
pub use pipeline::{PipelineConfig, PipelineError, Step, StepKind, Target};
pub use provider::{Provider, ProviderError, StaticProvider, Vm};
pub use readiness::{ReadinessError, ReadinessWaiter};
pub use session::{RemoteShell, SessionError, SessionTarget, SshSession};
