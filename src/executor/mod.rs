//! Sequential execution of a resolved pipeline.
//!
//! Steps run one at a time in the order [`PipelineConfig::plan`] returns.
//! Each target gets at most one open session, created on first use and
//! closed once the run finishes, whether it succeeded or not. The first
//! failing step stops the run.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::apply::{ApplyError, ApplyRequest, apply_script};
use crate::config::OnctlConfig;
use crate::local_fs;
use crate::pipeline::{PipelineConfig, PipelineError, Step, StepKind, Target};
use crate::provider::{Provider, ProviderError, Vm};
use crate::readiness::{ReadinessError, ReadinessWaiter};
use crate::session::{RemoteShell, SessionError, SessionTarget, SshSession};

/// Opens sessions to provider hosts.
pub trait Connector {
    /// Session type handed to step handlers.
    type Shell: RemoteShell;

    /// Returns a session for `vm` authenticating with `private_key`.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] when the session cannot be prepared.
    fn open(&self, vm: &Vm, private_key: &Utf8Path) -> Result<Self::Shell, SessionError>;
}

/// Connector producing lazily connected [`SshSession`]s.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SshConnector {
    connect_timeout: Duration,
}

impl SshConnector {
    /// Creates a connector with the given dial timeout.
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Connector for SshConnector {
    type Shell = SshSession;

    fn open(&self, vm: &Vm, private_key: &Utf8Path) -> Result<Self::Shell, SessionError> {
        Ok(SshSession::new(
            SessionTarget {
                username: vm.username.clone(),
                ip_address: vm.ip,
                ssh_port: vm.ssh_port,
            },
            private_key.to_owned(),
            self.connect_timeout,
        ))
    }
}

/// Failure of a single step.
#[derive(Debug, Error)]
pub enum StepError {
    /// Raised when the provider cannot supply the host.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// Raised when a session cannot be opened or a transfer fails.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Raised when a created host never finishes booting.
    #[error(transparent)]
    Readiness(#[from] ReadinessError),
    /// Raised when an applied script fails.
    #[error(transparent)]
    Apply(#[from] ApplyError),
    /// Raised when a step names a target missing from the pipeline.
    #[error("unknown target {0}")]
    UnknownTarget(String),
    /// Raised when a step type cannot be parsed.
    #[error(transparent)]
    Kind(#[from] PipelineError),
}

/// Errors returned by [`PipelineExecutor::execute`].
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Raised when the pipeline fails validation or resolution.
    #[error("pipeline is invalid: {0}")]
    Plan(#[source] PipelineError),
    /// Raised when a step fails; later steps did not run.
    #[error("step {step} failed: {source}")]
    StepFailed {
        /// Name of the failing step.
        step: String,
        /// Underlying failure.
        #[source]
        source: Box<StepError>,
    },
}

/// Summary of a successful run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExecutionReport {
    /// Step names in the order they completed.
    pub completed: Vec<String>,
}

/// Runs pipelines against hosts supplied by a [`Provider`].
#[derive(Debug)]
pub struct PipelineExecutor<P, C> {
    provider: P,
    connector: C,
    waiter: ReadinessWaiter,
    default_private_key: String,
    base_dir: Utf8PathBuf,
}

impl<P, C> PipelineExecutor<P, C>
where
    P: Provider,
    C: Connector,
{
    /// Creates an executor resolving relative paths against the current
    /// directory.
    #[must_use]
    pub fn new(config: &OnctlConfig, provider: P, connector: C) -> Self {
        Self {
            provider,
            connector,
            waiter: ReadinessWaiter::from_config(config),
            default_private_key: config.ssh_private_key_file.clone(),
            base_dir: Utf8PathBuf::from("."),
        }
    }

    /// Resolves relative local paths in the pipeline against `base_dir`.
    #[must_use]
    pub fn with_base_dir(mut self, base_dir: impl Into<Utf8PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Replaces the readiness policy used after `create` steps.
    #[must_use]
    pub const fn with_waiter(mut self, waiter: ReadinessWaiter) -> Self {
        self.waiter = waiter;
        self
    }

    /// Provider backing this executor.
    #[must_use]
    pub const fn provider(&self) -> &P {
        &self.provider
    }

    /// Plans and runs every step of `pipeline`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Plan`] before any step runs when the
    /// pipeline is invalid, and [`ExecutorError::StepFailed`] for the first
    /// failing step.
    pub async fn execute(&self, pipeline: &PipelineConfig) -> Result<ExecutionReport, ExecutorError> {
        let plan = pipeline.plan().map_err(ExecutorError::Plan)?;
        info!(steps = plan.len(), "pipeline resolved");

        let mut sessions = BTreeMap::new();
        let outcome = self.run_steps(pipeline, &plan, &mut sessions).await;
        for (target, mut shell) in sessions {
            shell.close();
            info!(%target, "session closed");
        }
        outcome
    }

    async fn run_steps(
        &self,
        pipeline: &PipelineConfig,
        plan: &[Step],
        sessions: &mut BTreeMap<String, C::Shell>,
    ) -> Result<ExecutionReport, ExecutorError> {
        let mut report = ExecutionReport::default();
        for step in plan {
            info!(step = %step.name, kind = %step.step_type, target = %step.target, "running step");
            self.run_step(pipeline, step, sessions)
                .await
                .map_err(|source| ExecutorError::StepFailed {
                    step: step.name.clone(),
                    source: Box::new(source),
                })?;
            report.completed.push(step.name.clone());
        }
        Ok(report)
    }

    async fn run_step(
        &self,
        pipeline: &PipelineConfig,
        step: &Step,
        sessions: &mut BTreeMap<String, C::Shell>,
    ) -> Result<(), StepError> {
        let target = pipeline
            .target(&step.target)
            .ok_or_else(|| StepError::UnknownTarget(step.target.clone()))?;

        match step.kind()? {
            StepKind::Create => self.create(target, sessions).await,
            StepKind::Upload => {
                let shell = self.session(target, sessions).await?;
                self.upload(shell, step)
            }
            StepKind::Download => {
                let shell = self.session(target, sessions).await?;
                self.download(shell, step)
            }
            StepKind::Apply => {
                let shell = self.session(target, sessions).await?;
                self.apply(shell, step)
            }
        }
    }

    async fn create(
        &self,
        target: &Target,
        sessions: &mut BTreeMap<String, C::Shell>,
    ) -> Result<(), StepError> {
        let vm = self.provider.deploy(target.vm_name(), &target.config.vm).await?;
        info!(vm = %vm.name, ip = %vm.ip, "host provisioned");

        if let Some(mut previous) = sessions.remove(&target.name) {
            previous.close();
        }
        let opened = self.open(target, &vm)?;
        let shell = sessions.entry(target.name.clone()).or_insert(opened);
        self.waiter.wait_until_ready(shell).await?;
        Ok(())
    }

    async fn session<'s>(
        &self,
        target: &Target,
        sessions: &'s mut BTreeMap<String, C::Shell>,
    ) -> Result<&'s mut C::Shell, StepError> {
        match sessions.entry(target.name.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let vm = self.provider.get_by_name(target.vm_name()).await?;
                Ok(entry.insert(self.open(target, &vm)?))
            }
        }
    }

    fn open(&self, target: &Target, vm: &Vm) -> Result<C::Shell, SessionError> {
        let key = target.private_key_file(&self.default_private_key);
        let private_key = self.local_path(&key);
        self.connector.open(vm, &private_key)
    }

    fn upload(&self, shell: &mut C::Shell, step: &Step) -> Result<(), StepError> {
        warn_if_empty(step);
        for file in &step.config.files {
            let local = self.local_path(&file.src);
            let remote = Utf8Path::new(file.destination());
            let bytes = shell.upload(&local, remote, None)?;
            info!(%local, %remote, bytes, "uploaded file");
        }
        Ok(())
    }

    fn download(&self, shell: &mut C::Shell, step: &Step) -> Result<(), StepError> {
        warn_if_empty(step);
        for file in &step.config.files {
            let remote = Utf8Path::new(&file.src);
            let local = self.local_path(file.destination());
            let bytes = shell.download(remote, &local, None)?;
            info!(%remote, %local, bytes, "downloaded file");
        }
        Ok(())
    }

    fn apply(&self, shell: &mut C::Shell, step: &Step) -> Result<(), StepError> {
        warn_if_empty(step);
        let dot_env = step
            .config
            .dot_env_file
            .as_deref()
            .filter(|path| !path.trim().is_empty())
            .map(|path| self.local_path(path));
        for file in &step.config.files {
            let request = ApplyRequest {
                script: self.local_path(&file.src),
                dot_env: dot_env.clone(),
                vars: step.config.variables.clone(),
            };
            let run = apply_script(shell, &request)?;
            info!(directory = %run.directory, log = %run.log_file, "script applied");
        }
        Ok(())
    }

    fn local_path(&self, path: &str) -> Utf8PathBuf {
        let expanded = local_fs::expand_tilde(path);
        local_fs::resolve_against(&self.base_dir, Utf8Path::new(&expanded))
    }
}

fn warn_if_empty(step: &Step) {
    if step.config.files.is_empty() {
        warn!(step = %step.name, "step lists no files, nothing to do");
    }
}
