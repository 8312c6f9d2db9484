//! Test support utilities shared across unit and integration tests.
//!
//! The doubles here stand in for the local Docker CLI ([`ScriptedRunner`]),
//! a remote host ([`ScriptedShell`]) and the SSH dialler
//! ([`ScriptedConnector`]). All of them share state through `Rc`, so a clone
//! handed to the code under test still reports what happened to the original.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::net::{IpAddr, Ipv4Addr};
use std::rc::Rc;

use camino::{Utf8Path, Utf8PathBuf};
use tokio::sync::{Mutex, MutexGuard};

use crate::executor::Connector;
use crate::local::{CommandOutput, CommandRunner, LocalCommandError};
use crate::provider::Vm;
use crate::session::{ProgressCallback, RemoteShell, SessionError};

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<VecDeque<CommandOutput>>>,
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len().saturating_add(1));
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Pushes a successful exit status with empty output.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a successful exit status with the given stdout.
    pub fn push_stdout(&self, stdout: impl Into<String>) {
        self.push_output(Some(0), stdout, "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, LocalCommandError> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| LocalCommandError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Operation observed by a [`ScriptedShell`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ShellCall {
    /// A command run through [`RemoteShell::run`].
    Run {
        /// Command text before the variable prefix is applied.
        command: String,
        /// Variables passed alongside the command.
        vars: Vec<String>,
    },
    /// A file pushed to the host.
    Upload {
        /// Local source path.
        local: Utf8PathBuf,
        /// Remote destination path.
        remote: Utf8PathBuf,
    },
    /// A file fetched from the host.
    Download {
        /// Remote source path.
        remote: Utf8PathBuf,
        /// Local destination path.
        local: Utf8PathBuf,
    },
}

#[derive(Debug, Default)]
struct ShellState {
    run_results: VecDeque<Result<String, SessionError>>,
    transfer_failures: VecDeque<SessionError>,
    calls: Vec<ShellCall>,
    closed: usize,
}

/// Scripted remote host.
///
/// `run` pops queued results in FIFO order and succeeds with empty stdout
/// once the queue is drained. Transfers succeed and report the local file
/// size (or zero) unless a failure was queued.
#[derive(Clone, Debug)]
pub struct ScriptedShell {
    host: IpAddr,
    state: Rc<RefCell<ShellState>>,
}

impl Default for ScriptedShell {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10)))
    }
}

impl ScriptedShell {
    /// Creates a shell reporting `host` as its address.
    #[must_use]
    pub fn new(host: IpAddr) -> Self {
        Self {
            host,
            state: Rc::new(RefCell::new(ShellState::default())),
        }
    }

    /// Queues a successful command with the given stdout.
    pub fn push_output(&self, stdout: impl Into<String>) {
        self.state
            .borrow_mut()
            .run_results
            .push_back(Ok(stdout.into()));
    }

    /// Queues a successful command with empty stdout.
    pub fn push_success(&self) {
        self.push_output("");
    }

    /// Queues a command that exits with `status`.
    pub fn push_exit(&self, status: i32) {
        self.push_error(SessionError::RemoteCommand {
            command: String::from("scripted"),
            exit_status: Some(status),
            stdout: String::new(),
            message: format!("exited with status {status}"),
        });
    }

    /// Queues an arbitrary session error for the next command.
    pub fn push_error(&self, error: SessionError) {
        self.state.borrow_mut().run_results.push_back(Err(error));
    }

    /// Makes the next upload or download fail with a transfer error.
    pub fn fail_next_transfer(&self, message: &str) {
        self.state
            .borrow_mut()
            .transfer_failures
            .push_back(SessionError::Transfer {
                path: String::from("scripted"),
                message: message.to_owned(),
            });
    }

    /// Snapshot of every recorded call.
    #[must_use]
    pub fn calls(&self) -> Vec<ShellCall> {
        self.state.borrow().calls.clone()
    }

    /// Commands passed to `run`, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|call| match call {
                ShellCall::Run { command, .. } => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns `true` when a recorded command contains `needle`.
    #[must_use]
    pub fn ran_command_containing(&self, needle: &str) -> bool {
        self.commands().iter().any(|command| command.contains(needle))
    }

    /// Number of upload calls recorded.
    #[must_use]
    pub fn upload_count(&self) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|call| matches!(call, ShellCall::Upload { .. }))
            .count()
    }

    /// Number of times `close` has been called.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.state.borrow().closed
    }

    fn transfer(&self, call: ShellCall, local: &Utf8Path) -> Result<u64, SessionError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(call);
        if let Some(failure) = state.transfer_failures.pop_front() {
            return Err(failure);
        }
        Ok(std::fs::metadata(local).map_or(0, |meta| meta.len()))
    }
}

impl RemoteShell for ScriptedShell {
    fn host(&self) -> IpAddr {
        self.host
    }

    fn run(&mut self, command: &str, vars: &[String]) -> Result<String, SessionError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(ShellCall::Run {
            command: command.to_owned(),
            vars: vars.to_vec(),
        });
        state.run_results.pop_front().unwrap_or_else(|| Ok(String::new()))
    }

    fn upload(
        &mut self,
        local: &Utf8Path,
        remote: &Utf8Path,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<u64, SessionError> {
        let bytes = self.transfer(
            ShellCall::Upload {
                local: local.to_owned(),
                remote: remote.to_owned(),
            },
            local,
        )?;
        if let Some(report) = progress {
            report(bytes, bytes);
        }
        Ok(bytes)
    }

    fn download(
        &mut self,
        remote: &Utf8Path,
        local: &Utf8Path,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<u64, SessionError> {
        let bytes = self.transfer(
            ShellCall::Download {
                remote: remote.to_owned(),
                local: local.to_owned(),
            },
            local,
        )?;
        if let Some(report) = progress {
            report(bytes, bytes);
        }
        Ok(bytes)
    }

    fn close(&mut self) {
        let mut state = self.state.borrow_mut();
        state.closed = state.closed.saturating_add(1);
    }
}

/// Connector handing out clones of one [`ScriptedShell`] per VM name.
#[derive(Clone, Debug, Default)]
pub struct ScriptedConnector {
    shells: Rc<RefCell<Vec<(String, ScriptedShell)>>>,
    opened: Rc<RefCell<Vec<(String, Utf8PathBuf)>>>,
    failures: Rc<RefCell<VecDeque<SessionError>>>,
}

impl ScriptedConnector {
    /// Creates a connector with no shells registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shell used for `vm_name`, creating it on first request.
    #[must_use]
    pub fn shell(&self, vm_name: &str) -> ScriptedShell {
        let mut shells = self.shells.borrow_mut();
        if let Some((_, shell)) = shells.iter().find(|(name, _)| name == vm_name) {
            return shell.clone();
        }
        let shell = ScriptedShell::default();
        shells.push((vm_name.to_owned(), shell.clone()));
        shell
    }

    /// Makes the next `open` fail with `error`.
    pub fn fail_next_open(&self, error: SessionError) {
        self.failures.borrow_mut().push_back(error);
    }

    /// VM names and private keys passed to `open`, in order.
    #[must_use]
    pub fn opened(&self) -> Vec<(String, Utf8PathBuf)> {
        self.opened.borrow().clone()
    }
}

impl Connector for ScriptedConnector {
    type Shell = ScriptedShell;

    fn open(&self, vm: &Vm, private_key: &Utf8Path) -> Result<Self::Shell, SessionError> {
        self.opened
            .borrow_mut()
            .push((vm.name.clone(), private_key.to_owned()));
        if let Some(error) = self.failures.borrow_mut().pop_front() {
            return Err(error);
        }
        let shell = self.shell(&vm.name);
        Ok(ScriptedShell {
            host: vm.ip,
            state: Rc::clone(&shell.state),
        })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
