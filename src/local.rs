//! Local process execution used by the deployment workflow.
//!
//! Image inspection, `docker save` and the registry probe all run on the
//! operator's machine. They go through [`CommandRunner`] so tests can script
//! their output instead of requiring a Docker daemon.

use std::ffi::OsString;
use std::process::Command;

use thiserror::Error;
use tracing::debug;

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Converts a non-zero exit into [`LocalCommandError::CommandFailure`].
    ///
    /// # Errors
    ///
    /// Returns [`LocalCommandError::CommandFailure`] when the exit code is not
    /// zero or missing.
    pub fn into_success(self, program: &str) -> Result<Self, LocalCommandError> {
        if self.is_success() {
            return Ok(self);
        }

        let status_text = self
            .code
            .map_or_else(|| String::from("unknown"), |code| code.to_string());
        Err(LocalCommandError::CommandFailure {
            program: program.to_owned(),
            status: self.code,
            status_text,
            stderr: self.stderr,
        })
    }
}

/// Errors raised while running a local command.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum LocalCommandError {
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a command completes with a non-zero exit code.
    #[error("{program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Command name used for the attempted operation.
        program: String,
        /// Exit status as reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the process.
        stderr: String,
    },
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`LocalCommandError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, LocalCommandError>;
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, LocalCommandError> {
        debug!(program, ?args, "running local command");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| LocalCommandError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sh(script: &str) -> Result<CommandOutput, LocalCommandError> {
        ProcessCommandRunner.run("sh", &[OsString::from("-c"), OsString::from(script)])
    }

    #[rstest]
    #[case("printf out && printf err 1>&2", Some(0), "out", "err")]
    #[case("printf out && printf err 1>&2; exit 42", Some(42), "out", "err")]
    #[case("", Some(0), "", "")]
    fn process_runner_captures_streams(
        #[case] script: &str,
        #[case] code: Option<i32>,
        #[case] stdout: &str,
        #[case] stderr: &str,
    ) {
        let output = sh(script).expect("sh should spawn");
        assert_eq!(output.code, code);
        assert_eq!(output.stdout, stdout);
        assert_eq!(output.stderr, stderr);
    }

    #[test]
    fn process_runner_reports_spawn_failure() {
        let result = ProcessCommandRunner.run("definitely-not-a-real-binary-xyz", &[]);
        assert!(
            matches!(result, Err(LocalCommandError::Spawn { .. })),
            "expected spawn error, got {result:?}"
        );
    }

    #[test]
    fn into_success_rejects_non_zero_status() {
        let output = CommandOutput {
            code: Some(3),
            stdout: String::new(),
            stderr: String::from("boom"),
        };
        let err = output
            .into_success("docker")
            .expect_err("non-zero exit should fail");
        assert_eq!(
            err,
            LocalCommandError::CommandFailure {
                program: String::from("docker"),
                status: Some(3),
                status_text: String::from("3"),
                stderr: String::from("boom"),
            }
        );
    }

    #[test]
    fn into_success_labels_missing_status_as_unknown() {
        let output = CommandOutput {
            code: None,
            stdout: String::new(),
            stderr: String::new(),
        };
        let err = output.into_success("gzip").expect_err("signal exit should fail");
        assert!(err.to_string().contains("status unknown"), "got {err}");
    }
}
