//! Errors raised by remote sessions and file transfers.

use thiserror::Error;

/// Errors surfaced while connecting, executing or transferring over SSH.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SessionError {
    /// Raised when the private key cannot be used or is rejected.
    #[error("authentication as {user}@{host} failed: {message}")]
    Auth {
        /// Remote user.
        user: String,
        /// Remote host.
        host: String,
        /// Reason reported by the key loader or the server.
        message: String,
    },
    /// Raised when the TCP dial or SSH handshake fails.
    #[error("failed to connect to {host}:{port}: {message}")]
    Connection {
        /// Remote host.
        host: String,
        /// Remote port.
        port: u16,
        /// Underlying error message.
        message: String,
    },
    /// Raised when a remote command exits non-zero or its channel fails.
    ///
    /// `stdout` carries whatever output was read before the failure.
    #[error("remote command `{command}` failed: {message}")]
    RemoteCommand {
        /// Command as sent to the remote shell.
        command: String,
        /// Exit status, when the remote side reported one.
        exit_status: Option<i32>,
        /// Standard output read before the failure.
        stdout: String,
        /// Description of the failure.
        message: String,
    },
    /// Raised when an SFTP transfer fails. Partially written files are left in
    /// place.
    #[error("transfer of {path} failed: {message}")]
    Transfer {
        /// Path being read or written when the failure occurred.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

impl SessionError {
    /// Returns `true` for authentication failures, which retries cannot fix.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    /// Partial stdout captured by a failed remote command.
    #[must_use]
    pub fn partial_stdout(&self) -> Option<&str> {
        match self {
            Self::RemoteCommand { stdout, .. } => Some(stdout),
            _ => None,
        }
    }
}
