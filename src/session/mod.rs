//! SSH sessions for remote command execution and file transfer.
//!
//! [`SshSession`] owns at most one authenticated connection to a single host.
//! The connection is opened on first use and reused by every later command,
//! each of which gets its own channel. Orchestrators talk to a session
//! through the [`RemoteShell`] trait so scripted doubles can stand in for a
//! real host in tests.

use std::io::{ErrorKind, Read};
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ssh2::Session;
use tracing::{debug, info, trace};

use crate::local_fs;

mod error;
mod transfer;

pub use error::SessionError;
pub use transfer::{CHUNK_SIZE, copy_with_progress};

/// Callback receiving `(bytes_so_far, total_bytes)` after each transferred
/// chunk.
pub type ProgressCallback<'a> = &'a mut dyn FnMut(u64, u64);

/// Network identity of a remote host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionTarget {
    /// Login user.
    pub username: String,
    /// Host address.
    pub ip_address: IpAddr,
    /// SSH port.
    pub ssh_port: u16,
}

/// Command execution and file transfer against one remote host.
///
/// Implementations are exclusively owned by one workflow at a time; every
/// method takes `&mut self`. Calls block the calling thread until the remote
/// side answers, so async callers run one workflow per runtime and await only
/// timers between calls.
pub trait RemoteShell {
    /// Address of the remote host, used for `PUBLIC_IP` and diagnostics.
    fn host(&self) -> IpAddr;

    /// Runs `command`, exporting `vars` (`KEY=value` entries) first, and
    /// returns its standard output.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::RemoteCommand`] on a non-zero exit or channel
    /// failure, or a connection error when the session cannot be opened.
    fn run(&mut self, command: &str, vars: &[String]) -> Result<String, SessionError>;

    /// Streams a local file to `remote`, returning the byte count.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transfer`] on any I/O fault.
    fn upload(
        &mut self,
        local: &Utf8Path,
        remote: &Utf8Path,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<u64, SessionError>;

    /// Streams `remote` into a local file, returning the byte count.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transfer`] on any I/O fault.
    fn download(
        &mut self,
        remote: &Utf8Path,
        local: &Utf8Path,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<u64, SessionError>;

    /// Releases the underlying connection. Later calls reconnect.
    fn close(&mut self) {}
}

/// Renders `KEY=value` entries in input order, each followed by a space.
///
/// ```
/// # use onctl::session::render_env_assignments;
/// let vars = [String::from("A=1"), String::from("B=2")];
/// assert_eq!(render_env_assignments(&vars), "A=1 B=2 ");
/// ```
#[must_use]
pub fn render_env_assignments(vars: &[String]) -> String {
    vars.iter().map(|var| format!("{var} ")).collect()
}

/// Prefixes `command` with an `export` clause for `vars` when any are given.
///
/// # Security
///
/// Entries are passed through verbatim; callers must quote untrusted values.
#[must_use]
pub fn compose_command(command: &str, vars: &[String]) -> String {
    if vars.is_empty() {
        command.to_owned()
    } else {
        format!("export {}&& {command}", render_env_assignments(vars))
    }
}

/// SSH session backed by `libssh2`.
pub struct SshSession {
    target: SessionTarget,
    private_key: Utf8PathBuf,
    connect_timeout: Duration,
    connection: Option<Session>,
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession")
            .field("target", &self.target)
            .field("private_key", &self.private_key)
            .field("connect_timeout", &self.connect_timeout)
            .field("connected", &self.connection.is_some())
            .finish()
    }
}

impl SshSession {
    /// Creates an unconnected session.
    #[must_use]
    pub const fn new(
        target: SessionTarget,
        private_key: Utf8PathBuf,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            target,
            private_key,
            connect_timeout,
            connection: None,
        }
    }

    /// Host identity this session connects to.
    #[must_use]
    pub const fn target(&self) -> &SessionTarget {
        &self.target
    }

    /// Returns `true` once a connection has been established.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Opens and authenticates the connection. A no-op when already connected.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Auth`] when the key cannot be read, does not
    /// look like a private key, or is rejected, and
    /// [`SessionError::Connection`] when the dial times out or the handshake
    /// fails.
    pub fn connect(&mut self) -> Result<(), SessionError> {
        if self.connection.is_some() {
            return Ok(());
        }

        self.check_private_key()?;

        let addr = SocketAddr::new(self.target.ip_address, self.target.ssh_port);
        debug!(%addr, timeout = ?self.connect_timeout, "dialling ssh");
        let tcp = TcpStream::connect_timeout(&addr, self.connect_timeout)
            .map_err(|err| self.connection_error(&err))?;

        let mut session = Session::new().map_err(|err| self.connection_error(&err))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|err| self.connection_error(&err))?;
        session
            .userauth_pubkey_file(
                &self.target.username,
                None,
                self.private_key.as_std_path(),
                None,
            )
            .map_err(|err| self.auth_error(err.to_string()))?;
        if !session.authenticated() {
            return Err(self.auth_error(String::from("server did not accept the key")));
        }

        info!(
            user = %self.target.username,
            host = %self.target.ip_address,
            port = self.target.ssh_port,
            "ssh session established"
        );
        self.connection = Some(session);
        Ok(())
    }

    fn session(&mut self) -> Result<&Session, SessionError> {
        self.connect()?;
        self.connection.as_ref().ok_or_else(|| SessionError::Connection {
            host: self.target.ip_address.to_string(),
            port: self.target.ssh_port,
            message: String::from("connection unavailable after connect"),
        })
    }

    fn check_private_key(&self) -> Result<(), SessionError> {
        let material = local_fs::read_to_string(&self.private_key)
            .map_err(|err| self.auth_error(format!("cannot read {}: {err}", self.private_key)))?;
        if !material.contains("PRIVATE KEY") {
            return Err(self.auth_error(format!(
                "{} does not contain a PEM or OpenSSH private key",
                self.private_key
            )));
        }
        Ok(())
    }

    fn auth_error(&self, message: String) -> SessionError {
        SessionError::Auth {
            user: self.target.username.clone(),
            host: self.target.ip_address.to_string(),
            message,
        }
    }

    fn connection_error(&self, err: &dyn std::fmt::Display) -> SessionError {
        SessionError::Connection {
            host: self.target.ip_address.to_string(),
            port: self.target.ssh_port,
            message: err.to_string(),
        }
    }
}

impl RemoteShell for SshSession {
    fn host(&self) -> IpAddr {
        self.target.ip_address
    }

    fn run(&mut self, command: &str, vars: &[String]) -> Result<String, SessionError> {
        let full_command = compose_command(command, vars);
        let session = self.session()?;
        let command_error = |message: String, exit_status: Option<i32>, stdout: String| {
            SessionError::RemoteCommand {
                command: full_command.clone(),
                exit_status,
                stdout,
                message,
            }
        };

        let mut channel = session
            .channel_session()
            .map_err(|err| command_error(err.to_string(), None, String::new()))?;
        channel
            .exec(&full_command)
            .map_err(|err| command_error(err.to_string(), None, String::new()))?;

        debug!(command = %full_command, "running remote command");
        let mut raw = Vec::new();
        let mut buffer = [0_u8; 8 * 1024];
        let read_error = loop {
            match channel.read(&mut buffer) {
                Ok(0) => break None,
                Ok(read) => {
                    let Some(chunk) = buffer.get(..read) else {
                        break None;
                    };
                    trace!(bytes = read, "remote stdout chunk");
                    raw.extend_from_slice(chunk);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => break Some(err),
            }
        };
        let stdout = String::from_utf8_lossy(&raw).into_owned();

        if let Some(err) = read_error {
            return Err(command_error(err.to_string(), None, stdout));
        }
        if let Err(err) = channel.wait_close() {
            return Err(command_error(err.to_string(), None, stdout));
        }
        let status = match channel.exit_status() {
            Ok(status) => status,
            Err(err) => return Err(command_error(err.to_string(), None, stdout)),
        };
        if status != 0 {
            return Err(command_error(
                format!("exited with status {status}"),
                Some(status),
                stdout,
            ));
        }

        Ok(stdout)
    }

    fn upload(
        &mut self,
        local: &Utf8Path,
        remote: &Utf8Path,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<u64, SessionError> {
        let session = self.session()?;
        transfer::upload(session, local, remote, progress)
    }

    fn download(
        &mut self,
        remote: &Utf8Path,
        local: &Utf8Path,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<u64, SessionError> {
        let session = self.session()?;
        transfer::download(session, remote, local, progress)
    }

    fn close(&mut self) {
        if let Some(session) = self.connection.take() {
            if let Err(err) = session.disconnect(None, "onctl session closed", None) {
                debug!(error = %err, "ssh disconnect failed");
            }
            debug!(host = %self.target.ip_address, "ssh session closed");
        }
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests;
