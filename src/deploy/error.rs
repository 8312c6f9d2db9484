//! Errors raised by the container deployment workflow.

use std::fmt;

use thiserror::Error;

use crate::local::LocalCommandError;
use crate::session::SessionError;

/// Step of the deployment a failure belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeployPhase {
    /// `uname -m` on the remote host.
    ProbeArchitecture,
    /// Local `docker image inspect`.
    InspectLocalImage,
    /// Remote image presence check.
    CheckRemoteImage,
    /// Remote `docker pull`.
    Pull,
    /// Local `docker save`.
    Save,
    /// Local `gzip` of the saved archive.
    Compress,
    /// Archive upload over SFTP.
    Upload,
    /// Remote `docker load`.
    Load,
    /// Remote `docker run`.
    Run,
}

impl DeployPhase {
    /// Short human readable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProbeArchitecture => "remote architecture probe",
            Self::InspectLocalImage => "local image inspection",
            Self::CheckRemoteImage => "remote image check",
            Self::Pull => "remote image pull",
            Self::Save => "local image save",
            Self::Compress => "archive compression",
            Self::Upload => "archive upload",
            Self::Load => "remote image load",
            Self::Run => "container start",
        }
    }
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by [`super::Deployer::deploy`].
#[derive(Debug, Error)]
pub enum DeployError {
    /// Raised when the image name is blank.
    #[error("an image name is required")]
    MissingImage,
    /// Raised when a local image targets a different CPU family than the host.
    #[error(
        "image {image} is built for {local} but the host runs {remote}; \
         rebuild it for linux/{remote} or fetch a matching variant with \
         `docker pull --platform linux/{remote} {image}`"
    )]
    ArchitectureMismatch {
        /// Image reference.
        image: String,
        /// Normalised architecture of the local image.
        local: String,
        /// Normalised architecture of the remote host.
        remote: String,
    },
    /// Raised when the container does not reach the running state. The
    /// container has been force-removed by the time this is returned.
    #[error("container {container} failed to start: {reason}\n--- container logs ---\n{logs}")]
    ContainerStart {
        /// Container name or identifier.
        container: String,
        /// Why verification failed.
        reason: String,
        /// Output of `docker logs` captured before rollback.
        logs: String,
    },
    /// Raised when a remote command or transfer fails.
    #[error("{phase} failed: {source}")]
    Session {
        /// Phase that failed.
        phase: DeployPhase,
        /// Underlying session failure.
        #[source]
        source: SessionError,
    },
    /// Raised when a local Docker command fails.
    #[error("{phase} failed: {source}")]
    Local {
        /// Phase that failed.
        phase: DeployPhase,
        /// Underlying command failure.
        #[source]
        source: LocalCommandError,
    },
    /// Raised when the local scratch directory cannot be created.
    #[error("failed to create a local scratch directory: {0}")]
    Workspace(#[source] std::io::Error),
}

impl DeployError {
    /// Container logs captured for a failed start, if any.
    #[must_use]
    pub fn container_logs(&self) -> Option<&str> {
        match self {
            Self::ContainerStart { logs, .. } => Some(logs),
            _ => None,
        }
    }
}
