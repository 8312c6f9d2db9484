//! Polling for first-boot completion on freshly created hosts.

use std::net::IpAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::OnctlConfig;
use crate::session::{RemoteShell, SessionError};

/// File cloud-init writes once first boot has finished.
pub const BOOT_FINISHED_SENTINEL: &str = "/var/lib/cloud/instance/boot-finished";

/// Errors raised while waiting for a host to become ready.
#[derive(Debug, Error)]
pub enum ReadinessError {
    /// Raised when the attempt budget runs out.
    #[error("host {ip} did not finish booting after {attempts} attempts")]
    Timeout {
        /// Address of the host that never became ready.
        ip: IpAddr,
        /// Number of probes issued.
        attempts: u32,
    },
    /// Raised when the session fails in a way retries cannot fix.
    #[error("readiness probe aborted: {0}")]
    Session(#[source] SessionError),
}

/// Fixed-interval poller for [`BOOT_FINISHED_SENTINEL`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReadinessWaiter {
    interval: Duration,
    attempts: u32,
}

impl ReadinessWaiter {
    /// Creates a waiter probing up to `attempts` times, `interval` apart.
    #[must_use]
    pub const fn new(interval: Duration, attempts: u32) -> Self {
        Self { interval, attempts }
    }

    /// Builds a waiter from the configured interval and budget.
    #[must_use]
    pub const fn from_config(config: &OnctlConfig) -> Self {
        Self::new(config.readiness_interval(), config.readiness_attempts)
    }

    /// Probes the host until the sentinel exists.
    ///
    /// A probe that exits non-zero or cannot reach the host counts as "not
    /// ready yet". There is no sleep after the final attempt. Returns the
    /// number of probes issued.
    ///
    /// # Errors
    ///
    /// Returns [`ReadinessError::Session`] on authentication failure and
    /// [`ReadinessError::Timeout`] once every attempt has failed.
    pub async fn wait_until_ready<S>(&self, shell: &mut S) -> Result<u32, ReadinessError>
    where
        S: RemoteShell + ?Sized,
    {
        let probe = format!("test -f {BOOT_FINISHED_SENTINEL}");
        let ip = shell.host();

        for attempt in 1..=self.attempts {
            match shell.run(&probe, &[]) {
                Ok(_) => {
                    info!(%ip, attempt, "host finished first boot");
                    return Ok(attempt);
                }
                Err(err) if err.is_auth() => return Err(ReadinessError::Session(err)),
                Err(err) => debug!(%ip, attempt, error = %err, "host not ready yet"),
            }

            if attempt < self.attempts {
                sleep(self.interval).await;
            }
        }

        Err(ReadinessError::Timeout {
            ip,
            attempts: self.attempts,
        })
    }
}
