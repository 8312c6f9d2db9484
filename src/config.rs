//! Configuration loading via `ortho-config`.
//!
//! [`OnctlConfig`] is constructed once per invocation and passed by reference
//! into the session connector, readiness waiter, deployer and pipeline
//! executor.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default remote user for SSH sessions.
pub const DEFAULT_SSH_USER: &str = "root";
/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;
/// Default private key used when a target does not name one.
pub const DEFAULT_PRIVATE_KEY_FILE: &str = "~/.ssh/id_rsa";
/// Upper bound on the TCP dial when opening a session.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 7;
/// Fixed sleep between readiness probes.
pub const DEFAULT_READINESS_INTERVAL_SECS: u64 = 3;
/// Number of readiness probes before giving up.
pub const DEFAULT_READINESS_ATTEMPTS: u32 = 15;
/// Delay between `docker run` and the running-state check.
pub const DEFAULT_VERIFY_DELAY_SECS: u64 = 2;
/// Default Docker CLI on both sides of a deployment.
pub const DEFAULT_DOCKER_BIN: &str = "docker";

/// SSH, readiness and deployment settings derived from defaults,
/// configuration files and `ONCTL_*` environment variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "ONCTL",
    discovery(
        app_name = "onctl",
        env_var = "ONCTL_CONFIG_PATH",
        config_file_name = "onctl.toml",
        dotfile_name = ".onctl.toml",
        project_file_name = "onctl.toml"
    )
)]
pub struct OnctlConfig {
    /// Remote user to connect as when a host does not specify one.
    #[ortho_config(default = DEFAULT_SSH_USER.to_owned())]
    pub ssh_user: String,
    /// SSH port used when a host does not specify one.
    #[ortho_config(default = DEFAULT_SSH_PORT)]
    pub ssh_port: u16,
    /// Private key used for authentication. Supports `~/` expansion.
    #[ortho_config(default = DEFAULT_PRIVATE_KEY_FILE.to_owned())]
    pub ssh_private_key_file: String,
    /// Seconds allowed for the TCP dial.
    #[ortho_config(default = DEFAULT_CONNECT_TIMEOUT_SECS)]
    pub connect_timeout_secs: u64,
    /// Seconds slept between readiness probes.
    #[ortho_config(default = DEFAULT_READINESS_INTERVAL_SECS)]
    pub readiness_interval_secs: u64,
    /// Maximum number of readiness probes.
    #[ortho_config(default = DEFAULT_READINESS_ATTEMPTS)]
    pub readiness_attempts: u32,
    /// Seconds to wait after `docker run` before checking the container.
    #[ortho_config(default = DEFAULT_VERIFY_DELAY_SECS)]
    pub deploy_verify_delay_secs: u64,
    /// Docker CLI invoked on the local machine.
    #[ortho_config(default = DEFAULT_DOCKER_BIN.to_owned())]
    pub docker_bin: String,
    /// Docker CLI invoked on the remote host.
    #[ortho_config(default = DEFAULT_DOCKER_BIN.to_owned())]
    pub remote_docker_bin: String,
}

impl Default for OnctlConfig {
    fn default() -> Self {
        Self {
            ssh_user: DEFAULT_SSH_USER.to_owned(),
            ssh_port: DEFAULT_SSH_PORT,
            ssh_private_key_file: DEFAULT_PRIVATE_KEY_FILE.to_owned(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            readiness_interval_secs: DEFAULT_READINESS_INTERVAL_SECS,
            readiness_attempts: DEFAULT_READINESS_ATTEMPTS,
            deploy_verify_delay_secs: DEFAULT_VERIFY_DELAY_SECS,
            docker_bin: DEFAULT_DOCKER_BIN.to_owned(),
            remote_docker_bin: DEFAULT_DOCKER_BIN.to_owned(),
        }
    }
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn message(&self, problem: &str) -> String {
        format!(
            "{problem} {}: set {} or add {} to onctl.toml",
            self.description, self.env_var, self.toml_key
        )
    }
}

impl OnctlConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("onctl")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required string is empty
    /// and [`ConfigError::InvalidValue`] when a numeric field is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_text(
            &self.ssh_user,
            &FieldMetadata::new("SSH user", "ONCTL_SSH_USER", "ssh_user"),
        )?;
        Self::require_text(
            &self.ssh_private_key_file,
            &FieldMetadata::new(
                "SSH private key file",
                "ONCTL_SSH_PRIVATE_KEY_FILE",
                "ssh_private_key_file",
            ),
        )?;
        Self::require_text(
            &self.docker_bin,
            &FieldMetadata::new("local docker binary", "ONCTL_DOCKER_BIN", "docker_bin"),
        )?;
        Self::require_text(
            &self.remote_docker_bin,
            &FieldMetadata::new(
                "remote docker binary",
                "ONCTL_REMOTE_DOCKER_BIN",
                "remote_docker_bin",
            ),
        )?;
        Self::require_positive(
            u64::from(self.ssh_port),
            &FieldMetadata::new("SSH port", "ONCTL_SSH_PORT", "ssh_port"),
        )?;
        Self::require_positive(
            self.connect_timeout_secs,
            &FieldMetadata::new(
                "connect timeout",
                "ONCTL_CONNECT_TIMEOUT_SECS",
                "connect_timeout_secs",
            ),
        )?;
        Self::require_positive(
            u64::from(self.readiness_attempts),
            &FieldMetadata::new(
                "readiness attempt budget",
                "ONCTL_READINESS_ATTEMPTS",
                "readiness_attempts",
            ),
        )?;
        Ok(())
    }

    /// Dial timeout for new SSH connections.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Sleep between readiness probes.
    #[must_use]
    pub const fn readiness_interval(&self) -> Duration {
        Duration::from_secs(self.readiness_interval_secs)
    }

    /// Delay between starting a container and verifying it.
    #[must_use]
    pub const fn deploy_verify_delay(&self) -> Duration {
        Duration::from_secs(self.deploy_verify_delay_secs)
    }

    fn require_text(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(metadata.message("missing")));
        }
        Ok(())
    }

    fn require_positive(value: u64, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::InvalidValue(metadata.message("zero is not a valid")));
        }
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a numeric field holds an unusable value.
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}
