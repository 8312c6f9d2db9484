//! Versioned apply directories and script execution on remote hosts.
//!
//! Every apply run gets a fresh `.onctl/applyNN` directory under the remote
//! user's working directory. The number is one more than the highest number
//! already present, so deleted directories leave gaps that are never reused
//! and the directory list doubles as an execution history.

use camino::{Utf8Path, Utf8PathBuf};
use shell_escape::escape;
use thiserror::Error;
use tracing::{debug, info};

use crate::session::{RemoteShell, SessionError};

/// Remote directory, relative to the login directory, holding apply runs.
pub const APPLY_ROOT: &str = ".onctl";

const APPLY_PREFIX: &str = "apply";

/// Errors raised while applying a script.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// Raised when the script path has no file name component.
    #[error("script path {path} does not name a file")]
    InvalidScript {
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// Raised when the apply directory cannot be listed or created.
    #[error("failed to allocate an apply directory: {0}")]
    Allocate(#[source] SessionError),
    /// Raised when the script or dot-env file cannot be uploaded.
    #[error("failed to upload {path}: {source}")]
    Upload {
        /// Local file being uploaded.
        path: Utf8PathBuf,
        /// Underlying transfer failure.
        #[source]
        source: SessionError,
    },
    /// Raised when the script exits non-zero.
    #[error("script failed, see {log_file} on the host: {source}")]
    Execute {
        /// Remote log file holding the script's combined output.
        log_file: String,
        /// Underlying command failure.
        #[source]
        source: SessionError,
    },
}

/// Parameters for one apply run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ApplyRequest {
    /// Local script to upload and run.
    pub script: Utf8PathBuf,
    /// Optional local dot-env file uploaded as `.env` beside the script.
    pub dot_env: Option<Utf8PathBuf>,
    /// `KEY=value` entries exported before the script runs.
    pub vars: Vec<String>,
}

/// Outcome of a successful apply run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ApplyRun {
    /// Remote directory, for example `.onctl/apply03`.
    pub directory: String,
    /// Script file name inside the directory.
    pub script_name: String,
    /// Remote path of the script's log file.
    pub log_file: String,
}

/// Returns the directory name following the highest `applyNN` in `names`.
///
/// Entries that are not `apply` followed by digits are ignored. Numbers are
/// zero-padded to at least two digits.
///
/// ```
/// # use onctl::apply::next_apply_dir;
/// assert_eq!(next_apply_dir(["apply00", "apply07", "notes"]), "apply08");
/// assert_eq!(next_apply_dir(std::iter::empty::<&str>()), "apply00");
/// ```
#[must_use]
pub fn next_apply_dir<I, S>(names: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let highest = names
        .into_iter()
        .filter_map(|name| apply_number(name.as_ref().trim()))
        .max();
    let next = highest.map_or(0, |number| number.saturating_add(1));
    format!("{APPLY_PREFIX}{next:02}")
}

fn apply_number(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(APPLY_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Creates the next apply directory on the host and returns its path.
///
/// The final `mkdir` runs without `-p`, so two allocations racing for the
/// same number fail instead of sharing a directory.
///
/// # Errors
///
/// Returns [`ApplyError::Allocate`] when listing or creation fails.
pub fn allocate_apply_dir<S>(shell: &mut S) -> Result<String, ApplyError>
where
    S: RemoteShell + ?Sized,
{
    let listing = shell
        .run(&format!("mkdir -p {APPLY_ROOT} && ls -1 {APPLY_ROOT}"), &[])
        .map_err(ApplyError::Allocate)?;
    let directory = format!("{APPLY_ROOT}/{}", next_apply_dir(listing.lines()));
    shell
        .run(&format!("mkdir {directory}"), &[])
        .map_err(ApplyError::Allocate)?;
    debug!(%directory, "allocated apply directory");
    Ok(directory)
}

/// Uploads and runs a script in a fresh apply directory.
///
/// The script runs under `sudo -E` with `.env` (when uploaded) sourced with
/// `allexport`, then `vars` and `PUBLIC_IP` exported. Combined output goes to
/// `output-<script>.log` in the apply directory.
///
/// # Errors
///
/// Returns [`ApplyError`] for the phase that failed. Nothing is rolled back;
/// the directory stays behind as a record of the attempt.
pub fn apply_script<S>(shell: &mut S, request: &ApplyRequest) -> Result<ApplyRun, ApplyError>
where
    S: RemoteShell + ?Sized,
{
    let script_name = request
        .script
        .file_name()
        .ok_or_else(|| ApplyError::InvalidScript {
            path: request.script.clone(),
        })?
        .to_owned();

    let directory = allocate_apply_dir(shell)?;
    let remote_dir = Utf8Path::new(&directory);

    upload(shell, &request.script, &remote_dir.join(&script_name))?;
    if let Some(dot_env) = &request.dot_env {
        upload(shell, dot_env, &remote_dir.join(".env"))?;
    }

    let log_name = format!("output-{script_name}.log");
    let log_file = remote_dir.join(&log_name).into_string();
    let command = compose_apply_command(
        &directory,
        &script_name,
        &log_name,
        &request.vars,
        &shell.host().to_string(),
    );

    info!(%directory, script = %script_name, "running apply script");
    shell
        .run(&command, &[])
        .map_err(|source| ApplyError::Execute {
            log_file: log_file.clone(),
            source,
        })?;

    Ok(ApplyRun {
        directory,
        script_name,
        log_file,
    })
}

fn upload<S>(shell: &mut S, local: &Utf8Path, remote: &Utf8Path) -> Result<(), ApplyError>
where
    S: RemoteShell + ?Sized,
{
    shell
        .upload(local, remote, None)
        .map(|_| ())
        .map_err(|source| ApplyError::Upload {
            path: local.to_owned(),
            source,
        })
}

fn compose_apply_command(
    directory: &str,
    script_name: &str,
    log_name: &str,
    vars: &[String],
    public_ip: &str,
) -> String {
    let script = escape(script_name.into());
    let exports: String = vars
        .iter()
        .map(|var| format!("{} ", quote_assignment(var)))
        .chain(std::iter::once(format!(
            "PUBLIC_IP={}",
            escape(public_ip.into())
        )))
        .collect();

    format!(
        concat!(
            "cd {dir} && chmod +x {script} && ",
            "if [ -f .env ]; then set -a; . ./.env; set +a; fi && ",
            "export {exports} && ",
            "sudo -E ./{script} > {log} 2>&1"
        ),
        dir = escape(directory.into()),
        script = script,
        exports = exports,
        log = escape(log_name.into()),
    )
}

fn quote_assignment(var: &str) -> String {
    var.split_once('=').map_or_else(
        || var.to_owned(),
        |(key, value)| format!("{key}={}", escape(value.into())),
    )
}
