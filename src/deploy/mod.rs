//! Container deployment onto a remote Docker host.
//!
//! [`Deployer::deploy`] drives the workflow: probe the host architecture,
//! classify the image with [`RegistryHeuristic`], check local images for an
//! architecture match, skip the transfer when the host already has the image,
//! otherwise pull remotely (registry images) or save, upload and load (local
//! images), then start the container and verify it is running. A container
//! that fails verification is force-removed after its logs are captured.

use std::ffi::OsString;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use shell_escape::escape;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::OnctlConfig;
use crate::local::{CommandOutput, CommandRunner};
use crate::session::{RemoteShell, SessionError};

mod arch;
mod error;
mod progress;
mod registry;

pub use arch::normalize_arch;
pub use error::{DeployError, DeployPhase};
pub use progress::{TransferProgress, percentage, throughput};
pub use registry::{
    RegistryHeuristic, names_loopback_registry, names_registry_host, repository_of,
};

const ARCHIVE_NAME: &str = "image.tar";

/// Where the image comes from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImageSource {
    /// Pulled by the remote host from a registry.
    Hub,
    /// Saved locally and shipped over SSH.
    Local,
}

/// How the image reached the remote host.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImageTransfer {
    /// The host already had the image.
    AlreadyPresent,
    /// The host pulled it from a registry.
    Pulled,
    /// The archive was uploaded and loaded.
    Uploaded {
        /// Size of the compressed archive.
        bytes: u64,
    },
}

/// Outcome of the idempotent "no container with this name" pre-condition.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PreconditionOutcome {
    /// No container had the name.
    AlreadyAbsent,
    /// A container with the name was stopped and removed.
    Removed,
    /// The check or removal failed and was ignored.
    Ignored {
        /// Failure that was swallowed.
        reason: String,
    },
}

/// Parameters for a container deployment.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeployOptions {
    /// Image reference, for example `nginx:1.25`.
    pub image: String,
    /// `KEY=value` environment entries for the container.
    pub env: Vec<String>,
    /// Optional container name.
    pub name: Option<String>,
    /// Port publications in `docker run -p` syntax.
    pub publish: Vec<String>,
}

/// Successful deployment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Deployment {
    /// Identifier printed by `docker run -d`.
    pub container_id: String,
    /// Classification used for the image.
    pub source: ImageSource,
    /// Normalised host architecture.
    pub remote_arch: String,
    /// How the image reached the host.
    pub image_transfer: ImageTransfer,
}

/// Deploys containers to hosts reached through a [`RemoteShell`].
#[derive(Clone, Debug)]
pub struct Deployer<R> {
    runner: R,
    docker_bin: String,
    remote_docker_bin: String,
    verify_delay: Duration,
    registry: RegistryHeuristic,
    show_progress: bool,
}

impl<R: CommandRunner> Deployer<R> {
    /// Creates a deployer using `runner` for local Docker commands.
    #[must_use]
    pub fn new(runner: R, config: &OnctlConfig) -> Self {
        Self {
            runner,
            docker_bin: config.docker_bin.clone(),
            remote_docker_bin: config.remote_docker_bin.clone(),
            verify_delay: config.deploy_verify_delay(),
            registry: RegistryHeuristic::default(),
            show_progress: true,
        }
    }

    /// Replaces the registry heuristic.
    #[must_use]
    pub const fn with_registry(mut self, registry: RegistryHeuristic) -> Self {
        self.registry = registry;
        self
    }

    /// Replaces the delay between `docker run` and the running-state check.
    #[must_use]
    pub const fn with_verify_delay(mut self, delay: Duration) -> Self {
        self.verify_delay = delay;
        self
    }

    /// Enables or disables the upload progress bar.
    #[must_use]
    pub const fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Runs the full deployment workflow against `shell`.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::ArchitectureMismatch`] before any transfer when
    /// a local image does not match the host, [`DeployError::ContainerStart`]
    /// when the container does not stay up, and session or local command
    /// errors tagged with the failing [`DeployPhase`].
    pub async fn deploy<S>(
        &self,
        shell: &mut S,
        options: &DeployOptions,
    ) -> Result<Deployment, DeployError>
    where
        S: RemoteShell + ?Sized,
    {
        let image = options.image.trim();
        if image.is_empty() {
            return Err(DeployError::MissingImage);
        }

        let remote_arch = normalize_arch(
            &shell
                .run("uname -m", &[])
                .map_err(|source| session_error(DeployPhase::ProbeArchitecture, source))?,
        );
        let source = self.registry.classify(&self.runner, &self.docker_bin, image);
        info!(image, ?source, %remote_arch, "deploying container");

        if source == ImageSource::Local {
            self.check_local_architecture(image, &remote_arch)?;
        }

        let image_transfer = if self.remote_image_present(shell, image)? {
            info!(image, "image already present on host");
            ImageTransfer::AlreadyPresent
        } else {
            match source {
                ImageSource::Hub => {
                    self.pull_remote(shell, image)?;
                    ImageTransfer::Pulled
                }
                ImageSource::Local => ImageTransfer::Uploaded {
                    bytes: self.transfer_local_image(shell, image)?,
                },
            }
        };

        let container_id = self.run_container(shell, image, options).await?;
        Ok(Deployment {
            container_id,
            source,
            remote_arch,
            image_transfer,
        })
    }

    /// Makes sure no container called `name` exists on the host.
    ///
    /// No-op when absent, stop then remove when present. Failures are logged
    /// and reported through [`PreconditionOutcome::Ignored`], never returned
    /// as errors.
    #[must_use]
    pub fn ensure_container_absent<S>(&self, shell: &mut S, name: &str) -> PreconditionOutcome
    where
        S: RemoteShell + ?Sized,
    {
        let docker = &self.remote_docker_bin;
        let quoted = escape(name.into());
        let filter = escape(format!("name=^/{name}$").into());
        let existing = match shell.run(
            &format!("{docker} ps -aq --filter {filter}"),
            &[],
        ) {
            Ok(stdout) => stdout,
            Err(err) => return ignored(name, &err),
        };
        if existing.trim().is_empty() {
            debug!(container = name, "no existing container");
            return PreconditionOutcome::AlreadyAbsent;
        }

        if let Err(err) = shell.run(&format!("{docker} stop {quoted}"), &[]) {
            warn!(container = name, error = %err, "failed to stop existing container");
        }
        match shell.run(&format!("{docker} rm {quoted}"), &[]) {
            Ok(_) => {
                info!(container = name, "removed existing container");
                PreconditionOutcome::Removed
            }
            Err(err) => ignored(name, &err),
        }
    }

    fn check_local_architecture(&self, image: &str, remote_arch: &str) -> Result<(), DeployError> {
        let output = self
            .local(
                DeployPhase::InspectLocalImage,
                &["image", "inspect", "--format", "{{.Architecture}}", image],
            )?;
        let local_arch = normalize_arch(&output.stdout);
        if local_arch != remote_arch {
            return Err(DeployError::ArchitectureMismatch {
                image: image.to_owned(),
                local: local_arch,
                remote: remote_arch.to_owned(),
            });
        }
        Ok(())
    }

    fn remote_image_present<S>(&self, shell: &mut S, image: &str) -> Result<bool, DeployError>
    where
        S: RemoteShell + ?Sized,
    {
        let command = format!(
            "{docker} image inspect {image} >/dev/null 2>&1 && echo present || echo absent",
            docker = self.remote_docker_bin,
            image = escape(image.into()),
        );
        let answer = shell
            .run(&command, &[])
            .map_err(|source| session_error(DeployPhase::CheckRemoteImage, source))?;
        Ok(answer.trim() == "present")
    }

    fn pull_remote<S>(&self, shell: &mut S, image: &str) -> Result<(), DeployError>
    where
        S: RemoteShell + ?Sized,
    {
        info!(image, "pulling image on host");
        shell
            .run(
                &format!("{} pull {}", self.remote_docker_bin, escape(image.into())),
                &[],
            )
            .map(|_| ())
            .map_err(|source| session_error(DeployPhase::Pull, source))
    }

    fn transfer_local_image<S>(&self, shell: &mut S, image: &str) -> Result<u64, DeployError>
    where
        S: RemoteShell + ?Sized,
    {
        let scratch = tempfile::Builder::new()
            .prefix("onctl-deploy-")
            .tempdir()
            .map_err(DeployError::Workspace)?;
        let scratch_path = Utf8Path::from_path(scratch.path()).ok_or_else(|| {
            DeployError::Workspace(std::io::Error::other("scratch directory is not UTF-8"))
        })?;
        let tar = scratch_path.join(ARCHIVE_NAME);

        info!(image, "saving local image");
        self.local(
            DeployPhase::Save,
            &["save", "--output", tar.as_str(), image],
        )?;
        let compressed = self.compress(&tar)?;

        let remote_archive = Utf8PathBuf::from(format!("/tmp/onctl-{}.tar.gz", Uuid::new_v4()));
        let result = self.upload_and_load(shell, &compressed, &remote_archive);
        remove_remote_archive(shell, &remote_archive);
        result
    }

    fn compress(&self, tar: &Utf8Path) -> Result<Utf8PathBuf, DeployError> {
        let args = [OsString::from("-f"), OsString::from(tar.as_str())];
        self.runner
            .run("gzip", &args)
            .and_then(|output| output.into_success("gzip"))
            .map_err(|source| DeployError::Local {
                phase: DeployPhase::Compress,
                source,
            })?;
        Ok(Utf8PathBuf::from(format!("{tar}.gz")))
    }

    fn upload_and_load<S>(
        &self,
        shell: &mut S,
        archive: &Utf8Path,
        remote_archive: &Utf8Path,
    ) -> Result<u64, DeployError>
    where
        S: RemoteShell + ?Sized,
    {
        let progress = if self.show_progress {
            TransferProgress::new("uploading image")
        } else {
            TransferProgress::hidden()
        };
        let mut report = |sent: u64, total: u64| progress.update(sent, total);
        let bytes = shell
            .upload(archive, remote_archive, Some(&mut report))
            .map_err(|source| session_error(DeployPhase::Upload, source))?;
        info!(archive = %remote_archive, summary = %progress.finish(bytes), "uploaded image archive");

        let load = format!(
            "gunzip -c {archive} | {docker} load",
            archive = escape(remote_archive.as_str().into()),
            docker = self.remote_docker_bin,
        );
        shell
            .run(&load, &[])
            .map_err(|source| session_error(DeployPhase::Load, source))?;
        Ok(bytes)
    }

    async fn run_container<S>(
        &self,
        shell: &mut S,
        image: &str,
        options: &DeployOptions,
    ) -> Result<String, DeployError>
    where
        S: RemoteShell + ?Sized,
    {
        if let Some(name) = options.name.as_deref() {
            let outcome = self.ensure_container_absent(shell, name);
            debug!(container = name, ?outcome, "container pre-condition applied");
        }

        let started = shell.run(&self.run_command(image, options), &[]);
        let container_id = match started {
            Ok(stdout) => stdout.trim().to_owned(),
            Err(err) => return Err(self.failed_run(shell, options, err)),
        };
        let Some(handle) = Some(container_id.as_str())
            .filter(|id| !id.is_empty())
            .or(options.name.as_deref())
            .map(str::to_owned)
        else {
            return Err(DeployError::ContainerStart {
                container: image.to_owned(),
                reason: String::from("docker run printed no container id"),
                logs: String::new(),
            });
        };
        let container = options.name.clone().unwrap_or_else(|| handle.clone());

        sleep(self.verify_delay).await;

        let quoted_handle = escape(handle.as_str().into());
        let status = shell.run(
            &format!(
                "{} inspect -f '{{{{.State.Running}}}}' {quoted_handle}",
                self.remote_docker_bin
            ),
            &[],
        );
        let reason = match status {
            Ok(state) if state.trim() == "true" => {
                info!(%container, id = %handle, "container running");
                return Ok(handle);
            }
            Ok(state) => format!("container state is running={}", state.trim()),
            Err(err) => format!("status query failed: {err}"),
        };

        let logs = self.collect_logs_and_remove(shell, &container, &handle);
        Err(DeployError::ContainerStart {
            container,
            reason,
            logs,
        })
    }

    /// Maps a failed `docker run`. The container may already exist (for
    /// example when port publication fails), so a known handle is rolled back
    /// like any other failed start.
    fn failed_run<S>(
        &self,
        shell: &mut S,
        options: &DeployOptions,
        err: SessionError,
    ) -> DeployError
    where
        S: RemoteShell + ?Sized,
    {
        let created = err
            .partial_stdout()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_owned);
        let Some(handle) = options.name.clone().or(created) else {
            return session_error(DeployPhase::Run, err);
        };
        let container = options.name.clone().unwrap_or_else(|| handle.clone());
        let reason = format!("docker run failed: {err}");
        let logs = self.collect_logs_and_remove(shell, &container, &handle);
        DeployError::ContainerStart {
            container,
            reason,
            logs,
        }
    }

    fn collect_logs_and_remove<S>(
        &self,
        shell: &mut S,
        container: &str,
        handle: &str,
    ) -> String
    where
        S: RemoteShell + ?Sized,
    {
        let docker = &self.remote_docker_bin;
        let quoted = escape(handle.into());
        let logs = match shell.run(&format!("{docker} logs {quoted} 2>&1"), &[]) {
            Ok(logs) => logs,
            Err(err) => err
                .partial_stdout()
                .filter(|partial| !partial.is_empty())
                .map_or_else(|| format!("(logs unavailable: {err})"), str::to_owned),
        };
        if let Err(err) = shell.run(&format!("{docker} rm -f {quoted}"), &[]) {
            warn!(%container, error = %err, "failed to remove container after failed start");
        }
        logs
    }

    fn run_command(&self, image: &str, options: &DeployOptions) -> String {
        let mut parts = vec![self.remote_docker_bin.clone(), String::from("run"), String::from("-d")];
        if let Some(name) = options.name.as_deref() {
            parts.push(String::from("--name"));
            parts.push(escape(name.into()).into_owned());
        }
        for entry in &options.env {
            parts.push(String::from("-e"));
            parts.push(escape(entry.as_str().into()).into_owned());
        }
        for port in &options.publish {
            parts.push(String::from("-p"));
            parts.push(escape(port.as_str().into()).into_owned());
        }
        parts.push(escape(image.into()).into_owned());
        parts.join(" ")
    }

    fn local(&self, phase: DeployPhase, args: &[&str]) -> Result<CommandOutput, DeployError> {
        let os_args: Vec<OsString> = args.iter().map(OsString::from).collect();
        self.runner
            .run(&self.docker_bin, &os_args)
            .and_then(|output| output.into_success(&self.docker_bin))
            .map_err(|source| DeployError::Local { phase, source })
    }
}

fn remove_remote_archive<S>(shell: &mut S, remote_archive: &Utf8Path)
where
    S: RemoteShell + ?Sized,
{
    let command = format!("rm -f {}", escape(remote_archive.as_str().into()));
    if let Err(err) = shell.run(&command, &[]) {
        warn!(archive = %remote_archive, error = %err, "failed to remove remote image archive");
    }
}

fn ignored(name: &str, err: &SessionError) -> PreconditionOutcome {
    warn!(container = name, error = %err, "container pre-condition check failed, continuing");
    PreconditionOutcome::Ignored {
        reason: err.to_string(),
    }
}

const fn session_error(phase: DeployPhase, source: SessionError) -> DeployError {
    DeployError::Session { phase, source }
}
