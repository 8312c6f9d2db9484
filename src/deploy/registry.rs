//! Heuristic classification of images as registry-hosted or local-only.
//!
//! The check is cheap and is not authoritative. `docker search`
//! only covers Docker Hub, so private images on Hub read as local (false
//! negative) and a local image that shares a public repository name reads as
//! hosted (false positive). A false negative costs an unnecessary transfer; a
//! false positive surfaces as a failed remote pull.

use std::ffi::OsString;
use std::net::IpAddr;

use tracing::debug;

use super::ImageSource;
use crate::local::CommandRunner;

const SEARCH_LIMIT: &str = "25";

/// How [`super::Deployer`] decides between pulling and transferring an image.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RegistryHeuristic {
    /// Treat images on a loopback registry as local and images naming any
    /// other registry host as hosted; otherwise look for an exact repository
    /// match in `docker search` output.
    #[default]
    DockerSearch,
    /// Skip probing and use the given source.
    Assume(ImageSource),
}

impl RegistryHeuristic {
    /// Classifies `image`. Search failures fall back to [`ImageSource::Local`].
    #[must_use]
    pub fn classify<R>(&self, runner: &R, docker_bin: &str, image: &str) -> ImageSource
    where
        R: CommandRunner + ?Sized,
    {
        match *self {
            Self::Assume(source) => source,
            Self::DockerSearch if names_loopback_registry(image) => ImageSource::Local,
            Self::DockerSearch if names_registry_host(image) => ImageSource::Hub,
            Self::DockerSearch => search_hub(runner, docker_bin, image),
        }
    }
}

fn search_hub<R>(runner: &R, docker_bin: &str, image: &str) -> ImageSource
where
    R: CommandRunner + ?Sized,
{
    let repository = repository_of(image);
    let args = [
        OsString::from("search"),
        OsString::from("--limit"),
        OsString::from(SEARCH_LIMIT),
        OsString::from("--format"),
        OsString::from("{{.Name}}"),
        OsString::from(repository),
    ];

    let output = match runner.run(docker_bin, &args) {
        Ok(output) if output.is_success() => output,
        Ok(output) => {
            debug!(image, stderr = %output.stderr, "registry search failed, assuming local image");
            return ImageSource::Local;
        }
        Err(err) => {
            debug!(image, error = %err, "registry search failed, assuming local image");
            return ImageSource::Local;
        }
    };

    if output.stdout.lines().any(|line| line.trim() == repository) {
        ImageSource::Hub
    } else {
        ImageSource::Local
    }
}

/// Returns `true` when the first path component names a registry host
/// other than the local machine.
#[must_use]
pub fn names_registry_host(image: &str) -> bool {
    registry_component(image).is_some_and(|first| {
        (first.contains('.') || first.contains(':')) && !is_loopback_host(first)
    })
}

/// Returns `true` when the image lives on a registry bound to loopback
/// (`localhost`, `127.0.0.1`, `[::1]`, with or without a port).
///
/// Such a name resolves to the remote host itself once pulled there, so the
/// image has to be shipped instead.
///
/// ```
/// # use onctl::deploy::names_loopback_registry;
/// assert!(names_loopback_registry("localhost:5000/app"));
/// assert!(!names_loopback_registry("ghcr.io/acme/api"));
/// ```
#[must_use]
pub fn names_loopback_registry(image: &str) -> bool {
    registry_component(image).is_some_and(is_loopback_host)
}

fn registry_component(image: &str) -> Option<&str> {
    image.split_once('/').map(|(first, _)| first)
}

fn is_loopback_host(component: &str) -> bool {
    let host = component.strip_prefix('[').map_or_else(
        || component.split_once(':').map_or(component, |(name, _)| name),
        |bracketed| bracketed.split_once(']').map_or(bracketed, |(name, _)| name),
    );
    host.eq_ignore_ascii_case("localhost")
        || host.parse::<IpAddr>().is_ok_and(|addr| addr.is_loopback())
}

/// Strips any digest and tag from an image reference.
///
/// ```
/// # use onctl::deploy::repository_of;
/// assert_eq!(repository_of("nginx:1.25"), "nginx");
/// assert_eq!(repository_of("localhost:5000/app"), "localhost:5000/app");
/// ```
#[must_use]
pub fn repository_of(image: &str) -> &str {
    let without_digest = image.split_once('@').map_or(image, |(name, _)| name);
    match without_digest.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => name,
        _ => without_digest,
    }
}
