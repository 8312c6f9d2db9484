//! Declarative pipeline model: targets, steps and their dependencies.
//!
//! A pipeline is parsed once from YAML, validated for referential integrity
//! and then resolved into a total execution order. After validation the
//! configuration is treated as immutable.

use std::fmt;
use std::net::IpAddr;

use camino::Utf8Path;
use serde::Deserialize;

use crate::local_fs;

mod error;
mod resolve;
mod validate;

pub use error::{NameKind, PipelineError};
pub use resolve::resolve;
pub use validate::validate;

/// Root pipeline document.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct PipelineConfig {
    /// Remote host bindings.
    #[serde(default)]
    pub targets: Vec<Target>,
    /// Units of work, in declaration order.
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Named binding to a remote host.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct Target {
    /// Unique target name.
    pub name: String,
    /// Connection and VM settings.
    #[serde(default)]
    pub config: TargetConfig,
}

/// Per-target settings.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    /// Public key registered with the VM. The private key is expected next to
    /// it without the `.pub` suffix.
    pub public_key_file: Option<String>,
    /// VM description handed to the provider.
    #[serde(default)]
    pub vm: VmSpec,
}

/// Provider-facing VM description. Unknown keys are ignored so
/// provider-specific settings can live alongside these.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VmSpec {
    /// VM name; defaults to the target name.
    pub name: Option<String>,
    /// Address of an existing host.
    pub ip: Option<IpAddr>,
    /// Login user; defaults to the configured SSH user.
    pub username: Option<String>,
    /// SSH port; defaults to the configured SSH port.
    pub ssh_port: Option<u16>,
}

/// One unit of orchestrated work.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct Step {
    /// Unique step name.
    pub name: String,
    /// Declared step type; checked by [`validate`].
    #[serde(rename = "type")]
    pub step_type: String,
    /// Target the step runs against.
    pub target: String,
    /// Steps that must complete first. Forward references are allowed.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Type-specific settings.
    #[serde(default)]
    pub config: StepConfig,
}

/// Union of the optional step settings.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepConfig {
    /// Files to transfer, or scripts to apply.
    #[serde(default)]
    pub files: Vec<FileMapping>,
    /// Local dot-env file shipped alongside applied scripts.
    pub dot_env_file: Option<String>,
    /// `KEY=value` assignments exported for applied scripts.
    #[serde(default)]
    pub variables: Vec<String>,
}

/// Source/destination pair for a transfer.
///
/// For uploads `src` is local and `dst` remote; downloads reverse this. When
/// `dst` is absent the file keeps its name in the working directory.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct FileMapping {
    /// Source path.
    pub src: String,
    /// Optional destination path.
    pub dst: Option<String>,
}

impl FileMapping {
    /// Destination path, falling back to the source file name.
    #[must_use]
    pub fn destination(&self) -> &str {
        if let Some(dst) = self.dst.as_deref().filter(|dst| !dst.trim().is_empty()) {
            return dst;
        }
        Utf8Path::new(&self.src).file_name().unwrap_or(&self.src)
    }
}

/// Legal step types.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepKind {
    /// Provision (or look up) the target VM and wait for first boot.
    Create,
    /// Copy local files to the target.
    Upload,
    /// Run scripts in a fresh apply directory.
    Apply,
    /// Copy remote files back to the local machine.
    Download,
}

impl StepKind {
    /// Parses a declared step type.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(Self::Create),
            "upload" => Some(Self::Upload),
            "apply" => Some(Self::Apply),
            "download" => Some(Self::Download),
            _ => None,
        }
    }

    /// Canonical lower-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Upload => "upload",
            Self::Apply => "apply",
            Self::Download => "download",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Step {
    /// Returns the parsed step type.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownStepType`] for undeclared types.
    pub fn kind(&self) -> Result<StepKind, PipelineError> {
        StepKind::parse(&self.step_type).ok_or_else(|| PipelineError::UnknownStepType {
            step: self.name.clone(),
            step_type: self.step_type.clone(),
        })
    }
}

impl Target {
    /// Name the provider knows this target's VM by.
    #[must_use]
    pub fn vm_name(&self) -> &str {
        self.config
            .vm
            .name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.name)
    }

    /// Private key for this target, derived from `publicKeyFile` by dropping a
    /// trailing `.pub`, or `fallback` when no key is configured.
    #[must_use]
    pub fn private_key_file(&self, fallback: &str) -> String {
        let configured = self
            .config
            .public_key_file
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty());
        let Some(public_key) = configured else {
            return local_fs::expand_tilde(fallback);
        };
        let private_key = public_key.strip_suffix(".pub").unwrap_or(public_key);
        local_fs::expand_tilde(private_key)
    }
}

impl PipelineConfig {
    /// Parses a pipeline from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Parse`] when the document is malformed.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, PipelineError> {
        serde_yaml::from_str(yaml).map_err(|err| PipelineError::Parse(err.to_string()))
    }

    /// Reads and parses a pipeline file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Read`] when the file cannot be read and
    /// [`PipelineError::Parse`] when its content is malformed.
    pub fn load(path: &Utf8Path) -> Result<Self, PipelineError> {
        let yaml = local_fs::read_to_string(path).map_err(|err| PipelineError::Read {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Validates names and references. See [`validate`].
    ///
    /// # Errors
    ///
    /// Returns the first [`PipelineError`] found.
    pub fn validate(&self) -> Result<(), PipelineError> {
        validate(self)
    }

    /// Validates the pipeline and returns its steps in execution order.
    ///
    /// # Errors
    ///
    /// Returns any validation error, or [`PipelineError::Cycle`].
    pub fn plan(&self) -> Result<Vec<Step>, PipelineError> {
        self.validate()?;
        resolve(&self.steps)
    }

    /// Looks up a target by name.
    #[must_use]
    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|target| target.name == name)
    }
}
