//! Error types for pipeline loading, validation and resolution.

use std::fmt;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Kind of declaration that carries a unique name.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NameKind {
    /// A `targets` entry.
    Target,
    /// A `steps` entry.
    Step,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Target => f.write_str("target"),
            Self::Step => f.write_str("step"),
        }
    }
}

/// Errors raised while loading, validating or ordering a pipeline.
///
/// Every variant is recoverable: the caller can fix the YAML and retry.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PipelineError {
    /// Raised when the pipeline file cannot be read.
    #[error("failed to read pipeline file {path}: {message}")]
    Read {
        /// Path that failed to load.
        path: Utf8PathBuf,
        /// Underlying I/O error message.
        message: String,
    },
    /// Raised when the YAML document does not match the pipeline schema.
    #[error("failed to parse pipeline: {0}")]
    Parse(String),
    /// Raised when two targets or two steps share a name.
    #[error("duplicate {kind} name '{name}'")]
    DuplicateName {
        /// Whether the clash is between targets or steps.
        kind: NameKind,
        /// The repeated name.
        name: String,
    },
    /// Raised when a step declares a type outside create/upload/apply/download.
    #[error("step '{step}' has unknown type '{step_type}' (expected create, upload, apply or download)")]
    UnknownStepType {
        /// Offending step.
        step: String,
        /// Declared type.
        step_type: String,
    },
    /// Raised when a step references a target that is not declared.
    #[error("step '{step}' references unknown target '{target}'")]
    UnknownTarget {
        /// Offending step.
        step: String,
        /// Missing target name.
        target: String,
    },
    /// Raised when `depends_on` names a step that is not declared.
    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency {
        /// Offending step.
        step: String,
        /// Missing dependency name.
        dependency: String,
    },
    /// Raised when the dependency graph contains a cycle.
    #[error("dependency cycle detected among steps: {}", unresolved.join(", "))]
    Cycle {
        /// Steps that could not be ordered, in declaration order.
        unresolved: Vec<String>,
    },
}
