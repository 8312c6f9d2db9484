//! Referential-integrity checks for a parsed pipeline.

use std::collections::HashSet;

use super::{NameKind, PipelineConfig, PipelineError};

/// Validates a pipeline.
///
/// Checks run in a fixed order and the first failure wins: unique target
/// names, unique step names, then for each step in declaration order its
/// type, its target and its dependencies.
///
/// # Errors
///
/// Returns [`PipelineError::DuplicateName`], [`PipelineError::UnknownStepType`],
/// [`PipelineError::UnknownTarget`] or [`PipelineError::UnknownDependency`].
pub fn validate(config: &PipelineConfig) -> Result<(), PipelineError> {
    let targets = unique_names(
        config.targets.iter().map(|target| target.name.as_str()),
        NameKind::Target,
    )?;
    let steps = unique_names(
        config.steps.iter().map(|step| step.name.as_str()),
        NameKind::Step,
    )?;

    for step in &config.steps {
        step.kind()?;

        if !targets.contains(step.target.as_str()) {
            return Err(PipelineError::UnknownTarget {
                step: step.name.clone(),
                target: step.target.clone(),
            });
        }

        if let Some(dependency) = step
            .depends_on
            .iter()
            .find(|dependency| !steps.contains(dependency.as_str()))
        {
            return Err(PipelineError::UnknownDependency {
                step: step.name.clone(),
                dependency: dependency.clone(),
            });
        }
    }

    Ok(())
}

fn unique_names<'a>(
    names: impl Iterator<Item = &'a str>,
    kind: NameKind,
) -> Result<HashSet<&'a str>, PipelineError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(PipelineError::DuplicateName {
                kind,
                name: name.to_owned(),
            });
        }
    }
    Ok(seen)
}
