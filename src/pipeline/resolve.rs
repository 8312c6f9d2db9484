//! Topological ordering of pipeline steps.

use std::collections::{HashMap, VecDeque};

use super::{NameKind, PipelineError, Step};

/// Orders `steps` so every step follows all of its dependencies.
///
/// Uses Kahn's algorithm with edges pointing from a dependency to its
/// dependents. The ready queue is FIFO and is seeded, and extended, in
/// declaration order, so the same input always yields the same order.
///
/// # Errors
///
/// Returns [`PipelineError::Cycle`] when not every step can be ordered (no
/// partial order is returned), [`PipelineError::UnknownDependency`] for a
/// dangling reference and [`PipelineError::DuplicateName`] when two steps
/// share a name.
pub fn resolve(steps: &[Step]) -> Result<Vec<Step>, PipelineError> {
    let mut index = HashMap::with_capacity(steps.len());
    for (position, step) in steps.iter().enumerate() {
        if index.insert(step.name.as_str(), position).is_some() {
            return Err(PipelineError::DuplicateName {
                kind: NameKind::Step,
                name: step.name.clone(),
            });
        }
    }

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];
    let mut in_degree: Vec<usize> = steps.iter().map(|step| step.depends_on.len()).collect();

    for (position, step) in steps.iter().enumerate() {
        for dependency in &step.depends_on {
            let edges = index
                .get(dependency.as_str())
                .and_then(|&source| dependents.get_mut(source))
                .ok_or_else(|| PipelineError::UnknownDependency {
                    step: step.name.clone(),
                    dependency: dependency.clone(),
                })?;
            edges.push(position);
        }
    }

    let mut ready: VecDeque<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(position, _)| position)
        .collect();
    let mut ordered = Vec::with_capacity(steps.len());

    while let Some(position) = ready.pop_front() {
        let Some(step) = steps.get(position) else {
            continue;
        };
        ordered.push(step.clone());

        for &dependent in dependents.get(position).map_or(&[][..], Vec::as_slice) {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    ready.push_back(dependent);
                }
            }
        }
    }

    if ordered.len() < steps.len() {
        let unresolved = steps
            .iter()
            .zip(&in_degree)
            .filter(|(_, degree)| **degree > 0)
            .map(|(step, _)| step.name.clone())
            .collect();
        return Err(PipelineError::Cycle { unresolved });
    }

    Ok(ordered)
}
