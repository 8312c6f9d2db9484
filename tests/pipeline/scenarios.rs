//! BDD scenarios for pipeline planning and execution.

use rstest_bdd_macros::scenario;

use super::test_helpers::{PipelineContext, pipeline_context};

#[scenario(
    path = "tests/features/pipeline.feature",
    name = "Plan steps in dependency order"
)]
fn scenario_plan_order(pipeline_context: PipelineContext) {
    drop(pipeline_context);
}

#[scenario(
    path = "tests/features/pipeline.feature",
    name = "Break ties by declaration order"
)]
fn scenario_plan_ties(pipeline_context: PipelineContext) {
    drop(pipeline_context);
}

#[scenario(
    path = "tests/features/pipeline.feature",
    name = "Reject a dependency cycle"
)]
fn scenario_plan_cycle(pipeline_context: PipelineContext) {
    drop(pipeline_context);
}

#[scenario(
    path = "tests/features/pipeline.feature",
    name = "Reject an unknown step type"
)]
fn scenario_plan_unknown_type(pipeline_context: PipelineContext) {
    drop(pipeline_context);
}

#[scenario(
    path = "tests/features/pipeline.feature",
    name = "Execute every step against a provisioned host"
)]
fn scenario_execute(pipeline_context: PipelineContext) {
    drop(pipeline_context);
}

#[scenario(
    path = "tests/features/pipeline.feature",
    name = "Stop at the first failing script"
)]
fn scenario_execute_failure(pipeline_context: PipelineContext) {
    drop(pipeline_context);
}
