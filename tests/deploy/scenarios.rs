//! BDD scenarios for container deployment.

use rstest_bdd_macros::scenario;

use super::test_helpers::{DeployContext, deploy_context};

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Refuse a local image built for another architecture"
)]
fn scenario_architecture_mismatch(deploy_context: DeployContext) {
    drop(deploy_context);
}

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Start a registry image already on the host"
)]
fn scenario_image_present(deploy_context: DeployContext) {
    drop(deploy_context);
}

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Roll back a container that exits"
)]
fn scenario_rollback(deploy_context: DeployContext) {
    drop(deploy_context);
}
