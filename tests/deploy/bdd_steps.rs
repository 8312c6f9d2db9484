//! BDD step definitions for container deployment.

use std::time::Duration;

use onctl::{DeployOptions, Deployer, OnctlConfig};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::DeployContext;

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a local image built for \"{arch}\"")]
fn local_image(deploy_context: &DeployContext, arch: String) {
    deploy_context.runner.push_stdout("");
    deploy_context.runner.push_stdout(format!("{arch}\n"));
}

#[given("a registry image \"{image}\"")]
fn registry_image(deploy_context: &DeployContext, image: String) {
    deploy_context.runner.push_stdout(format!("{image}\n"));
}

#[given("a host running \"{arch}\"")]
fn host_running(deploy_context: &DeployContext, arch: String) {
    deploy_context.shell.push_output(format!("{arch}\n"));
}

#[given("the host already has the image")]
fn image_present(deploy_context: &DeployContext) {
    deploy_context.shell.push_output("present\n");
}

#[given("the container starts as \"{id}\"")]
fn container_starts(deploy_context: &DeployContext, id: String) {
    deploy_context.shell.push_output(format!("{id}\n"));
    deploy_context.shell.push_output("true\n");
}

#[given("the container exits with logs \"{logs}\"")]
fn container_exits(deploy_context: &DeployContext, logs: String) {
    deploy_context.shell.push_output("c0ffee\n");
    deploy_context.shell.push_output("false\n");
    deploy_context.shell.push_output(logs);
    deploy_context.shell.push_success();
}

#[when("I deploy \"{image}\"")]
fn deploy_image(deploy_context: &DeployContext, image: String) -> Result<(), StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let deployer = Deployer::new(deploy_context.runner.clone(), &OnctlConfig::default())
        .with_verify_delay(Duration::ZERO)
        .with_progress(false);
    let options = DeployOptions {
        image,
        ..DeployOptions::default()
    };
    let mut shell = deploy_context.shell.clone();

    let result = runtime.block_on(deployer.deploy(&mut shell, &options));
    deploy_context.outcome.replace(Some(
        result
            .map(|deployment| deployment.container_id)
            .map_err(|err| err.to_string()),
    ));
    Ok(())
}

#[then("the deployment fails with \"{fragment}\"")]
fn deployment_fails(deploy_context: &DeployContext, fragment: String) -> Result<(), StepError> {
    match deploy_context.outcome.borrow().as_ref() {
        Some(Err(message)) if message.contains(&fragment) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected failure mentioning {fragment}, got {other:?}"
        ))),
    }
}

#[then("container \"{id}\" is running")]
fn container_running(deploy_context: &DeployContext, id: String) -> Result<(), StepError> {
    match deploy_context.outcome.borrow().as_ref() {
        Some(Ok(container)) if *container == id => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected container {id}, got {other:?}"
        ))),
    }
}

#[then("no image was transferred")]
fn nothing_transferred(deploy_context: &DeployContext) -> Result<(), StepError> {
    let shell = &deploy_context.shell;
    if shell.upload_count() == 0 && !shell.ran_command_containing("pull") {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "unexpected transfer: {:?}",
            shell.commands()
        )))
    }
}

#[then("the failed container was removed")]
fn container_removed(deploy_context: &DeployContext) -> Result<(), StepError> {
    if deploy_context.shell.ran_command_containing("rm -f c0ffee") {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "no rollback command: {:?}",
            deploy_context.shell.commands()
        )))
    }
}
