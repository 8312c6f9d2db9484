//! BDD step definitions for pipeline planning and execution.

use std::time::Duration;

use onctl::{
    ExecutorError, OnctlConfig, PipelineConfig, PipelineExecutor, ReadinessWaiter,
    StaticProvider,
};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{Outcome, PipelineContext, named_pipeline};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("unknown pipeline fixture {0}")]
    Fixture(String),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("the \"{name}\" pipeline")]
fn given_pipeline(pipeline_context: &PipelineContext, name: String) -> Result<(), StepError> {
    let yaml = named_pipeline(&name).ok_or(StepError::Fixture(name))?;
    pipeline_context.yaml.replace(yaml.to_owned());
    Ok(())
}

#[given("the configure script exits with status \"{status}\"")]
fn configure_script_fails(pipeline_context: &PipelineContext, status: i32) {
    let shell = pipeline_context.connector.shell("web");
    shell.push_success();
    shell.push_output("");
    shell.push_success();
    shell.push_exit(status);
}

#[when("I plan the pipeline")]
fn plan_pipeline(pipeline_context: &PipelineContext) {
    let outcome = PipelineConfig::from_yaml_str(&pipeline_context.yaml.borrow())
        .and_then(|pipeline| pipeline.plan())
        .map_or_else(
            |err| Outcome::Failed {
                step: None,
                message: err.to_string(),
            },
            |steps| Outcome::Steps(steps.into_iter().map(|step| step.name).collect()),
        );
    pipeline_context.record(outcome);
}

#[when("I execute the pipeline")]
fn execute_pipeline(pipeline_context: &PipelineContext) -> Result<(), StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let pipeline = PipelineConfig::from_yaml_str(&pipeline_context.yaml.borrow())
        .map_err(|err| StepError::Assertion(err.to_string()))?;
    let executor = PipelineExecutor::new(
        &OnctlConfig::default(),
        StaticProvider::from_pipeline(&pipeline, "root", 22),
        pipeline_context.connector.clone(),
    )
    .with_base_dir("/work")
    .with_waiter(ReadinessWaiter::new(Duration::from_millis(1), 2));

    let result = runtime.block_on(executor.execute(&pipeline));
    let outcome = match result {
        Ok(report) => Outcome::Steps(report.completed),
        Err(ExecutorError::StepFailed { step, source }) => Outcome::Failed {
            step: Some(step),
            message: source.to_string(),
        },
        Err(err) => Outcome::Failed {
            step: None,
            message: err.to_string(),
        },
    };
    pipeline_context.record(outcome);
    Ok(())
}

#[then("the plan is \"{expected}\"")]
fn plan_is(pipeline_context: &PipelineContext, expected: String) -> Result<(), StepError> {
    expect_steps(pipeline_context, &expected)
}

#[then("the run completes \"{expected}\"")]
fn run_completes(pipeline_context: &PipelineContext, expected: String) -> Result<(), StepError> {
    expect_steps(pipeline_context, &expected)
}

#[then("planning fails with \"{fragment}\"")]
fn planning_fails(pipeline_context: &PipelineContext, fragment: String) -> Result<(), StepError> {
    match pipeline_context.outcome() {
        Some(Outcome::Failed { message, .. }) if message.contains(&fragment) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected failure mentioning {fragment}, got {other:?}"
        ))),
    }
}

#[then("step \"{name}\" fails")]
fn step_fails(pipeline_context: &PipelineContext, name: String) -> Result<(), StepError> {
    match pipeline_context.outcome() {
        Some(Outcome::Failed {
            step: Some(failed), ..
        }) if failed == name => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected step {name} to fail, got {other:?}"
        ))),
    }
}

#[then("the host received \"{remote}\"")]
fn host_received(pipeline_context: &PipelineContext, remote: String) -> Result<(), StepError> {
    let shell = pipeline_context.connector.shell("web");
    let received = shell.calls().iter().any(|call| {
        matches!(call, onctl::test_support::ShellCall::Upload { remote: path, .. } if path.as_str() == remote)
    });
    if received {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "no upload to {remote}: {:?}",
            shell.calls()
        )))
    }
}

#[then("one session was opened and closed")]
fn one_session(pipeline_context: &PipelineContext) -> Result<(), StepError> {
    let opened = pipeline_context.connector.opened().len();
    let closed = pipeline_context.connector.shell("web").close_count();
    if opened == 1 && closed == 1 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected one session, opened {opened} closed {closed}"
        )))
    }
}

fn expect_steps(pipeline_context: &PipelineContext, expected: &str) -> Result<(), StepError> {
    let wanted: Vec<String> = expected.split(", ").map(str::to_owned).collect();
    match pipeline_context.outcome() {
        Some(Outcome::Steps(steps)) if steps == wanted => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected {wanted:?}, got {other:?}"
        ))),
    }
}
