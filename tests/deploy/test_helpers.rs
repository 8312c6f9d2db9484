//! Shared fixtures for deployment BDD scenarios.

use std::cell::RefCell;

use onctl::test_support::{ScriptedRunner, ScriptedShell};
use rstest::fixture;

#[derive(Debug, Default)]
pub struct DeployContext {
    pub runner: ScriptedRunner,
    pub shell: ScriptedShell,
    pub outcome: RefCell<Option<Result<String, String>>>,
}

#[fixture]
pub fn deploy_context() -> DeployContext {
    DeployContext::default()
}
