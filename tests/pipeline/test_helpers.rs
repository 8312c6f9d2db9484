//! Shared fixtures for pipeline BDD scenarios.

use std::cell::RefCell;

use onctl::test_support::ScriptedConnector;
use rstest::fixture;

pub const ORDERED: &str = r"
targets:
  - name: web
    config:
      vm:
        ip: 192.0.2.20
        username: ubuntu
steps:
  - name: configure
    type: apply
    target: web
    depends_on: [push-assets]
    config:
      files:
        - src: scripts/setup.sh
      variables: [MODE=prod]
  - name: provision
    type: create
    target: web
  - name: push-assets
    type: upload
    target: web
    depends_on: [provision]
    config:
      files:
        - src: assets/site.tar
          dst: /srv/site.tar
";

pub const INDEPENDENT: &str = r"
targets:
  - name: web
steps:
  - name: gamma
    type: apply
    target: web
    depends_on: [alpha]
  - name: alpha
    type: apply
    target: web
  - name: beta
    type: apply
    target: web
";

pub const CYCLIC: &str = r"
targets:
  - name: web
steps:
  - name: first
    type: apply
    target: web
    depends_on: [second]
  - name: second
    type: apply
    target: web
    depends_on: [first]
";

pub const MISTYPED: &str = r"
targets:
  - name: web
steps:
  - name: restart
    type: reboot
    target: web
";

/// Result of planning or executing: step names on success.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    Steps(Vec<String>),
    Failed {
        step: Option<String>,
        message: String,
    },
}

#[derive(Debug, Default)]
pub struct PipelineContext {
    pub yaml: RefCell<String>,
    pub connector: ScriptedConnector,
    pub outcome: RefCell<Option<Outcome>>,
}

impl PipelineContext {
    pub fn record(&self, outcome: Outcome) {
        self.outcome.replace(Some(outcome));
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome.borrow().clone()
    }
}

#[fixture]
pub fn pipeline_context() -> PipelineContext {
    PipelineContext::default()
}

pub fn named_pipeline(name: &str) -> Option<&'static str> {
    match name {
        "ordered" => Some(ORDERED),
        "independent" => Some(INDEPENDENT),
        "cyclic" => Some(CYCLIC),
        "mistyped" => Some(MISTYPED),
        _ => None,
    }
}
