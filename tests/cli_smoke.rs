//! Behavioural smoke tests for the CLI entrypoint.

use assert_cmd::cargo::cargo_bin_cmd;
use camino::Utf8PathBuf;
use cap_std::{ambient_authority, fs_utf8::Dir};
use predicates::prelude::*;
use tempfile::TempDir;

const PIPELINE: &str = "\
targets:
  - name: web
    config:
      vm:
        ip: 192.0.2.20
steps:
  - name: configure
    type: apply
    target: web
    depends_on: [provision]
  - name: provision
    type: create
    target: web
";

const CYCLIC: &str = "\
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

struct Workspace {
    root: Utf8PathBuf,
    _tmp: TempDir,
}

impl Workspace {
    fn with_file(name: &str, contents: &str) -> Self {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
            .unwrap_or_else(|path| panic!("temp dir should be utf8: {}", path.display()));
        Dir::open_ambient_dir(&root, ambient_authority())
            .unwrap_or_else(|err| panic!("open temp dir: {err}"))
            .write(name, contents)
            .unwrap_or_else(|err| panic!("write {name}: {err}"));
        Self { root, _tmp: tmp }
    }

    fn path(&self, name: &str) -> String {
        self.root.join(name).into_string()
    }
}

#[test]
fn bare_invocation_prints_usage() {
    let mut cmd = cargo_bin_cmd!("onctl");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn validate_accepts_a_well_formed_pipeline() {
    let workspace = Workspace::with_file("pipeline.yaml", PIPELINE);
    let mut cmd = cargo_bin_cmd!("onctl");
    cmd.args(["validate", &workspace.path("pipeline.yaml")])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 targets, 2 steps"));
}

#[test]
fn plan_prints_steps_in_dependency_order() {
    let workspace = Workspace::with_file("pipeline.yaml", PIPELINE);
    let mut cmd = cargo_bin_cmd!("onctl");
    cmd.args(["plan", &workspace.path("pipeline.yaml")])
        .assert()
        .success()
        .stdout("1. provision (create on web)\n2. configure (apply on web)\n");
}

#[test]
fn validate_reports_cycles_and_exits_nonzero() {
    let workspace = Workspace::with_file("cyclic.yaml", CYCLIC);
    let mut cmd = cargo_bin_cmd!("onctl");
    cmd.args(["validate", &workspace.path("cyclic.yaml")])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("dependency cycle detected among steps: first, second"));
}

#[test]
fn malformed_yaml_exits_nonzero() {
    let workspace = Workspace::with_file("broken.yaml", "targets: [name: web\n");
    let mut cmd = cargo_bin_cmd!("onctl");
    cmd.args(["plan", &workspace.path("broken.yaml")])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to parse pipeline"));
}

#[test]
fn missing_pipeline_file_exits_nonzero() {
    let workspace = Workspace::with_file("unused.txt", "");
    let mut cmd = cargo_bin_cmd!("onctl");
    cmd.args(["validate", &workspace.path("absent.yaml")])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to read pipeline file"));
}

#[test]
fn apply_without_a_usable_key_fails_before_dialling() {
    let workspace = Workspace::with_file("setup.sh", "#!/bin/sh\ntrue\n");
    let mut cmd = cargo_bin_cmd!("onctl");
    cmd.args([
        "apply",
        "--host",
        "127.0.0.1",
        "--key",
        &workspace.path("missing-key"),
        &workspace.path("setup.sh"),
    ])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("apply failed"));
}

#[test]
fn deploy_help_lists_publish_flag() {
    let mut cmd = cargo_bin_cmd!("onctl");
    cmd.args(["deploy", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--publish"));
}
