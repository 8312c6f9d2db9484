//! Integration tests for configuration loading and validation.

use camino::Utf8PathBuf;
use cap_std::{ambient_authority, fs_utf8::Dir};
use onctl::config::{ConfigError, OnctlConfig};
use onctl::test_support::EnvGuard;
use onctl::{PipelineConfig, local_fs};
use rstest::{fixture, rstest};
use tempfile::TempDir;

#[fixture]
fn valid_config() -> OnctlConfig {
    OnctlConfig::default()
}

#[rstest]
#[case::ssh_user("ONCTL_SSH_USER", "ssh_user")]
#[case::private_key("ONCTL_SSH_PRIVATE_KEY_FILE", "ssh_private_key_file")]
#[case::docker_bin("ONCTL_DOCKER_BIN", "docker_bin")]
#[case::remote_docker_bin("ONCTL_REMOTE_DOCKER_BIN", "remote_docker_bin")]
fn blank_text_fields_produce_actionable_errors(
    valid_config: OnctlConfig,
    #[case] env_var: &str,
    #[case] toml_key: &str,
) {
    let mut cfg = valid_config;
    match toml_key {
        "ssh_user" => cfg.ssh_user.clear(),
        "ssh_private_key_file" => cfg.ssh_private_key_file = String::from("   "),
        "docker_bin" => cfg.docker_bin.clear(),
        _ => cfg.remote_docker_bin.clear(),
    }

    let error = cfg.validate().expect_err("validation should fail");
    let ConfigError::MissingField(ref message) = error else {
        panic!("expected MissingField, got {error:?}");
    };
    assert!(message.contains(env_var), "missing env var: {message}");
    assert!(message.contains(toml_key), "missing TOML key: {message}");
    assert!(message.contains("onctl.toml"), "missing file name: {message}");
}

#[rstest]
fn zero_readiness_budget_is_rejected(valid_config: OnctlConfig) {
    let cfg = OnctlConfig {
        readiness_attempts: 0,
        ..valid_config
    };

    let error = cfg.validate().expect_err("zero attempts");
    assert!(
        matches!(error, ConfigError::InvalidValue(ref message) if message.contains("ONCTL_READINESS_ATTEMPTS")),
        "unexpected error: {error}"
    );
}

#[rstest]
fn zero_connect_timeout_is_rejected(valid_config: OnctlConfig) {
    let cfg = OnctlConfig {
        connect_timeout_secs: 0,
        ..valid_config
    };

    assert!(matches!(
        cfg.validate(),
        Err(ConfigError::InvalidValue(_))
    ));
}

#[tokio::test]
async fn environment_overrides_defaults() {
    let _guard = EnvGuard::set_vars(&[
        ("ONCTL_SSH_USER", "deploy"),
        ("ONCTL_READINESS_ATTEMPTS", "4"),
    ])
    .await;

    let config = OnctlConfig::load_without_cli_args().expect("config loads");

    assert_eq!(config.ssh_user, "deploy");
    assert_eq!(config.readiness_attempts, 4);
    assert_eq!(config.ssh_port, 22);
    assert!(config.validate().is_ok());
}

#[tokio::test]
async fn target_keys_expand_against_home() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let home = tmp.path().to_string_lossy().to_string();
    let _guard = EnvGuard::set_vars(&[("HOME", home.as_str())]).await;

    let pipeline = PipelineConfig::from_yaml_str(
        r"
targets:
  - name: web
    config:
      publicKeyFile: ~/.ssh/web.pub
steps: []
",
    )
    .expect("pipeline parses");
    let target = pipeline.target("web").expect("target declared");

    assert_eq!(
        target.private_key_file("~/.ssh/id_rsa"),
        format!("{home}/.ssh/web")
    );
}

#[test]
fn pipeline_files_load_through_local_fs() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
        .unwrap_or_else(|path| panic!("temp dir should be utf8: {}", path.display()));
    Dir::open_ambient_dir(&root, ambient_authority())
        .unwrap_or_else(|err| panic!("open temp dir: {err}"))
        .write(
            "pipeline.yaml",
            "targets:\n  - name: web\nsteps:\n  - name: setup\n    type: apply\n    target: web\n",
        )
        .unwrap_or_else(|err| panic!("write pipeline: {err}"));

    let path = root.join("pipeline.yaml");
    let text = local_fs::read_to_string(&path).expect("file readable");
    let pipeline = PipelineConfig::load(&path).expect("pipeline loads");

    assert!(text.contains("setup"));
    assert_eq!(pipeline.steps.len(), 1);
}
