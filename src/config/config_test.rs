use std::time::Duration;

use serial_test::serial;
use temp_env::with_vars;

use super::*;
use crate::Error;

fn cleanup_all_changeflow_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("CHANGEFLOW__") || key == "CONFIG_PATH" {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_config_should_initialize_with_hardcoded_values() {
    let config = ChangeflowConfig::default();

    assert_eq!(config.cache.initial_capacity, 0);
    assert!(!config.cache.log_changesets);
    assert_eq!(config.buffer.timeout_ms, 0);
    assert!(!config.buffer.initial_paused);
    assert!(config.buffer.timeout().is_none());
}

#[test]
#[serial]
fn new_should_merge_environment_overrides() {
    cleanup_all_changeflow_env_vars();
    with_vars(
        vec![
            ("CHANGEFLOW__BUFFER__TIMEOUT_MS", Some("250")),
            ("CHANGEFLOW__CACHE__LOG_CHANGESETS", Some("true")),
        ],
        || {
            let config = ChangeflowConfig::new().unwrap();

            assert_eq!(config.buffer.timeout(), Some(Duration::from_millis(250)));
            assert!(config.cache.log_changesets);
        },
    );
}

#[test]
#[serial]
fn with_override_config_should_merge_file_settings() {
    cleanup_all_changeflow_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("override.toml");
    std::fs::write(
        &config_path,
        r#"
        [cache]
        initial_capacity = 64

        [buffer]
        initial_paused = true
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let base_config = ChangeflowConfig::new().expect("success");
        let config = base_config
            .with_override_config(config_path.to_str().unwrap())
            .unwrap();

        assert_eq!(config.cache.initial_capacity, 64);
        assert!(config.buffer.initial_paused);
        assert_eq!(config.buffer.timeout_ms, 0);
    });
}

#[test]
#[serial]
fn environment_variables_should_have_highest_priority() {
    cleanup_all_changeflow_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("changeflow.toml");
    std::fs::write(
        &config_path,
        r#"
        [buffer]
        timeout_ms = 100
        "#,
    )
    .unwrap();

    with_vars(
        vec![
            ("CONFIG_PATH", Some(config_path.to_str().unwrap())),
            ("CHANGEFLOW__BUFFER__TIMEOUT_MS", Some("900")),
        ],
        || {
            let config = ChangeflowConfig::new().unwrap();

            assert_eq!(config.buffer.timeout_ms, 900);
        },
    );
}

#[test]
#[serial]
fn missing_config_file_should_fail() {
    cleanup_all_changeflow_env_vars();
    with_vars(
        vec![("CONFIG_PATH", Some("/nonexistent/changeflow.toml"))],
        || {
            let result = ChangeflowConfig::new();

            assert!(matches!(result, Err(Error::Config(_))));
        },
    );
}

#[test]
fn validation_should_reject_excessive_timeout() {
    let mut config = ChangeflowConfig::default();
    config.buffer.timeout_ms = 3_600_001;

    assert!(matches!(config.validate(), Err(Error::Config(_))));
}

#[test]
fn validation_should_accept_timeout_boundaries() {
    let mut config = ChangeflowConfig::default();
    config.buffer.timeout_ms = 3_600_000;

    assert!(config.validate().is_ok());
}

#[test]
#[tracing_test::traced_test]
fn validation_should_warn_on_large_capacity() {
    let mut config = ChangeflowConfig::default();
    config.cache.initial_capacity = 50_000_000;

    assert!(config.validate().is_ok());
    assert!(logs_contain("very large"));
}
