//! Configuration loading tests
//!
//! Covers the resolution order (CLI path, then SNDB_CONFIG) and the
//! failure modes of an explicitly named file.
//!
//! Note: Uses serial_test to prevent ENV variable race conditions. Tests that
//! touch SNDB_CONFIG are marked #[serial].

use serial_test::serial;
use sndb_common::config::CONFIG_ENV_VAR;
use sndb_common::{EngineConfig, Error};
use std::env;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", contents).unwrap();
    file
}

#[test]
#[serial]
fn test_load_from_cli_path() {
    let file = config_file("position_interval_ms = 100");

    let config = EngineConfig::load(Some(file.path())).unwrap();

    assert_eq!(config.position_interval_ms, 100);
    assert!(config.auto_reset_primary);
}

#[test]
#[serial]
fn test_load_from_env_var() {
    let file = config_file("auto_reset_primary = false");

    env::set_var(CONFIG_ENV_VAR, file.path());
    let config = EngineConfig::load(None);
    env::remove_var(CONFIG_ENV_VAR);

    assert!(!config.unwrap().auto_reset_primary);
}

#[test]
#[serial]
fn test_cli_path_beats_env_var() {
    let cli = config_file("position_interval_ms = 75");
    let from_env = config_file("position_interval_ms = 500");

    env::set_var(CONFIG_ENV_VAR, from_env.path());
    let config = EngineConfig::load(Some(cli.path()));
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(config.unwrap().position_interval_ms, 75);
}

#[test]
#[serial]
fn test_missing_explicit_file_fails() {
    let result = EngineConfig::load(Some(Path::new("/nonexistent/sndb/config.toml")));
    assert!(matches!(result, Err(Error::Config(_))));

    env::set_var(CONFIG_ENV_VAR, "/nonexistent/sndb/env.toml");
    let result = EngineConfig::load(None);
    env::remove_var(CONFIG_ENV_VAR);
    assert!(matches!(result, Err(Error::Config(_))));
}

/// A file that exists but does not parse is an error, not silently ignored
#[test]
#[serial]
fn test_unparseable_file_fails() {
    let file = config_file("position_interval_ms = [1, 2]");

    let result = EngineConfig::load(Some(file.path()));

    match result {
        Err(Error::ConfigParse { path, .. }) => assert_eq!(path, file.path()),
        other => panic!("Expected ConfigParse error, got {:?}", other),
    }
}

#[test]
#[serial]
fn test_invalid_values_fail_validation() {
    let file = config_file("position_interval_ms = 0");

    let result = EngineConfig::load(Some(file.path()));

    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_thread_and_device_settings() {
    let file = config_file("command_thread_nice = 5\noutput_device = \"Speakers\"");

    let config = EngineConfig::load(Some(file.path())).unwrap();

    assert_eq!(config.command_thread_nice, Some(5));
    assert_eq!(config.output_device.as_deref(), Some("Speakers"));
}
