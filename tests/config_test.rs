//! Loading configuration from disk and the environment.

use anyhow::Result;
use pjctl::config::{AppConfig, LogFormat};
use pjctl::daemon::{self, Daemon};
use serial_test::serial;
use std::path::PathBuf;
use tempfile::tempdir;

const DEVICES: &str = r#"
[logging]
level = "warn"
format = "compact"

[[devices]]
key = "proj-1"
type = "Christie4k7hsProjector"

[devices.control]
method = "tcp"
host = "127.0.0.1"
port = 1

[devices.properties]
warmingTimeMs = 45000
"#;

fn example_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/pjctl.example.toml")
}

#[test]
#[serial]
fn test_load_from_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("pjctl.toml");
    std::fs::write(&path, DEVICES)?;

    let config = AppConfig::load_from(&path)?;
    config.validate()?;

    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.logging.format, LogFormat::Compact);
    assert_eq!(config.devices.len(), 1);
    assert!(daemon::validate_devices(&daemon::registry(), &config).is_empty());
    Ok(())
}

#[test]
#[serial]
fn test_missing_file_yields_defaults() -> Result<()> {
    let dir = tempdir()?;
    let config = AppConfig::load_from(dir.path().join("absent.toml"))?;

    assert_eq!(config.application.name, "pjctl");
    assert!(config.devices.is_empty());
    Ok(())
}

#[test]
#[serial]
fn test_environment_overrides_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("pjctl.toml");
    std::fs::write(&path, DEVICES)?;

    std::env::set_var("PJCTL_LOGGING__LEVEL", "debug");
    std::env::set_var("PJCTL_APPLICATION__NAME", "Balcony");
    let loaded = AppConfig::load_from(&path);
    std::env::remove_var("PJCTL_LOGGING__LEVEL");
    std::env::remove_var("PJCTL_APPLICATION__NAME");

    let config = loaded?;
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.application.name, "Balcony");
    assert_eq!(config.logging.format, LogFormat::Compact);
    Ok(())
}

#[test]
#[serial]
fn test_malformed_file_is_an_error() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("pjctl.toml");
    std::fs::write(&path, "[[devices]]\nkey = 42\n")?;

    assert!(AppConfig::load_from(&path).is_err());
    Ok(())
}

#[test]
#[serial]
fn test_shipped_example_is_valid() -> Result<()> {
    let config = AppConfig::load_from(example_path())?;
    config.validate()?;

    let errors = daemon::validate_devices(&daemon::registry(), &config);
    assert!(errors.is_empty(), "{:?}", errors);
    assert_eq!(config.enabled_devices().len(), 1);
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_daemon_builds_from_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("pjctl.toml");
    std::fs::write(&path, DEVICES)?;

    let config = AppConfig::load_from(&path)?;
    let daemon = Daemon::build(&daemon::registry(), &config).await?;

    let snapshot = daemon.device("proj-1")?.snapshot();
    assert_eq!(snapshot["model"], "christie_4k7_hs");
    assert_eq!(snapshot["power_on"], false);
    Ok(())
}
