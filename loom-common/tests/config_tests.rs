//! Configuration loading and root folder resolution
//!
//! Tests that touch LOOM_* environment variables are marked #[serial].

use loom_common::config::{
    default_root_folder, load_toml_config, load_toml_config_or_default, resolve_root_folder,
    write_toml_config, SchedulerToml, TomlConfig, CONFIG_FILE_ENV, ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
fn test_default_root_folder_is_not_empty() {
    let root = default_root_folder();
    assert!(!root.as_os_str().is_empty());
    assert!(root.to_string_lossy().contains("loom"));
}

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    env::remove_var(ROOT_FOLDER_ENV);
    let root = resolve_root_folder(None, ROOT_FOLDER_ENV, None);
    assert_eq!(root, default_root_folder());
}

#[test]
#[serial]
fn test_resolver_priority_order() {
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/srv/from-toml")),
        ..Default::default()
    };

    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(
        resolve_root_folder(None, ROOT_FOLDER_ENV, Some(&toml)),
        PathBuf::from("/srv/from-toml")
    );

    env::set_var(ROOT_FOLDER_ENV, "/srv/from-env");
    assert_eq!(
        resolve_root_folder(None, ROOT_FOLDER_ENV, Some(&toml)),
        PathBuf::from("/srv/from-env")
    );

    // CLI beats everything
    assert_eq!(
        resolve_root_folder(Some(Path::new("/srv/from-cli")), ROOT_FOLDER_ENV, Some(&toml)),
        PathBuf::from("/srv/from-cli")
    );

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
fn test_partial_toml_fills_scheduler_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
root_folder = "/srv/loom"

[scheduler]
tick_interval_seconds = 60
default_promo = "promos/station-id.mp4"
"#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/loom")));
    assert_eq!(config.scheduler.tick_interval_seconds, 60);
    assert_eq!(config.scheduler.default_promo.as_deref(), Some("promos/station-id.mp4"));
    assert_eq!(config.scheduler.end_of_day, "23:30");
    assert_eq!(config.scheduler.buffer_lookback_hours, 2);
    assert_eq!(config.logging.level, "loom_sd=debug,loom_common=info");
}

#[test]
fn test_invalid_scheduler_values_rejected() {
    let mut config = TomlConfig::default();
    config.scheduler.tick_interval_seconds = 0;
    assert!(config.validate().is_err());

    let mut config = TomlConfig::default();
    config.scheduler.min_distance = 0.8;
    config.scheduler.max_distance = 0.2;
    assert!(config.validate().is_err());

    let mut config = TomlConfig::default();
    config.scheduler.end_of_day = "late".to_string();
    assert!(config.validate().is_err());

    let mut config = TomlConfig::default();
    config.scheduler.specialty_honor_probability = 1.5;
    assert!(config.validate().is_err());

    assert!(TomlConfig::default().validate().is_ok());
}

#[test]
fn test_malformed_file_degrades_to_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[scheduler\ntick_interval_seconds = ").unwrap();

    let config = load_toml_config_or_default(Some(&path));
    assert_eq!(config, TomlConfig::default());
}

#[test]
fn test_missing_file_degrades_to_defaults() {
    let dir = TempDir::new().unwrap();
    let config = load_toml_config_or_default(Some(&dir.path().join("absent.toml")));
    assert_eq!(config.scheduler, SchedulerToml::default());
}

#[test]
#[serial]
fn test_config_env_points_at_missing_file() {
    env::set_var(CONFIG_FILE_ENV, "/nonexistent/loom/config.toml");
    assert!(loom_common::config::config_file_path().is_err());
    env::remove_var(CONFIG_FILE_ENV);
}

#[test]
fn test_write_then_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = TomlConfig::default();
    config.scheduler.slot_minutes = 15;
    config.scheduler.default_commercial_folder = "ads".to_string();
    write_toml_config(&config, &path).unwrap();

    let loaded = load_toml_config(&path).unwrap();
    assert_eq!(loaded, config);
}
