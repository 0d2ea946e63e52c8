//! Configuration loading and root folder resolution
//!
//! The TOML file is optional: a missing or unreadable file logs a warning and
//! the compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the data (root) folder
pub const ROOT_FOLDER_ENV: &str = "LOOM_ROOT_FOLDER";

/// Environment variable overriding the config file location
pub const CONFIG_FILE_ENV: &str = "LOOM_CONFIG";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Data folder holding the database and media
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub scheduler: SchedulerToml,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive used when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "loom_sd=debug,loom_common=info".to_string(),
        }
    }
}

/// `[scheduler]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerToml {
    /// Cadence of the tick loop
    pub tick_interval_seconds: u64,
    /// Folder (under the data folder) commercials live in
    pub default_commercial_folder: String,
    /// Path of the promo placed at the head of each gap
    pub default_promo: Option<String>,
    /// Local "HH:MM" at which the next day is generated
    pub end_of_day: String,
    /// Slot granularity movies are rounded up to
    pub slot_minutes: u32,
    pub buffer_lookback_hours: u32,
    pub main_lookback_hours: u32,
    pub specialty_honor_probability: f64,
    pub min_distance: f64,
    pub max_distance: f64,
}

impl Default for SchedulerToml {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 300,
            default_commercial_folder: "commercials".to_string(),
            default_promo: None,
            end_of_day: "23:30".to_string(),
            slot_minutes: 30,
            buffer_lookback_hours: 2,
            main_lookback_hours: 24,
            specialty_honor_probability: 0.7,
            min_distance: 0.0,
            max_distance: 0.5,
        }
    }
}

impl TomlConfig {
    /// Reject values the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        let s = &self.scheduler;
        if s.tick_interval_seconds == 0 {
            return Err(Error::Config("tick_interval_seconds must be > 0".to_string()));
        }
        if s.slot_minutes == 0 {
            return Err(Error::Config("slot_minutes must be > 0".to_string()));
        }
        if !(0.0..=1.0).contains(&s.specialty_honor_probability) {
            return Err(Error::Config(format!(
                "specialty_honor_probability must be within [0, 1], got {}",
                s.specialty_honor_probability
            )));
        }
        if !s.min_distance.is_finite() || !s.max_distance.is_finite() || s.min_distance < 0.0 {
            return Err(Error::Config(
                "facet distances must be finite and non-negative".to_string(),
            ));
        }
        if s.min_distance > s.max_distance {
            return Err(Error::Config(format!(
                "min_distance ({}) exceeds max_distance ({})",
                s.min_distance, s.max_distance
            )));
        }
        crate::time::parse_time_of_day(&s.end_of_day)?;
        Ok(())
    }
}

/// Root folder resolution, in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_config: Option<&TomlConfig>,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(root_folder) = toml_config.and_then(|c| c.root_folder.as_ref()) {
        return root_folder.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Locate the configuration file
///
/// `LOOM_CONFIG` wins; otherwise `~/.config/loom/config.toml`, then
/// `/etc/loom/config.toml` on Linux.
pub fn config_file_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
        return Err(Error::Config(format!("Config file not found: {:?}", path)));
    }

    let user_config = dirs::config_dir().map(|d| d.join("loom").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/loom/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// Load and validate a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;
    config.validate()?;
    Ok(config)
}

/// Load the config file, degrading to defaults on any failure
pub fn load_toml_config_or_default(explicit: Option<&Path>) -> TomlConfig {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match config_file_path() {
            Ok(path) => path,
            Err(e) => {
                info!("Using default configuration: {}", e);
                return TomlConfig::default();
            }
        },
    };

    match load_toml_config(&path) {
        Ok(config) => {
            info!("Loaded configuration from {}", path.display());
            config
        }
        Err(e) => {
            warn!("Ignoring configuration at {}: {}", path.display(), e);
            TomlConfig::default()
        }
    }
}

/// Write a config file, creating parent directories
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/loom (or /var/lib/loom for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("loom"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/loom"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("loom"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/loom"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("loom"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\loom"))
    } else {
        PathBuf::from("./loom_data")
    }
}
