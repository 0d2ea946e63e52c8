//! Runtime scheduler configuration
//!
//! Built from the TOML `[scheduler]` table plus the resolved data folder.

use crate::db::settings;
use crate::Result;
use chrono::NaiveTime;
use loom_common::config::SchedulerToml;
use loom_common::time::parse_time_of_day;
use loom_common::{MediaItem, MediaKind};
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Usage context recorded for main media picks
pub const MAIN_USAGE_CONTEXT: &str = "main";
/// Usage context recorded for commercials and shorts
pub const BUFFER_USAGE_CONTEXT: &str = "buffer";
/// Usage context recorded for music fill
pub const MUSIC_USAGE_CONTEXT: &str = "music";

const HOUR: u64 = 3600;

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Root of all relative media paths
    pub data_folder: PathBuf,
    pub tick_interval: Duration,
    /// Folder under `data_folder` holding commercials
    pub default_commercial_folder: String,
    /// Promo placed at the head of each gap, relative to `data_folder`
    pub default_promo: Option<PathBuf>,
    pub end_of_day: NaiveTime,
    /// Movie slot granularity
    pub slot: Duration,
    pub buffer_lookback: Duration,
    pub main_lookback: Duration,
    pub specialty_honor_probability: f64,
    pub min_distance: f64,
    pub max_distance: f64,
}

impl SchedulerConfig {
    /// Defaults rooted at `data_folder`
    pub fn new(data_folder: impl Into<PathBuf>) -> Self {
        let defaults = SchedulerToml::default();
        Self {
            data_folder: data_folder.into(),
            tick_interval: Duration::from_secs(defaults.tick_interval_seconds),
            default_commercial_folder: defaults.default_commercial_folder,
            default_promo: None,
            end_of_day: NaiveTime::from_hms_opt(23, 30, 0).unwrap_or(NaiveTime::MIN),
            slot: Duration::from_secs(u64::from(defaults.slot_minutes) * 60),
            buffer_lookback: Duration::from_secs(u64::from(defaults.buffer_lookback_hours) * HOUR),
            main_lookback: Duration::from_secs(u64::from(defaults.main_lookback_hours) * HOUR),
            specialty_honor_probability: defaults.specialty_honor_probability,
            min_distance: defaults.min_distance,
            max_distance: defaults.max_distance,
        }
    }

    pub fn from_toml(data_folder: impl Into<PathBuf>, toml: &SchedulerToml) -> Result<Self> {
        Ok(Self {
            data_folder: data_folder.into(),
            tick_interval: Duration::from_secs(toml.tick_interval_seconds.max(1)),
            default_commercial_folder: toml.default_commercial_folder.clone(),
            default_promo: toml.default_promo.as_ref().map(PathBuf::from),
            end_of_day: parse_time_of_day(&toml.end_of_day)?,
            slot: Duration::from_secs(u64::from(toml.slot_minutes.max(1)) * 60),
            buffer_lookback: Duration::from_secs(u64::from(toml.buffer_lookback_hours) * HOUR),
            main_lookback: Duration::from_secs(u64::from(toml.main_lookback_hours) * HOUR),
            specialty_honor_probability: toml.specialty_honor_probability,
            min_distance: toml.min_distance,
            max_distance: toml.max_distance,
        })
    }

    /// Absolute path a media item will be played from
    ///
    /// Absolute paths are kept; commercials resolve under the commercial
    /// folder, everything else under the data folder.
    pub fn resolve_media_path(&self, item: &MediaItem) -> PathBuf {
        if item.path.is_absolute() {
            return item.path.clone();
        }
        match item.kind {
            MediaKind::Commercial => self
                .data_folder
                .join(&self.default_commercial_folder)
                .join(&item.path),
            _ => self.data_folder.join(&item.path),
        }
    }

    /// Whether `path` names the configured default promo
    pub fn is_default_promo(&self, path: &Path) -> bool {
        self.default_promo.as_deref() == Some(path)
    }

    /// Mirror tunables into the settings table for other readers
    pub async fn mirror_to_settings(&self, db: &Pool<Sqlite>) -> Result<()> {
        settings::set_setting(db, "tick_interval_seconds", self.tick_interval.as_secs()).await?;
        let buffer_hours = self.buffer_lookback.as_secs() / HOUR;
        settings::set_setting(db, "buffer_lookback_hours", buffer_hours).await?;
        let main_hours = self.main_lookback.as_secs() / HOUR;
        settings::set_setting(db, "main_lookback_hours", main_hours).await?;
        settings::set_setting(
            db,
            "specialty_honor_probability",
            self.specialty_honor_probability,
        )
        .await?;
        Ok(())
    }
}
