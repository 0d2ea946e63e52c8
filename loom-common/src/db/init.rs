//! Database initialization
//!
//! Opens (or creates) the SQLite database, applies connection pragmas, creates
//! every table idempotently and seeds default settings.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create every table (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_tags_table(pool).await?;
    create_shows_table(pool).await?;
    create_media_table(pool).await?;
    create_media_tags_table(pool).await?;
    create_show_tags_table(pool).await?;
    create_facets_tables(pool).await?;
    create_mosaics_tables(pool).await?;
    create_episode_progression_table(pool).await?;
    create_media_usage_table(pool).await?;
    Ok(())
}

/// Create the settings table
///
/// Stores application configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_tags_table(pool: &SqlitePool) -> Result<()> {
    // holiday_dates is a JSON array of ISO dates
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            tag_type TEXT NOT NULL CHECK (tag_type IN ('Genre', 'Aesthetic', 'Era', 'Specialty', 'Holiday', 'AgeGroup', 'MusicalGenre')),
            holiday_dates TEXT NOT NULL DEFAULT '[]',
            season_start TEXT,
            season_end TEXT,
            explicitly_holiday INTEGER NOT NULL DEFAULT 0,
            sequence INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tags_type ON tags(tag_type)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_shows_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS shows (
            guid TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            episode_count INTEGER NOT NULL DEFAULT 0 CHECK (episode_count >= 0),
            duration_limit_ms INTEGER NOT NULL CHECK (duration_limit_ms >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_media_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS media (
            guid TEXT PRIMARY KEY,
            kind TEXT NOT NULL CHECK (kind IN ('Movie', 'Episode', 'Commercial', 'Short', 'Music', 'Promo', 'Bumper')),
            title TEXT NOT NULL,
            duration_ms INTEGER NOT NULL CHECK (duration_ms >= 0),
            path TEXT NOT NULL,
            show_id TEXT REFERENCES shows(guid) ON DELETE CASCADE,
            episode_number INTEGER,
            over_duration INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            CHECK ((kind = 'Episode') = (show_id IS NOT NULL AND episode_number IS NOT NULL))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_media_kind ON media(kind)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_media_show_episode ON media(show_id, episode_number) WHERE show_id IS NOT NULL",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_media_tags_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS media_tags (
            media_id TEXT NOT NULL REFERENCES media(guid) ON DELETE CASCADE,
            tag_id TEXT NOT NULL REFERENCES tags(guid) ON DELETE CASCADE,
            PRIMARY KEY (media_id, tag_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_media_tags_tag ON media_tags(tag_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_show_tags_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS show_tags (
            show_id TEXT NOT NULL REFERENCES shows(guid) ON DELETE CASCADE,
            tag_id TEXT NOT NULL REFERENCES tags(guid) ON DELETE CASCADE,
            PRIMARY KEY (show_id, tag_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_facets_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS facets (
            guid TEXT PRIMARY KEY,
            genre_tag_id TEXT NOT NULL REFERENCES tags(guid) ON DELETE CASCADE,
            aesthetic_tag_id TEXT NOT NULL REFERENCES tags(guid) ON DELETE CASCADE,
            UNIQUE (genre_tag_id, aesthetic_tag_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Directional: (a, b) and (b, a) are independent rows
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS facet_distances (
            source_facet_id TEXT NOT NULL REFERENCES facets(guid) ON DELETE CASCADE,
            target_facet_id TEXT NOT NULL REFERENCES facets(guid) ON DELETE CASCADE,
            distance REAL NOT NULL CHECK (distance >= 0),
            PRIMARY KEY (source_facet_id, target_facet_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_mosaics_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mosaics (
            guid TEXT PRIMARY KEY,
            facet_id TEXT NOT NULL REFERENCES facets(guid) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mosaic_genres (
            mosaic_id TEXT NOT NULL REFERENCES mosaics(guid) ON DELETE CASCADE,
            genre_name TEXT NOT NULL,
            PRIMARY KEY (mosaic_id, genre_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_episode_progression_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS episode_progression (
            show_id TEXT NOT NULL REFERENCES shows(guid) ON DELETE CASCADE,
            stream_variant TEXT NOT NULL CHECK (stream_variant IN ('Continuous', 'Adhoc', 'Block')),
            current_episode INTEGER NOT NULL DEFAULT 0 CHECK (current_episode >= 0),
            last_played_at INTEGER,
            next_episode_duration_limit_ms INTEGER,
            next_episode_over_duration INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (show_id, stream_variant)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_media_usage_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS media_usage (
            guid TEXT PRIMARY KEY,
            media_id TEXT NOT NULL,
            media_kind TEXT NOT NULL,
            usage_context TEXT NOT NULL,
            stream_session_id TEXT,
            used_at INTEGER NOT NULL,
            expires_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_media_usage_lookup ON media_usage(media_id, usage_context, used_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or update default settings
///
/// Ensures all required settings exist; NULL values are reset to defaults.
pub async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    // Stream resume state
    ensure_setting(pool, "stream_mode", "stopped").await?;
    ensure_setting(pool, "stream_session_id", "").await?;
    ensure_setting(pool, "stream_end_time", "").await?;

    // Scheduler tunables (mirrored from the TOML [scheduler] table at startup)
    ensure_setting(pool, "tick_interval_seconds", "300").await?;
    ensure_setting(pool, "buffer_lookback_hours", "2").await?;
    ensure_setting(pool, "main_lookback_hours", "24").await?;
    ensure_setting(pool, "specialty_honor_probability", "0.7").await?;

    Ok(())
}

async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    match value {
        None => {
            // INSERT OR IGNORE tolerates concurrent initialization
            sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default_value)
                .execute(pool)
                .await?;
            info!("Initialized setting '{}' with default value: {}", key, default_value);
        }
        Some(None) => {
            sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
                .bind(default_value)
                .bind(key)
                .execute(pool)
                .await?;
            warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
        }
        Some(Some(_)) => {}
    }

    Ok(())
}
