//! Episode progression database access
//!
//! One row per (show, stream variant).

use crate::db::{duration_from_millis, parse_uuid};
use crate::error::{Error, Result};
use loom_common::models::EpisodeProgression;
use loom_common::time::{datetime_from_millis, duration_to_millis};
use loom_common::StreamVariant;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

fn progression_from_row(row: &SqliteRow) -> Result<EpisodeProgression> {
    let show_id: String = row.try_get("show_id")?;
    let variant: String = row.try_get("stream_variant")?;
    let current: i64 = row.try_get("current_episode")?;
    let last_played: Option<i64> = row.try_get("last_played_at")?;
    let limit: Option<i64> = row.try_get("next_episode_duration_limit_ms")?;

    Ok(EpisodeProgression {
        show_id: parse_uuid(&show_id)?,
        stream_variant: StreamVariant::from_str(&variant)
            .ok_or_else(|| Error::Persistence(format!("Unknown stream variant: {}", variant)))?,
        current_episode: u32::try_from(current)
            .map_err(|_| Error::Persistence(format!("Invalid current_episode {}", current)))?,
        last_played_at: last_played.map(datetime_from_millis).transpose()?,
        next_episode_duration_limit: limit.map(duration_from_millis),
        next_episode_over_duration: row.try_get::<i64, _>("next_episode_over_duration")? != 0,
    })
}

pub async fn get_progression(
    db: &Pool<Sqlite>,
    show_id: Uuid,
    variant: StreamVariant,
) -> Result<Option<EpisodeProgression>> {
    let row = sqlx::query(
        r#"
        SELECT show_id, stream_variant, current_episode, last_played_at,
               next_episode_duration_limit_ms, next_episode_over_duration
        FROM episode_progression
        WHERE show_id = ? AND stream_variant = ?
        "#,
    )
    .bind(show_id.to_string())
    .bind(variant.as_str())
    .fetch_optional(db)
    .await?;

    row.as_ref().map(progression_from_row).transpose()
}

/// Insert a new progression; fails if one exists for the pair
pub async fn create_progression(db: &Pool<Sqlite>, p: &EpisodeProgression) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO episode_progression
            (show_id, stream_variant, current_episode, last_played_at,
             next_episode_duration_limit_ms, next_episode_over_duration)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(p.show_id.to_string())
    .bind(p.stream_variant.as_str())
    .bind(i64::from(p.current_episode))
    .bind(p.last_played_at.map(|t| t.timestamp_millis()))
    .bind(p.next_episode_duration_limit.map(duration_to_millis))
    .bind(p.next_episode_over_duration as i64)
    .execute(db)
    .await?;
    Ok(())
}

/// Update an existing progression; returns whether a row changed
pub async fn update_progression(db: &Pool<Sqlite>, p: &EpisodeProgression) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE episode_progression
        SET current_episode = ?, last_played_at = ?,
            next_episode_duration_limit_ms = ?, next_episode_over_duration = ?
        WHERE show_id = ? AND stream_variant = ?
        "#,
    )
    .bind(i64::from(p.current_episode))
    .bind(p.last_played_at.map(|t| t.timestamp_millis()))
    .bind(p.next_episode_duration_limit.map(duration_to_millis))
    .bind(p.next_episode_over_duration as i64)
    .bind(p.show_id.to_string())
    .bind(p.stream_variant.as_str())
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn upsert_progression(db: &Pool<Sqlite>, p: &EpisodeProgression) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO episode_progression
            (show_id, stream_variant, current_episode, last_played_at,
             next_episode_duration_limit_ms, next_episode_over_duration)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(show_id, stream_variant) DO UPDATE SET
            current_episode = excluded.current_episode,
            last_played_at = excluded.last_played_at,
            next_episode_duration_limit_ms = excluded.next_episode_duration_limit_ms,
            next_episode_over_duration = excluded.next_episode_over_duration
        "#,
    )
    .bind(p.show_id.to_string())
    .bind(p.stream_variant.as_str())
    .bind(i64::from(p.current_episode))
    .bind(p.last_played_at.map(|t| t.timestamp_millis()))
    .bind(p.next_episode_duration_limit.map(duration_to_millis))
    .bind(p.next_episode_over_duration as i64)
    .execute(db)
    .await?;
    Ok(())
}
