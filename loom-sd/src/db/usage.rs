//! Media usage tracking
//!
//! A usage record excludes its media from selection in the same context
//! until `expires_at`, or until `used_at + lookback` when no expiry is set.

use crate::db::parse_uuid;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use loom_common::models::UsageRecord;
use loom_common::time::{datetime_from_millis, duration_to_millis};
use loom_common::MediaKind;
use sqlx::{Pool, Row, Sqlite};
use std::time::Duration;
use uuid::Uuid;

pub async fn record_usage(db: &Pool<Sqlite>, record: &UsageRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO media_usage (guid, media_id, media_kind, usage_context, stream_session_id, used_at, expires_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.id.to_string())
    .bind(record.media_id.to_string())
    .bind(record.media_kind.as_str())
    .bind(&record.usage_context)
    .bind(record.stream_session_id.map(|s| s.to_string()))
    .bind(record.used_at.timestamp_millis())
    .bind(record.expires_at.map(|t| t.timestamp_millis()))
    .execute(db)
    .await?;
    Ok(())
}

/// Whether `media_id` is still excluded in `context` at `as_of`
pub async fn is_recently_used(
    db: &Pool<Sqlite>,
    media_id: Uuid,
    kind: MediaKind,
    context: &str,
    lookback: Duration,
    as_of: DateTime<Utc>,
) -> Result<bool> {
    let now_ms = as_of.timestamp_millis();
    let used: i64 = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM media_usage
            WHERE media_id = ? AND media_kind = ? AND usage_context = ?
              AND ((expires_at IS NOT NULL AND expires_at > ?)
                OR (expires_at IS NULL AND used_at > ?))
        )
        "#,
    )
    .bind(media_id.to_string())
    .bind(kind.as_str())
    .bind(context)
    .bind(now_ms)
    .bind(now_ms.saturating_sub(duration_to_millis(lookback)))
    .fetch_one(db)
    .await?;
    Ok(used != 0)
}

/// Usage history of one item, newest first
pub async fn usage_for_media(db: &Pool<Sqlite>, media_id: Uuid) -> Result<Vec<UsageRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT guid, media_id, media_kind, usage_context, stream_session_id, used_at, expires_at
        FROM media_usage WHERE media_id = ? ORDER BY used_at DESC
        "#,
    )
    .bind(media_id.to_string())
    .fetch_all(db)
    .await?;

    rows.iter()
        .map(|row| -> Result<UsageRecord> {
            let guid: String = row.try_get("guid")?;
            let media: String = row.try_get("media_id")?;
            let kind: String = row.try_get("media_kind")?;
            let session: Option<String> = row.try_get("stream_session_id")?;
            let expires: Option<i64> = row.try_get("expires_at")?;
            Ok(UsageRecord {
                id: parse_uuid(&guid)?,
                media_id: parse_uuid(&media)?,
                media_kind: MediaKind::from_str(&kind)
                    .ok_or_else(|| Error::Persistence(format!("Unknown media kind: {}", kind)))?,
                usage_context: row.try_get("usage_context")?,
                stream_session_id: session.as_deref().map(parse_uuid).transpose()?,
                used_at: datetime_from_millis(row.try_get("used_at")?)?,
                expires_at: expires.map(datetime_from_millis).transpose()?,
            })
        })
        .collect()
}

/// Drop records that can no longer exclude anything
///
/// A record without expiry is stale once `used_at` is older than
/// `max_lookback`.
pub async fn purge_stale_usage(
    db: &Pool<Sqlite>,
    max_lookback: Duration,
    as_of: DateTime<Utc>,
) -> Result<u64> {
    let now_ms = as_of.timestamp_millis();
    let result = sqlx::query(
        r#"
        DELETE FROM media_usage
        WHERE (expires_at IS NOT NULL AND expires_at <= ?)
           OR (expires_at IS NULL AND used_at <= ?)
        "#,
    )
    .bind(now_ms)
    .bind(now_ms.saturating_sub(duration_to_millis(max_lookback)))
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}
