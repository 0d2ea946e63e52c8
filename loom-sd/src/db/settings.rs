//! Settings database access
//!
//! Read/write the settings key-value table, including the persisted stream
//! state used to resume after a restart.

use crate::db::parse_uuid;
use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use uuid::Uuid;

/// Generic setting getter
///
/// Returns `None` when the key is absent; unparseable values are errors.
pub async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(db)
            .await?;

    match value.flatten() {
        Some(s) => match s.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::Persistence(format!(
                "Failed to parse setting '{}' value: {}",
                key, s
            ))),
        },
        None => Ok(None),
    }
}

/// Generic setting setter (upsert)
pub async fn set_setting<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;

    Ok(())
}

/// Persisted stream mode
#[derive(Debug, Clone, PartialEq)]
pub enum PersistedStream {
    Stopped,
    Continuous { session_id: Uuid },
    Adhoc { session_id: Uuid, end_time: DateTime<FixedOffset> },
}

/// Save the active stream so it can be resumed
pub async fn save_stream_state(db: &Pool<Sqlite>, state: &PersistedStream) -> Result<()> {
    let (mode, session, end) = match state {
        PersistedStream::Stopped => ("stopped", String::new(), String::new()),
        PersistedStream::Continuous { session_id } => {
            ("continuous", session_id.to_string(), String::new())
        }
        PersistedStream::Adhoc { session_id, end_time } => {
            ("adhoc", session_id.to_string(), end_time.to_rfc3339())
        }
    };
    set_setting(db, "stream_mode", mode).await?;
    set_setting(db, "stream_session_id", session).await?;
    set_setting(db, "stream_end_time", end).await
}

/// Load the persisted stream; missing keys read as stopped
pub async fn load_stream_state(db: &Pool<Sqlite>) -> Result<PersistedStream> {
    let mode = get_setting::<String>(db, "stream_mode").await?.unwrap_or_default();
    let session = get_setting::<String>(db, "stream_session_id").await?.unwrap_or_default();

    match mode.as_str() {
        "continuous" => Ok(PersistedStream::Continuous {
            session_id: parse_uuid(&session)?,
        }),
        "adhoc" => {
            let end = get_setting::<String>(db, "stream_end_time").await?.unwrap_or_default();
            let end_time = DateTime::parse_from_rfc3339(&end).map_err(|e| {
                Error::Persistence(format!("Invalid stream_end_time '{}': {}", end, e))
            })?;
            Ok(PersistedStream::Adhoc {
                session_id: parse_uuid(&session)?,
                end_time,
            })
        }
        _ => Ok(PersistedStream::Stopped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> Pool<Sqlite> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        loom_common::db::create_settings_table(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_setting_round_trip() {
        let db = setup_test_db().await;

        assert_eq!(get_setting::<u64>(&db, "tick_interval_seconds").await.unwrap(), None);
        set_setting(&db, "tick_interval_seconds", 300u64).await.unwrap();
        set_setting(&db, "tick_interval_seconds", 60u64).await.unwrap();
        assert_eq!(get_setting::<u64>(&db, "tick_interval_seconds").await.unwrap(), Some(60));
    }

    #[tokio::test]
    async fn test_unparseable_setting_is_error() {
        let db = setup_test_db().await;
        set_setting(&db, "slot_minutes", "thirty").await.unwrap();
        assert!(get_setting::<u32>(&db, "slot_minutes").await.is_err());
    }

    #[tokio::test]
    async fn test_stream_state_persistence() {
        let db = setup_test_db().await;
        assert_eq!(load_stream_state(&db).await.unwrap(), PersistedStream::Stopped);

        let session_id = Uuid::new_v4();
        let end_time = FixedOffset::east_opt(-4 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 7, 4, 23, 0, 0)
            .unwrap();
        let adhoc = PersistedStream::Adhoc { session_id, end_time };
        save_stream_state(&db, &adhoc).await.unwrap();
        assert_eq!(load_stream_state(&db).await.unwrap(), adhoc);

        save_stream_state(&db, &PersistedStream::Continuous { session_id }).await.unwrap();
        assert_eq!(
            load_stream_state(&db).await.unwrap(),
            PersistedStream::Continuous { session_id }
        );

        save_stream_state(&db, &PersistedStream::Stopped).await.unwrap();
        assert_eq!(load_stream_state(&db).await.unwrap(), PersistedStream::Stopped);
    }
}
