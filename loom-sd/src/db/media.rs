//! Media and show database access
//!
//! Episodes live in `media` with `show_id`/`episode_number` set; a show is
//! loaded together with its tags and its episodes in episode order.

use crate::db::query::CandidateQuery;
use crate::db::tags::{replace_links, tags_for_owners};
use crate::db::{duration_from_millis, parse_uuid};
use crate::error::{Error, Result};
use loom_common::models::{Episode, Show};
use loom_common::time::duration_to_millis;
use loom_common::{MediaItem, MediaKind};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, QueryBuilder, Row, Sqlite, SqliteConnection};
use std::path::PathBuf;
use uuid::Uuid;

const MEDIA_COLUMNS: &str =
    "m.guid, m.kind, m.title, m.duration_ms, m.path, m.show_id, m.episode_number, m.over_duration";

const SHOW_COLUMNS: &str = "s.guid, s.title, s.episode_count, s.duration_limit_ms";

fn media_from_row(row: &SqliteRow) -> Result<MediaItem> {
    let guid: String = row.try_get("guid")?;
    let kind_str: String = row.try_get("kind")?;
    let kind = MediaKind::from_str(&kind_str)
        .ok_or_else(|| Error::Persistence(format!("Unknown media kind: {}", kind_str)))?;
    let path: String = row.try_get("path")?;

    Ok(MediaItem {
        id: parse_uuid(&guid)?,
        kind,
        title: row.try_get("title")?,
        duration: duration_from_millis(row.try_get("duration_ms")?),
        path: PathBuf::from(path),
        tags: Vec::new(),
    })
}

fn episode_from_row(row: &SqliteRow) -> Result<Episode> {
    let item = media_from_row(row)?;
    let show_id: Option<String> = row.try_get("show_id")?;
    let show_id = show_id
        .ok_or_else(|| Error::Persistence(format!("Episode {} has no show", item.id)))?;
    let number: i64 = row.try_get("episode_number")?;

    Ok(Episode {
        show_id: parse_uuid(&show_id)?,
        episode_number: u32::try_from(number)
            .map_err(|_| Error::Persistence(format!("Invalid episode number {}", number)))?,
        over_duration: row.try_get::<i64, _>("over_duration")? != 0,
        item,
    })
}

async fn attach_tags(db: &Pool<Sqlite>, items: &mut [MediaItem]) -> Result<()> {
    let ids: Vec<Uuid> = items.iter().map(|i| i.id).collect();
    let mut tags = tags_for_owners(db, "media_tags", "media_id", &ids).await?;
    for item in items.iter_mut() {
        item.tags = tags.remove(&item.id).unwrap_or_default();
    }
    Ok(())
}

async fn upsert_media_row(
    conn: &mut SqliteConnection,
    item: &MediaItem,
    episode: Option<(Uuid, u32, bool)>,
) -> Result<()> {
    let (show_id, number, over) = match episode {
        Some((show_id, number, over)) => (Some(show_id.to_string()), Some(i64::from(number)), over),
        None => (None, None, false),
    };

    sqlx::query(
        r#"
        INSERT INTO media (guid, kind, title, duration_ms, path, show_id, episode_number, over_duration, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(guid) DO UPDATE SET
            kind = excluded.kind,
            title = excluded.title,
            duration_ms = excluded.duration_ms,
            path = excluded.path,
            show_id = excluded.show_id,
            episode_number = excluded.episode_number,
            over_duration = excluded.over_duration
        "#,
    )
    .bind(item.id.to_string())
    .bind(item.kind.as_str())
    .bind(&item.title)
    .bind(duration_to_millis(item.duration))
    .bind(item.path.to_string_lossy().to_string())
    .bind(show_id)
    .bind(number)
    .bind(over as i64)
    .bind(chrono::Utc::now().timestamp_millis())
    .execute(&mut *conn)
    .await?;

    replace_links(conn, "media_tags", "media_id", item.id, &item.tags).await
}

/// Insert or update a standalone media item and its tags
///
/// Episodes are saved through [`save_show`]; shows are not media rows.
pub async fn save_media(db: &Pool<Sqlite>, item: &MediaItem) -> Result<()> {
    if matches!(item.kind, MediaKind::Episode | MediaKind::Show) {
        return Err(Error::Validation(format!(
            "{} '{}' must be saved through its show",
            item.kind, item.title
        )));
    }

    let mut tx = db.begin().await?;
    upsert_media_row(&mut tx, item, None).await?;
    tx.commit().await?;
    Ok(())
}

pub async fn get_media(db: &Pool<Sqlite>, id: Uuid) -> Result<Option<MediaItem>> {
    let row = sqlx::query(&format!("SELECT {} FROM media m WHERE m.guid = ?", MEDIA_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(db)
        .await?;

    match row {
        Some(row) => {
            let mut items = vec![media_from_row(&row)?];
            attach_tags(db, &mut items).await?;
            Ok(items.pop())
        }
        None => Ok(None),
    }
}

/// All media of one kind, ordered by title
pub async fn list_media(db: &Pool<Sqlite>, kind: MediaKind) -> Result<Vec<MediaItem>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM media m WHERE m.kind = ? ORDER BY m.title",
        MEDIA_COLUMNS
    ))
    .bind(kind.as_str())
    .fetch_all(db)
    .await?;

    let mut items = rows.iter().map(media_from_row).collect::<Result<Vec<_>>>()?;
    attach_tags(db, &mut items).await?;
    Ok(items)
}

pub async fn delete_media(db: &Pool<Sqlite>, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM media WHERE guid = ?")
        .bind(id.to_string())
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Media of one kind carrying any of `names`
pub async fn find_by_tag_names(
    db: &Pool<Sqlite>,
    kind: MediaKind,
    names: &[String],
) -> Result<Vec<MediaItem>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }
    let query = CandidateQuery::of_kinds(&[kind])
        .with_tags(crate::db::TagFilter::any().require_any_of(names.iter().cloned()));
    find_candidates(db, &query).await
}

/// Media matching a candidate query, with tags loaded
pub async fn find_candidates(db: &Pool<Sqlite>, query: &CandidateQuery) -> Result<Vec<MediaItem>> {
    let mut qb: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM media m WHERE 1 = 1", MEDIA_COLUMNS));

    if !query.kinds.is_empty() {
        qb.push(" AND m.kind IN (");
        let mut kinds = qb.separated(", ");
        for kind in &query.kinds {
            kinds.push_bind(kind.as_str());
        }
        kinds.push_unseparated(")");
    }
    query.push_filters(&mut qb, "m", "media_tags", "media_id", "duration_ms");
    qb.push(" ORDER BY m.title, m.guid");

    let rows = qb.build().fetch_all(db).await?;
    let mut items = rows.iter().map(media_from_row).collect::<Result<Vec<_>>>()?;
    attach_tags(db, &mut items).await?;
    Ok(items)
}

/// Insert or update a show with its tags and episodes
pub async fn save_show(db: &Pool<Sqlite>, show: &Show) -> Result<()> {
    let mut tx = db.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO shows (guid, title, episode_count, duration_limit_ms)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(guid) DO UPDATE SET
            title = excluded.title,
            episode_count = excluded.episode_count,
            duration_limit_ms = excluded.duration_limit_ms
        "#,
    )
    .bind(show.id.to_string())
    .bind(&show.title)
    .bind(i64::from(show.episode_count))
    .bind(duration_to_millis(show.duration_limit))
    .execute(&mut *tx)
    .await?;

    replace_links(&mut tx, "show_tags", "show_id", show.id, &show.tags).await?;

    for episode in &show.episodes {
        if episode.show_id != show.id {
            return Err(Error::Validation(format!(
                "Episode '{}' belongs to a different show",
                episode.item.title
            )));
        }
        let mut item = episode.item.clone();
        item.kind = MediaKind::Episode;
        upsert_media_row(
            &mut tx,
            &item,
            Some((show.id, episode.episode_number, episode.over_duration)),
        )
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn load_episodes(db: &Pool<Sqlite>, show_id: Uuid) -> Result<Vec<Episode>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM media m WHERE m.show_id = ? ORDER BY m.episode_number",
        MEDIA_COLUMNS
    ))
    .bind(show_id.to_string())
    .fetch_all(db)
    .await?;

    let mut episodes = rows.iter().map(episode_from_row).collect::<Result<Vec<_>>>()?;
    let ids: Vec<Uuid> = episodes.iter().map(|e| e.item.id).collect();
    let mut tags = tags_for_owners(db, "media_tags", "media_id", &ids).await?;
    for episode in &mut episodes {
        episode.item.tags = tags.remove(&episode.item.id).unwrap_or_default();
    }
    Ok(episodes)
}

fn show_from_row(row: &SqliteRow) -> Result<Show> {
    let guid: String = row.try_get("guid")?;
    let count: i64 = row.try_get("episode_count")?;
    Ok(Show {
        id: parse_uuid(&guid)?,
        title: row.try_get("title")?,
        episode_count: u32::try_from(count)
            .map_err(|_| Error::Persistence(format!("Invalid episode_count {}", count)))?,
        duration_limit: duration_from_millis(row.try_get("duration_limit_ms")?),
        tags: Vec::new(),
        episodes: Vec::new(),
    })
}

async fn hydrate_shows(db: &Pool<Sqlite>, rows: &[SqliteRow]) -> Result<Vec<Show>> {
    let mut shows = rows.iter().map(show_from_row).collect::<Result<Vec<_>>>()?;
    let ids: Vec<Uuid> = shows.iter().map(|s| s.id).collect();
    let mut tags = tags_for_owners(db, "show_tags", "show_id", &ids).await?;
    for show in &mut shows {
        show.tags = tags.remove(&show.id).unwrap_or_default();
        show.episodes = load_episodes(db, show.id).await?;
    }
    Ok(shows)
}

pub async fn get_show(db: &Pool<Sqlite>, id: Uuid) -> Result<Option<Show>> {
    let rows = sqlx::query(&format!("SELECT {} FROM shows s WHERE s.guid = ?", SHOW_COLUMNS))
        .bind(id.to_string())
        .fetch_all(db)
        .await?;
    Ok(hydrate_shows(db, &rows).await?.pop())
}

pub async fn list_shows(db: &Pool<Sqlite>) -> Result<Vec<Show>> {
    let rows = sqlx::query(&format!("SELECT {} FROM shows s ORDER BY s.title", SHOW_COLUMNS))
        .fetch_all(db)
        .await?;
    hydrate_shows(db, &rows).await
}

pub async fn delete_show(db: &Pool<Sqlite>, id: Uuid) -> Result<bool> {
    let mut tx = db.begin().await?;
    sqlx::query("DELETE FROM media WHERE show_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM shows WHERE guid = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

/// Shows matching a candidate query
///
/// Tag groups match show tags, the duration cap applies to the show's
/// duration limit and recency is keyed by show id. `kinds` is ignored.
pub async fn find_show_candidates(db: &Pool<Sqlite>, query: &CandidateQuery) -> Result<Vec<Show>> {
    let sql = format!("SELECT {} FROM shows s WHERE s.episode_count > 0", SHOW_COLUMNS);
    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(sql);
    query.push_filters(&mut qb, "s", "show_tags", "show_id", "duration_limit_ms");
    qb.push(" ORDER BY s.title, s.guid");

    let rows = qb.build().fetch_all(db).await?;
    hydrate_shows(db, &rows).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TagFilter;
    use chrono::{TimeZone, Utc};
    use loom_common::{Tag, TagType};
    use sqlx::sqlite::SqlitePoolOptions;
    use std::time::Duration;

    async fn setup_test_db() -> Pool<Sqlite> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        loom_common::db::create_schema(&pool).await.unwrap();
        pool
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[tokio::test]
    async fn test_media_round_trip_with_tags() {
        let db = setup_test_db().await;
        let item = MediaItem::new(MediaKind::Commercial, "Cola", secs(30), "cola.mp4")
            .with_tags(vec![
                Tag::new("retro", TagType::Aesthetic),
                Tag::new("Family", TagType::AgeGroup),
            ]);
        save_media(&db, &item).await.unwrap();

        let loaded = get_media(&db, item.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Cola");
        assert_eq!(loaded.duration, secs(30));
        assert_eq!(loaded.tags.len(), 2);
        assert!(loaded.has_tag("retro"));

        assert_eq!(list_media(&db, MediaKind::Commercial).await.unwrap().len(), 1);
        assert!(list_media(&db, MediaKind::Short).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_media_rejects_episode() {
        let db = setup_test_db().await;
        let item = MediaItem::new(MediaKind::Episode, "Pilot", secs(1320), "pilot.mkv");
        assert!(matches!(save_media(&db, &item).await, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_find_candidates_tag_groups_and_duration_cap() {
        let db = setup_test_db().await;
        let xmas = Tag::new("christmas", TagType::Holiday);
        let comedy = Tag::new("comedy", TagType::Genre);

        let both = MediaItem::new(MediaKind::Commercial, "Both", secs(30), "a.mp4")
            .with_tags(vec![xmas.clone(), comedy.clone()]);
        let only_genre = MediaItem::new(MediaKind::Commercial, "Genre", secs(30), "b.mp4")
            .with_tags(vec![comedy.clone()]);
        let long = MediaItem::new(MediaKind::Short, "Long", secs(600), "c.mp4")
            .with_tags(vec![xmas.clone(), comedy.clone()]);
        for item in [&both, &only_genre, &long] {
            save_media(&db, item).await.unwrap();
        }

        let query = CandidateQuery::of_kinds(&[MediaKind::Commercial, MediaKind::Short])
            .with_tags(TagFilter::any().require_any_of(["christmas"]).require_any_of(["comedy"]));
        let titles: Vec<String> = find_candidates(&db, &query)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.title)
            .collect();
        assert_eq!(titles, vec!["Both", "Long"]);

        let capped = query.with_max_duration(Some(secs(120)));
        let titles: Vec<String> = find_candidates(&db, &capped)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.title)
            .collect();
        assert_eq!(titles, vec!["Both"]);

        let any_comedy = find_by_tag_names(&db, MediaKind::Commercial, &["comedy".to_string()])
            .await
            .unwrap();
        assert_eq!(any_comedy.len(), 2);
    }

    #[tokio::test]
    async fn test_recency_exclusion_respects_expiry() {
        let db = setup_test_db().await;
        let item = MediaItem::new(MediaKind::Commercial, "Ad", secs(15), "ad.mp4");
        save_media(&db, &item).await.unwrap();

        let used_at = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        let record = loom_common::models::UsageRecord::new(item.id, item.kind, "buffer", used_at)
            .with_expiry(used_at + chrono::Duration::minutes(10));
        crate::db::usage::record_usage(&db, &record).await.unwrap();

        let at = |minutes| {
            CandidateQuery::of_kinds(&[MediaKind::Commercial]).excluding_recent(
                "buffer",
                secs(7200),
                used_at + chrono::Duration::minutes(minutes),
            )
        };
        // Expiry wins over the two hour lookback
        assert!(find_candidates(&db, &at(5)).await.unwrap().is_empty());
        assert_eq!(find_candidates(&db, &at(11)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_show_round_trip_and_candidates() {
        let db = setup_test_db().await;
        let mut show = Show::new("Space Patrol", secs(1800));
        show.episode_count = 2;
        show.tags = vec![Tag::new("scifi", TagType::Genre), Tag::new("retro", TagType::Aesthetic)];
        for n in 1..=2 {
            show.episodes.push(Episode {
                item: MediaItem::new(
                    MediaKind::Episode,
                    format!("Part {}", n),
                    secs(1320),
                    format!("sp{}.mkv", n),
                ),
                show_id: show.id,
                episode_number: n,
                over_duration: false,
            });
        }
        save_show(&db, &show).await.unwrap();

        let loaded = get_show(&db, show.id).await.unwrap().unwrap();
        assert_eq!(loaded.episodes.len(), 2);
        assert_eq!(loaded.episode(2).unwrap().item.title, "Part 2");
        assert!(loaded.has_tag("scifi"));

        let query = CandidateQuery::default()
            .with_tags(TagFilter::any().require_any_of(["scifi"]).require_any_of(["retro"]));
        assert_eq!(find_show_candidates(&db, &query).await.unwrap().len(), 1);

        let too_short = query.with_max_duration(Some(secs(600)));
        assert!(find_show_candidates(&db, &too_short).await.unwrap().is_empty());

        assert!(delete_show(&db, show.id).await.unwrap());
        assert!(list_shows(&db).await.unwrap().is_empty());
        assert!(list_media(&db, MediaKind::Episode).await.unwrap().is_empty());
    }
}
