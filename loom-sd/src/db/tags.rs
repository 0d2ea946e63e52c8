//! Tag database access
//!
//! Tag names are unique; media and shows reference tags by guid through the
//! `media_tags` and `show_tags` link tables.

use crate::db::parse_uuid;
use crate::error::{Error, Result};
use chrono::NaiveDate;
use loom_common::{Tag, TagType};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, QueryBuilder, Row, Sqlite, SqliteConnection};
use std::collections::HashMap;
use uuid::Uuid;

pub(crate) const TAG_COLUMNS: &str =
    "t.guid, t.name, t.tag_type, t.holiday_dates, t.season_start, t.season_end, t.explicitly_holiday, t.sequence";

/// SQLite's default bind limit is far above this; chunking keeps statements small
const ID_CHUNK: usize = 400;

/// A tag reference as it arrives from ingestion: a bare name or a full tag
#[derive(Debug, Clone, PartialEq)]
pub enum TagRef {
    Name(String),
    Tag(Tag),
}

impl From<&str> for TagRef {
    fn from(name: &str) -> Self {
        TagRef::Name(name.to_string())
    }
}

impl From<Tag> for TagRef {
    fn from(tag: Tag) -> Self {
        TagRef::Tag(tag)
    }
}

fn parse_date(column: &str, value: Option<String>) -> Result<Option<NaiveDate>> {
    value
        .filter(|s| !s.is_empty())
        .map(|s| {
            NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_err(|e| Error::Persistence(format!("Invalid {} '{}': {}", column, s, e)))
        })
        .transpose()
}

pub(crate) fn tag_from_row(row: &SqliteRow) -> Result<Tag> {
    let guid: String = row.try_get("guid")?;
    let type_str: String = row.try_get("tag_type")?;
    let tag_type = TagType::from_str(&type_str)
        .ok_or_else(|| Error::Persistence(format!("Unknown tag type: {}", type_str)))?;

    let holiday_json: String = row.try_get("holiday_dates")?;
    let holiday_dates: Vec<NaiveDate> = serde_json::from_str(&holiday_json)
        .map_err(|e| Error::Persistence(format!("Invalid holiday_dates for tag {}: {}", guid, e)))?;

    Ok(Tag {
        id: parse_uuid(&guid)?,
        name: row.try_get("name")?,
        tag_type,
        holiday_dates,
        season_start: parse_date("season_start", row.try_get("season_start")?)?,
        season_end: parse_date("season_end", row.try_get("season_end")?)?,
        explicitly_holiday: row.try_get::<i64, _>("explicitly_holiday")? != 0,
        sequence: row.try_get("sequence")?,
    })
}

/// Insert or update a tag by guid
pub async fn save_tag(db: &Pool<Sqlite>, tag: &Tag) -> Result<()> {
    let mut conn = db.acquire().await?;
    upsert_tag(&mut conn, tag).await
}

async fn upsert_tag(conn: &mut SqliteConnection, tag: &Tag) -> Result<()> {
    let holiday_json = serde_json::to_string(&tag.holiday_dates)
        .map_err(|e| Error::Persistence(format!("Serialize holiday_dates failed: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO tags (guid, name, tag_type, holiday_dates, season_start, season_end, explicitly_holiday, sequence)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(guid) DO UPDATE SET
            name = excluded.name,
            tag_type = excluded.tag_type,
            holiday_dates = excluded.holiday_dates,
            season_start = excluded.season_start,
            season_end = excluded.season_end,
            explicitly_holiday = excluded.explicitly_holiday,
            sequence = excluded.sequence
        "#,
    )
    .bind(tag.id.to_string())
    .bind(&tag.name)
    .bind(tag.tag_type.as_str())
    .bind(holiday_json)
    .bind(tag.season_start.map(|d| d.format("%Y-%m-%d").to_string()))
    .bind(tag.season_end.map(|d| d.format("%Y-%m-%d").to_string()))
    .bind(tag.explicitly_holiday as i64)
    .bind(tag.sequence)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Resolve a tag to its stored guid, inserting it when the name is new
///
/// An existing tag with the same name wins; its guid is returned.
pub(crate) async fn ensure_tag(conn: &mut SqliteConnection, tag: &Tag) -> Result<Uuid> {
    let existing: Option<String> = sqlx::query_scalar("SELECT guid FROM tags WHERE name = ?")
        .bind(&tag.name)
        .fetch_optional(&mut *conn)
        .await?;

    match existing {
        Some(guid) => parse_uuid(&guid),
        None => {
            upsert_tag(conn, tag).await?;
            Ok(tag.id)
        }
    }
}

pub async fn get_tag(db: &Pool<Sqlite>, id: Uuid) -> Result<Option<Tag>> {
    let row = sqlx::query(&format!("SELECT {} FROM tags t WHERE t.guid = ?", TAG_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(db)
        .await?;
    row.as_ref().map(tag_from_row).transpose()
}

pub async fn get_tag_by_name(db: &Pool<Sqlite>, name: &str) -> Result<Option<Tag>> {
    let row = sqlx::query(&format!("SELECT {} FROM tags t WHERE t.name = ?", TAG_COLUMNS))
        .bind(name)
        .fetch_optional(db)
        .await?;
    row.as_ref().map(tag_from_row).transpose()
}

pub async fn list_tags(db: &Pool<Sqlite>) -> Result<Vec<Tag>> {
    let sql = format!("SELECT {} FROM tags t ORDER BY t.tag_type, t.name", TAG_COLUMNS);
    let rows = sqlx::query(&sql).fetch_all(db).await?;
    rows.iter().map(tag_from_row).collect()
}

pub async fn list_tags_of_type(db: &Pool<Sqlite>, tag_type: TagType) -> Result<Vec<Tag>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM tags t WHERE t.tag_type = ? ORDER BY t.sequence, t.name",
        TAG_COLUMNS
    ))
    .bind(tag_type.as_str())
    .fetch_all(db)
    .await?;
    rows.iter().map(tag_from_row).collect()
}

/// Delete a tag; returns whether it existed
pub async fn delete_tag(db: &Pool<Sqlite>, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM tags WHERE guid = ?")
        .bind(id.to_string())
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Resolve ingestion tag references to stored tags
///
/// Names must already exist; full tags are inserted when new.
pub async fn resolve_tag_refs(db: &Pool<Sqlite>, refs: &[TagRef]) -> Result<Vec<Tag>> {
    let mut resolved = Vec::with_capacity(refs.len());
    for tag_ref in refs {
        let tag = match tag_ref {
            TagRef::Name(name) => get_tag_by_name(db, name)
                .await?
                .ok_or_else(|| Error::NotFound(format!("Tag '{}'", name)))?,
            TagRef::Tag(tag) => {
                let mut conn = db.acquire().await?;
                let id = ensure_tag(&mut conn, tag).await?;
                drop(conn);
                get_tag(db, id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("Tag '{}'", tag.name)))?
            }
        };
        resolved.push(tag);
    }
    Ok(resolved)
}

/// Replace the tag links of one owner (media or show)
pub(crate) async fn replace_links(
    conn: &mut SqliteConnection,
    link_table: &str,
    owner_column: &str,
    owner_id: Uuid,
    tags: &[Tag],
) -> Result<()> {
    sqlx::query(&format!("DELETE FROM {} WHERE {} = ?", link_table, owner_column))
        .bind(owner_id.to_string())
        .execute(&mut *conn)
        .await?;

    for tag in tags {
        let tag_id = ensure_tag(conn, tag).await?;
        sqlx::query(&format!(
            "INSERT OR IGNORE INTO {} ({}, tag_id) VALUES (?, ?)",
            link_table, owner_column
        ))
        .bind(owner_id.to_string())
        .bind(tag_id.to_string())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Load tags for many owners at once, keyed by owner id
pub(crate) async fn tags_for_owners(
    db: &Pool<Sqlite>,
    link_table: &str,
    owner_column: &str,
    owner_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<Tag>>> {
    let mut by_owner: HashMap<Uuid, Vec<Tag>> = HashMap::new();

    for chunk in owner_ids.chunks(ID_CHUNK) {
        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "SELECT lt.{oc} AS owner_id, {cols} FROM {lt} lt JOIN tags t ON t.guid = lt.tag_id WHERE lt.{oc} IN (",
            oc = owner_column,
            cols = TAG_COLUMNS,
            lt = link_table
        ));
        let mut ids = qb.separated(", ");
        for id in chunk {
            ids.push_bind(id.to_string());
        }
        ids.push_unseparated(") ORDER BY t.name");

        let rows = qb.build().fetch_all(db).await?;
        for row in &rows {
            let owner: String = row.try_get("owner_id")?;
            by_owner
                .entry(parse_uuid(&owner)?)
                .or_default()
                .push(tag_from_row(row)?);
        }
    }

    Ok(by_owner)
}
