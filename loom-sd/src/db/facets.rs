//! Facet graph and mosaic database access

use crate::db::parse_uuid;
use crate::db::tags::{ensure_tag, get_tag};
use crate::error::{Error, Result};
use loom_common::models::{Facet, FacetDistance, Mosaic};
use sqlx::{Pool, QueryBuilder, Row, Sqlite};
use std::collections::HashMap;
use uuid::Uuid;

/// Insert or update a facet and replace its outgoing distances
///
/// Distances must be finite and non-negative.
pub async fn save_facet(db: &Pool<Sqlite>, facet: &Facet) -> Result<()> {
    for rel in &facet.relationships {
        validate_distance(rel.distance)?;
    }

    let mut tx = db.begin().await?;
    let genre_id = ensure_tag(&mut tx, &facet.genre).await?;
    let aesthetic_id = ensure_tag(&mut tx, &facet.aesthetic).await?;

    sqlx::query(
        r#"
        INSERT INTO facets (guid, genre_tag_id, aesthetic_tag_id)
        VALUES (?, ?, ?)
        ON CONFLICT(guid) DO UPDATE SET
            genre_tag_id = excluded.genre_tag_id,
            aesthetic_tag_id = excluded.aesthetic_tag_id
        "#,
    )
    .bind(facet.id.to_string())
    .bind(genre_id.to_string())
    .bind(aesthetic_id.to_string())
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM facet_distances WHERE source_facet_id = ?")
        .bind(facet.id.to_string())
        .execute(&mut *tx)
        .await?;

    for rel in &facet.relationships {
        sqlx::query(
            "INSERT INTO facet_distances (source_facet_id, target_facet_id, distance) VALUES (?, ?, ?)",
        )
        .bind(facet.id.to_string())
        .bind(rel.target_facet_id.to_string())
        .bind(rel.distance)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Set one directional distance (source -> target)
pub async fn set_distance(
    db: &Pool<Sqlite>,
    source: Uuid,
    target: Uuid,
    distance: f64,
) -> Result<()> {
    validate_distance(distance)?;
    sqlx::query(
        r#"
        INSERT INTO facet_distances (source_facet_id, target_facet_id, distance)
        VALUES (?, ?, ?)
        ON CONFLICT(source_facet_id, target_facet_id) DO UPDATE SET distance = excluded.distance
        "#,
    )
    .bind(source.to_string())
    .bind(target.to_string())
    .bind(distance)
    .execute(db)
    .await?;
    Ok(())
}

fn validate_distance(distance: f64) -> Result<()> {
    if distance.is_finite() && distance >= 0.0 {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "Facet distance must be finite and non-negative, got {}",
            distance
        )))
    }
}

/// Outgoing distances from one facet, closest first
pub async fn distances_from(db: &Pool<Sqlite>, source: Uuid) -> Result<Vec<FacetDistance>> {
    let rows = sqlx::query(
        "SELECT target_facet_id, distance FROM facet_distances WHERE source_facet_id = ? ORDER BY distance",
    )
    .bind(source.to_string())
    .fetch_all(db)
    .await?;

    rows.iter()
        .map(|row| -> Result<FacetDistance> {
            let target: String = row.try_get("target_facet_id")?;
            Ok(FacetDistance {
                target_facet_id: parse_uuid(&target)?,
                distance: row.try_get("distance")?,
            })
        })
        .collect()
}

async fn hydrate_facet(
    db: &Pool<Sqlite>,
    guid: &str,
    genre: &str,
    aesthetic: &str,
) -> Result<Facet> {
    let id = parse_uuid(guid)?;
    let genre = get_tag(db, parse_uuid(genre)?)
        .await?
        .ok_or_else(|| Error::Persistence(format!("Facet {} has no genre tag", id)))?;
    let aesthetic = get_tag(db, parse_uuid(aesthetic)?)
        .await?
        .ok_or_else(|| Error::Persistence(format!("Facet {} has no aesthetic tag", id)))?;

    Ok(Facet {
        id,
        genre,
        aesthetic,
        relationships: distances_from(db, id).await?,
    })
}

pub async fn get_facet(db: &Pool<Sqlite>, id: Uuid) -> Result<Option<Facet>> {
    let row = sqlx::query("SELECT guid, genre_tag_id, aesthetic_tag_id FROM facets WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(db)
        .await?;

    match row {
        Some(row) => {
            let guid: String = row.try_get("guid")?;
            let genre: String = row.try_get("genre_tag_id")?;
            let aesthetic: String = row.try_get("aesthetic_tag_id")?;
            Ok(Some(hydrate_facet(db, &guid, &genre, &aesthetic).await?))
        }
        None => Ok(None),
    }
}

pub async fn list_facets(db: &Pool<Sqlite>) -> Result<Vec<Facet>> {
    let rows = sqlx::query("SELECT guid, genre_tag_id, aesthetic_tag_id FROM facets ORDER BY guid")
        .fetch_all(db)
        .await?;

    let mut facets = Vec::with_capacity(rows.len());
    for row in &rows {
        let guid: String = row.try_get("guid")?;
        let genre: String = row.try_get("genre_tag_id")?;
        let aesthetic: String = row.try_get("aesthetic_tag_id")?;
        facets.push(hydrate_facet(db, &guid, &genre, &aesthetic).await?);
    }
    Ok(facets)
}

pub async fn save_mosaic(db: &Pool<Sqlite>, mosaic: &Mosaic) -> Result<()> {
    let mut tx = db.begin().await?;
    sqlx::query(
        "INSERT INTO mosaics (guid, facet_id) VALUES (?, ?) ON CONFLICT(guid) DO UPDATE SET facet_id = excluded.facet_id",
    )
    .bind(mosaic.id.to_string())
    .bind(mosaic.facet_id.to_string())
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM mosaic_genres WHERE mosaic_id = ?")
        .bind(mosaic.id.to_string())
        .execute(&mut *tx)
        .await?;

    for genre in &mosaic.musical_genres {
        sqlx::query("INSERT OR IGNORE INTO mosaic_genres (mosaic_id, genre_name) VALUES (?, ?)")
            .bind(mosaic.id.to_string())
            .bind(genre)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Mosaics linked to any of the given facets
pub async fn mosaics_for_facets(db: &Pool<Sqlite>, facet_ids: &[Uuid]) -> Result<Vec<Mosaic>> {
    if facet_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
        "SELECT mo.guid, mo.facet_id, g.genre_name FROM mosaics mo \
         LEFT JOIN mosaic_genres g ON g.mosaic_id = mo.guid WHERE mo.facet_id IN (",
    );
    let mut ids = qb.separated(", ");
    for id in facet_ids {
        ids.push_bind(id.to_string());
    }
    ids.push_unseparated(") ORDER BY mo.guid, g.genre_name");

    let rows = qb.build().fetch_all(db).await?;

    let mut order: Vec<Uuid> = Vec::new();
    let mut by_id: HashMap<Uuid, Mosaic> = HashMap::new();
    for row in &rows {
        let guid: String = row.try_get("guid")?;
        let facet: String = row.try_get("facet_id")?;
        let genre: Option<String> = row.try_get("genre_name")?;
        let id = parse_uuid(&guid)?;

        if !by_id.contains_key(&id) {
            order.push(id);
            by_id.insert(
                id,
                Mosaic {
                    id,
                    facet_id: parse_uuid(&facet)?,
                    musical_genres: Vec::new(),
                },
            );
        }
        if let (Some(genre), Some(mosaic)) = (genre, by_id.get_mut(&id)) {
            mosaic.musical_genres.push(genre);
        }
    }

    Ok(order.into_iter().filter_map(|id| by_id.remove(&id)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_common::{Tag, TagType};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> Pool<Sqlite> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        loom_common::db::create_schema(&pool).await.unwrap();
        pool
    }

    fn facet(genre: &str, aesthetic: &str) -> Facet {
        Facet::new(Tag::new(genre, TagType::Genre), Tag::new(aesthetic, TagType::Aesthetic))
    }

    #[tokio::test]
    async fn test_distances_are_directional() {
        let db = setup_test_db().await;
        let a = facet("noir", "gritty");
        let b = facet("comedy", "bright");
        save_facet(&db, &a).await.unwrap();
        save_facet(&db, &b).await.unwrap();

        set_distance(&db, a.id, b.id, 0.2).await.unwrap();
        set_distance(&db, b.id, a.id, 0.9).await.unwrap();

        let from_a = distances_from(&db, a.id).await.unwrap();
        let from_b = distances_from(&db, b.id).await.unwrap();
        assert_eq!(from_a[0].distance, 0.2);
        assert_eq!(from_b[0].distance, 0.9);

        let loaded = get_facet(&db, a.id).await.unwrap().unwrap();
        assert_eq!(loaded.label(), "noir/gritty");
        assert_eq!(loaded.relationships.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_distance_rejected() {
        let db = setup_test_db().await;
        let a = facet("noir", "gritty");
        save_facet(&db, &a).await.unwrap();

        assert!(matches!(
            set_distance(&db, a.id, a.id, f64::NAN).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            set_distance(&db, a.id, a.id, -1.0).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_facets_share_tags_by_name() {
        let db = setup_test_db().await;
        save_facet(&db, &facet("noir", "gritty")).await.unwrap();
        save_facet(&db, &facet("noir", "neon")).await.unwrap();

        let facets = list_facets(&db).await.unwrap();
        assert_eq!(facets.len(), 2);
        assert_eq!(facets[0].genre.id, facets[1].genre.id);
    }

    #[tokio::test]
    async fn test_mosaics_for_facets() {
        let db = setup_test_db().await;
        let a = facet("noir", "gritty");
        let b = facet("comedy", "bright");
        save_facet(&db, &a).await.unwrap();
        save_facet(&db, &b).await.unwrap();

        let mosaic = Mosaic {
            id: Uuid::new_v4(),
            facet_id: a.id,
            musical_genres: vec!["jazz".to_string(), "blues".to_string()],
        };
        save_mosaic(&db, &mosaic).await.unwrap();

        let found = mosaics_for_facets(&db, &[a.id, b.id]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].musical_genres, vec!["blues", "jazz"]);
        assert!(mosaics_for_facets(&db, &[b.id]).await.unwrap().is_empty());
    }
}
