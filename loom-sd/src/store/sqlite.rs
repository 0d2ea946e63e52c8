//! SQLite-backed store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loom_common::models::{EpisodeProgression, Facet, Mosaic, Show, UsageRecord};
use loom_common::{MediaItem, MediaKind, StreamVariant, Tag};
use sqlx::{Pool, Sqlite};
use std::time::Duration;
use uuid::Uuid;

use super::{CandidateQuery, MediaStore, ProgressionStore, StreamStateStore, UsageStore};
use crate::db::{self, settings::PersistedStream, tags::TagRef};
use crate::Result;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Pool<Sqlite>,
}

impl SqliteStore {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.db
    }
}

#[async_trait]
impl MediaStore for SqliteStore {
    async fn find_tag(&self, id: Uuid) -> Result<Option<Tag>> {
        db::tags::get_tag(&self.db, id).await
    }

    async fn find_tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        db::tags::get_tag_by_name(&self.db, name).await
    }

    async fn all_tags(&self) -> Result<Vec<Tag>> {
        db::tags::list_tags(&self.db).await
    }

    async fn save_tag(&self, tag: &Tag) -> Result<()> {
        db::tags::save_tag(&self.db, tag).await
    }

    async fn delete_tag(&self, id: Uuid) -> Result<bool> {
        db::tags::delete_tag(&self.db, id).await
    }

    async fn resolve_tags(&self, refs: &[TagRef]) -> Result<Vec<Tag>> {
        db::tags::resolve_tag_refs(&self.db, refs).await
    }

    async fn find_media(&self, id: Uuid) -> Result<Option<MediaItem>> {
        db::media::get_media(&self.db, id).await
    }

    async fn all_media(&self, kind: MediaKind) -> Result<Vec<MediaItem>> {
        db::media::list_media(&self.db, kind).await
    }

    async fn save_media(&self, item: &MediaItem) -> Result<()> {
        db::media::save_media(&self.db, item).await
    }

    async fn delete_media(&self, id: Uuid) -> Result<bool> {
        db::media::delete_media(&self.db, id).await
    }

    async fn find_media_by_tag_names(
        &self,
        kind: MediaKind,
        names: &[String],
    ) -> Result<Vec<MediaItem>> {
        db::media::find_by_tag_names(&self.db, kind, names).await
    }

    async fn find_candidates(&self, query: &CandidateQuery) -> Result<Vec<MediaItem>> {
        db::media::find_candidates(&self.db, query).await
    }

    async fn find_show(&self, id: Uuid) -> Result<Option<Show>> {
        db::media::get_show(&self.db, id).await
    }

    async fn all_shows(&self) -> Result<Vec<Show>> {
        db::media::list_shows(&self.db).await
    }

    async fn save_show(&self, show: &Show) -> Result<()> {
        db::media::save_show(&self.db, show).await
    }

    async fn delete_show(&self, id: Uuid) -> Result<bool> {
        db::media::delete_show(&self.db, id).await
    }

    async fn find_show_candidates(&self, query: &CandidateQuery) -> Result<Vec<Show>> {
        db::media::find_show_candidates(&self.db, query).await
    }

    async fn find_facet(&self, id: Uuid) -> Result<Option<Facet>> {
        db::facets::get_facet(&self.db, id).await
    }

    async fn all_facets(&self) -> Result<Vec<Facet>> {
        db::facets::list_facets(&self.db).await
    }

    async fn save_facet(&self, facet: &Facet) -> Result<()> {
        db::facets::save_facet(&self.db, facet).await
    }

    async fn save_mosaic(&self, mosaic: &Mosaic) -> Result<()> {
        db::facets::save_mosaic(&self.db, mosaic).await
    }

    async fn mosaics_for_facets(&self, facet_ids: &[Uuid]) -> Result<Vec<Mosaic>> {
        db::facets::mosaics_for_facets(&self.db, facet_ids).await
    }
}

#[async_trait]
impl ProgressionStore for SqliteStore {
    async fn find_progression(
        &self,
        show_id: Uuid,
        variant: StreamVariant,
    ) -> Result<Option<EpisodeProgression>> {
        db::progression::get_progression(&self.db, show_id, variant).await
    }

    async fn create_progression(&self, progression: &EpisodeProgression) -> Result<()> {
        db::progression::create_progression(&self.db, progression).await
    }

    async fn update_progression(&self, progression: &EpisodeProgression) -> Result<bool> {
        db::progression::update_progression(&self.db, progression).await
    }

    async fn upsert_progression(&self, progression: &EpisodeProgression) -> Result<()> {
        db::progression::upsert_progression(&self.db, progression).await
    }
}

#[async_trait]
impl UsageStore for SqliteStore {
    async fn record_usage(&self, record: &UsageRecord) -> Result<()> {
        db::usage::record_usage(&self.db, record).await
    }

    async fn is_recently_used(
        &self,
        media_id: Uuid,
        kind: MediaKind,
        context: &str,
        lookback: Duration,
        as_of: DateTime<Utc>,
    ) -> Result<bool> {
        db::usage::is_recently_used(&self.db, media_id, kind, context, lookback, as_of).await
    }

    async fn purge_stale_usage(&self, max_lookback: Duration, as_of: DateTime<Utc>) -> Result<u64> {
        db::usage::purge_stale_usage(&self.db, max_lookback, as_of).await
    }
}

#[async_trait]
impl StreamStateStore for SqliteStore {
    async fn save_stream_state(&self, state: &PersistedStream) -> Result<()> {
        db::settings::save_stream_state(&self.db, state).await
    }

    async fn load_stream_state(&self) -> Result<PersistedStream> {
        db::settings::load_stream_state(&self.db).await
    }
}
