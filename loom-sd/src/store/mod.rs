//! Storage seam consumed by the selection engines and scheduler
//!
//! Engines hold an `Arc<dyn Store>`; [`SqliteStore`] is the production
//! implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loom_common::models::{EpisodeProgression, Facet, Mosaic, Show, UsageRecord};
use loom_common::{MediaItem, MediaKind, StreamVariant, Tag};
use std::time::Duration;
use uuid::Uuid;

pub use crate::db::settings::PersistedStream;
pub use crate::db::tags::TagRef;
use crate::Result;

mod sqlite;

pub use crate::db::query::{CandidateQuery, RecencyExclusion, TagFilter};
pub use sqlite::SqliteStore;

/// Tags, media, shows and the facet graph
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn find_tag(&self, id: Uuid) -> Result<Option<Tag>>;
    async fn find_tag_by_name(&self, name: &str) -> Result<Option<Tag>>;
    async fn all_tags(&self) -> Result<Vec<Tag>>;
    /// Create or update
    async fn save_tag(&self, tag: &Tag) -> Result<()>;
    async fn delete_tag(&self, id: Uuid) -> Result<bool>;
    /// Resolve bare tag names and full tags to stored tags
    async fn resolve_tags(&self, refs: &[TagRef]) -> Result<Vec<Tag>>;

    async fn find_media(&self, id: Uuid) -> Result<Option<MediaItem>>;
    async fn all_media(&self, kind: MediaKind) -> Result<Vec<MediaItem>>;
    async fn save_media(&self, item: &MediaItem) -> Result<()>;
    async fn delete_media(&self, id: Uuid) -> Result<bool>;
    /// Media of `kind` carrying any of `names`
    async fn find_media_by_tag_names(
        &self,
        kind: MediaKind,
        names: &[String],
    ) -> Result<Vec<MediaItem>>;
    /// Media matching the query, recency exclusion applied in the store
    async fn find_candidates(&self, query: &CandidateQuery) -> Result<Vec<MediaItem>>;

    async fn find_show(&self, id: Uuid) -> Result<Option<Show>>;
    async fn all_shows(&self) -> Result<Vec<Show>>;
    async fn save_show(&self, show: &Show) -> Result<()>;
    async fn delete_show(&self, id: Uuid) -> Result<bool>;
    async fn find_show_candidates(&self, query: &CandidateQuery) -> Result<Vec<Show>>;

    async fn find_facet(&self, id: Uuid) -> Result<Option<Facet>>;
    async fn all_facets(&self) -> Result<Vec<Facet>>;
    async fn save_facet(&self, facet: &Facet) -> Result<()>;
    async fn save_mosaic(&self, mosaic: &Mosaic) -> Result<()>;
    async fn mosaics_for_facets(&self, facet_ids: &[Uuid]) -> Result<Vec<Mosaic>>;
}

/// Episode progression keyed by (show, stream variant)
#[async_trait]
pub trait ProgressionStore: Send + Sync {
    async fn find_progression(
        &self,
        show_id: Uuid,
        variant: StreamVariant,
    ) -> Result<Option<EpisodeProgression>>;
    async fn create_progression(&self, progression: &EpisodeProgression) -> Result<()>;
    async fn update_progression(&self, progression: &EpisodeProgression) -> Result<bool>;
    async fn upsert_progression(&self, progression: &EpisodeProgression) -> Result<()>;
}

/// Recency tracking
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn record_usage(&self, record: &UsageRecord) -> Result<()>;
    async fn is_recently_used(
        &self,
        media_id: Uuid,
        kind: MediaKind,
        context: &str,
        lookback: Duration,
        as_of: DateTime<Utc>,
    ) -> Result<bool>;
    /// Drop records older than `max_lookback`; returns how many went
    async fn purge_stale_usage(&self, max_lookback: Duration, as_of: DateTime<Utc>) -> Result<u64>;
}

/// Active stream mode, for resume after restart
#[async_trait]
pub trait StreamStateStore: Send + Sync {
    async fn save_stream_state(&self, state: &PersistedStream) -> Result<()>;
    async fn load_stream_state(&self) -> Result<PersistedStream>;
}

/// Everything the engines and scheduler need from storage
pub trait Store: MediaStore + ProgressionStore + UsageStore + StreamStateStore {}

impl<T: MediaStore + ProgressionStore + UsageStore + StreamStateStore> Store for T {}
