//! Music selection ("mosaic")
//!
//! Picks one track for a gap. A mosaic linked to the surrounding facets
//! supplies the musical genres; tags of the adjacent media narrow the pick in
//! strict priority order, falling through to genre-only when no level
//! matches.

use crate::store::{CandidateQuery, Store, TagFilter};
use crate::Result;
use chrono::{DateTime, FixedOffset, Utc};
use loom_common::models::{Mosaic, UsageRecord};
use loom_common::tags::{in_season, TagContext};
use loom_common::{MediaItem, MediaKind, Tag, TagType};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Tag types consulted, highest priority first
pub const PRIORITY: [TagType; 5] = [
    TagType::AgeGroup,
    TagType::Holiday,
    TagType::Specialty,
    TagType::MusicalGenre,
    TagType::Era,
];

pub const DEFAULT_SPECIALTY_HONOR_PROBABILITY: f64 = 0.7;

#[derive(Debug, Clone)]
pub struct MusicRequest {
    pub facet_ids: Vec<Uuid>,
    /// Tags of the media on either side of the gap
    pub adjacent_tags: Vec<Tag>,
    pub at: DateTime<FixedOffset>,
    pub max_duration: Option<Duration>,
    /// Recency context; `None` disables both exclusion and recording
    pub usage_context: Option<String>,
    pub lookback: Duration,
    pub session_id: Option<Uuid>,
    pub specialty_honor_probability: f64,
    /// Tracks already picked for this gap
    pub exclude_ids: Vec<Uuid>,
}

impl MusicRequest {
    pub fn new(facet_ids: Vec<Uuid>, adjacent_tags: Vec<Tag>, at: DateTime<FixedOffset>) -> Self {
        Self {
            facet_ids,
            adjacent_tags,
            at,
            max_duration: None,
            usage_context: None,
            lookback: Duration::from_secs(2 * 3600),
            session_id: None,
            specialty_honor_probability: DEFAULT_SPECIALTY_HONOR_PROBABILITY,
            exclude_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MusicSelection {
    pub track: Option<MediaItem>,
    pub mosaic_id: Option<Uuid>,
    /// Priority level that produced the track; `None` for the genre-only fallback
    pub level: Option<TagType>,
    /// A specialty match lost the honour roll and was replaced
    pub specialty_declined: bool,
    pub reason: Option<String>,
}

impl MusicSelection {
    fn none(mosaic_id: Option<Uuid>, reason: &str) -> Self {
        Self {
            track: None,
            mosaic_id,
            level: None,
            specialty_declined: false,
            reason: Some(reason.to_string()),
        }
    }
}

pub struct MosaicEngine {
    store: Arc<dyn Store>,
}

impl MosaicEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn select(
        &self,
        request: &MusicRequest,
        rng: &mut (dyn RngCore + Send + Sync),
    ) -> Result<MusicSelection> {
        let mosaics = self.store.mosaics_for_facets(&request.facet_ids).await?;
        let Some(mosaic) = mosaics.choose(rng).cloned() else {
            return Ok(MusicSelection::none(None, "no mosaic for facets"));
        };

        let context = TagContext::from_tags(&request.adjacent_tags, request.at.date_naive());
        let mut selection = MusicSelection::none(Some(mosaic.id), "no tracks");

        for level in PRIORITY {
            let names = context.names(level);
            if names.is_empty() {
                continue;
            }

            let Some(track) = self.pick(request, &mosaic, Some(names), rng).await? else {
                debug!(level = %level, "Music level yielded nothing");
                continue;
            };

            if level == TagType::Specialty {
                let p = request.specialty_honor_probability.clamp(0.0, 1.0);
                if !rng.gen_bool(p) {
                    if let Some(fallback) = self.pick(request, &mosaic, None, rng).await? {
                        selection.track = Some(fallback);
                        selection.specialty_declined = true;
                        break;
                    }
                }
            }

            selection.track = Some(track);
            selection.level = Some(level);
            break;
        }

        if selection.track.is_none() {
            selection.track = self.pick(request, &mosaic, None, rng).await?;
        }

        let Some(track) = &selection.track else {
            debug!(mosaic = %mosaic.id, "No music for mosaic");
            return Ok(selection);
        };
        selection.reason = None;

        if let Some(context) = &request.usage_context {
            let record = UsageRecord::new(
                track.id,
                MediaKind::Music,
                context.clone(),
                request.at.with_timezone(&Utc),
            )
            .with_session(request.session_id);
            self.store.record_usage(&record).await?;
        }

        debug!(
            mosaic = %mosaic.id,
            level = selection.level.map(|l| l.as_str()).unwrap_or("genre"),
            specialty_declined = selection.specialty_declined,
            "Music selected: {}",
            track.title
        );
        Ok(selection)
    }

    /// One random track matching the mosaic's genres and, if given, `names`
    async fn pick(
        &self,
        request: &MusicRequest,
        mosaic: &Mosaic,
        names: Option<&[String]>,
        rng: &mut (dyn RngCore + Send + Sync),
    ) -> Result<Option<MediaItem>> {
        let mut filter = TagFilter::any().require_any_of(mosaic.musical_genres.iter().cloned());
        if let Some(names) = names {
            filter = filter.require_any_of(names.iter().cloned());
        }

        let mut query = CandidateQuery::of_kinds(&[MediaKind::Music])
            .with_tags(filter)
            .with_max_duration(request.max_duration)
            .excluding_ids(request.exclude_ids.iter().copied());
        if let Some(context) = &request.usage_context {
            query = query.excluding_recent(
                context.clone(),
                request.lookback,
                request.at.with_timezone(&Utc),
            );
        }

        let date = request.at.date_naive();
        let tracks: Vec<MediaItem> = self
            .store
            .find_candidates(&query)
            .await?
            .into_iter()
            .filter(|t| in_season(&t.tags, date))
            .collect();

        Ok(tracks.choose(rng).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ignores_genre_and_aesthetic() {
        assert_eq!(PRIORITY[0], TagType::AgeGroup);
        assert_eq!(PRIORITY[1], TagType::Holiday);
        assert!(!PRIORITY.contains(&TagType::Genre));
        assert!(!PRIORITY.contains(&TagType::Aesthetic));
    }
}
