//! Relationship walk ("refract")
//!
//! Picks the next long-form item by walking the facet graph from the item
//! that just played:
//!
//! 1. Facets whose genre and aesthetic names both tag the source item
//! 2. One of them uniformly at random
//! 3. A controlled-random step along its outgoing distances
//! 4. Movies and shows tagged with the target facet's genre and aesthetic
//! 5. Movies or shows by coin flip (or explicit bias), then one candidate
//!
//! Running out of options is a soft failure: the selection is `None` and the
//! trace carries the reason.

use crate::progression::ProgressionTracker;
use crate::store::{CandidateQuery, Store, TagFilter};
use crate::Result;
use chrono::{DateTime, FixedOffset, Utc};
use loom_common::models::{Episode, FacetDistance, MainMedia, Show, UsageRecord};
use loom_common::tags::in_season;
use loom_common::{MediaItem, MediaKind, StreamVariant};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Recency window applied when no lookback is configured
pub const DEFAULT_MAIN_LOOKBACK: Duration = Duration::from_secs(24 * 3600);

pub const REASON_NO_TAGS: &str = "no tags";
pub const REASON_NO_SOURCE_FACETS: &str = "no matching source facets";
pub const REASON_NO_RELATIONSHIPS: &str = "no relationships";
pub const REASON_NO_CANDIDATES: &str = "no candidates";

/// Choose a target along weighted outgoing distances
///
/// Distances inside `[min, max]` are sorted ascending and drawn with weight
/// `(n - i)^2`, so closer facets are favoured without excluding farther
/// ones. When nothing falls in range the globally closest distance wins.
pub fn pick_target<R: Rng + ?Sized>(
    distances: &[FacetDistance],
    min_distance: f64,
    max_distance: f64,
    rng: &mut R,
) -> Option<FacetDistance> {
    let mut in_range: Vec<FacetDistance> = distances
        .iter()
        .filter(|d| d.distance >= min_distance && d.distance <= max_distance)
        .copied()
        .collect();

    if in_range.is_empty() {
        return distances
            .iter()
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
            .copied();
    }

    in_range.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    let n = in_range.len() as u64;
    let weights: Vec<u64> = (0..n).map(|i| (n - i) * (n - i)).collect();
    let total: u64 = weights.iter().sum();

    let mut roll = rng.gen_range(0..total);
    for (candidate, weight) in in_range.iter().zip(&weights) {
        if roll < *weight {
            return Some(*candidate);
        }
        roll -= weight;
    }
    in_range.last().copied()
}

/// Options for one walk
#[derive(Debug, Clone)]
pub struct RefractOptions {
    pub min_distance: f64,
    pub max_distance: f64,
    /// `Some(true)` tries shows first, `Some(false)` movies, `None` flips a coin
    pub prefer_shows: Option<bool>,
    /// Recency context; `None` disables both exclusion and recording
    pub usage_context: Option<String>,
    pub max_duration: Option<Duration>,
    pub stream_variant: StreamVariant,
    pub lookback: Duration,
    pub session_id: Option<Uuid>,
    /// Episodes of a show already planned but not yet played
    pub planned_offsets: HashMap<Uuid, usize>,
    /// Scheduled start of the pick; drives recency and seasonal gating
    pub at: DateTime<FixedOffset>,
}

impl RefractOptions {
    pub fn new(stream_variant: StreamVariant, at: DateTime<FixedOffset>) -> Self {
        Self {
            min_distance: 0.0,
            max_distance: 0.5,
            prefer_shows: None,
            usage_context: None,
            max_duration: None,
            stream_variant,
            lookback: DEFAULT_MAIN_LOOKBACK,
            session_id: None,
            planned_offsets: HashMap::new(),
            at,
        }
    }
}

/// Diagnostic record of one walk
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefractTrace {
    pub source_facet: Option<String>,
    pub target_facet: Option<String>,
    pub distance: Option<f64>,
    pub movie_candidates: usize,
    pub show_candidates: usize,
    /// Why the walk produced nothing
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefractSelection {
    pub selection: Option<MainMedia>,
    pub trace: RefractTrace,
}

impl RefractSelection {
    fn soft_fail(mut trace: RefractTrace, reason: &str) -> Self {
        trace.reason = Some(reason.to_string());
        debug!(reason, "Refract produced no selection");
        Self {
            selection: None,
            trace,
        }
    }
}

pub struct RefractEngine {
    store: Arc<dyn Store>,
    progression: ProgressionTracker,
}

impl RefractEngine {
    pub fn new(store: Arc<dyn Store>, progression: ProgressionTracker) -> Self {
        Self { store, progression }
    }

    /// Walk from `source` to the next main media
    pub async fn select_next(
        &self,
        source: &MediaItem,
        options: &RefractOptions,
        rng: &mut (dyn RngCore + Send + Sync),
    ) -> Result<RefractSelection> {
        let mut trace = RefractTrace::default();

        let names = source.tag_names();
        if names.is_empty() {
            return Ok(RefractSelection::soft_fail(trace, REASON_NO_TAGS));
        }

        let facets = self.store.all_facets().await?;
        let matching: Vec<_> = facets.iter().filter(|f| f.matches(&names)).collect();
        let Some(source_facet) = matching.choose(rng).copied() else {
            return Ok(RefractSelection::soft_fail(trace, REASON_NO_SOURCE_FACETS));
        };
        trace.source_facet = Some(source_facet.label());

        let Some(step) = pick_target(
            &source_facet.relationships,
            options.min_distance,
            options.max_distance,
            rng,
        ) else {
            return Ok(RefractSelection::soft_fail(trace, REASON_NO_RELATIONSHIPS));
        };
        trace.distance = Some(step.distance);

        let Some(target) = facets.iter().find(|f| f.id == step.target_facet_id) else {
            return Ok(RefractSelection::soft_fail(trace, REASON_NO_RELATIONSHIPS));
        };
        trace.target_facet = Some(target.label());

        let filter = TagFilter::any()
            .require_any_of([target.genre.name.clone()])
            .require_any_of([target.aesthetic.name.clone()]);
        self.choose_from(filter, options, trace, rng).await
    }

    /// Pick any main media, for a stream with nothing to walk from
    pub async fn select_seed(
        &self,
        options: &RefractOptions,
        rng: &mut (dyn RngCore + Send + Sync),
    ) -> Result<RefractSelection> {
        self.choose_from(TagFilter::any(), options, RefractTrace::default(), rng)
            .await
    }

    /// Gather movies and shows matching `filter`, then choose one
    async fn choose_from(
        &self,
        filter: TagFilter,
        options: &RefractOptions,
        mut trace: RefractTrace,
        rng: &mut (dyn RngCore + Send + Sync),
    ) -> Result<RefractSelection> {
        let mut query = CandidateQuery::default()
            .with_tags(filter)
            .with_max_duration(options.max_duration);
        if let Some(context) = &options.usage_context {
            query = query.excluding_recent(
                context.clone(),
                options.lookback,
                options.at.with_timezone(&Utc),
            );
        }

        let date = options.at.date_naive();
        let movies: Vec<MediaItem> = self
            .store
            .find_candidates(&CandidateQuery {
                kinds: vec![MediaKind::Movie],
                ..query.clone()
            })
            .await?
            .into_iter()
            .filter(|m| in_season(&m.tags, date))
            .collect();

        let mut shows = Vec::new();
        for show in self.store.find_show_candidates(&query).await? {
            if !in_season(&show.tags, date) {
                continue;
            }
            if let Some(entry) = self.next_episode_within_cap(&show, options).await? {
                shows.push((show, entry));
            }
        }

        trace.movie_candidates = movies.len();
        trace.show_candidates = shows.len();

        let shows_first = options.prefer_shows.unwrap_or_else(|| rng.gen_bool(0.5));
        let selection = match (shows_first, movies.is_empty(), shows.is_empty()) {
            (_, true, true) => None,
            (true, _, false) | (false, true, false) => shows.choose(rng).map(|(show, episode)| {
                MainMedia::Episode {
                    show_id: show.id,
                    show_title: show.title.clone(),
                    episode: episode.clone(),
                }
            }),
            _ => movies.choose(rng).cloned().map(MainMedia::Movie),
        };

        let Some(selection) = selection else {
            return Ok(RefractSelection::soft_fail(trace, REASON_NO_CANDIDATES));
        };

        if let Some(context) = &options.usage_context {
            let (media_id, kind) = match &selection {
                MainMedia::Movie(item) => (item.id, MediaKind::Movie),
                MainMedia::Episode { show_id, .. } => (*show_id, MediaKind::Show),
            };
            let record =
                UsageRecord::new(media_id, kind, context.clone(), options.at.with_timezone(&Utc))
                    .with_session(options.session_id);
            self.store.record_usage(&record).await?;
        }

        info!(
            source_facet = trace.source_facet.as_deref().unwrap_or("-"),
            target_facet = trace.target_facet.as_deref().unwrap_or("-"),
            distance = trace.distance.unwrap_or_default(),
            movie_candidates = trace.movie_candidates,
            show_candidates = trace.show_candidates,
            "Refract selected: {}",
            selection.title()
        );

        Ok(RefractSelection {
            selection: Some(selection),
            trace,
        })
    }

    /// Next planned episode of `show`
    ///
    /// Dropped when it is over-duration, either by its own flag or, for the
    /// very next episode, by the flag stored on the progression, and when it
    /// breaks the duration cap.
    async fn next_episode_within_cap(
        &self,
        show: &Show,
        options: &RefractOptions,
    ) -> Result<Option<Episode>> {
        let offset = options.planned_offsets.get(&show.id).copied().unwrap_or(0);
        if offset == 0
            && self
                .progression
                .next_marked_over_duration(show, options.stream_variant)
                .await?
        {
            debug!(show = %show.title, "Next episode marked over-duration, skipping show");
            return Ok(None);
        }

        let episode = self
            .progression
            .planned_episode(show, options.stream_variant, offset)
            .await?;

        Ok(episode.filter(|e| {
            !e.over_duration && options.max_duration.map_or(true, |cap| e.item.duration <= cap)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn edge(distance: f64) -> FacetDistance {
        FacetDistance {
            target_facet_id: Uuid::new_v4(),
            distance,
        }
    }

    #[test]
    fn test_walk_stays_inside_range() {
        let b = edge(0.1);
        let c = edge(0.5);
        let d = edge(0.9);
        let distances = [d, b, c];
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..500 {
            let picked = pick_target(&distances, 0.05, 0.7, &mut rng).unwrap();
            assert!(picked == b || picked == c);
        }
    }

    #[test]
    fn test_closest_is_favoured() {
        let near = edge(0.1);
        let far = edge(0.5);
        let mut rng = StdRng::seed_from_u64(11);

        let near_hits = (0..1000)
            .filter(|_| pick_target(&[far, near], 0.0, 1.0, &mut rng) == Some(near))
            .count();
        // Weights 4:1
        assert!(near_hits > 700, "near picked {} times", near_hits);
    }

    #[test]
    fn test_out_of_range_falls_back_to_closest() {
        let a = edge(0.8);
        let b = edge(0.95);
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(pick_target(&[b, a], 0.0, 0.5, &mut rng), Some(a));
        assert_eq!(pick_target(&[], 0.0, 0.5, &mut rng), None);
    }
}
