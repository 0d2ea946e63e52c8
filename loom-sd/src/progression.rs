//! Episode progression tracker
//!
//! One state machine per (show, stream variant): `current_episode` is 0 while
//! unstarted, then the number of the last episode confirmed played. Reads
//! preview upcoming numbers without moving the state; only
//! [`ProgressionTracker::commit_episode_played`] advances it.

use crate::store::Store;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use loom_common::models::{Episode, EpisodeProgression, Show};
use loom_common::time::round_up_to;
use loom_common::StreamVariant;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// `count` episode numbers following `current`, wrapping past `episode_count`
pub fn upcoming_episode_numbers(current: u32, episode_count: u32, count: usize) -> Vec<u32> {
    if episode_count == 0 {
        return Vec::new();
    }

    let mut next = if current == 0 || current >= episode_count {
        1
    } else {
        current + 1
    };

    let mut numbers = Vec::with_capacity(count);
    for _ in 0..count {
        numbers.push(next);
        next = if next >= episode_count { 1 } else { next + 1 };
    }
    numbers
}

/// Slot length an episode occupies: the show's bucket, or a whole number of
/// buckets for an over-duration episode
pub fn episode_slot(show: &Show, episode: &Episode) -> std::time::Duration {
    if episode.over_duration || episode.item.duration > show.duration_limit {
        round_up_to(episode.item.duration, show.duration_limit)
    } else {
        show.duration_limit
    }
}

#[derive(Clone)]
pub struct ProgressionTracker {
    store: Arc<dyn Store>,
}

impl ProgressionTracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Load the progression for (show, variant), creating it at 0 if missing
    pub async fn load_or_create(
        &self,
        show: &Show,
        variant: StreamVariant,
    ) -> Result<EpisodeProgression> {
        if let Some(progression) = self.store.find_progression(show.id, variant).await? {
            return Ok(progression);
        }

        let progression = EpisodeProgression::new(show.id, variant);
        self.store.upsert_progression(&progression).await?;
        debug!(show = %show.title, variant = %variant, "Created episode progression");
        Ok(progression)
    }

    /// Preview the next `count` episode numbers without advancing state
    pub async fn request_episodes(
        &self,
        show: &Show,
        variant: StreamVariant,
        count: usize,
    ) -> Result<Vec<u32>> {
        if show.episode_count == 0 {
            warn!("Show '{}' has no episodes", show.title);
            return Ok(Vec::new());
        }

        let progression = self.load_or_create(show, variant).await?;
        Ok(upcoming_episode_numbers(
            progression.current_episode,
            show.episode_count,
            count,
        ))
    }

    /// The episode `offset` places after the next one (0 = next)
    ///
    /// Falls back to episode 1 when the computed number is missing from the
    /// show's episode list.
    pub async fn planned_episode(
        &self,
        show: &Show,
        variant: StreamVariant,
        offset: usize,
    ) -> Result<Option<Episode>> {
        let numbers = self.request_episodes(show, variant, offset + 1).await?;
        let Some(number) = numbers.last().copied() else {
            return Ok(None);
        };

        match show.episode(number) {
            Some(episode) => Ok(Some(episode.clone())),
            None => {
                warn!(
                    "Show '{}' has no episode {}, falling back to episode 1",
                    show.title, number
                );
                Ok(show.episode(1).or_else(|| show.episodes.first()).cloned())
            }
        }
    }

    /// The next episode to play
    pub async fn next_episode(
        &self,
        show: &Show,
        variant: StreamVariant,
    ) -> Result<Option<Episode>> {
        self.planned_episode(show, variant, 0).await
    }

    /// Whether the stored progression flags the next episode over-duration
    pub async fn next_marked_over_duration(
        &self,
        show: &Show,
        variant: StreamVariant,
    ) -> Result<bool> {
        Ok(self
            .store
            .find_progression(show.id, variant)
            .await?
            .is_some_and(|p| p.next_episode_over_duration))
    }

    /// Record that `episode_number` was played
    ///
    /// Sets `current_episode`, stamps `last_played_at` and recomputes the
    /// next episode's duration limit and over-duration flag.
    pub async fn commit_episode_played(
        &self,
        show: &Show,
        variant: StreamVariant,
        episode_number: u32,
        played_at: DateTime<Utc>,
    ) -> Result<EpisodeProgression> {
        if episode_number == 0 || episode_number > show.episode_count {
            return Err(Error::Validation(format!(
                "Episode {} out of range for '{}' (1..={})",
                episode_number, show.title, show.episode_count
            )));
        }

        let mut progression = self.load_or_create(show, variant).await?;
        progression.current_episode = episode_number;
        progression.last_played_at = Some(played_at);

        let next_number = upcoming_episode_numbers(episode_number, show.episode_count, 1)
            .first()
            .copied()
            .unwrap_or(1);
        match show.episode(next_number) {
            Some(next) => {
                progression.next_episode_duration_limit = Some(episode_slot(show, next));
                progression.next_episode_over_duration = next.over_duration;
            }
            None => {
                progression.next_episode_duration_limit = Some(show.duration_limit);
                progression.next_episode_over_duration = false;
            }
        }

        self.store.upsert_progression(&progression).await?;
        info!(
            show = %show.title,
            variant = %variant,
            episode = episode_number,
            next = next_number,
            "Committed episode progression"
        );
        Ok(progression)
    }
}
