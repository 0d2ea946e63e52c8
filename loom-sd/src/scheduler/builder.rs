//! Block assembly
//!
//! A block is one main item in a slot rounded up to its bucket, preceded by
//! the buffer that fills the rest of the slot: default promo, then tiered
//! buffer fill, then music.

use super::StreamScheduler;
use crate::config::{BUFFER_USAGE_CONTEXT, MAIN_USAGE_CONTEXT, MUSIC_USAGE_CONTEXT};
use crate::mosaic::MusicRequest;
use crate::progression::episode_slot;
use crate::refract::RefractOptions;
use crate::spectrum::FillRequest;
use crate::Result;
use chrono::{DateTime, FixedOffset, Utc};
use loom_common::events::LoomEvent;
use loom_common::models::MainMedia;
use loom_common::tags::TagContext;
use loom_common::time::round_up_to;
use loom_common::{MediaBlock, MediaItem, MediaKind, Tag};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A placed main item with everything the gap fill needs
struct PlacedMain {
    main: MainMedia,
    /// Item tags plus show tags for episodes
    tags: Vec<Tag>,
    slot: Duration,
}

impl StreamScheduler {
    /// Build consecutive blocks from `from` until one ends at or past `until`
    pub(super) async fn build_until(
        &mut self,
        from: DateTime<FixedOffset>,
        until: DateTime<FixedOffset>,
    ) -> Result<Vec<MediaBlock>> {
        let mut blocks = Vec::new();
        let mut cursor = from;

        while cursor < until {
            let block = self.build_block(cursor).await?;
            let end = block.end_time();
            if end <= cursor {
                warn!(
                    at = %cursor.to_rfc3339(),
                    "Library produced an empty block, schedule ends early"
                );
                break;
            }
            cursor = end;
            blocks.push(block);
        }

        debug!(
            blocks = blocks.len(),
            from = %from.to_rfc3339(),
            through = %cursor.to_rfc3339(),
            "Built schedule segment"
        );
        Ok(blocks)
    }

    /// Build the block starting at `start`
    pub(super) async fn build_block(&mut self, start: DateTime<FixedOffset>) -> Result<MediaBlock> {
        let previous_tags = self
            .last_source
            .as_ref()
            .map(|s| s.tags.clone())
            .unwrap_or_default();

        let placed = self.place_main(start).await?;
        let (gap, main_tags) = match &placed {
            Some(p) => (p.slot.saturating_sub(p.main.duration()), p.tags.clone()),
            None => (self.config.slot, Vec::new()),
        };

        let buffer = self
            .fill_gap(start, gap, &main_tags, &previous_tags)
            .await?;

        let mut block = MediaBlock::new(start);
        block.buffer_items = buffer;
        if let Some(placed) = placed {
            let mut source = placed.main.item().clone();
            source.tags = placed.tags;
            self.last_source = Some(source);
            block.main_media = Some(placed.main);
        }

        debug!(
            start = %start.to_rfc3339(),
            buffer_items = block.buffer_items.len(),
            duration_s = block.duration().as_secs(),
            "Built block: {}",
            block.label()
        );
        Ok(block)
    }

    /// Pick and place the main item: walk from the last one, else seed
    async fn place_main(&mut self, start: DateTime<FixedOffset>) -> Result<Option<PlacedMain>> {
        let mut options = RefractOptions::new(self.mode.variant(), start);
        options.min_distance = self.config.min_distance;
        options.max_distance = self.config.max_distance;
        options.usage_context = Some(MAIN_USAGE_CONTEXT.to_string());
        options.lookback = self.config.main_lookback;
        options.session_id = self.session_id;
        options.planned_offsets = self.planned.clone();

        let mut main = None;
        if let Some(source) = &self.last_source {
            let walk = self
                .refract
                .select_next(source, &options, self.rng.as_mut())
                .await?;
            if let Some(reason) = &walk.trace.reason {
                debug!(reason = %reason, "Relationship walk failed, seeding");
            }
            main = walk.selection;
        }

        if main.is_none() {
            main = self.refract.select_seed(&options, self.rng.as_mut()).await?.selection;
        }

        if main.is_none() {
            warn!("Every main item was used recently, allowing repeats");
            options.usage_context = None;
            main = self.refract.select_seed(&options, self.rng.as_mut()).await?.selection;
            if let Some(picked) = &main {
                self.record_main_reuse(picked, start).await?;
            }
        }

        let Some(main) = main else {
            warn!("No main media available, scheduling a buffer-only slot");
            return Ok(None);
        };

        let placed = match &main {
            MainMedia::Movie(item) => PlacedMain {
                tags: item.tags.clone(),
                slot: round_up_to(item.duration, self.config.slot),
                main: main.clone(),
            },
            MainMedia::Episode { show_id, episode, .. } => {
                *self.planned.entry(*show_id).or_insert(0) += 1;
                match self.store.find_show(*show_id).await? {
                    Some(show) => {
                        let mut tags = episode.item.tags.clone();
                        for tag in &show.tags {
                            if !tags.iter().any(|t| t.name == tag.name) {
                                tags.push(tag.clone());
                            }
                        }
                        PlacedMain {
                            tags,
                            slot: episode_slot(&show, episode),
                            main: main.clone(),
                        }
                    }
                    None => PlacedMain {
                        tags: episode.item.tags.clone(),
                        slot: round_up_to(episode.item.duration, self.config.slot),
                        main: main.clone(),
                    },
                }
            }
        };
        Ok(Some(placed))
    }

    /// Usage for a main item picked with exclusion switched off
    async fn record_main_reuse(
        &self,
        main: &MainMedia,
        start: DateTime<FixedOffset>,
    ) -> Result<()> {
        let (media_id, kind) = match main {
            MainMedia::Movie(item) => (item.id, MediaKind::Movie),
            MainMedia::Episode { show_id, .. } => (*show_id, MediaKind::Show),
        };
        let record = loom_common::models::UsageRecord::new(
            media_id,
            kind,
            MAIN_USAGE_CONTEXT,
            start.with_timezone(&Utc),
        )
        .with_session(self.session_id);
        self.store.record_usage(&record).await
    }

    /// Fill `gap` with promo, buffer and music
    async fn fill_gap(
        &mut self,
        start: DateTime<FixedOffset>,
        gap: Duration,
        main_tags: &[Tag],
        previous_tags: &[Tag],
    ) -> Result<Vec<MediaItem>> {
        let mut buffer = Vec::new();
        let mut remaining = gap;
        if remaining.is_zero() {
            return Ok(buffer);
        }

        if let Some(promo) = self.default_promo().await? {
            if promo.duration <= remaining {
                remaining -= promo.duration;
                buffer.push(promo);
            }
        }

        let adjacent: Vec<Tag> = main_tags.iter().chain(previous_tags).cloned().collect();

        if !remaining.is_zero() {
            let context = TagContext::from_tags(&adjacent, start.date_naive());
            let request = FillRequest::new(remaining, context, start).with_usage(
                BUFFER_USAGE_CONTEXT,
                self.config.buffer_lookback,
                self.session_id,
            );
            let fill = self.spectrum.fill(&request, self.rng.as_mut()).await?;
            let reuse = fill
                .stats
                .reusage_reason
                .clone()
                .filter(|_| fill.stats.reusage_applied);
            if let Some(reason) = reuse {
                self.events.emit_lossy(LoomEvent::BufferReuseApplied {
                    reason,
                    timestamp: Utc::now(),
                });
            }
            remaining = remaining.saturating_sub(fill.stats.duration_filled);
            buffer.extend(fill.items);
        }

        if !remaining.is_zero() {
            let names: Vec<&str> = main_tags.iter().map(|t| t.name.as_str()).collect();
            let facet_ids: Vec<_> = self
                .store
                .all_facets()
                .await?
                .into_iter()
                .filter(|f| f.matches(&names))
                .map(|f| f.id)
                .collect();

            let mut exclude = Vec::new();
            while !remaining.is_zero() {
                let mut request = MusicRequest::new(facet_ids.clone(), adjacent.clone(), start);
                request.max_duration = Some(remaining);
                request.usage_context = Some(MUSIC_USAGE_CONTEXT.to_string());
                request.lookback = self.config.buffer_lookback;
                request.session_id = self.session_id;
                request.specialty_honor_probability = self.config.specialty_honor_probability;
                request.exclude_ids = exclude.clone();

                let selection = self.mosaic.select(&request, self.rng.as_mut()).await?;
                let Some(track) = selection.track else {
                    break;
                };
                remaining = remaining.saturating_sub(track.duration);
                exclude.push(track.id);
                buffer.push(track);
            }
        }

        if !remaining.is_zero() {
            info!(
                gap_s = gap.as_secs(),
                unfilled_s = remaining.as_secs(),
                at = %start.to_rfc3339(),
                "Gap underfilled, block ends early"
            );
        }
        Ok(buffer)
    }

    /// The configured default promo, looked up by path
    async fn default_promo(&self) -> Result<Option<MediaItem>> {
        let Some(path) = &self.config.default_promo else {
            return Ok(None);
        };
        let promos = self.store.all_media(MediaKind::Promo).await?;
        let promo = promos.into_iter().find(|p| self.config.is_default_promo(&p.path));
        if promo.is_none() {
            warn!(path = %path.display(), "Default promo not found in library");
        }
        Ok(promo)
    }
}
