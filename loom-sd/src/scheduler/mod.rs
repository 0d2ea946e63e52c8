//! Stream scheduler
//!
//! Owns the on-deck/upcoming queues and the day markers, builds blocks with
//! the selection engines and hands them to the playback driver. The
//! scheduler is the only writer of its queues; [`StreamService`] serialises
//! ticks and control calls behind one lock.
//!
//! **State machine:**
//! - `Stopped -> Initializing -> Running` on start
//! - `Running -> RegeneratingNextDay -> Running` once a day (continuous only)
//! - any state `-> Stopped` on stop, or when an ad-hoc stream reaches its end
//! - any state `-> Stopped` on shutdown, which keeps the persisted stream

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::mosaic::MosaicEngine;
use crate::playback::PlaybackDriver;
use crate::progression::ProgressionTracker;
use crate::refract::RefractEngine;
use crate::spectrum::SpectrumEngine;
use crate::store::{PersistedStream, Store};
use crate::{Error, Result};
use chrono::{DateTime, FixedOffset, Utc};
use loom_common::events::{EventBus, LoomEvent, QueueChangeTrigger, StreamState};
use loom_common::models::MainMedia;
use loom_common::tags::AgeLadder;
use loom_common::{MediaBlock, MediaItem, StreamVariant};
use rand::RngCore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

mod builder;
pub mod markers;
pub mod queue;
mod service;
pub mod validation;

pub use markers::DayMarkers;
pub use queue::{BlockQueues, ON_DECK_SLOTS};
pub use service::StreamService;
pub use validation::{MissingMedia, MissingMediaHandler, ReportOnlyHandler};

/// What the stream is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    Idle,
    Continuous,
    Adhoc { end_time: DateTime<FixedOffset> },
}

impl StreamMode {
    pub fn variant(&self) -> StreamVariant {
        match self {
            StreamMode::Adhoc { .. } => StreamVariant::Adhoc,
            _ => StreamVariant::Continuous,
        }
    }
}

/// Control-surface status snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamStatus {
    pub is_continuous: bool,
    pub on_deck_length: usize,
    pub upcoming_length: usize,
    pub state: StreamState,
    pub session_id: Option<Uuid>,
    pub end_time: Option<DateTime<FixedOffset>>,
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    pub missing: usize,
    pub advanced: usize,
    pub tomorrow_rolled: bool,
    pub regenerated_blocks: Option<usize>,
    pub stopped: bool,
}

pub struct StreamScheduler {
    config: SchedulerConfig,
    store: Arc<dyn Store>,
    driver: Arc<dyn PlaybackDriver>,
    clock: Arc<dyn Clock>,
    rng: Box<dyn RngCore + Send + Sync>,
    events: EventBus,
    missing_handler: Arc<dyn MissingMediaHandler>,

    progression: ProgressionTracker,
    refract: RefractEngine,
    spectrum: SpectrumEngine,
    mosaic: MosaicEngine,

    queues: BlockQueues,
    markers: Option<DayMarkers>,
    state: StreamState,
    mode: StreamMode,
    session_id: Option<Uuid>,

    /// Last main item placed, tagged for the next relationship walk
    last_source: Option<MediaItem>,
    /// Episodes planned per show beyond its committed progression
    planned: HashMap<Uuid, usize>,
}

impl StreamScheduler {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn Store>,
        driver: Arc<dyn PlaybackDriver>,
        clock: Arc<dyn Clock>,
        rng: Box<dyn RngCore + Send + Sync>,
    ) -> Self {
        let progression = ProgressionTracker::new(store.clone());
        Self {
            refract: RefractEngine::new(store.clone(), progression.clone()),
            spectrum: SpectrumEngine::new(store.clone()),
            mosaic: MosaicEngine::new(store.clone()),
            progression,
            config,
            store,
            driver,
            clock,
            rng,
            events: EventBus::default(),
            missing_handler: Arc::new(ReportOnlyHandler),
            queues: BlockQueues::new(),
            markers: None,
            state: StreamState::Stopped,
            mode: StreamMode::Idle,
            session_id: None,
            last_source: None,
            planned: HashMap::new(),
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_missing_media_handler(mut self, handler: Arc<dyn MissingMediaHandler>) -> Self {
        self.missing_handler = handler;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    pub fn queues(&self) -> &BlockQueues {
        &self.queues
    }

    pub fn markers(&self) -> Option<&DayMarkers> {
        self.markers.as_ref()
    }

    pub fn status(&self) -> StreamStatus {
        StreamStatus {
            is_continuous: self.mode == StreamMode::Continuous,
            on_deck_length: self.queues.on_deck_len(),
            upcoming_length: self.queues.upcoming_len(),
            state: self.state,
            session_id: self.session_id,
            end_time: match self.mode {
                StreamMode::Adhoc { end_time } => Some(end_time),
                _ => None,
            },
        }
    }

    /// Start a 24/7 stream programmed through the next day boundary
    pub async fn start_continuous(&mut self) -> Result<StreamStatus> {
        self.begin_continuous(Uuid::new_v4()).await
    }

    /// Start a stream that ends at `end_time` and is never regenerated
    pub async fn start_adhoc(&mut self, end_time: DateTime<FixedOffset>) -> Result<StreamStatus> {
        self.begin_adhoc(end_time, Uuid::new_v4()).await
    }

    async fn begin_continuous(&mut self, session_id: Uuid) -> Result<StreamStatus> {
        let now = self.clock.now();
        let markers = DayMarkers::new(now, self.config.end_of_day, self.clock.zone());
        let horizon = markers.horizon();
        self.start(StreamMode::Continuous, session_id, now, horizon, markers)
            .await
    }

    async fn begin_adhoc(
        &mut self,
        end_time: DateTime<FixedOffset>,
        session_id: Uuid,
    ) -> Result<StreamStatus> {
        let now = self.clock.now();
        if end_time <= now {
            return Err(Error::Validation(format!(
                "Ad-hoc end time {} is not in the future",
                end_time.to_rfc3339()
            )));
        }
        let markers = DayMarkers::new(now, self.config.end_of_day, self.clock.zone());
        self.start(StreamMode::Adhoc { end_time }, session_id, now, end_time, markers)
            .await
    }

    async fn start(
        &mut self,
        mode: StreamMode,
        session_id: Uuid,
        now: DateTime<FixedOffset>,
        until: DateTime<FixedOffset>,
        markers: DayMarkers,
    ) -> Result<StreamStatus> {
        if self.state.is_active() {
            return Err(Error::InvalidState(format!(
                "Stream already {}",
                self.state
            )));
        }

        self.set_state(StreamState::Initializing);
        match self.driver.health_check().await {
            Ok(health) if !health.healthy => warn!("Playback driver degraded: {}", health.detail),
            Ok(health) => debug!("Playback driver: {}", health.detail),
            Err(e) => warn!("Playback driver health check failed: {}", e),
        }
        self.mode = mode;
        self.session_id = Some(session_id);
        self.markers = Some(markers);
        self.queues.clear();
        self.planned.clear();
        self.last_source = None;
        self.refresh_tag_cache().await;

        let blocks = match self.build_until(now, until).await {
            Ok(blocks) => blocks,
            Err(e) => {
                error!("Failed to build initial schedule: {}", e);
                self.reset();
                self.set_state(StreamState::Stopped);
                return Err(e);
            }
        };

        let added = blocks.len();
        self.queues.extend_upcoming(blocks);
        self.emit_schedule_extended(added, QueueChangeTrigger::StreamStart);
        self.enqueue_on_deck(QueueChangeTrigger::StreamStart).await;

        if let Err(e) = self.driver.play().await {
            error!("Playback driver failed to start: {}", e);
        }

        self.persist().await;
        self.set_state(StreamState::Running);
        info!(
            session = ?self.session_id,
            blocks = added,
            until = %until.to_rfc3339(),
            "Stream started"
        );
        Ok(self.status())
    }

    /// Stop immediately: clears both queues and halts the driver
    pub async fn stop(&mut self) -> Result<()> {
        if let Err(e) = self.driver.stop().await {
            error!("Playback driver failed to stop: {}", e);
        }
        self.reset();
        self.set_state(StreamState::Stopped);
        self.persist().await;
        info!("Stream stopped");
        Ok(())
    }

    /// Halt for process exit, leaving the persisted stream to be resumed
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Err(e) = self.driver.stop().await {
            error!("Playback driver failed to stop: {}", e);
        }
        if self.state.is_active() {
            self.persist().await;
        }
        let session = self.session_id;
        self.reset();
        self.set_state(StreamState::Stopped);
        info!(?session, "Stream halted for shutdown");
        Ok(())
    }

    /// Resume whatever stream was active before a restart
    pub async fn resume_persisted(&mut self) -> Result<Option<StreamStatus>> {
        match self.store.load_stream_state().await? {
            PersistedStream::Stopped => Ok(None),
            PersistedStream::Continuous { session_id } => {
                info!(%session_id, "Resuming continuous stream");
                self.begin_continuous(session_id).await.map(Some)
            }
            PersistedStream::Adhoc { session_id, end_time } => {
                if end_time > self.clock.now() {
                    info!(%session_id, end = %end_time.to_rfc3339(), "Resuming ad-hoc stream");
                    self.begin_adhoc(end_time, session_id).await.map(Some)
                } else {
                    info!(%session_id, "Persisted ad-hoc stream already ended");
                    self.persist().await;
                    Ok(None)
                }
            }
        }
    }

    /// One scheduler tick
    ///
    /// Each step logs its own failures; a failing step never aborts the tick.
    pub async fn tick(&mut self) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        if !self.state.is_active() {
            return outcome;
        }

        let now = self.clock.now();

        if let StreamMode::Adhoc { end_time } = self.mode {
            if now >= end_time {
                info!(end = %end_time.to_rfc3339(), "Ad-hoc stream reached its end time");
                self.commit_played_through(end_time).await;
                if let Err(e) = self.stop().await {
                    error!("Failed to stop ad-hoc stream: {}", e);
                }
                outcome.stopped = true;
                return outcome;
            }
        }

        outcome.missing = self.check_missing_media(now).await;
        outcome.advanced = self.advance_due(now).await;

        if let Some(markers) = self.markers.as_mut() {
            if markers.tomorrow_passed(now) {
                markers.roll_tomorrow(now);
                debug!(tomorrow = %markers.tomorrow.to_rfc3339(), "Day rolled over");
                outcome.tomorrow_rolled = true;
            }
        }
        if outcome.tomorrow_rolled {
            self.refresh_tag_cache().await;
            self.purge_usage(now).await;
        }

        let regenerate = self.mode == StreamMode::Continuous
            && self.markers.is_some_and(|m| m.end_of_day_passed(now));
        if regenerate {
            outcome.regenerated_blocks = Some(self.regenerate_next_day(now).await);
        }

        outcome
    }

    async fn check_missing_media(&mut self, now: DateTime<FixedOffset>) -> usize {
        let window = chrono::Duration::from_std(self.config.tick_interval)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let missing =
            validation::find_missing(self.queues.blocks(), now, now + window, &self.config).await;

        for item in &missing {
            if let Err(e) = self.missing_handler.handle(item).await {
                error!("Missing-media handler failed for '{}': {}", item.title, e);
            }
            self.events.emit_lossy(LoomEvent::MissingMediaDetected {
                block_id: item.block_id,
                media_id: item.media_id,
                kind: item.kind,
                title: item.title.clone(),
                path: item.path.clone(),
                scheduled_start: item.scheduled_start,
                timestamp: Utc::now(),
            });
        }
        missing.len()
    }

    /// Retire every on-deck block whose successor has started
    async fn advance_due(&mut self, now: DateTime<FixedOffset>) -> usize {
        let mut advanced = 0;
        while self.queues.is_due(now) {
            let Some((finished, promoted)) = self.queues.advance() else {
                break;
            };
            advanced += 1;
            debug!(block = %finished.label(), "Block finished");

            if let Some(MainMedia::Episode { show_id, episode, .. }) = &finished.main_media {
                self.commit_episode(*show_id, episode.episode_number).await;
            }

            if let Some(block) = promoted {
                self.enqueue_block(&block, QueueChangeTrigger::Advancement).await;
            }
        }

        if advanced > 1 {
            info!(advanced, "Caught up on overdue blocks");
        }
        self.enqueue_on_deck(QueueChangeTrigger::Advancement).await;
        advanced
    }

    async fn commit_episode(&mut self, show_id: Uuid, episode_number: u32) {
        if let Some(count) = self.planned.get_mut(&show_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.planned.remove(&show_id);
            }
        }

        let variant = self.mode.variant();
        let show = match self.store.find_show(show_id).await {
            Ok(Some(show)) => show,
            Ok(None) => {
                warn!(%show_id, "Played episode belongs to a deleted show");
                return;
            }
            Err(e) => {
                error!(%show_id, "Failed to load show for progression: {}", e);
                return;
            }
        };

        let played_at = self.clock.now().with_timezone(&Utc);
        match self
            .progression
            .commit_episode_played(&show, variant, episode_number, played_at)
            .await
        {
            Ok(_) => self.events.emit_lossy(LoomEvent::EpisodeCommitted {
                show_id,
                stream_variant: variant,
                episode_number,
                timestamp: Utc::now(),
            }),
            Err(e) => error!(
                show = %show.title,
                "Failed to commit episode {}: {}", episode_number, e
            ),
        }
    }

    /// Commit the episode of every queued block that finished by `end`
    ///
    /// Covers the tail of an ad-hoc stream, whose last blocks never get a
    /// successor to retire them.
    async fn commit_played_through(&mut self, end: DateTime<FixedOffset>) {
        let played: Vec<(Uuid, u32)> = self
            .queues
            .blocks()
            .filter(|block| block.end_time() <= end)
            .filter_map(|block| match &block.main_media {
                Some(MainMedia::Episode { show_id, episode, .. }) => {
                    Some((*show_id, episode.episode_number))
                }
                _ => None,
            })
            .collect();

        for (show_id, episode_number) in played {
            self.commit_episode(show_id, episode_number).await;
        }
    }

    /// Build the next day and append it to upcoming
    async fn regenerate_next_day(&mut self, now: DateTime<FixedOffset>) -> usize {
        let Some(markers) = self.markers.as_mut() else {
            return 0;
        };
        // Re-arm first so a failed build is not retried every tick
        let marker = markers.roll_end_of_day(now);
        let horizon = markers.horizon();

        self.set_state(StreamState::RegeneratingNextDay);
        let from = self.queues.last_end().map_or(now, |end| end.max(now));
        info!(
            from = %from.to_rfc3339(),
            through = %horizon.to_rfc3339(),
            next_marker = %marker.to_rfc3339(),
            "Regenerating next day"
        );

        let added = match self.build_until(from, horizon).await {
            Ok(blocks) => {
                let added = blocks.len();
                self.queues.extend_upcoming(blocks);
                self.emit_schedule_extended(added, QueueChangeTrigger::DayRegeneration);
                self.enqueue_on_deck(QueueChangeTrigger::DayRegeneration).await;
                added
            }
            Err(e) => {
                error!("Next-day regeneration failed: {}", e);
                0
            }
        };

        self.set_state(StreamState::Running);
        added
    }

    /// Top up on-deck from upcoming and forward the moved blocks
    async fn enqueue_on_deck(&mut self, trigger: QueueChangeTrigger) {
        for block in self.queues.fill_on_deck() {
            self.enqueue_block(&block, trigger).await;
        }
    }

    async fn enqueue_block(&self, block: &MediaBlock, trigger: QueueChangeTrigger) {
        if let Err(e) = self.driver.enqueue(block).await {
            error!(block_id = %block.id, "Playback driver rejected block: {}", e);
            return;
        }
        self.events.emit_lossy(LoomEvent::BlockEnqueued {
            block_id: block.id,
            label: block.label(),
            start_time: block.start_time,
            trigger,
            timestamp: Utc::now(),
        });
    }

    fn emit_schedule_extended(&self, added: usize, trigger: QueueChangeTrigger) {
        let Some(through) = self.queues.last_end() else {
            return;
        };
        self.events.emit_lossy(LoomEvent::ScheduleExtended {
            blocks_added: added,
            through,
            trigger,
            timestamp: Utc::now(),
        });
    }

    /// Reload the age ladder from the current tag vocabulary
    async fn refresh_tag_cache(&mut self) {
        match self.store.all_tags().await {
            Ok(tags) => {
                self.spectrum.set_ladder(AgeLadder::from_tags(&tags));
            }
            Err(e) => warn!("Failed to refresh tag cache: {}", e),
        }
    }

    /// Drop usage records no lookback can reach any more
    async fn purge_usage(&self, now: DateTime<FixedOffset>) {
        let max_lookback = self.config.main_lookback.max(self.config.buffer_lookback);
        match self
            .store
            .purge_stale_usage(max_lookback, now.with_timezone(&Utc))
            .await
        {
            Ok(0) => {}
            Ok(purged) => debug!(purged, "Purged stale usage records"),
            Err(e) => warn!("Failed to purge usage records: {}", e),
        }
    }

    fn set_state(&mut self, new_state: StreamState) {
        if self.state == new_state {
            return;
        }
        let old_state = self.state;
        self.state = new_state;
        debug!("Stream state {} -> {}", old_state, new_state);
        self.events.emit_lossy(LoomEvent::StreamStateChanged {
            old_state,
            new_state,
            timestamp: Utc::now(),
        });
    }

    fn reset(&mut self) {
        self.queues.clear();
        self.planned.clear();
        self.markers = None;
        self.mode = StreamMode::Idle;
        self.session_id = None;
        self.last_source = None;
    }

    async fn persist(&self) {
        let persisted = match (self.mode, self.session_id) {
            (StreamMode::Continuous, Some(session_id)) => {
                PersistedStream::Continuous { session_id }
            }
            (StreamMode::Adhoc { end_time }, Some(session_id)) => PersistedStream::Adhoc {
                session_id,
                end_time,
            },
            _ => PersistedStream::Stopped,
        };
        if let Err(e) = self.store.save_stream_state(&persisted).await {
            error!("Failed to persist stream state: {}", e);
        }
    }
}
