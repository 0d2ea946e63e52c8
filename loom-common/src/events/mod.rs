//! Event types for the stream director
//!
//! Events are broadcast over [`EventBus`]; every subscriber sees every event
//! emitted after it subscribed.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{MediaKind, StreamVariant};

mod stream_types;

pub use stream_types::{QueueChangeTrigger, StreamState};

/// Stream director events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LoomEvent {
    /// Stream lifecycle transition
    StreamStateChanged {
        old_state: StreamState,
        new_state: StreamState,
        timestamp: DateTime<Utc>,
    },

    /// A block was handed to the playback driver
    BlockEnqueued {
        block_id: Uuid,
        label: String,
        start_time: DateTime<FixedOffset>,
        trigger: QueueChangeTrigger,
        timestamp: DateTime<Utc>,
    },

    /// Blocks were appended to the upcoming queue
    ScheduleExtended {
        blocks_added: usize,
        /// End of the last appended block
        through: DateTime<FixedOffset>,
        trigger: QueueChangeTrigger,
        timestamp: DateTime<Utc>,
    },

    /// An item about to play has no file on disk
    ///
    /// Informational only: the block is left in place.
    MissingMediaDetected {
        block_id: Uuid,
        media_id: Uuid,
        kind: MediaKind,
        title: String,
        path: PathBuf,
        scheduled_start: DateTime<FixedOffset>,
        timestamp: DateTime<Utc>,
    },

    /// Episode progression advanced after an episode was consumed
    EpisodeCommitted {
        show_id: Uuid,
        stream_variant: StreamVariant,
        episode_number: u32,
        timestamp: DateTime<Utc>,
    },

    /// A gap could only be filled by reusing recently played buffer items
    BufferReuseApplied {
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl LoomEvent {
    /// Short event name for logging
    pub fn name(&self) -> &'static str {
        match self {
            LoomEvent::StreamStateChanged { .. } => "StreamStateChanged",
            LoomEvent::BlockEnqueued { .. } => "BlockEnqueued",
            LoomEvent::ScheduleExtended { .. } => "ScheduleExtended",
            LoomEvent::MissingMediaDetected { .. } => "MissingMediaDetected",
            LoomEvent::EpisodeCommitted { .. } => "EpisodeCommitted",
            LoomEvent::BufferReuseApplied { .. } => "BufferReuseApplied",
        }
    }
}

/// Broadcast bus for [`LoomEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LoomEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<LoomEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: LoomEvent) -> Result<usize, broadcast::error::SendError<LoomEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: LoomEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
