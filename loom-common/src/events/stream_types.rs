//! Stream lifecycle type definitions

use serde::{Deserialize, Serialize};

/// Lifecycle state of the programmed stream
///
/// `Stopped -> Initializing -> Running`; a continuous stream cycles through
/// `RegeneratingNextDay` once per day while its next day is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum StreamState {
    Stopped,
    Initializing,
    Running,
    RegeneratingNextDay,
}

impl StreamState {
    /// Whether the tick loop should be driving this stream
    pub fn is_active(&self) -> bool {
        !matches!(self, StreamState::Stopped)
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamState::Stopped => write!(f, "Stopped"),
            StreamState::Initializing => write!(f, "Initializing"),
            StreamState::Running => write!(f, "Running"),
            StreamState::RegeneratingNextDay => write!(f, "RegeneratingNextDay"),
        }
    }
}

/// Why a block moved into (or towards) the playback driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum QueueChangeTrigger {
    /// Initial fill when a stream starts
    StreamStart,
    /// On-deck advanced because the next block's start time was reached
    Advancement,
    /// Next day's schedule appended to upcoming
    DayRegeneration,
}

impl std::fmt::Display for QueueChangeTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueChangeTrigger::StreamStart => write!(f, "StreamStart"),
            QueueChangeTrigger::Advancement => write!(f, "Advancement"),
            QueueChangeTrigger::DayRegeneration => write!(f, "DayRegeneration"),
        }
    }
}
