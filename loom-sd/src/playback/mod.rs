//! Playback driver seam
//!
//! The scheduler never renders media itself. Assembled blocks are handed to a
//! [`PlaybackDriver`], which owns the actual output.

use crate::Result;
use async_trait::async_trait;
use loom_common::MediaBlock;
use serde::{Deserialize, Serialize};

pub mod channel;
pub mod logging;

pub use channel::{ChannelDriver, DriverCommand};
pub use logging::LoggingDriver;

/// Driver health report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverHealth {
    pub healthy: bool,
    pub detail: String,
}

impl DriverHealth {
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            healthy: true,
            detail: detail.into(),
        }
    }

    pub fn degraded(detail: impl Into<String>) -> Self {
        Self {
            healthy: false,
            detail: detail.into(),
        }
    }
}

/// External renderer of the stream
#[async_trait]
pub trait PlaybackDriver: Send + Sync {
    /// Append a block after everything already handed over
    async fn enqueue(&self, block: &MediaBlock) -> Result<()>;

    async fn play(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    /// Halt output and drop anything still queued in the driver
    async fn stop(&self) -> Result<()>;

    async fn health_check(&self) -> Result<DriverHealth>;
}
