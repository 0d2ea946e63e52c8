//! Log-only playback driver
//!
//! Used when no renderer is attached: every command is logged and counted.

use super::{DriverHealth, PlaybackDriver};
use crate::Result;
use async_trait::async_trait;
use loom_common::MediaBlock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct LoggingDriver {
    enqueued: AtomicUsize,
    playing: AtomicBool,
}

impl LoggingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks enqueued since creation
    pub fn enqueued_count(&self) -> usize {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PlaybackDriver for LoggingDriver {
    async fn enqueue(&self, block: &MediaBlock) -> Result<()> {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        info!(
            block_id = %block.id,
            start = %block.start_time.to_rfc3339(),
            items = block.buffer_items.len() + usize::from(block.main_media.is_some()),
            "Enqueue block: {}",
            block.label()
        );
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        self.playing.store(true, Ordering::Relaxed);
        info!("Playback: play");
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.playing.store(false, Ordering::Relaxed);
        info!("Playback: pause");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.playing.store(false, Ordering::Relaxed);
        info!("Playback: stop");
        Ok(())
    }

    async fn health_check(&self) -> Result<DriverHealth> {
        Ok(DriverHealth::ok(format!(
            "logging driver, {} blocks enqueued",
            self.enqueued_count()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    #[tokio::test]
    async fn test_counts_enqueues_and_tracks_play_state() {
        let driver = LoggingDriver::new();
        let start = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 1, 20, 0, 0)
            .unwrap();

        driver.enqueue(&MediaBlock::new(start)).await.unwrap();
        driver.enqueue(&MediaBlock::new(start)).await.unwrap();
        assert_eq!(driver.enqueued_count(), 2);

        driver.play().await.unwrap();
        assert!(driver.is_playing());
        driver.stop().await.unwrap();
        assert!(!driver.is_playing());
        assert!(driver.health_check().await.unwrap().healthy);
    }
}
