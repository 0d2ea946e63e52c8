//! Missing-media detection
//!
//! Before items start playing the scheduler checks their files exist. A
//! missing file is reported through a [`MissingMediaHandler`]; the block
//! stays in the queue.

use crate::config::SchedulerConfig;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use loom_common::{MediaBlock, MediaKind};
use std::path::PathBuf;
use tracing::warn;
use uuid::Uuid;

/// One scheduled item whose file is not on disk
#[derive(Debug, Clone, PartialEq)]
pub struct MissingMedia {
    pub block_id: Uuid,
    pub media_id: Uuid,
    pub kind: MediaKind,
    pub title: String,
    pub path: PathBuf,
    pub scheduled_start: DateTime<FixedOffset>,
}

/// Reaction to a missing file
#[async_trait]
pub trait MissingMediaHandler: Send + Sync {
    async fn handle(&self, missing: &MissingMedia) -> Result<()>;
}

/// Logs the missing item and leaves the schedule untouched
#[derive(Debug, Default, Clone, Copy)]
pub struct ReportOnlyHandler;

#[async_trait]
impl MissingMediaHandler for ReportOnlyHandler {
    async fn handle(&self, missing: &MissingMedia) -> Result<()> {
        warn!(
            kind = %missing.kind,
            title = %missing.title,
            block_id = %missing.block_id,
            path = %missing.path.display(),
            scheduled = %missing.scheduled_start.to_rfc3339(),
            "Scheduled media file missing"
        );
        Ok(())
    }
}

/// Items starting in `[from, until)` whose resolved path does not exist
pub async fn find_missing<'a>(
    blocks: impl Iterator<Item = &'a MediaBlock>,
    from: DateTime<FixedOffset>,
    until: DateTime<FixedOffset>,
    config: &SchedulerConfig,
) -> Vec<MissingMedia> {
    let mut missing = Vec::new();
    for block in blocks {
        for (start, item) in block.timeline() {
            if start < from || start >= until {
                continue;
            }
            let path = config.resolve_media_path(item);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                continue;
            }
            missing.push(MissingMedia {
                block_id: block.id,
                media_id: item.id,
                kind: item.kind,
                title: item.title.clone(),
                path,
                scheduled_start: start,
            });
        }
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use loom_common::MediaItem;
    use std::time::Duration;

    #[tokio::test]
    async fn test_only_items_inside_window_are_checked() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("present.mp4"), b"x").unwrap();
        let config = SchedulerConfig::new(dir.path());

        let start = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 1, 20, 0, 0)
            .unwrap();
        let mut block = MediaBlock::new(start);
        let items = [("Present", "present.mp4"), ("Gone", "gone.mp4"), ("Later", "later.mp4")];
        for (title, path) in items {
            block
                .buffer_items
                .push(MediaItem::new(MediaKind::Short, title, Duration::from_secs(60), path));
        }

        let missing = find_missing(
            std::iter::once(&block),
            start,
            start + chrono::Duration::seconds(120),
            &config,
        )
        .await;

        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].title, "Gone");
        assert_eq!(missing[0].scheduled_start, start + chrono::Duration::seconds(60));
        assert_eq!(missing[0].path, dir.path().join("gone.mp4"));
    }
}
