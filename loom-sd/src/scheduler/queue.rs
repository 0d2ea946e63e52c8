//! On-deck and upcoming block queues
//!
//! A block lives in exactly one queue. On-deck holds the block playing now
//! and the one after it; upcoming is the unbounded reservoir behind them.

use chrono::{DateTime, FixedOffset};
use loom_common::MediaBlock;
use std::collections::VecDeque;

/// Blocks kept on deck (playing + next)
pub const ON_DECK_SLOTS: usize = 2;

#[derive(Debug, Default)]
pub struct BlockQueues {
    on_deck: VecDeque<MediaBlock>,
    upcoming: VecDeque<MediaBlock>,
}

impl BlockQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_deck(&self) -> &VecDeque<MediaBlock> {
        &self.on_deck
    }

    pub fn upcoming(&self) -> &VecDeque<MediaBlock> {
        &self.upcoming
    }

    pub fn on_deck_len(&self) -> usize {
        self.on_deck.len()
    }

    pub fn upcoming_len(&self) -> usize {
        self.upcoming.len()
    }

    pub fn is_empty(&self) -> bool {
        self.on_deck.is_empty() && self.upcoming.is_empty()
    }

    pub fn extend_upcoming(&mut self, blocks: impl IntoIterator<Item = MediaBlock>) {
        self.upcoming.extend(blocks);
    }

    /// Move blocks from upcoming until on-deck is full
    ///
    /// Returns the moved blocks, which still need to reach the driver.
    pub fn fill_on_deck(&mut self) -> Vec<MediaBlock> {
        let mut moved = Vec::new();
        while self.on_deck.len() < ON_DECK_SLOTS {
            let Some(block) = self.upcoming.pop_front() else {
                break;
            };
            moved.push(block.clone());
            self.on_deck.push_back(block);
        }
        moved
    }

    /// Whether the second on-deck block has started
    pub fn is_due(&self, now: DateTime<FixedOffset>) -> bool {
        self.on_deck.len() >= ON_DECK_SLOTS
            && self.on_deck.get(1).is_some_and(|next| now >= next.start_time)
    }

    /// Retire the first on-deck block and promote one upcoming block
    ///
    /// Returns the retired block and the promoted one, if any.
    pub fn advance(&mut self) -> Option<(MediaBlock, Option<MediaBlock>)> {
        let finished = self.on_deck.pop_front()?;
        let promoted = self.upcoming.pop_front();
        if let Some(block) = &promoted {
            self.on_deck.push_back(block.clone());
        }
        Some((finished, promoted))
    }

    /// End of the last scheduled block
    pub fn last_end(&self) -> Option<DateTime<FixedOffset>> {
        self.upcoming
            .back()
            .or_else(|| self.on_deck.back())
            .map(MediaBlock::end_time)
    }

    /// All queued blocks, on-deck first
    pub fn blocks(&self) -> impl Iterator<Item = &MediaBlock> {
        self.on_deck.iter().chain(self.upcoming.iter())
    }

    pub fn clear(&mut self) {
        self.on_deck.clear();
        self.upcoming.clear();
    }
}
