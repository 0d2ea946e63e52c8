//! Greedy per-tier packing
//!
//! Commercials go first, in candidate order, each taken only when it still
//! fits the budget. Once commercials cover [`COMMERCIAL_SHARE`] of the budget
//! no further commercials are considered; shorts then top the tier up to the
//! full budget.

use loom_common::MediaItem;
use std::time::Duration;

/// Share of a tier budget at which commercial packing stops
pub const COMMERCIAL_SHARE: f64 = 0.8;

/// Items chosen for one tier, in play order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackedTier {
    pub items: Vec<MediaItem>,
    pub duration: Duration,
}

impl PackedTier {
    fn try_add(&mut self, item: &MediaItem, budget: Duration) -> bool {
        if self.duration + item.duration <= budget {
            self.duration += item.duration;
            self.items.push(item.clone());
            true
        } else {
            false
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Pack `commercials` then `shorts` into `budget`
///
/// The sum of the returned items never exceeds `budget`.
pub fn pack_tier(commercials: &[MediaItem], shorts: &[MediaItem], budget: Duration) -> PackedTier {
    let mut packed = PackedTier::default();
    let commercial_cutoff = budget.mul_f64(COMMERCIAL_SHARE);

    for item in commercials {
        if packed.duration >= commercial_cutoff {
            break;
        }
        packed.try_add(item, budget);
    }

    for item in shorts {
        if packed.duration >= budget {
            break;
        }
        packed.try_add(item, budget);
    }

    packed
}
