//! Buffer fill ("spectrum")
//!
//! Fills a gap with commercials and shorts in five tiers of descending match
//! quality. Each tier works against what is still unfilled and may only take
//! a fraction of it:
//!
//! | Tier      | Cap  | Tag requirement                                  |
//! |-----------|------|--------------------------------------------------|
//! | Perfect   | 30%  | active holiday AND specialty AND genre           |
//! | Good      | 40%  | holiday or specialty, plus genre when known      |
//! | Decent    | 50%  | genre                                            |
//! | Fallback  | 60%  | one arbitrary genre/specialty tag                |
//! | Emergency | 100% | none; recently used items may be reused          |
//!
//! Inside a tier holiday matches are tried before specialty matches. Music is
//! left to the mosaic selector.

use crate::store::{CandidateQuery, Store, TagFilter};
use crate::Result;
use chrono::{DateTime, FixedOffset, Utc};
use loom_common::models::UsageRecord;
use loom_common::tags::{in_season, AgeLadder, TagContext};
use loom_common::{MediaItem, MediaKind};
use rand::seq::SliceRandom;
use rand::RngCore;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub mod packing;

pub use packing::{pack_tier, PackedTier, COMMERCIAL_SHARE};

/// Recency window applied to buffer items when none is configured
pub const DEFAULT_BUFFER_LOOKBACK: Duration = Duration::from_secs(2 * 3600);

/// Match-quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Perfect,
    Good,
    Decent,
    Fallback,
    Emergency,
}

impl Tier {
    /// Tiers in the order they are attempted
    pub const ALL: [Tier; 5] = [
        Tier::Perfect,
        Tier::Good,
        Tier::Decent,
        Tier::Fallback,
        Tier::Emergency,
    ];

    /// Share of the remaining gap this tier may fill
    pub fn cap(&self) -> f64 {
        match self {
            Tier::Perfect => 0.3,
            Tier::Good => 0.4,
            Tier::Decent => 0.5,
            Tier::Fallback => 0.6,
            Tier::Emergency => 1.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Tier::Perfect => "perfect",
            Tier::Good => "good",
            Tier::Decent => "decent",
            Tier::Fallback => "fallback",
            Tier::Emergency => "emergency",
        }
    }
}

/// Tag filter for a tier, or `None` when the context cannot drive it
pub fn tier_filter<R: rand::Rng + ?Sized>(
    tier: Tier,
    context: &TagContext,
    rng: &mut R,
) -> Option<TagFilter> {
    match tier {
        Tier::Perfect => {
            if context.holiday.is_empty()
                || context.specialty.is_empty()
                || context.genre.is_empty()
            {
                return None;
            }
            Some(
                TagFilter::any()
                    .require_any_of(context.holiday.iter().cloned())
                    .require_any_of(context.specialty.iter().cloned())
                    .require_any_of(context.genre.iter().cloned())
                    .require_any_of(context.era.iter().cloned())
                    .require_any_of(context.aesthetic.iter().cloned()),
            )
        }
        Tier::Good => {
            let themed: Vec<String> = context
                .holiday
                .iter()
                .chain(&context.specialty)
                .cloned()
                .collect();
            if themed.is_empty() {
                return None;
            }
            Some(
                TagFilter::any()
                    .require_any_of(themed)
                    .require_any_of(context.genre.iter().cloned()),
            )
        }
        Tier::Decent => {
            if context.genre.is_empty() {
                return None;
            }
            Some(TagFilter::any().require_any_of(context.genre.iter().cloned()))
        }
        Tier::Fallback => {
            let pool: Vec<&String> = context.genre.iter().chain(&context.specialty).collect();
            Some(match pool.choose(rng) {
                Some(name) => TagFilter::any().require_any_of([(*name).clone()]),
                None => TagFilter::any(),
            })
        }
        Tier::Emergency => Some(TagFilter::any()),
    }
}

/// One gap to fill
#[derive(Debug, Clone)]
pub struct FillRequest {
    pub target: Duration,
    pub context: TagContext,
    /// Scheduled start of the gap; drives recency and seasonal gating
    pub at: DateTime<FixedOffset>,
    /// Recency context; `None` disables both exclusion and recording
    pub usage_context: Option<String>,
    pub lookback: Duration,
    pub session_id: Option<Uuid>,
}

impl FillRequest {
    pub fn new(target: Duration, context: TagContext, at: DateTime<FixedOffset>) -> Self {
        Self {
            target,
            context,
            at,
            usage_context: None,
            lookback: DEFAULT_BUFFER_LOOKBACK,
            session_id: None,
        }
    }

    pub fn with_usage(
        mut self,
        context: impl Into<String>,
        lookback: Duration,
        session_id: Option<Uuid>,
    ) -> Self {
        self.usage_context = Some(context.into());
        self.lookback = lookback;
        self.session_id = session_id;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FillStats {
    pub perfect_matches: usize,
    pub good_matches: usize,
    pub decent_matches: usize,
    pub fallback_matches: usize,
    pub emergency_matches: usize,
    pub duration_filled: Duration,
    pub target_duration: Duration,
    pub reusage_applied: bool,
    pub reusage_reason: Option<String>,
}

impl FillStats {
    fn count_mut(&mut self, tier: Tier) -> &mut usize {
        match tier {
            Tier::Perfect => &mut self.perfect_matches,
            Tier::Good => &mut self.good_matches,
            Tier::Decent => &mut self.decent_matches,
            Tier::Fallback => &mut self.fallback_matches,
            Tier::Emergency => &mut self.emergency_matches,
        }
    }

    pub fn matches(&self, tier: Tier) -> usize {
        match tier {
            Tier::Perfect => self.perfect_matches,
            Tier::Good => self.good_matches,
            Tier::Decent => self.decent_matches,
            Tier::Fallback => self.fallback_matches,
            Tier::Emergency => self.emergency_matches,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FillResult {
    /// Play order: tier by tier, commercials before shorts within a tier
    pub items: Vec<MediaItem>,
    pub stats: FillStats,
}

pub struct SpectrumEngine {
    store: Arc<dyn Store>,
    ladder: AgeLadder,
}

impl SpectrumEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            ladder: AgeLadder::default(),
        }
    }

    pub fn with_ladder(mut self, ladder: AgeLadder) -> Self {
        self.ladder = ladder;
        self
    }

    pub fn set_ladder(&mut self, ladder: AgeLadder) {
        self.ladder = ladder;
    }

    /// Fill `request.target` with buffer items
    pub async fn fill(
        &self,
        request: &FillRequest,
        rng: &mut (dyn RngCore + Send + Sync),
    ) -> Result<FillResult> {
        let mut result = FillResult::default();
        result.stats.target_duration = request.target;

        let accepted_ages = self.ladder.expand(&request.context.age_group);
        let mut chosen: HashSet<Uuid> = HashSet::new();
        let mut remaining = request.target;

        for tier in Tier::ALL {
            if remaining.is_zero() {
                break;
            }

            let Some(filter) = tier_filter(tier, &request.context, rng) else {
                debug!(tier = tier.name(), "Tier skipped: no tags to match");
                continue;
            };
            let budget = remaining.mul_f64(tier.cap());

            let mut packed = self
                .pack(request, &filter, budget, &chosen, &accepted_ages, true, rng)
                .await?;

            if packed.is_empty() && tier == Tier::Emergency && request.usage_context.is_some() {
                packed = self
                    .pack(request, &filter, budget, &chosen, &accepted_ages, false, rng)
                    .await?;
                if !packed.is_empty() {
                    let reason = format!(
                        "no unused buffer items within {}m lookback; reused {} items",
                        request.lookback.as_secs() / 60,
                        packed.items.len()
                    );
                    warn!("Buffer fill reusing recent items: {}", reason);
                    result.stats.reusage_applied = true;
                    result.stats.reusage_reason = Some(reason);
                }
            }

            if packed.is_empty() {
                debug!(
                    tier = tier.name(),
                    budget_ms = budget.as_millis() as u64,
                    "Tier found no items"
                );
                continue;
            }

            *result.stats.count_mut(tier) += packed.items.len();
            remaining = remaining.saturating_sub(packed.duration);
            chosen.extend(packed.items.iter().map(|i| i.id));
            result.items.extend(packed.items);
        }

        result.stats.duration_filled = result.items.iter().map(|i| i.duration).sum();

        if let Some(context) = &request.usage_context {
            let used_at = request.at.with_timezone(&Utc);
            for item in &result.items {
                let record = UsageRecord::new(item.id, item.kind, context.clone(), used_at)
                    .with_session(request.session_id);
                self.store.record_usage(&record).await?;
            }
        }

        info!(
            target_ms = request.target.as_millis() as u64,
            filled_ms = result.stats.duration_filled.as_millis() as u64,
            perfect = result.stats.perfect_matches,
            good = result.stats.good_matches,
            decent = result.stats.decent_matches,
            fallback = result.stats.fallback_matches,
            emergency = result.stats.emergency_matches,
            reused = result.stats.reusage_applied,
            "Buffer fill complete"
        );

        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    async fn pack(
        &self,
        request: &FillRequest,
        filter: &TagFilter,
        budget: Duration,
        chosen: &HashSet<Uuid>,
        accepted_ages: &Option<HashSet<String>>,
        exclude_recent: bool,
        rng: &mut (dyn RngCore + Send + Sync),
    ) -> Result<PackedTier> {
        let mut query = CandidateQuery::of_kinds(&[MediaKind::Commercial, MediaKind::Short])
            .with_tags(filter.clone())
            .with_max_duration(Some(budget))
            .excluding_ids(chosen.iter().copied());
        if exclude_recent {
            if let Some(context) = &request.usage_context {
                query = query.excluding_recent(
                    context.clone(),
                    request.lookback,
                    request.at.with_timezone(&Utc),
                );
            }
        }

        let date = request.at.date_naive();
        let mut candidates: Vec<MediaItem> = self
            .store
            .find_candidates(&query)
            .await?
            .into_iter()
            .filter(|item| in_season(&item.tags, date))
            .filter(|item| self.ladder.allows(accepted_ages, &item.tags))
            .collect();

        candidates.shuffle(rng);
        candidates.sort_by_key(|item| theme_rank(item, &request.context));

        let (commercials, shorts): (Vec<MediaItem>, Vec<MediaItem>) = candidates
            .into_iter()
            .partition(|item| item.kind == MediaKind::Commercial);

        Ok(pack_tier(&commercials, &shorts, budget))
    }
}

/// 0 for holiday matches, 1 for specialty matches, 2 otherwise
fn theme_rank(item: &MediaItem, context: &TagContext) -> u8 {
    if context.holiday.iter().any(|h| item.has_tag(h)) {
        0
    } else if context.specialty.iter().any(|s| item.has_tag(s)) {
        1
    } else {
        2
    }
}
