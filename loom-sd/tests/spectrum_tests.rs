//! Tiered buffer fill against the SQLite store

mod helpers;

use helpers::*;
use loom_common::tags::TagContext;
use loom_common::{MediaKind, Tag, TagType};
use loom_sd::spectrum::{FillRequest, SpectrumEngine, Tier};
use loom_sd::store::{MediaStore, UsageStore};
use std::collections::HashSet;
use std::time::Duration;

fn total(items: &[loom_common::MediaItem]) -> Duration {
    items.iter().map(|i| i.duration).sum()
}

#[tokio::test]
async fn test_fill_never_exceeds_target() {
    let store = create_test_store().await;
    let durations = [15, 20, 30, 30, 45, 60, 60, 90, 120, 150];
    for (i, &d) in durations.iter().enumerate() {
        let tags = if i % 2 == 0 { vec![genre("comedy")] } else { vec![genre("drama")] };
        store
            .save_media(&buffer(MediaKind::Commercial, &format!("Spot {}", i), d, tags))
            .await
            .unwrap();
    }
    for (i, &d) in [240u64, 300, 420].iter().enumerate() {
        let short = buffer(MediaKind::Short, &format!("Short {}", i), d, vec![genre("comedy")]);
        store.save_media(&short).await.unwrap();
    }

    let engine = SpectrumEngine::new(store.clone());
    let context = TagContext::from_tags(&[genre("comedy")], date(2026, 3, 2));
    let request = FillRequest::new(secs(600), context, at(2026, 3, 2, 12, 0));

    for seed in 0..20 {
        let result = engine.fill(&request, &mut seeded_rng(seed)).await.unwrap();
        assert!(total(&result.items) <= secs(600), "seed {} overfilled", seed);
        assert_eq!(result.stats.duration_filled, total(&result.items));
        assert_eq!(result.stats.target_duration, secs(600));

        let ids: HashSet<_> = result.items.iter().map(|i| i.id).collect();
        assert_eq!(ids.len(), result.items.len(), "item repeated within one gap");
    }
}

#[tokio::test]
async fn test_decent_tier_packs_commercials_then_declines_short() {
    let store = create_test_store().await;
    for (title, d) in [("A", 120), ("B", 180), ("C", 90)] {
        store
            .save_media(&buffer(MediaKind::Commercial, title, d, vec![genre("comedy")]))
            .await
            .unwrap();
    }
    store
        .save_media(&buffer(MediaKind::Short, "Reel", 300, vec![genre("comedy")]))
        .await
        .unwrap();

    let engine = SpectrumEngine::new(store.clone());
    let context = TagContext::from_tags(&[genre("comedy")], date(2026, 3, 2));
    // Decent budget is half the target: 480s
    let request = FillRequest::new(secs(960), context, at(2026, 3, 2, 12, 0));
    let result = engine.fill(&request, &mut seeded_rng(4)).await.unwrap();

    assert_eq!(result.stats.matches(Tier::Perfect), 0);
    assert_eq!(result.stats.matches(Tier::Good), 0);
    assert_eq!(result.stats.matches(Tier::Decent), 3);
    assert!(result.items[..3].iter().all(|i| i.kind == MediaKind::Commercial));
    assert_eq!(total(&result.items[..3]), secs(390));

    // The short waits for the fallback tier (0.6 x 570s = 342s)
    assert_eq!(result.stats.matches(Tier::Fallback), 1);
    assert_eq!(result.items[3].title, "Reel");
    assert_eq!(result.stats.duration_filled, secs(690));
}

#[tokio::test]
async fn test_family_context_excludes_mature_items() {
    let store = create_test_store().await;
    let ages = [
        ("Kids Spot", Some("Kids")),
        ("Family Spot", Some("Family")),
        ("Teen Spot", Some("YoungAdult")),
        ("Late Spot", Some("Mature")),
        ("Plain Spot", None),
    ];
    for (title, age) in ages {
        let tags = age.map(|a| vec![tag(a, TagType::AgeGroup)]).unwrap_or_default();
        store
            .save_media(&buffer(MediaKind::Commercial, title, 30, tags))
            .await
            .unwrap();
    }

    let engine = SpectrumEngine::new(store.clone());
    let context = TagContext::from_tags(&[tag("Family", TagType::AgeGroup)], date(2026, 3, 2));
    let request = FillRequest::new(secs(900), context, at(2026, 3, 2, 12, 0));

    for seed in 0..5 {
        let result = engine.fill(&request, &mut seeded_rng(seed)).await.unwrap();
        let titles: HashSet<&str> = result.items.iter().map(|i| i.title.as_str()).collect();
        assert!(!titles.contains("Late Spot"));
        assert_eq!(
            titles,
            HashSet::from(["Kids Spot", "Family Spot", "Teen Spot", "Plain Spot"])
        );
    }
}

#[tokio::test]
async fn test_holiday_match_outranks_specialty_within_tier() {
    let store = create_test_store().await;
    let christmas = Tag::holiday("Christmas", vec![date(2000, 12, 25)]);
    let western = tag("Western", TagType::Specialty);
    store
        .save_media(&buffer(MediaKind::Commercial, "Sleigh Bells", 30, vec![christmas.clone()]))
        .await
        .unwrap();
    store
        .save_media(&buffer(MediaKind::Commercial, "Saddle Up", 30, vec![western.clone()]))
        .await
        .unwrap();

    let engine = SpectrumEngine::new(store.clone());
    let context = TagContext::from_tags(&[christmas, western], date(2026, 12, 25));

    for seed in 0..10 {
        // Good budget (40s) fits exactly one of the two
        let request = FillRequest::new(secs(100), context.clone(), at(2026, 12, 25, 18, 0));
        let result = engine.fill(&request, &mut seeded_rng(seed)).await.unwrap();

        assert_eq!(result.stats.matches(Tier::Good), 1);
        assert_eq!(result.items[0].title, "Sleigh Bells");
        assert_eq!(result.items[1].title, "Saddle Up");
    }
}

#[tokio::test]
async fn test_buffer_usage_window_round_trip() {
    let store = create_test_store().await;
    let spot = buffer(MediaKind::Commercial, "Only Spot", 30, vec![]);
    store.save_media(&spot).await.unwrap();

    let engine = SpectrumEngine::new(store.clone());
    let first_at = at(2026, 3, 2, 12, 0);
    let request = FillRequest::new(secs(60), TagContext::default(), first_at).with_usage(
        "buffer",
        secs(2 * 3600),
        None,
    );
    let first = engine.fill(&request, &mut seeded_rng(1)).await.unwrap();
    assert_eq!(first.items.len(), 1);
    assert!(!first.stats.reusage_applied);

    let as_of = |h: u32, m: u32| at(2026, 3, 2, h, m).with_timezone(&chrono::Utc);
    let window = secs(2 * 3600);
    assert!(store
        .is_recently_used(spot.id, MediaKind::Commercial, "buffer", window, as_of(13, 0))
        .await
        .unwrap());
    assert!(!store
        .is_recently_used(spot.id, MediaKind::Commercial, "buffer", window, as_of(14, 1))
        .await
        .unwrap());
    assert!(!store
        .is_recently_used(spot.id, MediaKind::Commercial, "music", window, as_of(13, 0))
        .await
        .unwrap());

    // Inside the window the only candidate is reused and flagged
    let mut again = request.clone();
    again.at = at(2026, 3, 2, 13, 0);
    let second = engine.fill(&again, &mut seeded_rng(1)).await.unwrap();
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.items[0].id, spot.id);
    assert!(second.stats.reusage_applied);
    assert!(second.stats.reusage_reason.is_some());
    assert_eq!(second.stats.matches(Tier::Emergency), 1);
}

#[tokio::test]
async fn test_empty_library_fills_nothing() {
    let store = create_test_store().await;
    let engine = SpectrumEngine::new(store.clone());
    let request = FillRequest::new(secs(300), TagContext::default(), at(2026, 3, 2, 12, 0));

    let result = engine.fill(&request, &mut seeded_rng(0)).await.unwrap();
    assert!(result.items.is_empty());
    assert_eq!(result.stats.duration_filled, Duration::ZERO);
}
