//! Music selection by tag priority

mod helpers;

use helpers::*;
use loom_common::{MediaItem, MediaKind, Tag, TagType};
use loom_sd::mosaic::{MosaicEngine, MusicRequest};
use loom_sd::store::{MediaStore, SqliteStore, UsageStore};
use std::sync::Arc;
use uuid::Uuid;

struct Library {
    store: Arc<SqliteStore>,
    facet_id: Uuid,
    kids: MediaItem,
    carol: MediaItem,
    plain: MediaItem,
    twang: MediaItem,
}

fn christmas() -> Tag {
    Tag::holiday("Christmas", vec![date(2000, 12, 25)])
}

async fn seed_library() -> Library {
    let store = create_test_store().await;
    let facet = related("noir", "gritty", &[]);
    store.save_facet(&facet).await.unwrap();
    store.save_mosaic(&mosaic(facet.id, &["jazz"])).await.unwrap();

    let jazz = || tag("jazz", TagType::MusicalGenre);
    let kids_tag = || tag("Kids", TagType::AgeGroup);
    let kids = buffer(MediaKind::Music, "Lullaby Swing", 180, vec![jazz(), kids_tag()]);
    let carol = buffer(MediaKind::Music, "Blue Carol", 200, vec![jazz(), christmas()]);
    let plain = buffer(MediaKind::Music, "Late Set", 240, vec![jazz()]);
    let western = tag("Western", TagType::Specialty);
    let twang = buffer(MediaKind::Music, "Prairie Bop", 210, vec![jazz(), western]);
    // Not in the mosaic's genres
    let rock_tags = vec![tag("rock", TagType::MusicalGenre), kids_tag()];
    let rock = buffer(MediaKind::Music, "Loud Kids", 150, rock_tags);

    for item in [&kids, &carol, &plain, &twang, &rock] {
        store.save_media(item).await.unwrap();
    }

    Library {
        store,
        facet_id: facet.id,
        kids,
        carol,
        plain,
        twang,
    }
}

fn request(library: &Library, adjacent: Vec<Tag>) -> MusicRequest {
    MusicRequest::new(vec![library.facet_id], adjacent, at(2026, 12, 25, 19, 0))
}

#[tokio::test]
async fn test_age_group_is_highest_priority() {
    let library = seed_library().await;
    let engine = MosaicEngine::new(library.store.clone());
    let req = request(&library, vec![tag("Kids", TagType::AgeGroup), christmas()]);

    for seed in 0..5 {
        let selection = engine.select(&req, &mut seeded_rng(seed)).await.unwrap();
        assert_eq!(selection.track.map(|t| t.id), Some(library.kids.id));
        assert_eq!(selection.level, Some(TagType::AgeGroup));
    }
}

#[tokio::test]
async fn test_holiday_level_when_no_age_group() {
    let library = seed_library().await;
    let engine = MosaicEngine::new(library.store.clone());
    let req = request(&library, vec![christmas(), genre("noir")]);

    let selection = engine.select(&req, &mut seeded_rng(3)).await.unwrap();
    assert_eq!(selection.track.map(|t| t.id), Some(library.carol.id));
    assert_eq!(selection.level, Some(TagType::Holiday));
}

#[tokio::test]
async fn test_specialty_honoured_or_declined() {
    let library = seed_library().await;
    let engine = MosaicEngine::new(library.store.clone());

    let mut always = request(&library, vec![tag("Western", TagType::Specialty)]);
    always.specialty_honor_probability = 1.0;
    let honoured = engine.select(&always, &mut seeded_rng(8)).await.unwrap();
    assert_eq!(honoured.track.map(|t| t.id), Some(library.twang.id));
    assert_eq!(honoured.level, Some(TagType::Specialty));
    assert!(!honoured.specialty_declined);

    let mut never = always.clone();
    never.specialty_honor_probability = 0.0;
    let declined = engine.select(&never, &mut seeded_rng(8)).await.unwrap();
    assert!(declined.specialty_declined);
    assert_eq!(declined.level, None);
    assert!(declined.track.is_some());
}

#[tokio::test]
async fn test_specialty_only_when_holiday_has_no_track() {
    let library = seed_library().await;
    let engine = MosaicEngine::new(library.store.clone());
    let western = || tag("Western", TagType::Specialty);

    // Active on the request date, but no jazz track carries it
    let boxing_day = Tag::holiday("Boxing Day", vec![date(2000, 12, 25)]);
    let mut req = request(&library, vec![boxing_day, western()]);
    req.specialty_honor_probability = 1.0;
    for seed in 0..5 {
        let selection = engine.select(&req, &mut seeded_rng(seed)).await.unwrap();
        assert_eq!(selection.level, Some(TagType::Specialty));
        assert_eq!(selection.track.map(|t| t.id), Some(library.twang.id));
    }

    // A holiday with a matching track outranks the specialty
    let mut req = request(&library, vec![christmas(), western()]);
    req.specialty_honor_probability = 1.0;
    let selection = engine.select(&req, &mut seeded_rng(6)).await.unwrap();
    assert_eq!(selection.level, Some(TagType::Holiday));
    assert_eq!(selection.track.map(|t| t.id), Some(library.carol.id));
}

#[tokio::test]
async fn test_genre_only_fallback_stays_inside_mosaic() {
    let library = seed_library().await;
    let engine = MosaicEngine::new(library.store.clone());
    let req = request(&library, vec![genre("noir"), aesthetic("gritty")]);
    let jazz_ids = [library.kids.id, library.carol.id, library.plain.id, library.twang.id];

    for seed in 0..10 {
        let selection = engine.select(&req, &mut seeded_rng(seed)).await.unwrap();
        assert_eq!(selection.level, None);
        let track = selection.track.unwrap();
        assert!(jazz_ids.contains(&track.id), "picked {}", track.title);
    }
}

#[tokio::test]
async fn test_no_mosaic_is_a_soft_failure() {
    let library = seed_library().await;
    let engine = MosaicEngine::new(library.store.clone());
    let req = MusicRequest::new(vec![Uuid::new_v4()], vec![], at(2026, 12, 25, 19, 0));

    let selection = engine.select(&req, &mut seeded_rng(1)).await.unwrap();
    assert!(selection.track.is_none());
    assert!(selection.mosaic_id.is_none());
    assert!(selection.reason.is_some());
}

#[tokio::test]
async fn test_duration_cap_and_usage_recording() {
    let library = seed_library().await;
    let engine = MosaicEngine::new(library.store.clone());

    let mut req = request(&library, vec![]);
    req.max_duration = Some(secs(190));
    req.usage_context = Some("music".to_string());

    let selection = engine.select(&req, &mut seeded_rng(2)).await.unwrap();
    let track = selection.track.unwrap();
    assert_eq!(track.id, library.kids.id);

    let used = library
        .store
        .is_recently_used(
            track.id,
            MediaKind::Music,
            "music",
            secs(3600),
            at(2026, 12, 25, 19, 30).with_timezone(&chrono::Utc),
        )
        .await
        .unwrap();
    assert!(used);

    // Only track under the cap is now inside its window
    let again = engine.select(&req, &mut seeded_rng(2)).await.unwrap();
    assert!(again.track.is_none());
    assert_eq!(again.mosaic_id, Some(mosaic_id(&library).await));
}

async fn mosaic_id(library: &Library) -> Uuid {
    library.store.mosaics_for_facets(&[library.facet_id]).await.unwrap()[0].id
}
