//! Library builders
//!
//! Media paths are relative (`<kind>/<title>.mp4`) so they resolve under
//! whatever data folder a test configures.

use loom_common::models::{Episode, Facet, FacetDistance, Mosaic, Show};
use loom_common::{MediaItem, MediaKind, Tag, TagType};
use std::time::Duration;
use uuid::Uuid;

pub fn tag(name: &str, tag_type: TagType) -> Tag {
    Tag::new(name, tag_type)
}

pub fn genre(name: &str) -> Tag {
    Tag::new(name, TagType::Genre)
}

pub fn aesthetic(name: &str) -> Tag {
    Tag::new(name, TagType::Aesthetic)
}

fn media_path(kind: MediaKind, title: &str) -> String {
    format!("{}/{}.mp4", kind.as_str(), title.replace(' ', "_"))
}

pub fn movie(title: &str, duration_secs: u64, tags: Vec<Tag>) -> MediaItem {
    MediaItem::new(
        MediaKind::Movie,
        title,
        Duration::from_secs(duration_secs),
        media_path(MediaKind::Movie, title),
    )
    .with_tags(tags)
}

/// Commercial, short, music or promo
pub fn buffer(kind: MediaKind, title: &str, duration_secs: u64, tags: Vec<Tag>) -> MediaItem {
    MediaItem::new(kind, title, Duration::from_secs(duration_secs), media_path(kind, title))
        .with_tags(tags)
}

/// Show with one episode per entry of `episode_secs`, numbered from 1
///
/// Episodes longer than the limit are flagged over-duration.
pub fn show(title: &str, limit_secs: u64, episode_secs: &[u64], tags: Vec<Tag>) -> Show {
    let mut show = Show::new(title, Duration::from_secs(limit_secs));
    show.tags = tags;
    show.episode_count = episode_secs.len() as u32;

    for (i, &secs) in episode_secs.iter().enumerate() {
        let number = i as u32 + 1;
        let episode_title = format!("{} {}", title, number);
        let item = MediaItem::new(
            MediaKind::Episode,
            episode_title.as_str(),
            Duration::from_secs(secs),
            media_path(MediaKind::Episode, &episode_title),
        );
        show.episodes.push(Episode {
            item,
            show_id: show.id,
            episode_number: number,
            over_duration: secs > limit_secs,
        });
    }
    show
}

/// Facet with outgoing edges
pub fn related(genre_name: &str, aesthetic_name: &str, edges: &[(Uuid, f64)]) -> Facet {
    let mut facet = Facet::new(genre(genre_name), aesthetic(aesthetic_name));
    facet.relationships = edges
        .iter()
        .map(|&(target_facet_id, distance)| FacetDistance {
            target_facet_id,
            distance,
        })
        .collect();
    facet
}

pub fn mosaic(facet_id: Uuid, musical_genres: &[&str]) -> Mosaic {
    Mosaic {
        id: Uuid::new_v4(),
        facet_id,
        musical_genres: musical_genres.iter().map(|g| g.to_string()).collect(),
    }
}
