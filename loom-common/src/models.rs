//! Media and scheduling models
//!
//! Durations are `std::time::Duration` in memory and integer milliseconds in
//! the database. Scheduled times carry the local offset of the stream.

use crate::tags::{Tag, TagType};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Media kind enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum MediaKind {
    Movie,
    Episode,
    Show,
    Commercial,
    Short,
    Music,
    Promo,
    Bumper,
}

impl MediaKind {
    /// Parse media kind from its database string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Movie" => Some(MediaKind::Movie),
            "Episode" => Some(MediaKind::Episode),
            "Show" => Some(MediaKind::Show),
            "Commercial" => Some(MediaKind::Commercial),
            "Short" => Some(MediaKind::Short),
            "Music" => Some(MediaKind::Music),
            "Promo" => Some(MediaKind::Promo),
            "Bumper" => Some(MediaKind::Bumper),
            _ => None,
        }
    }

    /// Database string for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movie => "Movie",
            MediaKind::Episode => "Episode",
            MediaKind::Show => "Show",
            MediaKind::Commercial => "Commercial",
            MediaKind::Short => "Short",
            MediaKind::Music => "Music",
            MediaKind::Promo => "Promo",
            MediaKind::Bumper => "Bumper",
        }
    }

    /// Short-form filler content
    pub fn is_buffer(&self) -> bool {
        matches!(
            self,
            MediaKind::Commercial
                | MediaKind::Short
                | MediaKind::Music
                | MediaKind::Promo
                | MediaKind::Bumper
        )
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A playable media item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: Uuid,
    pub kind: MediaKind,
    pub title: String,
    pub duration: Duration,
    /// Relative to the data folder unless absolute
    pub path: PathBuf,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl MediaItem {
    pub fn new(
        kind: MediaKind,
        title: impl Into<String>,
        duration: Duration,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            title: title.into(),
            duration,
            path: path.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }

    pub fn tag_names(&self) -> Vec<&str> {
        self.tags.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.name == name)
    }

    pub fn tags_of(&self, tag_type: TagType) -> impl Iterator<Item = &Tag> {
        self.tags.iter().filter(move |t| t.tag_type == tag_type)
    }
}

/// An episode of a show
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub item: MediaItem,
    pub show_id: Uuid,
    pub episode_number: u32,
    /// Longer than the show's duration bucket
    pub over_duration: bool,
}

/// A show and its episodes (ordered by episode number)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Show {
    pub id: Uuid,
    pub title: String,
    pub episode_count: u32,
    /// Duration bucket episodes are scheduled into
    pub duration_limit: Duration,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

impl Show {
    pub fn new(title: impl Into<String>, duration_limit: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            episode_count: 0,
            duration_limit,
            tags: Vec::new(),
            episodes: Vec::new(),
        }
    }

    /// Look up an episode by its number
    pub fn episode(&self, number: u32) -> Option<&Episode> {
        self.episodes.iter().find(|e| e.episode_number == number)
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.name == name)
    }
}

/// Directed, weighted edge of the facet graph
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FacetDistance {
    pub target_facet_id: Uuid,
    pub distance: f64,
}

/// A (genre, aesthetic) node of the relationship graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facet {
    pub id: Uuid,
    pub genre: Tag,
    pub aesthetic: Tag,
    #[serde(default)]
    pub relationships: Vec<FacetDistance>,
}

impl Facet {
    pub fn new(genre: Tag, aesthetic: Tag) -> Self {
        Self {
            id: Uuid::new_v4(),
            genre,
            aesthetic,
            relationships: Vec::new(),
        }
    }

    /// Both the genre and the aesthetic name appear in `names`
    pub fn matches(&self, names: &[&str]) -> bool {
        names.contains(&self.genre.name.as_str()) && names.contains(&self.aesthetic.name.as_str())
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.genre.name, self.aesthetic.name)
    }
}

/// Facet to musical-genre association
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mosaic {
    pub id: Uuid,
    pub facet_id: Uuid,
    pub musical_genres: Vec<String>,
}

/// Stream variant enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum StreamVariant {
    /// 24/7, regenerates daily
    Continuous,
    /// Fixed window, never regenerated
    Adhoc,
    /// Curated grouping
    Block,
}

impl StreamVariant {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Continuous" => Some(StreamVariant::Continuous),
            "Adhoc" => Some(StreamVariant::Adhoc),
            "Block" => Some(StreamVariant::Block),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamVariant::Continuous => "Continuous",
            StreamVariant::Adhoc => "Adhoc",
            StreamVariant::Block => "Block",
        }
    }
}

impl std::fmt::Display for StreamVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Episode progression for one (show, stream variant) pair
///
/// `current_episode` is 0 while the show is unstarted and otherwise in
/// `1..=episode_count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeProgression {
    pub show_id: Uuid,
    pub stream_variant: StreamVariant,
    pub current_episode: u32,
    pub last_played_at: Option<DateTime<Utc>>,
    pub next_episode_duration_limit: Option<Duration>,
    pub next_episode_over_duration: bool,
}

impl EpisodeProgression {
    /// Unstarted progression
    pub fn new(show_id: Uuid, stream_variant: StreamVariant) -> Self {
        Self {
            show_id,
            stream_variant,
            current_episode: 0,
            last_played_at: None,
            next_episode_duration_limit: None,
            next_episode_over_duration: false,
        }
    }
}

/// One recorded use of a media item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub media_id: Uuid,
    pub media_kind: MediaKind,
    pub usage_context: String,
    pub stream_session_id: Option<Uuid>,
    pub used_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl UsageRecord {
    pub fn new(
        media_id: Uuid,
        media_kind: MediaKind,
        usage_context: impl Into<String>,
        used_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            media_id,
            media_kind,
            usage_context: usage_context.into(),
            stream_session_id: None,
            used_at,
            expires_at: None,
        }
    }

    pub fn with_session(mut self, session_id: Option<Uuid>) -> Self {
        self.stream_session_id = session_id;
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether this record still excludes its media at `now`
    ///
    /// An explicit expiry wins over the lookback window.
    pub fn excludes_at(&self, now: DateTime<Utc>, lookback: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => now < expires_at,
            None => match chrono::Duration::from_std(lookback) {
                Ok(window) => now < self.used_at + window,
                Err(_) => true,
            },
        }
    }
}

/// The long-form item of a block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MainMedia {
    Movie(MediaItem),
    Episode {
        show_id: Uuid,
        show_title: String,
        episode: Episode,
    },
}

impl MainMedia {
    pub fn item(&self) -> &MediaItem {
        match self {
            MainMedia::Movie(item) => item,
            MainMedia::Episode { episode, .. } => &episode.item,
        }
    }

    pub fn duration(&self) -> Duration {
        self.item().duration
    }

    /// Display title ("Show #N - Episode" for episodes)
    pub fn title(&self) -> String {
        match self {
            MainMedia::Movie(item) => item.title.clone(),
            MainMedia::Episode {
                show_title,
                episode,
                ..
            } => format!("{} #{} - {}", show_title, episode.episode_number, episode.item.title),
        }
    }
}

/// Atomic unit of the on-deck and upcoming queues
///
/// Buffer items play first, then the main media.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaBlock {
    pub id: Uuid,
    pub buffer_items: Vec<MediaItem>,
    pub main_media: Option<MainMedia>,
    pub start_time: DateTime<FixedOffset>,
}

impl MediaBlock {
    pub fn new(start_time: DateTime<FixedOffset>) -> Self {
        Self {
            id: Uuid::new_v4(),
            buffer_items: Vec::new(),
            main_media: None,
            start_time,
        }
    }

    /// Total play time of buffer and main media
    pub fn duration(&self) -> Duration {
        let buffer: Duration = self.buffer_items.iter().map(|i| i.duration).sum();
        buffer + self.main_media.as_ref().map(|m| m.duration()).unwrap_or_default()
    }

    pub fn end_time(&self) -> DateTime<FixedOffset> {
        let duration = chrono::Duration::from_std(self.duration())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.start_time + duration
    }

    /// Items in play order with their scheduled start times
    pub fn timeline(&self) -> Vec<(DateTime<FixedOffset>, &MediaItem)> {
        let mut cursor = self.start_time;
        let mut timeline = Vec::with_capacity(self.buffer_items.len() + 1);
        let items = self
            .buffer_items
            .iter()
            .chain(self.main_media.as_ref().map(|m| m.item()));
        for item in items {
            timeline.push((cursor, item));
            cursor += chrono::Duration::from_std(item.duration)
                .unwrap_or_else(|_| chrono::Duration::zero());
        }
        timeline
    }

    pub fn label(&self) -> String {
        match &self.main_media {
            Some(main) => main.title(),
            None => format!("buffer block ({} items)", self.buffer_items.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_media_kind_strings() {
        for kind in [
            MediaKind::Movie,
            MediaKind::Episode,
            MediaKind::Show,
            MediaKind::Commercial,
            MediaKind::Short,
            MediaKind::Music,
            MediaKind::Promo,
            MediaKind::Bumper,
        ] {
            assert_eq!(MediaKind::from_str(kind.as_str()), Some(kind));
        }
        assert!(MediaKind::Commercial.is_buffer());
        assert!(!MediaKind::Movie.is_buffer());
    }

    #[test]
    fn test_block_duration_and_timeline() {
        let start = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 1, 20, 0, 0)
            .unwrap();
        let mut block = MediaBlock::new(start);
        block.buffer_items.push(MediaItem::new(MediaKind::Commercial, "Ad", secs(30), "ad.mp4"));
        block.buffer_items.push(MediaItem::new(MediaKind::Promo, "Promo", secs(15), "promo.mp4"));
        block.main_media = Some(MainMedia::Movie(MediaItem::new(
            MediaKind::Movie,
            "Feature",
            secs(5400),
            "feature.mkv",
        )));

        assert_eq!(block.duration(), secs(5445));
        assert_eq!(block.end_time(), start + chrono::Duration::seconds(5445));

        let timeline = block.timeline();
        assert_eq!(timeline.len(), 3);
        assert_eq!(timeline[2].0, start + chrono::Duration::seconds(45));
        assert_eq!(timeline[2].1.title, "Feature");
    }

    #[test]
    fn test_usage_record_expiry_overrides_lookback() {
        let used_at = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let mut record = UsageRecord {
            id: Uuid::new_v4(),
            media_id: Uuid::new_v4(),
            media_kind: MediaKind::Commercial,
            usage_context: "buffer".to_string(),
            stream_session_id: None,
            used_at,
            expires_at: None,
        };

        let lookback = secs(2 * 3600);
        assert!(record.excludes_at(used_at + chrono::Duration::minutes(119), lookback));
        assert!(!record.excludes_at(used_at + chrono::Duration::minutes(120), lookback));

        record.expires_at = Some(used_at + chrono::Duration::minutes(10));
        assert!(!record.excludes_at(used_at + chrono::Duration::minutes(30), lookback));
    }

    #[test]
    fn test_facet_matches_requires_both_names() {
        let facet = Facet::new(
            Tag::new("Comedy", TagType::Genre),
            Tag::new("Retro", TagType::Aesthetic),
        );
        assert!(facet.matches(&["Comedy", "Retro", "80s"]));
        assert!(!facet.matches(&["Comedy"]));
        assert_eq!(facet.label(), "Comedy/Retro");
    }
}
