//! Tag vocabulary
//!
//! Typed tags drive every selection decision in Loom. This module holds the
//! tag model itself plus the two pieces of tag logic that several engines
//! share:
//! - Holiday activity windows (annual dates and seasons)
//! - The age-group ladder used for adjacency expansion
//!
//! String tag references coming from storage are resolved into [`Tag`] values
//! before they reach any engine.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Tag type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum TagType {
    Genre,
    Aesthetic,
    Era,
    Specialty,
    Holiday,
    AgeGroup,
    MusicalGenre,
}

impl TagType {
    /// All tag types, in declaration order
    pub const ALL: [TagType; 7] = [
        TagType::Genre,
        TagType::Aesthetic,
        TagType::Era,
        TagType::Specialty,
        TagType::Holiday,
        TagType::AgeGroup,
        TagType::MusicalGenre,
    ];

    /// Parse tag type from its database string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Genre" => Some(TagType::Genre),
            "Aesthetic" => Some(TagType::Aesthetic),
            "Era" => Some(TagType::Era),
            "Specialty" => Some(TagType::Specialty),
            "Holiday" => Some(TagType::Holiday),
            "AgeGroup" => Some(TagType::AgeGroup),
            "MusicalGenre" => Some(TagType::MusicalGenre),
            _ => None,
        }
    }

    /// Database string for this tag type
    pub fn as_str(&self) -> &'static str {
        match self {
            TagType::Genre => "Genre",
            TagType::Aesthetic => "Aesthetic",
            TagType::Era => "Era",
            TagType::Specialty => "Specialty",
            TagType::Holiday => "Holiday",
            TagType::AgeGroup => "AgeGroup",
            TagType::MusicalGenre => "MusicalGenre",
        }
    }
}

impl std::fmt::Display for TagType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed tag
///
/// Holiday tags carry their activity window: `holiday_dates` recur every year
/// on the same month/day, and `season_start`..=`season_end` is an annual window
/// that may wrap across new year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub tag_type: TagType,
    #[serde(default)]
    pub holiday_dates: Vec<NaiveDate>,
    pub season_start: Option<NaiveDate>,
    pub season_end: Option<NaiveDate>,
    /// Media carrying this tag only play while the tag is active
    #[serde(default)]
    pub explicitly_holiday: bool,
    /// Ordering of AgeGroup tags on the age ladder
    pub sequence: Option<i32>,
}

impl Tag {
    /// Create a plain tag with no holiday window
    pub fn new(name: impl Into<String>, tag_type: TagType) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            tag_type,
            holiday_dates: Vec::new(),
            season_start: None,
            season_end: None,
            explicitly_holiday: false,
            sequence: None,
        }
    }

    /// Create a holiday tag active on the given annual dates
    pub fn holiday(name: impl Into<String>, dates: Vec<NaiveDate>) -> Self {
        let mut tag = Self::new(name, TagType::Holiday);
        tag.holiday_dates = dates;
        tag
    }

    /// Builder: set an annual season window
    pub fn with_season(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.season_start = Some(start);
        self.season_end = Some(end);
        self
    }

    /// Builder: mark media with this tag as holiday-only
    pub fn explicitly_holiday(mut self) -> Self {
        self.explicitly_holiday = true;
        self
    }

    /// Builder: set ladder position
    pub fn with_sequence(mut self, sequence: i32) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Whether this tag is active on the given local date
    ///
    /// Non-holiday tags are always active. A holiday tag without any dates or
    /// season is never active.
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        if self.tag_type != TagType::Holiday {
            return true;
        }

        let key = month_day(date);
        if self.holiday_dates.iter().any(|d| month_day(*d) == key) {
            return true;
        }

        match (self.season_start, self.season_end) {
            (Some(start), Some(end)) => {
                let (start, end) = (month_day(start), month_day(end));
                if start <= end {
                    start <= key && key <= end
                } else {
                    // Season wraps across new year
                    key >= start || key <= end
                }
            }
            _ => false,
        }
    }
}

fn month_day(date: NaiveDate) -> u32 {
    date.month() * 100 + date.day()
}

/// Whether media carrying `tags` may be scheduled on `date`
///
/// Fails only when an explicitly-holiday tag is outside its window.
pub fn in_season(tags: &[Tag], date: NaiveDate) -> bool {
    tags.iter()
        .filter(|t| t.explicitly_holiday)
        .all(|t| t.is_active_on(date))
}

/// Normalize a tag name for loose comparison ("Young Adult" == "youngadult")
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Tag names segmented by type
///
/// Built from the tags of the media around a gap. Holiday names only include
/// tags active on the date the context was built for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagContext {
    pub age_group: Vec<String>,
    pub holiday: Vec<String>,
    pub specialty: Vec<String>,
    pub genre: Vec<String>,
    pub era: Vec<String>,
    pub aesthetic: Vec<String>,
    pub musical_genre: Vec<String>,
}

impl TagContext {
    /// Segment tags by type, keeping only holidays active on `date`
    pub fn from_tags<'a>(tags: impl IntoIterator<Item = &'a Tag>, date: NaiveDate) -> Self {
        let mut context = Self::default();
        for tag in tags {
            context.push(tag, date);
        }
        context
    }

    /// Add one tag to the matching segment (deduplicated)
    pub fn push(&mut self, tag: &Tag, date: NaiveDate) {
        let bucket = match tag.tag_type {
            TagType::AgeGroup => &mut self.age_group,
            TagType::Holiday => {
                if !tag.is_active_on(date) {
                    return;
                }
                &mut self.holiday
            }
            TagType::Specialty => &mut self.specialty,
            TagType::Genre => &mut self.genre,
            TagType::Era => &mut self.era,
            TagType::Aesthetic => &mut self.aesthetic,
            TagType::MusicalGenre => &mut self.musical_genre,
        };
        if !bucket.iter().any(|n| n == &tag.name) {
            bucket.push(tag.name.clone());
        }
    }

    /// Names for one tag type
    pub fn names(&self, tag_type: TagType) -> &[String] {
        match tag_type {
            TagType::AgeGroup => &self.age_group,
            TagType::Holiday => &self.holiday,
            TagType::Specialty => &self.specialty,
            TagType::Genre => &self.genre,
            TagType::Era => &self.era,
            TagType::Aesthetic => &self.aesthetic,
            TagType::MusicalGenre => &self.musical_genre,
        }
    }

    pub fn is_empty(&self) -> bool {
        TagType::ALL.iter().all(|t| self.names(*t).is_empty())
    }
}

/// Default age ladder, youngest first
pub const DEFAULT_AGE_LADDER: [&str; 4] = ["Kids", "Family", "YoungAdult", "Mature"];

/// Ordered age-group rungs used for adjacency expansion
///
/// Each rung is adjacent to the rung directly below and above it; the ends
/// have a single neighbour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgeLadder {
    rungs: Vec<String>,
}

impl Default for AgeLadder {
    fn default() -> Self {
        Self {
            rungs: DEFAULT_AGE_LADDER.iter().map(|s| normalize_name(s)).collect(),
        }
    }
}

impl AgeLadder {
    /// Build a ladder from AgeGroup tags ordered by `sequence`
    ///
    /// Falls back to the default ladder unless at least two AgeGroup tags
    /// carry a sequence.
    pub fn from_tags(tags: &[Tag]) -> Self {
        let mut sequenced: Vec<(&Tag, i32)> = tags
            .iter()
            .filter(|t| t.tag_type == TagType::AgeGroup)
            .filter_map(|t| t.sequence.map(|s| (t, s)))
            .collect();

        if sequenced.len() < 2 {
            return Self::default();
        }

        sequenced.sort_by_key(|(_, s)| *s);
        Self {
            rungs: sequenced.iter().map(|(t, _)| normalize_name(&t.name)).collect(),
        }
    }

    /// Whether `name` is a rung of this ladder
    pub fn recognizes(&self, name: &str) -> bool {
        let normalized = normalize_name(name);
        self.rungs.iter().any(|r| *r == normalized)
    }

    /// Expand requested age groups to themselves plus adjacent rungs
    ///
    /// Returns `None` ("accept all") when no recognized age group was requested.
    pub fn expand(&self, names: &[String]) -> Option<HashSet<String>> {
        let mut accepted = HashSet::new();
        for name in names {
            let normalized = normalize_name(name);
            if let Some(idx) = self.rungs.iter().position(|r| *r == normalized) {
                accepted.insert(self.rungs[idx].clone());
                if idx > 0 {
                    accepted.insert(self.rungs[idx - 1].clone());
                }
                if let Some(next) = self.rungs.get(idx + 1) {
                    accepted.insert(next.clone());
                }
            }
        }

        if accepted.is_empty() {
            None
        } else {
            Some(accepted)
        }
    }

    /// Whether an item with `tags` passes an expanded age filter
    ///
    /// Items without any recognized age-group tag always pass.
    pub fn allows(&self, accepted: &Option<HashSet<String>>, tags: &[Tag]) -> bool {
        let Some(accepted) = accepted else {
            return true;
        };

        let mut item_groups = tags
            .iter()
            .filter(|t| t.tag_type == TagType::AgeGroup)
            .map(|t| normalize_name(&t.name))
            .filter(|n| self.rungs.contains(n))
            .peekable();

        if item_groups.peek().is_none() {
            return true;
        }

        item_groups.any(|n| accepted.contains(&n))
    }
}
