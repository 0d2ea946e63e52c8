//! SQLite repository functions
//!
//! Free functions over `Pool<Sqlite>`; [`crate::store::SqliteStore`] exposes
//! them through the storage traits.

pub mod facets;
pub mod media;
pub mod progression;
pub mod query;
pub mod settings;
pub mod tags;
pub mod usage;

pub use query::{CandidateQuery, RecencyExclusion, TagFilter};

use crate::{Error, Result};
use std::time::Duration;
use uuid::Uuid;

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::Persistence(format!("Invalid UUID '{}': {}", s, e)))
}

pub(crate) fn duration_from_millis(millis: i64) -> Duration {
    Duration::from_millis(u64::try_from(millis).unwrap_or(0))
}
