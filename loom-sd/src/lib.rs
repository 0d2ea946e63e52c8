//! # Loom Stream Director Library (loom-sd)
//!
//! Programs a broadcast-style stream: picks long-form media by walking the
//! facet graph, tracks episode progression per show, fills the gaps between
//! long-form items with tag-matched buffer content and music, and keeps the
//! on-deck/upcoming queues aligned to wall-clock cadence.
//!
//! **Components:**
//! - [`refract`]: relationship walk from one main item to the next
//! - [`spectrum`]: tiered buffer fill for a duration gap
//! - [`mosaic`]: tag-priority music selection
//! - [`progression`]: per-show episode state machine
//! - [`scheduler`]: queues, tick loop and stream control surface
//! - [`store`] / [`db`]: storage seam and its SQLite implementation
//! - [`playback`]: external playback driver seam

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod mosaic;
pub mod playback;
pub mod progression;
pub mod refract;
pub mod scheduler;
pub mod spectrum;
pub mod store;

pub use error::{Error, Result};
