//! # Loom Common Library
//!
//! Shared code for the Loom stream programmer including:
//! - Media, tag and scheduling models
//! - Tag vocabulary helpers (holiday windows, age-group adjacency)
//! - Event types (LoomEvent enum) and the event bus
//! - Configuration loading
//! - Cadence and day-marker time helpers
//! - Database initialization

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod tags;
pub mod time;

pub use error::{Error, Result};
pub use models::{MediaBlock, MediaItem, MediaKind, StreamVariant};
pub use tags::{Tag, TagType};
