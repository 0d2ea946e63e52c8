//! Test helpers for loom-sd integration tests
//!
//! - in-memory store with the full schema
//! - fixed-offset timestamps and seeded randomness
//! - library builders for tags, media, shows, facets and mosaics

#![allow(dead_code)]

pub mod library;

pub use library::{aesthetic, buffer, genre, movie, mosaic, related, show, tag};

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use loom_sd::store::SqliteStore;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::time::Duration;

/// Fresh in-memory store with every table created
pub async fn create_test_store() -> Arc<SqliteStore> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    loom_common::db::create_schema(&pool).await.unwrap();
    Arc::new(SqliteStore::new(pool))
}

/// Local time at UTC+0
pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(year, month, day, hour, minute, 0)
        .unwrap()
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}
