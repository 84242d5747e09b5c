//! plan-scrape library interface
//!
//! Ingests the legacy timetable into the schedule store. Exposed as a
//! library for the CLI and for integration testing.

pub mod config;
pub mod courses;
pub mod db;
pub mod error;
pub mod fetch;
pub mod lectures;
pub mod normalize;
pub mod resolver;
pub mod source;

pub use crate::error::{ScrapeError, ScrapeResult};

use crate::config::WeekLookupPolicy;
use crate::source::TimetableSource;
use sqlx::SqlitePool;

/// Ingestion entry point
///
/// Holds the schedule store and the legacy source. Each pass method runs in
/// its own store transaction; passes on one `Scraper` are sequential.
pub struct Scraper<S: TimetableSource> {
    /// Schedule store
    pub db: SqlitePool,
    /// Legacy timetable
    pub source: S,
    /// Handling of rows that reference weeks outside the calendar
    pub week_policy: WeekLookupPolicy,
}

impl<S: TimetableSource> Scraper<S> {
    pub fn new(db: SqlitePool, source: S) -> Self {
        Self {
            db,
            source,
            week_policy: WeekLookupPolicy::default(),
        }
    }

    pub fn with_week_policy(mut self, week_policy: WeekLookupPolicy) -> Self {
        self.week_policy = week_policy;
        self
    }
}
