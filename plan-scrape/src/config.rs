//! Runtime settings for plan-scrape
//!
//! Bootstrap values (store path, legacy URL, logging) come from TOML via
//! `plan_common::config`. Everything tunable at runtime lives in the
//! `settings` table and is read here; missing values fall back to built-in
//! defaults.

use crate::db::settings::get_setting;
use crate::error::ScrapeResult;
use plan_common::Error;
use sqlx::SqlitePool;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// What a pass does when a row references a week missing from the calendar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeekLookupPolicy {
    /// Fail the whole pass; nothing is committed
    #[default]
    Abort,
    /// Log a warning and skip the row, like any other normalization failure
    SkipRow,
}

impl FromStr for WeekLookupPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.trim().to_lowercase().as_str() {
            "abort" => Ok(WeekLookupPolicy::Abort),
            "skip-row" | "skip_row" | "skip" => Ok(WeekLookupPolicy::SkipRow),
            other => Err(Error::Config(format!("Unknown week lookup policy '{}'", other))),
        }
    }
}

impl fmt::Display for WeekLookupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeekLookupPolicy::Abort => f.write_str("abort"),
            WeekLookupPolicy::SkipRow => f.write_str("skip-row"),
        }
    }
}

/// Settings read from the store at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub week_lookup_policy: WeekLookupPolicy,
    /// Per-request timeout for the retrieval layer
    pub http_timeout: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            week_lookup_policy: WeekLookupPolicy::Abort,
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl RuntimeSettings {
    /// Load runtime settings, using defaults for anything unset
    pub async fn load(pool: &SqlitePool) -> ScrapeResult<Self> {
        let defaults = Self::default();

        let week_lookup_policy = get_setting::<WeekLookupPolicy>(pool, "week_lookup_policy")
            .await?
            .unwrap_or(defaults.week_lookup_policy);

        let http_timeout = get_setting::<u64>(pool, "http_timeout_secs")
            .await?
            .map(Duration::from_secs)
            .unwrap_or(defaults.http_timeout);

        info!(
            week_lookup_policy = %week_lookup_policy,
            http_timeout_secs = http_timeout.as_secs(),
            "Loaded runtime settings"
        );

        Ok(Self {
            week_lookup_policy,
            http_timeout,
        })
    }
}
