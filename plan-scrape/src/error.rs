//! Error types for plan-scrape
//!
//! Row-scoped problems (unparseable day/time, a missing week under the
//! skip-row policy) never surface here; they are logged and the row is
//! skipped. A `ScrapeError` aborts the pass and rolls its transaction back.

use crate::resolver::LookupError;
use thiserror::Error;

/// Pass-level error
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Store access failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// plan-common error (config, corrupt row)
    #[error("Common error: {0}")]
    Common(#[from] plan_common::Error),

    /// Week reference missing from the calendar under the abort policy
    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    /// Semester prefix unsafe to interpolate into legacy table names
    #[error("Invalid semester prefix '{0}'")]
    InvalidPrefix(String),

    /// Stale lectures would be deleted on the word of a pass that read nothing
    #[error("Source returned no rows; refusing to delete {0} stale lectures")]
    EmptySource(usize),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Result type for plan-scrape operations
pub type ScrapeResult<T> = Result<T, ScrapeError>;
