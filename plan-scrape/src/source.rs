//! Legacy timetable source
//!
//! The ingestion passes read the source through [`TimetableSource`]; the
//! production implementation runs fixed queries against the legacy
//! per-semester tables via [`crate::fetch::try_sql`]. Tests substitute an
//! in-memory fake.
//!
//! A failed legacy query fails the pass. Zero rows must only ever mean an
//! empty semester, never a missing table or a dropped connection.

use crate::error::{ScrapeError, ScrapeResult};
use crate::fetch::{self, SourceRow};
use async_trait::async_trait;
use futures::TryStreamExt;
use plan_common::db::Term;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use tracing::info;

/// One raw timetable row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LectureRow {
    pub course_code: String,
    pub type_name: Option<String>,
    pub day: String,
    pub start: String,
    pub end: String,
    /// Week spec, e.g. "3-5,7"
    pub weeks: String,
    /// '#'-joined room names
    pub rooms: String,
    /// '#'-joined lecturer names
    pub lecturers: String,
    /// Activity code keying the row's group list
    pub activity_code: String,
}

impl LectureRow {
    fn from_source(row: &SourceRow) -> Self {
        Self {
            course_code: row.text("emnekode"),
            type_name: row.get("typenavn").map(str::to_string),
            day: row.text("dag"),
            start: row.text("start"),
            end: row.text("slutt"),
            weeks: row.text("uke"),
            rooms: row.text("romnavn"),
            lecturers: row.text("larer"),
            activity_code: row.text("aktkode"),
        }
    }
}

/// One raw course metadata row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CourseRow {
    pub code: String,
    pub full_name: String,
    /// Credit points as published, possibly with a decimal comma
    pub credit_points: Option<String>,
}

impl CourseRow {
    fn from_source(row: &SourceRow) -> Self {
        Self {
            code: row.text("emnekode"),
            full_name: row.text("emnenavn"),
            credit_points: row.get("vekt").map(str::to_string),
        }
    }
}

/// Read access to the legacy timetable
#[async_trait]
pub trait TimetableSource: Send + Sync {
    /// Timetable rows of a semester, optionally limited to a course-code prefix
    async fn lecture_rows(&self, prefix: &str, limit: Option<&str>) -> ScrapeResult<Vec<LectureRow>>;

    /// Study-programme codes attached to an activity
    async fn activity_groups(&self, prefix: &str, activity_code: &str) -> ScrapeResult<Vec<String>>;

    /// Course metadata rows of a semester
    async fn course_rows(&self, prefix: &str) -> ScrapeResult<Vec<CourseRow>>;
}

/// Table prefix of a semester: 'v' + yy for spring, 'h' + yy for autumn
pub fn semester_prefix(year: i32, term: Term) -> String {
    let letter = match term {
        Term::Spring => 'v',
        Term::Autumn => 'h',
    };
    format!("{}{:02}", letter, year.rem_euclid(100))
}

/// Reject prefixes that are not safe to splice into a table name
pub fn validate_prefix(prefix: &str) -> ScrapeResult<()> {
    if !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(ScrapeError::InvalidPrefix(prefix.to_string()))
    }
}

/// Legacy relational source
#[derive(Debug, Clone)]
pub struct LegacySource {
    pool: AnyPool,
}

impl LegacySource {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    /// Connect to the legacy database by URL (`mysql://...`, `sqlite:...`)
    pub async fn connect(url: &str) -> ScrapeResult<Self> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(2)
            .connect(url)
            .await?;

        info!("Connected to legacy timetable database");
        Ok(Self::new(pool))
    }

    async fn rows(&self, query: &str, params: &[String]) -> ScrapeResult<Vec<SourceRow>> {
        Ok(fetch::try_sql(&self.pool, query, params).try_collect().await?)
    }
}

#[async_trait]
impl TimetableSource for LegacySource {
    async fn lecture_rows(&self, prefix: &str, limit: Option<&str>) -> ScrapeResult<Vec<LectureRow>> {
        validate_prefix(prefix)?;

        let mut query = format!(
            "SELECT emnekode, typenavn, dag, start, slutt, uke, romnavn, larer, aktkode \
             FROM {}_timeplan WHERE emnekode NOT LIKE '#%'",
            prefix
        );
        let mut params = Vec::new();
        if let Some(limit) = limit {
            query.push_str(" AND emnekode LIKE ?");
            params.push(format!("{}%", limit));
        }

        let rows = self.rows(&query, &params).await?;
        Ok(rows.iter().map(LectureRow::from_source).collect())
    }

    async fn activity_groups(&self, prefix: &str, activity_code: &str) -> ScrapeResult<Vec<String>> {
        validate_prefix(prefix)?;

        let query = format!(
            "SELECT DISTINCT asp.studieprogramkode \
             FROM {}_akt_studieprogram asp, studieprogram sp \
             WHERE asp.studieprogramkode = sp.studieprogram_kode AND asp.aktkode = ?",
            prefix
        );
        let params = [activity_code.to_string()];

        let rows = self.rows(&query, &params).await?;
        Ok(rows.iter().map(|row| row.text("studieprogramkode")).collect())
    }

    async fn course_rows(&self, prefix: &str) -> ScrapeResult<Vec<CourseRow>> {
        validate_prefix(prefix)?;

        let query = format!(
            "SELECT emnekode, emnenavn, vekt FROM {}_fs_emne WHERE emnekode NOT LIKE '#%'",
            prefix
        );

        let rows = self.rows(&query, &[]).await?;
        Ok(rows.iter().map(CourseRow::from_source).collect())
    }
}
