//! Course metadata import
//!
//! Copies full names and credit points from the legacy course table onto
//! the store's courses, creating any course not seen before.

use crate::db::courses::{link_course_semester, update_course_metadata};
use crate::db::semesters::get_or_create_semester;
use crate::error::ScrapeResult;
use crate::resolver::{normalize_course_code, EntityResolver};
use crate::source::{semester_prefix, TimetableSource};
use crate::Scraper;
use plan_common::db::Term;
use tracing::{info, warn};

/// Outcome of one course import
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseReport {
    pub added: usize,
    pub updated: usize,
}

/// Strip one matching layer of `"` or `'` quotes
pub fn strip_quotes(name: &str) -> &str {
    for quote in ['"', '\''] {
        if name.len() >= 2 && name.starts_with(quote) && name.ends_with(quote) {
            return &name[1..name.len() - 1];
        }
    }
    name
}

/// Parse credit points, accepting a decimal comma
///
/// Blank and unparseable values give `None`; the latter is logged.
pub fn parse_credit_points(raw: Option<&str>) -> Option<f64> {
    let raw = raw.map(str::trim).filter(|r| !r.is_empty())?;

    match raw.replace(',', ".").parse::<f64>() {
        Ok(points) if points.is_finite() => Some(points),
        _ => {
            warn!(raw, "Unparseable credit points");
            None
        }
    }
}

impl<S: TimetableSource> Scraper<S> {
    /// Import course names and credit points for a semester
    pub async fn update_courses(
        &self,
        year: i32,
        term: Term,
        prefix: Option<&str>,
    ) -> ScrapeResult<CourseReport> {
        let prefix = prefix
            .map(str::to_string)
            .unwrap_or_else(|| semester_prefix(year, term));

        let rows = self.source.course_rows(&prefix).await?;

        let mut tx = self.db.begin().await?;
        let semester = get_or_create_semester(&mut tx, year, term).await?;
        let mut resolver = EntityResolver::new();
        let mut report = CourseReport::default();

        for row in &rows {
            if row.code.trim().is_empty() {
                continue;
            }

            let code = normalize_course_code(&row.code);
            if code.is_empty() {
                warn!(raw = %row.code, "Skipping course with unusable code");
                continue;
            }

            let (course_id, created) = resolver.course_with_status(&mut tx, &code).await?;
            link_course_semester(&mut tx, course_id, semester.guid).await?;

            let full_name = strip_quotes(row.full_name.trim());
            let points = parse_credit_points(row.credit_points.as_deref());
            update_course_metadata(&mut tx, course_id, full_name, points).await?;

            if created {
                report.added += 1;
                info!("Added course {}", code);
            } else {
                report.updated += 1;
                info!("Updated course {}", code);
            }
        }

        tx.commit().await?;

        info!(
            added = report.added,
            updated = report.updated,
            "Course import complete for {} {}",
            term,
            year
        );

        Ok(report)
    }
}
