//! Lecture reconciliation pass
//!
//! Pulls every timetable row of one semester from the legacy source and
//! makes the store agree with it. Each row is resolved into entity ids,
//! matched against an existing lecture with the same identity tuple and
//! group set, then either updates that lecture or creates a new one.
//! Lectures in scope that no row claimed are reported as stale; the pass
//! never deletes them.
//!
//! The whole pass runs in one store transaction. A pass-level error drops
//! the transaction, so a failed pass leaves the store untouched.

use crate::config::WeekLookupPolicy;
use crate::db::courses::link_course_semester;
use crate::db::lectures::{self as lecture_db, LectureIdentity, LinkTable};
use crate::db::semesters::get_or_create_semester;
use crate::error::{ScrapeError, ScrapeResult};
use crate::normalize::normalize;
use crate::resolver::{normalize_course_code, EntityResolver};
use crate::source::{semester_prefix, LectureRow, TimetableSource};
use crate::Scraper;
use plan_common::db::Term;
use sqlx::SqliteConnection;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outcome of one lecture pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Rows with a non-blank course code
    pub source_rows: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    /// In-scope lectures no row claimed
    pub stale: HashSet<Uuid>,
}

impl PassReport {
    /// Lectures claimed by this pass
    pub fn consumed(&self) -> usize {
        self.created + self.updated
    }
}

/// A row with every reference turned into an id
#[derive(Debug)]
struct ResolvedRow {
    course_code: String,
    identity: LectureIdentity,
    groups: BTreeSet<Uuid>,
    rooms: BTreeSet<Uuid>,
    lecturers: BTreeSet<Uuid>,
    weeks: BTreeSet<i64>,
    start_text: String,
    end_text: String,
}

/// Per-pass state; dropped when the pass ends
struct PassContext<'a, S: TimetableSource> {
    source: &'a S,
    prefix: &'a str,
    semester_id: Uuid,
    week_policy: WeekLookupPolicy,
    resolver: EntityResolver,
    linked_courses: HashSet<Uuid>,
    consumed: HashSet<Uuid>,
    report: PassReport,
}

impl<'a, S: TimetableSource> PassContext<'a, S> {
    /// RESOLVE; `None` means the row is skipped
    async fn resolve(
        &mut self,
        conn: &mut SqliteConnection,
        row: &LectureRow,
    ) -> ScrapeResult<Option<ResolvedRow>> {
        let code = normalize_course_code(&row.course_code);
        if code.is_empty() {
            warn!(raw = %row.course_code, "Skipping row with unusable course code");
            return Ok(None);
        }

        let course_id = self.resolver.course(conn, &code).await?;
        if self.linked_courses.insert(course_id) {
            link_course_semester(conn, course_id, self.semester_id).await?;
        }

        let slot = match normalize(&row.day, &row.start, &row.end) {
            Ok(slot) => slot,
            Err(e) => {
                warn!(
                    course = %code,
                    day = %row.day,
                    start = %row.start,
                    end = %row.end,
                    error = %e,
                    "Could not add lecture"
                );
                return Ok(None);
            }
        };

        let type_id = self.resolver.lecture_type(conn, row.type_name.as_deref()).await?;
        let rooms = self.resolver.rooms(conn, &row.rooms).await?;
        let lecturers = self.resolver.lecturers(conn, &row.lecturers).await?;

        let weeks = match self.resolver.weeks(conn, &row.weeks).await {
            Ok(weeks) => weeks,
            Err(ScrapeError::Lookup(e)) if self.week_policy == WeekLookupPolicy::SkipRow => {
                warn!(course = %code, weeks = %row.weeks, error = %e, "Skipping lecture");
                return Ok(None);
            }
            Err(e) => {
                error!(course = %code, weeks = %row.weeks, error = %e, "Aborting lecture pass");
                return Err(e);
            }
        };

        let group_names = self
            .source
            .activity_groups(self.prefix, &row.activity_code)
            .await?;
        let groups = self.resolver.groups(conn, &group_names).await?;

        Ok(Some(ResolvedRow {
            course_code: code,
            identity: LectureIdentity {
                course_id,
                semester_id: self.semester_id,
                day: slot.day,
                start_slot: slot.start_slot,
                end_slot: slot.end_slot,
                type_id,
            },
            groups,
            rooms,
            lecturers,
            weeks,
            start_text: row.start.trim().to_string(),
            end_text: row.end.trim().to_string(),
        }))
    }

    /// MATCH, then UPDATE or CREATE
    async fn apply(&mut self, conn: &mut SqliteConnection, row: ResolvedRow) -> ScrapeResult<()> {
        let mut matches = Vec::new();
        for id in lecture_db::find_by_identity(conn, &row.identity).await? {
            if self.consumed.contains(&id) {
                continue;
            }
            if lecture_db::linked_ids(conn, id, LinkTable::Groups).await? == row.groups {
                matches.push(id);
            }
        }

        if matches.len() > 1 {
            warn!(
                course = %row.course_code,
                candidates = matches.len(),
                "Several lectures share identity and groups, updating the oldest"
            );
        }

        match matches.first().copied() {
            Some(id) => {
                lecture_db::replace_links(conn, id, LinkTable::Rooms, &row.rooms).await?;
                lecture_db::replace_links(conn, id, LinkTable::Lecturers, &row.lecturers).await?;
                lecture_db::replace_weeks(conn, id, &row.weeks).await?;
                lecture_db::update_display_text(conn, id, &row.start_text, &row.end_text).await?;

                self.consumed.insert(id);
                self.report.updated += 1;
                debug!(lecture = %id, course = %row.course_code, "Lecture saved");
            }
            None => {
                let id =
                    lecture_db::insert_lecture(conn, &row.identity, &row.start_text, &row.end_text)
                        .await?;
                lecture_db::replace_links(conn, id, LinkTable::Groups, &row.groups).await?;
                lecture_db::replace_links(conn, id, LinkTable::Rooms, &row.rooms).await?;
                lecture_db::replace_links(conn, id, LinkTable::Lecturers, &row.lecturers).await?;
                lecture_db::replace_weeks(conn, id, &row.weeks).await?;

                self.consumed.insert(id);
                self.report.created += 1;
                debug!(lecture = %id, course = %row.course_code, "Lecture added");
            }
        }

        Ok(())
    }
}

impl<S: TimetableSource> Scraper<S> {
    /// Delete the lectures a pass reported as stale
    ///
    /// Refused when the pass read no source rows: an empty read makes every
    /// lecture in scope stale, and a semester is never emptied on that alone.
    pub async fn delete_stale(&self, report: &PassReport) -> ScrapeResult<u64> {
        if report.stale.is_empty() {
            return Ok(0);
        }
        if report.source_rows == 0 {
            return Err(ScrapeError::EmptySource(report.stale.len()));
        }

        let stale: Vec<Uuid> = report.stale.iter().copied().collect();
        let deleted = lecture_db::delete_lectures(&self.db, &stale).await?;
        info!("Deleted {} stale lectures", deleted);
        Ok(deleted)
    }

    /// Run a lecture pass and return the stale lecture ids
    pub async fn update_lectures(
        &self,
        year: i32,
        term: Term,
        prefix: Option<&str>,
        limit: Option<&str>,
    ) -> ScrapeResult<HashSet<Uuid>> {
        Ok(self.reconcile_lectures(year, term, prefix, limit).await?.stale)
    }

    /// Run a lecture pass and return the full report
    ///
    /// `prefix` overrides the legacy table prefix derived from the
    /// semester. `limit` restricts both the source rows and the stale scope
    /// to course codes starting with it.
    pub async fn reconcile_lectures(
        &self,
        year: i32,
        term: Term,
        prefix: Option<&str>,
        limit: Option<&str>,
    ) -> ScrapeResult<PassReport> {
        let prefix = prefix
            .map(str::to_string)
            .unwrap_or_else(|| semester_prefix(year, term));
        debug!(prefix = %prefix, "Using prefix");
        if let Some(limit) = limit {
            info!("Limiting to {}*", limit);
        }

        let rows = self.source.lecture_rows(&prefix, limit).await?;

        let mut tx = self.db.begin().await?;
        let semester = get_or_create_semester(&mut tx, year, term).await?;

        let mut ctx = PassContext {
            source: &self.source,
            prefix: &prefix,
            semester_id: semester.guid,
            week_policy: self.week_policy,
            resolver: EntityResolver::new(),
            linked_courses: HashSet::new(),
            consumed: HashSet::new(),
            report: PassReport::default(),
        };

        for row in &rows {
            if row.course_code.trim().is_empty() {
                continue;
            }
            ctx.report.source_rows += 1;

            match ctx.resolve(&mut tx, row).await? {
                Some(resolved) => ctx.apply(&mut tx, resolved).await?,
                None => ctx.report.skipped += 1,
            }
        }

        let in_scope = lecture_db::lectures_in_scope(&mut tx, semester.guid, limit).await?;
        ctx.report.stale = in_scope
            .into_iter()
            .filter(|id| !ctx.consumed.contains(id))
            .collect();

        tx.commit().await?;

        let report = ctx.report;
        info!(
            "{} lectures in source db, {} in destination",
            report.source_rows,
            report.consumed()
        );
        info!(
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            stale = report.stale.len(),
            "Lecture pass complete for {} {}",
            term,
            year
        );

        Ok(report)
    }
}
