//! Entity resolution
//!
//! Get-or-create for the auxiliary entities a lecture row references:
//! courses, lecture types, groups, rooms and lecturers, keyed by normalized
//! text. The store's UNIQUE constraints make creation idempotent; the
//! resolver memoizes ids so each key costs one round trip per pass.
//!
//! Weeks are the exception: the calendar is pre-seeded and only ever
//! looked up.

use crate::db::courses::get_or_create_course;
use crate::error::ScrapeResult;
use plan_common::db::{DEFAULT_GROUP, MAX_WEEK};
use plan_common::uuid_utils::{generate, parse_guid};
use sqlx::SqliteConnection;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Separator of multi-valued room and lecturer fields
pub const MULTI_VALUE_DELIMITER: char = '#';

/// Reference to an entity the system must not create
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("week {0} is not in the calendar")]
    MissingWeek(i64),
}

/// Simple `(guid, name UNIQUE)` entity tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NamedEntity {
    LectureType,
    Group,
    Room,
    Lecturer,
}

impl NamedEntity {
    fn table(&self) -> &'static str {
        match self {
            NamedEntity::LectureType => "lecture_types",
            NamedEntity::Group => "student_groups",
            NamedEntity::Room => "rooms",
            NamedEntity::Lecturer => "lecturers",
        }
    }
}

/// Normalize a source course code
///
/// Trims, strips a trailing "-N" version suffix and upper-cases:
/// `"tdt4100-1"` becomes `"TDT4100"`.
pub fn normalize_course_code(raw: &str) -> String {
    let code = raw.trim();
    let code = match code.rsplit_once('-') {
        Some((base, suffix)) if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) => {
            base
        }
        _ => code,
    };
    code.trim().to_uppercase()
}

/// Split a multi-valued field into trimmed, non-empty segments
pub fn split_multi_value(spec: &str) -> Vec<&str> {
    spec.split(MULTI_VALUE_DELIMITER)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Expand a week spec such as `"3-5, 7 9"` into week numbers
///
/// Tokens are separated by commas and/or whitespace. Malformed tokens are
/// logged and ignored. A range reaching past the calendar stops at its
/// first week beyond `MAX_WEEK`, which is enough for the calendar check to
/// reject it.
pub fn parse_week_spec(spec: &str) -> BTreeSet<i64> {
    let mut weeks = BTreeSet::new();

    for token in spec
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        if let Some((from, to)) = token.split_once('-') {
            match (from.parse::<i64>(), to.parse::<i64>()) {
                (Ok(from), Ok(to)) if from <= to => {
                    let last = to.min(from.max(MAX_WEEK + 1));
                    weeks.extend(from..=last);
                }
                _ => warn!(token, spec, "Malformed week range"),
            }
        } else if let Ok(week) = token.parse::<i64>() {
            weeks.insert(week);
        } else {
            warn!(token, spec, "Malformed week");
        }
    }

    weeks
}

/// Memoizing get-or-create service for one ingestion pass
///
/// Ids cached here are only valid inside the transaction they were read in,
/// so a resolver must not outlive its pass.
#[derive(Debug, Default)]
pub struct EntityResolver {
    courses: HashMap<String, Uuid>,
    named: HashMap<(&'static str, String), Uuid>,
    calendar: Option<BTreeSet<i64>>,
}

impl EntityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a normalized course code
    pub async fn course(&mut self, conn: &mut SqliteConnection, code: &str) -> ScrapeResult<Uuid> {
        Ok(self.course_with_status(conn, code).await?.0)
    }

    /// Resolve a normalized course code, reporting whether it was created
    pub async fn course_with_status(
        &mut self,
        conn: &mut SqliteConnection,
        code: &str,
    ) -> ScrapeResult<(Uuid, bool)> {
        if let Some(id) = self.courses.get(code) {
            return Ok((*id, false));
        }

        let (id, created) = get_or_create_course(conn, code).await?;
        if created {
            debug!(code, "Created course");
        }
        self.courses.insert(code.to_string(), id);

        Ok((id, created))
    }

    /// Resolve an optional lecture type; blank names resolve to None
    pub async fn lecture_type(
        &mut self,
        conn: &mut SqliteConnection,
        name: Option<&str>,
    ) -> ScrapeResult<Option<Uuid>> {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => Ok(Some(self.named(conn, NamedEntity::LectureType, name).await?)),
            None => Ok(None),
        }
    }

    /// Resolve group names; an empty list resolves to the DEFAULT group
    pub async fn groups(
        &mut self,
        conn: &mut SqliteConnection,
        names: &[String],
    ) -> ScrapeResult<BTreeSet<Uuid>> {
        let mut ids = BTreeSet::new();
        for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            ids.insert(self.named(conn, NamedEntity::Group, name).await?);
        }

        if ids.is_empty() {
            ids.insert(self.named(conn, NamedEntity::Group, DEFAULT_GROUP).await?);
        }

        Ok(ids)
    }

    /// Resolve a `#`-joined room list
    pub async fn rooms(
        &mut self,
        conn: &mut SqliteConnection,
        spec: &str,
    ) -> ScrapeResult<BTreeSet<Uuid>> {
        self.multi_value(conn, NamedEntity::Room, spec).await
    }

    /// Resolve a `#`-joined lecturer list
    pub async fn lecturers(
        &mut self,
        conn: &mut SqliteConnection,
        spec: &str,
    ) -> ScrapeResult<BTreeSet<Uuid>> {
        self.multi_value(conn, NamedEntity::Lecturer, spec).await
    }

    /// Expand a week spec and check every week against the calendar
    pub async fn weeks(
        &mut self,
        conn: &mut SqliteConnection,
        spec: &str,
    ) -> ScrapeResult<BTreeSet<i64>> {
        if self.calendar.is_none() {
            let numbers: Vec<i64> = sqlx::query_scalar("SELECT number FROM weeks")
                .fetch_all(&mut *conn)
                .await?;
            self.calendar = Some(numbers.into_iter().collect());
        }

        let weeks = parse_week_spec(spec);
        if let Some(calendar) = &self.calendar {
            if let Some(missing) = weeks.iter().find(|w| !calendar.contains(w)) {
                return Err(LookupError::MissingWeek(*missing).into());
            }
        }

        Ok(weeks)
    }

    async fn multi_value(
        &mut self,
        conn: &mut SqliteConnection,
        entity: NamedEntity,
        spec: &str,
    ) -> ScrapeResult<BTreeSet<Uuid>> {
        let mut ids = BTreeSet::new();
        for name in split_multi_value(spec) {
            ids.insert(self.named(conn, entity, name).await?);
        }
        Ok(ids)
    }

    async fn named(
        &mut self,
        conn: &mut SqliteConnection,
        entity: NamedEntity,
        name: &str,
    ) -> ScrapeResult<Uuid> {
        let key = (entity.table(), name.to_string());
        if let Some(id) = self.named.get(&key) {
            return Ok(*id);
        }

        let id = get_or_create_named(conn, entity, name).await?;
        self.named.insert(key, id);
        Ok(id)
    }
}

async fn get_or_create_named(
    conn: &mut SqliteConnection,
    entity: NamedEntity,
    name: &str,
) -> ScrapeResult<Uuid> {
    let insert = format!(
        "INSERT INTO {} (guid, name) VALUES (?, ?) ON CONFLICT(name) DO NOTHING",
        entity.table()
    );
    let inserted = sqlx::query(&insert)
        .bind(generate().to_string())
        .bind(name)
        .execute(&mut *conn)
        .await?;

    if inserted.rows_affected() == 1 {
        debug!(table = entity.table(), name, "Created entity");
    }

    let select = format!("SELECT guid FROM {} WHERE name = ?", entity.table());
    let guid: String = sqlx::query_scalar(&select)
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;

    Ok(parse_guid(&guid)?)
}
