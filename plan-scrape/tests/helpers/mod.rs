//! Test Helper Utilities
//!
//! Shared fixtures for plan-scrape integration tests: an in-memory schedule
//! store and a scriptable timetable source.

#![allow(dead_code)]

use async_trait::async_trait;
use plan_scrape::source::{CourseRow, LectureRow, TimetableSource};
use plan_scrape::ScrapeResult;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Mutex;

/// Fresh in-memory store with the full schema
///
/// Single connection, so every query sees the same in-memory database.
pub async fn create_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    plan_common::db::init_schema(&pool).await.unwrap();
    pool
}

/// Row count of a table
pub async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Timetable row with no type, rooms or lecturers
pub fn lecture_row(code: &str, day: &str, start: &str, end: &str, weeks: &str, activity: &str) -> LectureRow {
    LectureRow {
        course_code: code.to_string(),
        type_name: None,
        day: day.to_string(),
        start: start.to_string(),
        end: end.to_string(),
        weeks: weeks.to_string(),
        rooms: String::new(),
        lecturers: String::new(),
        activity_code: activity.to_string(),
    }
}

/// In-memory timetable source
///
/// Rows and group lists can be replaced between passes to simulate the
/// legacy data changing.
#[derive(Default)]
pub struct FakeSource {
    lectures: Mutex<Vec<LectureRow>>,
    groups: Mutex<HashMap<String, Vec<String>>>,
    courses: Mutex<Vec<CourseRow>>,
    prefixes: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn new(lectures: Vec<LectureRow>) -> Self {
        let source = Self::default();
        source.set_lectures(lectures);
        source
    }

    pub fn set_lectures(&self, lectures: Vec<LectureRow>) {
        *self.lectures.lock().unwrap() = lectures;
    }

    pub fn set_groups(&self, activity: &str, groups: &[&str]) {
        self.groups.lock().unwrap().insert(
            activity.to_string(),
            groups.iter().map(|g| g.to_string()).collect(),
        );
    }

    pub fn set_courses(&self, courses: Vec<CourseRow>) {
        *self.courses.lock().unwrap() = courses;
    }

    /// Prefixes requested so far, in call order
    pub fn prefixes(&self) -> Vec<String> {
        self.prefixes.lock().unwrap().clone()
    }

    fn record_prefix(&self, prefix: &str) {
        self.prefixes.lock().unwrap().push(prefix.to_string());
    }
}

#[async_trait]
impl TimetableSource for FakeSource {
    async fn lecture_rows(&self, prefix: &str, limit: Option<&str>) -> ScrapeResult<Vec<LectureRow>> {
        self.record_prefix(prefix);

        let rows = self.lectures.lock().unwrap().clone();
        Ok(rows
            .into_iter()
            .filter(|row| !row.course_code.starts_with('#'))
            .filter(|row| match limit {
                Some(limit) => row
                    .course_code
                    .to_lowercase()
                    .starts_with(&limit.to_lowercase()),
                None => true,
            })
            .collect())
    }

    async fn activity_groups(&self, _prefix: &str, activity_code: &str) -> ScrapeResult<Vec<String>> {
        Ok(self
            .groups
            .lock()
            .unwrap()
            .get(activity_code)
            .cloned()
            .unwrap_or_default())
    }

    async fn course_rows(&self, prefix: &str) -> ScrapeResult<Vec<CourseRow>> {
        self.record_prefix(prefix);
        Ok(self.courses.lock().unwrap().clone())
    }
}
