//! Tests for the legacy relational source
//!
//! The legacy tables are recreated in a SQLite file and read through the
//! same `AnyPool` path production uses for MySQL.

mod helpers;

use futures::StreamExt;
use helpers::{count, create_test_db};
use plan_common::db::Term;
use plan_scrape::fetch::{sql, try_sql, SourceRow};
use plan_scrape::source::{LegacySource, TimetableSource};
use plan_scrape::{ScrapeError, Scraper};
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use tempfile::TempDir;

const LEGACY_SCHEMA: &[&str] = &[
    "CREATE TABLE h24_timeplan (
        emnekode TEXT, typenavn TEXT, dag TEXT, start TEXT, slutt TEXT,
        uke TEXT, romnavn TEXT, larer TEXT, aktkode TEXT
    )",
    "CREATE TABLE h24_akt_studieprogram (aktkode TEXT, studieprogramkode TEXT)",
    "CREATE TABLE studieprogram (studieprogram_kode TEXT)",
    "CREATE TABLE h24_fs_emne (emnekode TEXT, emnenavn TEXT, vekt REAL)",
    "INSERT INTO h24_timeplan VALUES
        ('TDT4100-1', 'Forelesning', 'mandag', '08:15', '10:00', '2-5', 'R1#S5', 'Ola Nordmann', 'A1'),
        ('TDT4100-1', NULL, 'onsdag', '12:15', '14:00', '2-14', '', '', 'A2'),
        ('TMA4100-1', 'Forelesning', 'fredag', '10:15', '12:00', '1,3', 'F1', '', 'A3'),
        ('#TDT4100-1', 'Forelesning', 'mandag', '08:15', '10:00', '2', '', '', 'A1')",
    "INSERT INTO h24_akt_studieprogram VALUES ('A1', 'MTDT'), ('A1', 'BIT'), ('A1', 'GONE'), ('A3', 'MTDT')",
    "INSERT INTO studieprogram VALUES ('MTDT'), ('BIT')",
    "INSERT INTO h24_fs_emne VALUES ('TDT4100-1', '\"Objektorientert programmering\"', 7.5), ('#X-1', 'Hidden', 0), ('TMA4100-1', 'Matematikk 1', NULL)",
];

async fn legacy_pool(temp_dir: &TempDir) -> AnyPool {
    sqlx::any::install_default_drivers();

    let path = temp_dir.path().join("legacy.db");
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let pool = AnyPoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await
        .unwrap();

    for statement in LEGACY_SCHEMA {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    pool
}

#[tokio::test]
async fn test_sql_streams_rows_by_column_name() {
    let temp_dir = TempDir::new().unwrap();
    let pool = legacy_pool(&temp_dir).await;

    let params = vec!["A1".to_string()];
    let rows: Vec<SourceRow> = sql(
        &pool,
        "SELECT aktkode, studieprogramkode FROM h24_akt_studieprogram WHERE aktkode = ? ORDER BY studieprogramkode",
        &params,
    )
    .collect()
    .await;

    let programmes: Vec<String> = rows.iter().map(|r| r.text("studieprogramkode")).collect();
    assert_eq!(programmes, vec!["BIT", "GONE", "MTDT"]);
}

#[tokio::test]
async fn test_sql_error_ends_stream() {
    let temp_dir = TempDir::new().unwrap();
    let pool = legacy_pool(&temp_dir).await;

    let rows: Vec<SourceRow> = sql(&pool, "SELECT * FROM no_such_table", &[]).collect().await;

    assert!(rows.is_empty());

    let results: Vec<_> = try_sql(&pool, "SELECT * FROM no_such_table", &[]).collect().await;
    assert_eq!(results.len(), 1);
    assert!(results[0].is_err());
}

#[tokio::test]
async fn test_lecture_rows_skip_hash_codes_and_apply_limit() {
    let temp_dir = TempDir::new().unwrap();
    let source = LegacySource::new(legacy_pool(&temp_dir).await);

    let rows = source.lecture_rows("h24", None).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].rooms, "R1#S5");
    assert_eq!(rows[1].type_name, None);

    let limited = source.lecture_rows("h24", Some("TMA")).await.unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].course_code, "TMA4100-1");
}

#[tokio::test]
async fn test_activity_groups_join_known_programmes() {
    let temp_dir = TempDir::new().unwrap();
    let source = LegacySource::new(legacy_pool(&temp_dir).await);

    let mut groups = source.activity_groups("h24", "A1").await.unwrap();
    groups.sort();
    assert_eq!(groups, vec!["BIT", "MTDT"]);

    assert!(source.activity_groups("h24", "A2").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_course_rows_render_numeric_points() {
    let temp_dir = TempDir::new().unwrap();
    let source = LegacySource::new(legacy_pool(&temp_dir).await);

    let rows = source.course_rows("h24").await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].credit_points.as_deref(), Some("7.5"));
    assert_eq!(rows[1].credit_points, None);
}

#[tokio::test]
async fn test_unsafe_prefix_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let source = LegacySource::new(legacy_pool(&temp_dir).await);

    let result = source.lecture_rows("h24_timeplan; --", None).await;
    assert!(matches!(result, Err(ScrapeError::InvalidPrefix(_))));
}

#[tokio::test]
async fn test_full_pass_over_legacy_source() {
    let temp_dir = TempDir::new().unwrap();
    let source = LegacySource::new(legacy_pool(&temp_dir).await);
    let scraper = Scraper::new(create_test_db().await, source);

    let lectures = scraper.reconcile_lectures(2024, Term::Autumn, None, None).await.unwrap();
    assert_eq!(lectures.created, 3);

    let courses = scraper.update_courses(2024, Term::Autumn, None).await.unwrap();
    assert_eq!(courses.added, 0);
    assert_eq!(courses.updated, 2);

    let again = scraper.reconcile_lectures(2024, Term::Autumn, None, None).await.unwrap();
    assert_eq!(again.created, 0);
    assert_eq!(again.updated, 3);

    assert_eq!(count(&scraper.db, "lectures").await, 3);
    // MTDT, BIT and the default group
    assert_eq!(count(&scraper.db, "student_groups").await, 3);
}

#[tokio::test]
async fn test_missing_legacy_tables_fail_the_pass() {
    let temp_dir = TempDir::new().unwrap();
    let source = LegacySource::new(legacy_pool(&temp_dir).await);
    let scraper = Scraper::new(create_test_db().await, source);

    let first = scraper.reconcile_lectures(2024, Term::Autumn, None, None).await.unwrap();
    assert_eq!(first.created, 3);

    // No h42_* tables exist
    let result = scraper
        .reconcile_lectures(2024, Term::Autumn, Some("h42"), None)
        .await;
    assert!(matches!(result, Err(ScrapeError::Database(_))));

    let result = scraper.update_courses(2024, Term::Autumn, Some("h42")).await;
    assert!(matches!(result, Err(ScrapeError::Database(_))));

    assert_eq!(count(&scraper.db, "lectures").await, 3);
}
