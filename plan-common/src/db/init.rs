//! Schedule store initialization
//!
//! Creates the schema on first run and seeds the fixed data the importers
//! rely on: the week calendar and default runtime settings. Every step is
//! idempotent, so this runs on every startup.

use crate::db::models::MAX_WEEK;
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Open (or create) the schedule store and bring its schema up to date
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(std::time::Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and seed fixed data
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_semesters_table(pool).await?;
    create_courses_table(pool).await?;
    create_name_table(pool, "lecture_types").await?;
    create_name_table(pool, "student_groups").await?;
    create_name_table(pool, "rooms").await?;
    create_name_table(pool, "lecturers").await?;
    create_weeks_table(pool).await?;
    create_lectures_table(pool).await?;
    create_lecture_link_tables(pool).await?;
    create_scrape_cache_table(pool).await?;

    seed_week_calendar(pool).await?;
    init_default_settings(pool).await?;

    Ok(())
}

/// Create the settings table
///
/// Stores runtime configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_semesters_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS semesters (
            guid TEXT PRIMARY KEY,
            year INTEGER NOT NULL,
            term TEXT NOT NULL CHECK (term IN ('spring', 'autumn')),
            UNIQUE (year, term)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_courses_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS courses (
            guid TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL DEFAULT '',
            credit_points REAL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS course_semesters (
            course_id TEXT NOT NULL REFERENCES courses(guid) ON DELETE CASCADE,
            semester_id TEXT NOT NULL REFERENCES semesters(guid) ON DELETE CASCADE,
            PRIMARY KEY (course_id, semester_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create one of the simple `(guid, name UNIQUE)` entity tables
async fn create_name_table(pool: &SqlitePool, table: &str) -> Result<()> {
    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )
        "#,
        table
    );
    sqlx::query(&sql).execute(pool).await?;

    Ok(())
}

async fn create_weeks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS weeks (
            number INTEGER PRIMARY KEY CHECK (number >= 1)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_lectures_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lectures (
            guid TEXT PRIMARY KEY,
            course_id TEXT NOT NULL REFERENCES courses(guid) ON DELETE CASCADE,
            semester_id TEXT NOT NULL REFERENCES semesters(guid) ON DELETE CASCADE,
            day INTEGER NOT NULL CHECK (day BETWEEN 0 AND 4),
            start_slot INTEGER NOT NULL,
            end_slot INTEGER NOT NULL,
            type_id TEXT REFERENCES lecture_types(guid),
            start_text TEXT NOT NULL DEFAULT '',
            end_text TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_lectures_identity ON lectures(semester_id, course_id, day, start_slot, end_slot)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_lecture_link_tables(pool: &SqlitePool) -> Result<()> {
    for (table, column, column_type, target) in [
        ("lecture_groups", "group_id", "TEXT", "student_groups(guid)"),
        ("lecture_rooms", "room_id", "TEXT", "rooms(guid)"),
        ("lecture_lecturers", "lecturer_id", "TEXT", "lecturers(guid)"),
        ("lecture_weeks", "week_number", "INTEGER", "weeks(number)"),
    ] {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                lecture_id TEXT NOT NULL REFERENCES lectures(guid) ON DELETE CASCADE,
                {column} {column_type} NOT NULL REFERENCES {target},
                PRIMARY KEY (lecture_id, {column})
            )
            "#
        );
        sqlx::query(&sql).execute(pool).await?;
    }

    Ok(())
}

async fn create_scrape_cache_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scrape_cache (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            cached_at TEXT NOT NULL DEFAULT (datetime('now')),
            CHECK (length(key) = 64)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Seed weeks 1..=53
///
/// Importers only ever look weeks up; this is the single place they are created.
pub async fn seed_week_calendar(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;
    for number in 1..=MAX_WEEK {
        sqlx::query("INSERT OR IGNORE INTO weeks (number) VALUES (?)")
            .bind(number)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    Ok(())
}

/// Ensure every runtime setting has a value
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, "week_lookup_policy", "abort").await?;
    ensure_setting(pool, "http_timeout_secs", "30").await?;

    Ok(())
}

/// Insert a setting with its default, or reset it if it is NULL
async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        WHERE settings.value IS NULL
        "#,
    )
    .bind(key)
    .bind(default_value)
    .execute(pool)
    .await?;

    Ok(())
}
