//! Tests for schedule store initialization
//!
//! Covers automatic database creation, idempotent re-initialization and the
//! fixed data seeded on startup (week calendar, default settings).

use plan_common::db::init::init_database;
use plan_common::db::MAX_WEEK;
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("plan.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("plan.db");

    let pool1 = init_database(&db_path).await.unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_week_calendar_seeded_once() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("plan.db");

    let pool = init_database(&db_path).await.unwrap();
    pool.close().await;
    // Second startup must not duplicate or fail on existing weeks
    let pool = init_database(&db_path).await.unwrap();

    let (count, min, max): (i64, i64, i64) =
        sqlx::query_as("SELECT COUNT(*), MIN(number), MAX(number) FROM weeks")
            .fetch_one(&pool)
            .await
            .unwrap();

    assert_eq!(count, MAX_WEEK);
    assert_eq!(min, 1);
    assert_eq!(max, MAX_WEEK);
}

#[tokio::test]
async fn test_default_settings_initialized() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("plan.db");
    let pool = init_database(&db_path).await.unwrap();

    let policy: String = sqlx::query_scalar("SELECT value FROM settings WHERE key = 'week_lookup_policy'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(policy, "abort");

    let timeout: String = sqlx::query_scalar("SELECT value FROM settings WHERE key = 'http_timeout_secs'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(timeout, "30");
}

#[tokio::test]
async fn test_existing_settings_survive_restart() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("plan.db");

    let pool = init_database(&db_path).await.unwrap();
    sqlx::query("UPDATE settings SET value = 'skip-row' WHERE key = 'week_lookup_policy'")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let policy: String = sqlx::query_scalar("SELECT value FROM settings WHERE key = 'week_lookup_policy'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(policy, "skip-row");
}
