//! Settings database operations
//!
//! Get/set accessors for the `settings` key-value table.

use plan_common::{Error, Result};
use sqlx::SqlitePool;

/// Generic setting getter
///
/// Returns None when the key is absent or NULL.
pub async fn get_setting<T>(db: &SqlitePool, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(Option<String>,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row.and_then(|(value,)| value) {
        Some(value) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting '{}' failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Generic setting setter
pub async fn set_setting<T>(db: &SqlitePool, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        plan_common::db::create_settings_table(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_missing_setting_is_none() {
        let pool = setup_test_db().await;
        let value = get_setting::<u64>(&pool, "http_timeout_secs").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_set_then_get_overwrites() {
        let pool = setup_test_db().await;

        set_setting(&pool, "http_timeout_secs", 10).await.unwrap();
        set_setting(&pool, "http_timeout_secs", 12).await.unwrap();

        let value = get_setting::<u64>(&pool, "http_timeout_secs").await.unwrap();
        assert_eq!(value, Some(12));
    }

    #[tokio::test]
    async fn test_unparseable_setting_is_config_error() {
        let pool = setup_test_db().await;
        set_setting(&pool, "http_timeout_secs", "soon").await.unwrap();

        let result = get_setting::<u64>(&pool, "http_timeout_secs").await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
