//! Semester database operations

use plan_common::db::{Semester, Term};
use plan_common::uuid_utils::{generate, parse_guid};
use plan_common::Result;
use sqlx::SqliteConnection;

/// Get or create the semester for (year, term)
pub async fn get_or_create_semester(
    conn: &mut SqliteConnection,
    year: i32,
    term: Term,
) -> Result<Semester> {
    sqlx::query(
        "INSERT INTO semesters (guid, year, term) VALUES (?, ?, ?)
         ON CONFLICT(year, term) DO NOTHING",
    )
    .bind(generate().to_string())
    .bind(year)
    .bind(term.as_str())
    .execute(&mut *conn)
    .await?;

    let guid: String = sqlx::query_scalar("SELECT guid FROM semesters WHERE year = ? AND term = ?")
        .bind(year)
        .bind(term.as_str())
        .fetch_one(&mut *conn)
        .await?;

    Ok(Semester {
        guid: parse_guid(&guid)?,
        year,
        term,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        plan_common::db::init_schema(&pool).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let first = get_or_create_semester(&mut conn, 2024, Term::Spring).await.unwrap();
        let second = get_or_create_semester(&mut conn, 2024, Term::Spring).await.unwrap();
        let autumn = get_or_create_semester(&mut conn, 2024, Term::Autumn).await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first.guid, autumn.guid);
    }
}
