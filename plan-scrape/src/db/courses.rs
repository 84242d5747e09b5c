//! Course database operations

use plan_common::db::Course;
use plan_common::uuid_utils::{generate, parse_guid};
use plan_common::Result;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

/// Get or create a course by its normalized code
///
/// Returns the course id and whether this call created it.
pub async fn get_or_create_course(conn: &mut SqliteConnection, code: &str) -> Result<(Uuid, bool)> {
    let inserted = sqlx::query(
        "INSERT INTO courses (guid, code) VALUES (?, ?)
         ON CONFLICT(code) DO NOTHING",
    )
    .bind(generate().to_string())
    .bind(code)
    .execute(&mut *conn)
    .await?;

    let guid: String = sqlx::query_scalar("SELECT guid FROM courses WHERE code = ?")
        .bind(code)
        .fetch_one(&mut *conn)
        .await?;

    Ok((parse_guid(&guid)?, inserted.rows_affected() == 1))
}

/// Record that a course is taught in a semester
pub async fn link_course_semester(
    conn: &mut SqliteConnection,
    course_id: Uuid,
    semester_id: Uuid,
) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO course_semesters (course_id, semester_id) VALUES (?, ?)")
        .bind(course_id.to_string())
        .bind(semester_id.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Overwrite name and, when given, credit points
pub async fn update_course_metadata(
    conn: &mut SqliteConnection,
    course_id: Uuid,
    full_name: &str,
    credit_points: Option<f64>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE courses
        SET full_name = ?,
            credit_points = COALESCE(?, credit_points),
            updated_at = CURRENT_TIMESTAMP
        WHERE guid = ?
        "#,
    )
    .bind(full_name)
    .bind(credit_points)
    .bind(course_id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Load course by code
pub async fn load_course_by_code(conn: &mut SqliteConnection, code: &str) -> Result<Option<Course>> {
    let row = sqlx::query("SELECT guid, code, full_name, credit_points FROM courses WHERE code = ?")
        .bind(code)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => {
            let guid: String = row.get("guid");
            Ok(Some(Course {
                guid: parse_guid(&guid)?,
                code: row.get("code"),
                full_name: row.get("full_name"),
                credit_points: row.get("credit_points"),
            }))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    #[tokio::test]
    async fn test_course_metadata_keeps_points_when_absent() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        plan_common::db::init_schema(&pool).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let (id, created) = get_or_create_course(&mut conn, "TDT4100").await.unwrap();
        assert!(created);
        let (again, created) = get_or_create_course(&mut conn, "TDT4100").await.unwrap();
        assert_eq!(id, again);
        assert!(!created);

        update_course_metadata(&mut conn, id, "Objektorientert programmering", Some(7.5))
            .await
            .unwrap();
        update_course_metadata(&mut conn, id, "Object-oriented programming", None)
            .await
            .unwrap();

        let course = load_course_by_code(&mut conn, "TDT4100").await.unwrap().unwrap();
        assert_eq!(course.full_name, "Object-oriented programming");
        assert_eq!(course.credit_points, Some(7.5));
    }
}
