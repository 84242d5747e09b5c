//! Lecture database operations
//!
//! Lectures are keyed for matching by their identity tuple (course,
//! semester, day, start slot, end slot, type). The link tables hold the
//! many-to-many sets: groups, rooms, lecturers and weeks.

use plan_common::db::Lecture;
use plan_common::uuid_utils::{generate, parse_guid};
use plan_common::Result;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Matching key of a lecture, before group-set comparison
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LectureIdentity {
    pub course_id: Uuid,
    pub semester_id: Uuid,
    pub day: i64,
    pub start_slot: i64,
    pub end_slot: i64,
    pub type_id: Option<Uuid>,
}

/// Link tables whose members are entity guids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTable {
    Groups,
    Rooms,
    Lecturers,
}

impl LinkTable {
    fn table(&self) -> &'static str {
        match self {
            LinkTable::Groups => "lecture_groups",
            LinkTable::Rooms => "lecture_rooms",
            LinkTable::Lecturers => "lecture_lecturers",
        }
    }

    fn column(&self) -> &'static str {
        match self {
            LinkTable::Groups => "group_id",
            LinkTable::Rooms => "room_id",
            LinkTable::Lecturers => "lecturer_id",
        }
    }

    fn entity_table(&self) -> &'static str {
        match self {
            LinkTable::Groups => "student_groups",
            LinkTable::Rooms => "rooms",
            LinkTable::Lecturers => "lecturers",
        }
    }
}

/// Lectures sharing an identity tuple, in creation order
pub async fn find_by_identity(
    conn: &mut SqliteConnection,
    identity: &LectureIdentity,
) -> Result<Vec<Uuid>> {
    let guids: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT guid FROM lectures
        WHERE course_id = ? AND semester_id = ? AND day = ?
          AND start_slot = ? AND end_slot = ? AND type_id IS ?
        ORDER BY rowid
        "#,
    )
    .bind(identity.course_id.to_string())
    .bind(identity.semester_id.to_string())
    .bind(identity.day)
    .bind(identity.start_slot)
    .bind(identity.end_slot)
    .bind(identity.type_id.map(|t| t.to_string()))
    .fetch_all(&mut *conn)
    .await?;

    guids.iter().map(|g| parse_guid(g)).collect()
}

/// Insert a lecture row (no links)
pub async fn insert_lecture(
    conn: &mut SqliteConnection,
    identity: &LectureIdentity,
    start_text: &str,
    end_text: &str,
) -> Result<Uuid> {
    let guid = generate();

    sqlx::query(
        r#"
        INSERT INTO lectures (
            guid, course_id, semester_id, day, start_slot, end_slot, type_id,
            start_text, end_text
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(guid.to_string())
    .bind(identity.course_id.to_string())
    .bind(identity.semester_id.to_string())
    .bind(identity.day)
    .bind(identity.start_slot)
    .bind(identity.end_slot)
    .bind(identity.type_id.map(|t| t.to_string()))
    .bind(start_text)
    .bind(end_text)
    .execute(&mut *conn)
    .await?;

    Ok(guid)
}

/// Overwrite the display clock text
pub async fn update_display_text(
    conn: &mut SqliteConnection,
    lecture_id: Uuid,
    start_text: &str,
    end_text: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE lectures SET start_text = ?, end_text = ?, updated_at = CURRENT_TIMESTAMP WHERE guid = ?",
    )
    .bind(start_text)
    .bind(end_text)
    .bind(lecture_id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Current member ids of one link table
pub async fn linked_ids(
    conn: &mut SqliteConnection,
    lecture_id: Uuid,
    link: LinkTable,
) -> Result<BTreeSet<Uuid>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE lecture_id = ?",
        link.column(),
        link.table()
    );
    let guids: Vec<String> = sqlx::query_scalar(&sql)
        .bind(lecture_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

    guids.iter().map(|g| parse_guid(g)).collect()
}

/// Replace the members of one link table
pub async fn replace_links(
    conn: &mut SqliteConnection,
    lecture_id: Uuid,
    link: LinkTable,
    ids: &BTreeSet<Uuid>,
) -> Result<()> {
    let delete = format!("DELETE FROM {} WHERE lecture_id = ?", link.table());
    sqlx::query(&delete)
        .bind(lecture_id.to_string())
        .execute(&mut *conn)
        .await?;

    let insert = format!(
        "INSERT INTO {} (lecture_id, {}) VALUES (?, ?)",
        link.table(),
        link.column()
    );
    for id in ids {
        sqlx::query(&insert)
            .bind(lecture_id.to_string())
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Replace the week set of a lecture
pub async fn replace_weeks(
    conn: &mut SqliteConnection,
    lecture_id: Uuid,
    weeks: &BTreeSet<i64>,
) -> Result<()> {
    sqlx::query("DELETE FROM lecture_weeks WHERE lecture_id = ?")
        .bind(lecture_id.to_string())
        .execute(&mut *conn)
        .await?;

    for week in weeks {
        sqlx::query("INSERT INTO lecture_weeks (lecture_id, week_number) VALUES (?, ?)")
            .bind(lecture_id.to_string())
            .bind(*week)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Lectures of a semester, optionally limited to course codes with a prefix
pub async fn lectures_in_scope(
    conn: &mut SqliteConnection,
    semester_id: Uuid,
    course_prefix: Option<&str>,
) -> Result<Vec<Uuid>> {
    let guids: Vec<String> = match course_prefix {
        Some(prefix) => {
            let prefix = prefix.trim().to_uppercase();
            sqlx::query_scalar(
                r#"
                SELECT l.guid FROM lectures l
                JOIN courses c ON c.guid = l.course_id
                WHERE l.semester_id = ? AND substr(c.code, 1, length(?)) = ?
                ORDER BY l.rowid
                "#,
            )
            .bind(semester_id.to_string())
            .bind(&prefix)
            .bind(&prefix)
            .fetch_all(&mut *conn)
            .await?
        }
        None => {
            sqlx::query_scalar("SELECT guid FROM lectures WHERE semester_id = ? ORDER BY rowid")
                .bind(semester_id.to_string())
                .fetch_all(&mut *conn)
                .await?
        }
    };

    guids.iter().map(|g| parse_guid(g)).collect()
}

/// Load lecture by guid
pub async fn load_lecture(conn: &mut SqliteConnection, lecture_id: Uuid) -> Result<Option<Lecture>> {
    let row = sqlx::query(
        r#"
        SELECT guid, course_id, semester_id, day, start_slot, end_slot, type_id,
               start_text, end_text
        FROM lectures
        WHERE guid = ?
        "#,
    )
    .bind(lecture_id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => {
            let guid: String = row.get("guid");
            let course_id: String = row.get("course_id");
            let semester_id: String = row.get("semester_id");
            let type_id: Option<String> = row.get("type_id");

            Ok(Some(Lecture {
                guid: parse_guid(&guid)?,
                course_id: parse_guid(&course_id)?,
                semester_id: parse_guid(&semester_id)?,
                day: row.get("day"),
                start_slot: row.get("start_slot"),
                end_slot: row.get("end_slot"),
                type_id: type_id.as_deref().map(parse_guid).transpose()?,
                start_text: row.get("start_text"),
                end_text: row.get("end_text"),
            }))
        }
        None => Ok(None),
    }
}

/// Names linked to a lecture through one link table, sorted
pub async fn linked_names(
    conn: &mut SqliteConnection,
    lecture_id: Uuid,
    link: LinkTable,
) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT e.name FROM {links} l JOIN {entities} e ON e.guid = l.{column}
         WHERE l.lecture_id = ? ORDER BY e.name",
        links = link.table(),
        entities = link.entity_table(),
        column = link.column()
    );

    let names = sqlx::query_scalar(&sql)
        .bind(lecture_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

    Ok(names)
}

/// Week numbers of a lecture, sorted
pub async fn linked_weeks(conn: &mut SqliteConnection, lecture_id: Uuid) -> Result<Vec<i64>> {
    let weeks = sqlx::query_scalar(
        "SELECT week_number FROM lecture_weeks WHERE lecture_id = ? ORDER BY week_number",
    )
    .bind(lecture_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    Ok(weeks)
}

/// Delete lectures (link rows cascade)
///
/// Ingestion never calls this; it is for callers acting on a stale set.
pub async fn delete_lectures(pool: &SqlitePool, ids: &[Uuid]) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut deleted = 0;

    for id in ids {
        let result = sqlx::query("DELETE FROM lectures WHERE guid = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        deleted += result.rows_affected();
    }

    tx.commit().await?;
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::courses::get_or_create_course;
    use crate::db::semesters::get_or_create_semester;
    use plan_common::db::Term;

    async fn setup() -> (SqlitePool, LectureIdentity) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        plan_common::db::init_schema(&pool).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let semester = get_or_create_semester(&mut conn, 2024, Term::Autumn).await.unwrap();
        let (course_id, _) = get_or_create_course(&mut conn, "TDT4120").await.unwrap();

        let identity = LectureIdentity {
            course_id,
            semester_id: semester.guid,
            day: 1,
            start_slot: 10,
            end_slot: 12,
            type_id: None,
        };
        drop(conn);
        (pool, identity)
    }

    #[tokio::test]
    async fn test_identity_lookup_treats_null_type_as_value() {
        let (pool, identity) = setup().await;
        let mut conn = pool.acquire().await.unwrap();

        let id = insert_lecture(&mut conn, &identity, "10:15", "12:00").await.unwrap();

        let found = find_by_identity(&mut conn, &identity).await.unwrap();
        assert_eq!(found, vec![id]);

        let other_day = LectureIdentity { day: 2, ..identity.clone() };
        assert!(find_by_identity(&mut conn, &other_day).await.unwrap().is_empty());

        let lecture = load_lecture(&mut conn, id).await.unwrap().unwrap();
        assert_eq!(lecture.start_text, "10:15");
        assert_eq!(lecture.type_id, None);
    }

    #[tokio::test]
    async fn test_replace_weeks_overwrites() {
        let (pool, identity) = setup().await;
        let mut conn = pool.acquire().await.unwrap();
        let id = insert_lecture(&mut conn, &identity, "10:15", "12:00").await.unwrap();

        replace_weeks(&mut conn, id, &BTreeSet::from([1, 2, 3])).await.unwrap();
        replace_weeks(&mut conn, id, &BTreeSet::from([3, 4])).await.unwrap();

        assert_eq!(linked_weeks(&mut conn, id).await.unwrap(), vec![3, 4]);
    }

    #[tokio::test]
    async fn test_delete_cascades_links() {
        let (pool, identity) = setup().await;
        let mut conn = pool.acquire().await.unwrap();
        let id = insert_lecture(&mut conn, &identity, "10:15", "12:00").await.unwrap();
        replace_weeks(&mut conn, id, &BTreeSet::from([5])).await.unwrap();
        drop(conn);

        let deleted = delete_lectures(&pool, &[id]).await.unwrap();
        assert_eq!(deleted, 1);

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lecture_weeks")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
