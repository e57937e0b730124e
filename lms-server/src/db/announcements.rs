//! Announcement persistence
//!
//! A NULL course_id means the announcement addresses all students.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_ts, parse_uuid, parse_uuid_opt};

#[derive(Debug, Clone)]
pub struct Announcement {
    pub id: Uuid,
    pub teacher_id: Option<Uuid>,
    pub course_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

fn row_to_announcement(row: &sqlx::sqlite::SqliteRow) -> Result<Announcement> {
    Ok(Announcement {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        teacher_id: parse_uuid_opt(row.get("teacher_id"))?,
        course_id: parse_uuid_opt(row.get("course_id"))?,
        title: row.get("title"),
        message: row.get("message"),
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
    })
}

const ANNOUNCEMENT_COLUMNS: &str = "id, teacher_id, course_id, title, message, created_at";

/// Publish an announcement
pub async fn insert_announcement(
    pool: &SqlitePool,
    teacher_id: Option<Uuid>,
    course_id: Option<Uuid>,
    title: &str,
    message: &str,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO announcements (id, teacher_id, course_id, title, message, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(teacher_id.map(|t| t.to_string()))
    .bind(course_id.map(|c| c.to_string()))
    .bind(title)
    .bind(message)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(id)
}

/// Load one announcement
pub async fn load_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Announcement>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM announcements WHERE id = ?",
        ANNOUNCEMENT_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_announcement).transpose()
}

/// Feed for a student: global announcements plus those of courses the
/// student holds a paid enrollment in
pub async fn list_for_student(pool: &SqlitePool, student_id: Uuid) -> Result<Vec<Announcement>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM announcements
         WHERE course_id IS NULL
            OR course_id IN (SELECT course_id FROM enrollments WHERE student_id = ? AND paid = 1)
         ORDER BY created_at DESC",
        ANNOUNCEMENT_COLUMNS
    ))
    .bind(student_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_announcement).collect()
}

/// A teacher's own announcements, newest first
pub async fn list_by_teacher(pool: &SqlitePool, teacher_id: Uuid) -> Result<Vec<Announcement>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM announcements WHERE teacher_id = ? ORDER BY created_at DESC",
        ANNOUNCEMENT_COLUMNS
    ))
    .bind(teacher_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_announcement).collect()
}

/// Count of a teacher's announcements
pub async fn count_by_teacher(pool: &SqlitePool, teacher_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM announcements WHERE teacher_id = ?")
        .bind(teacher_id.to_string())
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Delete one announcement
pub async fn delete_announcement(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM announcements WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete all of a teacher's announcements
pub async fn delete_by_teacher(pool: &SqlitePool, teacher_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM announcements WHERE teacher_id = ?")
        .bind(teacher_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Null out the course link (course deletion detaches announcements)
pub async fn detach_course(pool: &SqlitePool, course_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE announcements SET course_id = NULL WHERE course_id = ?")
        .bind(course_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::courses::{insert_course, Course};
    use crate::db::enrollments;
    use crate::db::users::{insert_user, User};
    use lms_common::models::Role;

    #[tokio::test]
    async fn student_feed_filters_unenrolled_courses() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        lms_common::db::init::create_all_tables(&pool).await.unwrap();

        let student = User::new("S".to_string(), "s@example.com".to_string(), Role::Student);
        insert_user(&pool, &student).await.unwrap();

        let mine = Course::new("Mine".to_string(), None, None, 0.0, None, None);
        let other = Course::new("Other".to_string(), None, None, 0.0, None, None);
        insert_course(&pool, &mine).await.unwrap();
        insert_course(&pool, &other).await.unwrap();
        enrollments::upsert_paid(&pool, student.id, mine.id).await.unwrap();

        insert_announcement(&pool, None, None, "Global", "hi all").await.unwrap();
        insert_announcement(&pool, None, Some(mine.id), "Course", "hi class").await.unwrap();
        insert_announcement(&pool, None, Some(other.id), "Hidden", "not for you").await.unwrap();

        let feed = list_for_student(&pool, student.id).await.unwrap();
        let titles: Vec<_> = feed.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(feed.len(), 2);
        assert!(titles.contains(&"Global"));
        assert!(titles.contains(&"Course"));
    }
}
