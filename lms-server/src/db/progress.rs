//! Content progress persistence
//!
//! Rows are created lazily on first mark-watched; unlock state is
//! recomputed from these rows on every read, never cached.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use uuid::Uuid;

use super::{parse_ts_opt, parse_uuid};

#[derive(Debug, Clone)]
pub struct ContentProgress {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub content_id: Uuid,
    pub completed: bool,
    pub watched_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

fn row_to_progress(row: &sqlx::sqlite::SqliteRow) -> Result<ContentProgress> {
    Ok(ContentProgress {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        student_id: parse_uuid(&row.get::<String, _>("student_id"))?,
        course_id: parse_uuid(&row.get::<String, _>("course_id"))?,
        content_id: parse_uuid(&row.get::<String, _>("content_id"))?,
        completed: row.get::<i64, _>("completed") != 0,
        watched_at: parse_ts_opt(row.get("watched_at"))?,
        completed_at: parse_ts_opt(row.get("completed_at"))?,
    })
}

/// Load the progress row for a (student, content) pair
pub async fn load(
    pool: &SqlitePool,
    student_id: Uuid,
    content_id: Uuid,
) -> Result<Option<ContentProgress>> {
    let row = sqlx::query(
        "SELECT id, student_id, course_id, content_id, completed, watched_at, completed_at
         FROM course_progress WHERE student_id = ? AND content_id = ?",
    )
    .bind(student_id.to_string())
    .bind(content_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_progress).transpose()
}

/// Record a completed watch. First completion stamps completed_at; a
/// repeat watch refreshes watched_at only, so progress never regresses.
pub async fn upsert_completed(
    pool: &SqlitePool,
    student_id: Uuid,
    course_id: Uuid,
    content_id: Uuid,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO course_progress (id, student_id, course_id, content_id, completed,
                                     watched_at, completed_at)
        VALUES (?, ?, ?, ?, 1, ?, ?)
        ON CONFLICT(student_id, content_id) DO UPDATE SET
            completed = 1,
            watched_at = excluded.watched_at,
            completed_at = COALESCE(course_progress.completed_at, excluded.completed_at)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(student_id.to_string())
    .bind(course_id.to_string())
    .bind(content_id.to_string())
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Content ids the student has completed within a course
pub async fn completed_content_ids(
    pool: &SqlitePool,
    student_id: Uuid,
    course_id: Uuid,
) -> Result<HashSet<Uuid>> {
    let rows = sqlx::query(
        "SELECT content_id FROM course_progress
         WHERE student_id = ? AND course_id = ? AND completed = 1",
    )
    .bind(student_id.to_string())
    .bind(course_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| parse_uuid(&row.get::<String, _>("content_id")))
        .collect()
}

/// Delete all progress for a course
pub async fn delete_by_course(pool: &SqlitePool, course_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM course_progress WHERE course_id = ?")
        .bind(course_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete all progress for a student
pub async fn delete_by_student(pool: &SqlitePool, student_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM course_progress WHERE student_id = ?")
        .bind(student_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::contents::insert_content;
    use crate::db::courses::{insert_course, Course};
    use crate::db::users::{insert_user, User};
    use lms_common::models::Role;

    async fn setup() -> (SqlitePool, Uuid, Uuid, Uuid) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        lms_common::db::init::create_all_tables(&pool).await.unwrap();

        let user = User::new("S".to_string(), "s@example.com".to_string(), Role::Student);
        insert_user(&pool, &user).await.unwrap();
        let course = Course::new("C".to_string(), None, None, 0.0, None, None);
        insert_course(&pool, &course).await.unwrap();
        let content = insert_content(&pool, course.id, "Intro", None, 10, None).await.unwrap();
        (pool, user.id, course.id, content.id)
    }

    #[tokio::test]
    async fn repeat_watch_keeps_first_completion_time() {
        let (pool, student, course, content) = setup().await;

        upsert_completed(&pool, student, course, content).await.unwrap();
        let first = load(&pool, student, content).await.unwrap().unwrap();
        let first_completed_at = first.completed_at.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        upsert_completed(&pool, student, course, content).await.unwrap();
        let second = load(&pool, student, content).await.unwrap().unwrap();

        assert!(second.completed);
        assert_eq!(second.completed_at.unwrap(), first_completed_at);
    }

    #[tokio::test]
    async fn completed_ids_scoped_to_course() {
        let (pool, student, course, content) = setup().await;

        upsert_completed(&pool, student, course, content).await.unwrap();

        let ids = completed_content_ids(&pool, student, course).await.unwrap();
        assert!(ids.contains(&content));

        let other = completed_content_ids(&pool, student, Uuid::new_v4()).await.unwrap();
        assert!(other.is_empty());
    }
}
