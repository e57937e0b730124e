//! Course content (lesson) persistence
//!
//! Order indices define the strict linear sequence the progress gating
//! walks.

use anyhow::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

#[derive(Debug, Clone)]
pub struct CourseContent {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub video_url: Option<String>,
    pub duration_minutes: i64,
    pub order_index: i64,
}

fn row_to_content(row: &sqlx::sqlite::SqliteRow) -> Result<CourseContent> {
    Ok(CourseContent {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        course_id: parse_uuid(&row.get::<String, _>("course_id"))?,
        title: row.get("title"),
        video_url: row.get("video_url"),
        duration_minutes: row.get("duration_minutes"),
        order_index: row.get("order_index"),
    })
}

const CONTENT_COLUMNS: &str = "id, course_id, title, video_url, duration_minutes, order_index";

/// Append a content item; when no index is given it lands after the
/// current last item
pub async fn insert_content(
    pool: &SqlitePool,
    course_id: Uuid,
    title: &str,
    video_url: Option<&str>,
    duration_minutes: i64,
    order_index: Option<i64>,
) -> Result<CourseContent> {
    let order_index = match order_index {
        Some(i) => i,
        None => next_order_index(pool, course_id).await?,
    };

    let id = Uuid::new_v4();
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO course_contents (id, course_id, title, video_url, duration_minutes,
                                     order_index, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(course_id.to_string())
    .bind(title)
    .bind(video_url)
    .bind(duration_minutes)
    .bind(order_index)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(CourseContent {
        id,
        course_id,
        title: title.to_string(),
        video_url: video_url.map(|s| s.to_string()),
        duration_minutes,
        order_index,
    })
}

/// Index one past the current last item (0 for an empty course)
pub async fn next_order_index(pool: &SqlitePool, course_id: Uuid) -> Result<i64> {
    let max: Option<i64> =
        sqlx::query_scalar("SELECT MAX(order_index) FROM course_contents WHERE course_id = ?")
            .bind(course_id.to_string())
            .fetch_one(pool)
            .await?;
    Ok(max.map(|m| m + 1).unwrap_or(0))
}

/// Contents of a course in sequence order
pub async fn list_by_course(pool: &SqlitePool, course_id: Uuid) -> Result<Vec<CourseContent>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM course_contents WHERE course_id = ? ORDER BY order_index",
        CONTENT_COLUMNS
    ))
    .bind(course_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_content).collect()
}

/// Load a single content item
pub async fn load_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<CourseContent>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM course_contents WHERE id = ?",
        CONTENT_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_content).transpose()
}

/// Lesson count and total minutes for a course
pub async fn course_stats(pool: &SqlitePool, course_id: Uuid) -> Result<(i64, i64)> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS n, COALESCE(SUM(duration_minutes), 0) AS minutes
         FROM course_contents WHERE course_id = ?",
    )
    .bind(course_id.to_string())
    .fetch_one(pool)
    .await?;

    Ok((row.get("n"), row.get("minutes")))
}

/// Delete all contents of a course
pub async fn delete_by_course(pool: &SqlitePool, course_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM course_contents WHERE course_id = ?")
        .bind(course_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::courses::{insert_course, Course};

    async fn setup() -> (SqlitePool, Uuid) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        lms_common::db::init::create_all_tables(&pool).await.unwrap();

        let course = Course::new("C".to_string(), None, None, 0.0, None, None);
        insert_course(&pool, &course).await.unwrap();
        (pool, course.id)
    }

    #[tokio::test]
    async fn appended_contents_get_sequential_indices() {
        let (pool, course_id) = setup().await;

        let a = insert_content(&pool, course_id, "Intro", None, 10, None).await.unwrap();
        let b = insert_content(&pool, course_id, "Part 1", None, 20, None).await.unwrap();
        assert_eq!(a.order_index, 0);
        assert_eq!(b.order_index, 1);

        let listed = list_by_course(&pool, course_id).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].title, "Intro");
    }

    #[tokio::test]
    async fn stats_sum_minutes() {
        let (pool, course_id) = setup().await;

        insert_content(&pool, course_id, "A", None, 45, None).await.unwrap();
        insert_content(&pool, course_id, "B", None, 80, None).await.unwrap();

        let (count, minutes) = course_stats(&pool, course_id).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(minutes, 125);
    }
}
