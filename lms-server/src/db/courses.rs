//! Course catalog persistence
//!
//! Catalog search composes WHERE and ORDER BY clauses from the optional
//! request parameters; sort fields go through a whitelist so request
//! text never reaches SQL verbatim.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_ts, parse_uuid, parse_uuid_opt};

#[derive(Debug, Clone)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: f64,
    pub thumbnail: Option<String>,
    pub teacher_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Course {
    pub fn new(
        title: String,
        description: Option<String>,
        category: Option<String>,
        price: f64,
        thumbnail: Option<String>,
        teacher_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            description,
            category,
            price,
            thumbnail,
            teacher_id,
            created_at: Utc::now(),
        }
    }
}

const COURSE_COLUMNS: &str =
    "id, title, description, category, price, thumbnail, teacher_id, created_at";

fn row_to_course(row: &sqlx::sqlite::SqliteRow) -> Result<Course> {
    Ok(Course {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        title: row.get("title"),
        description: row.get("description"),
        category: row.get("category"),
        price: row.get("price"),
        thumbnail: row.get("thumbnail"),
        teacher_id: parse_uuid_opt(row.get("teacher_id"))?,
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
    })
}

/// Insert a new course
pub async fn insert_course(pool: &SqlitePool, course: &Course) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO courses (id, title, description, category, price, thumbnail, teacher_id,
                             created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(course.id.to_string())
    .bind(&course.title)
    .bind(&course.description)
    .bind(&course.category)
    .bind(course.price)
    .bind(&course.thumbnail)
    .bind(course.teacher_id.map(|id| id.to_string()))
    .bind(course.created_at.to_rfc3339())
    .bind(course.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load course by id
pub async fn load_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Course>> {
    let row = sqlx::query(&format!("SELECT {} FROM courses WHERE id = ?", COURSE_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_course).transpose()
}

fn sort_column(field: Option<&str>) -> &'static str {
    match field {
        Some("title") => "title",
        Some("price") => "price",
        Some("category") => "category",
        Some("createdAt") | Some("created_at") => "created_at",
        _ => "created_at",
    }
}

/// Catalog search: optional keyword over title, description and
/// category, optional category filter, whitelisted sort
pub async fn search(
    pool: &SqlitePool,
    keyword: Option<&str>,
    category: Option<&str>,
    sort_field: Option<&str>,
    sort_desc: bool,
) -> Result<Vec<Course>> {
    let direction = if sort_desc { "DESC" } else { "ASC" };
    let sql = format!(
        "SELECT {} FROM courses
         WHERE (? IS NULL OR title LIKE ? COLLATE NOCASE
                OR description LIKE ? COLLATE NOCASE
                OR category LIKE ? COLLATE NOCASE)
           AND (? IS NULL OR category = ? COLLATE NOCASE)
         ORDER BY {} {}",
        COURSE_COLUMNS,
        sort_column(sort_field),
        direction
    );

    let pattern = keyword.map(|s| format!("%{}%", s.trim()));
    let category = category.map(|s| s.trim().to_string());
    let rows = sqlx::query(&sql)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&category)
        .bind(&category)
        .fetch_all(pool)
        .await?;

    rows.iter().map(row_to_course).collect()
}

/// Total number of courses
pub async fn count_courses(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Courses assigned to a teacher
pub async fn list_by_teacher(pool: &SqlitePool, teacher_id: Uuid) -> Result<Vec<Course>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM courses WHERE teacher_id = ? ORDER BY created_at DESC",
        COURSE_COLUMNS
    ))
    .bind(teacher_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_course).collect()
}

/// Null out the teacher link on all of a teacher's courses
pub async fn detach_teacher(pool: &SqlitePool, teacher_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE courses SET teacher_id = NULL, updated_at = ? WHERE teacher_id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(teacher_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete the course row itself; callers detach or delete dependents
/// first
pub async fn delete_course(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM courses WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Distinct categories currently in the catalog
pub async fn distinct_categories(pool: &SqlitePool) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT DISTINCT category FROM courses WHERE category IS NOT NULL ORDER BY category",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(|row| row.get("category")).collect())
}

/// Course count per category, for the analytics report
pub async fn category_distribution(pool: &SqlitePool) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query(
        "SELECT COALESCE(category, 'Uncategorized') AS category, COUNT(*) AS n
         FROM courses GROUP BY COALESCE(category, 'Uncategorized') ORDER BY n DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get("category"), row.get("n")))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        lms_common::db::init::create_all_tables(&pool).await.unwrap();
        pool
    }

    async fn seed_course(pool: &SqlitePool, title: &str, category: &str, price: f64) -> Course {
        let course = Course::new(
            title.to_string(),
            Some(format!("{} fundamentals", title)),
            Some(category.to_string()),
            price,
            None,
            None,
        );
        insert_course(pool, &course).await.unwrap();
        course
    }

    #[tokio::test]
    async fn keyword_search_spans_fields() {
        let pool = test_pool().await;
        seed_course(&pool, "Rust Basics", "Programming", 499.0).await;
        seed_course(&pool, "Watercolour", "Art", 299.0).await;

        let hits = search(&pool, Some("rust"), None, None, false).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Rust Basics");

        // "fundamentals" appears only in descriptions
        let hits = search(&pool, Some("fundamentals"), None, None, false).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn category_filter_and_sort() {
        let pool = test_pool().await;
        seed_course(&pool, "A", "Programming", 100.0).await;
        seed_course(&pool, "B", "Programming", 300.0).await;
        seed_course(&pool, "C", "Art", 200.0).await;

        let hits = search(&pool, None, Some("Programming"), Some("price"), true)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "B");
    }

    #[tokio::test]
    async fn unknown_sort_field_falls_back() {
        let pool = test_pool().await;
        seed_course(&pool, "A", "X", 1.0).await;

        // A hostile sort field must not be interpolated
        let hits = search(&pool, None, None, Some("price; DROP TABLE courses"), false)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }
}
