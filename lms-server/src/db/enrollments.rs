//! Enrollment persistence
//!
//! One row per (student, course); `paid` flips when a payment verifies.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_ts, parse_uuid};

#[derive(Debug, Clone)]
pub struct Enrollment {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub paid: bool,
    pub enrolled_at: DateTime<Utc>,
}

fn row_to_enrollment(row: &sqlx::sqlite::SqliteRow) -> Result<Enrollment> {
    Ok(Enrollment {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        student_id: parse_uuid(&row.get::<String, _>("student_id"))?,
        course_id: parse_uuid(&row.get::<String, _>("course_id"))?,
        paid: row.get::<i64, _>("paid") != 0,
        enrolled_at: parse_ts(&row.get::<String, _>("enrolled_at"))?,
    })
}

const ENROLLMENT_COLUMNS: &str = "id, student_id, course_id, paid, enrolled_at";

/// Load the enrollment for a (student, course) pair
pub async fn load(pool: &SqlitePool, student_id: Uuid, course_id: Uuid) -> Result<Option<Enrollment>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM enrollments WHERE student_id = ? AND course_id = ?",
        ENROLLMENT_COLUMNS
    ))
    .bind(student_id.to_string())
    .bind(course_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_enrollment).transpose()
}

/// Create or update the enrollment as paid
pub async fn upsert_paid(pool: &SqlitePool, student_id: Uuid, course_id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO enrollments (id, student_id, course_id, paid, enrolled_at)
        VALUES (?, ?, ?, 1, ?)
        ON CONFLICT(student_id, course_id) DO UPDATE SET paid = 1
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(student_id.to_string())
    .bind(course_id.to_string())
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Set the paid flag on an existing enrollment
pub async fn set_paid(pool: &SqlitePool, id: Uuid, paid: bool) -> Result<()> {
    sqlx::query("UPDATE enrollments SET paid = ? WHERE id = ?")
        .bind(paid as i64)
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Paid enrollments of a student
pub async fn list_paid_by_student(pool: &SqlitePool, student_id: Uuid) -> Result<Vec<Enrollment>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM enrollments WHERE student_id = ? AND paid = 1 ORDER BY enrolled_at DESC",
        ENROLLMENT_COLUMNS
    ))
    .bind(student_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_enrollment).collect()
}

/// All enrollments of a course
pub async fn list_by_course(pool: &SqlitePool, course_id: Uuid) -> Result<Vec<Enrollment>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM enrollments WHERE course_id = ? ORDER BY enrolled_at DESC",
        ENROLLMENT_COLUMNS
    ))
    .bind(course_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_enrollment).collect()
}

/// All enrollments of a student
pub async fn list_by_student(pool: &SqlitePool, student_id: Uuid) -> Result<Vec<Enrollment>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM enrollments WHERE student_id = ? ORDER BY enrolled_at DESC",
        ENROLLMENT_COLUMNS
    ))
    .bind(student_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_enrollment).collect()
}

/// Distinct students holding at least one paid enrollment
pub async fn count_distinct_paid_students(pool: &SqlitePool) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(DISTINCT student_id) FROM enrollments WHERE paid = 1")
            .fetch_one(pool)
            .await?;
    Ok(count)
}

/// Paid enrollment counts bucketed by calendar month ("YYYY-MM")
pub async fn monthly_counts(pool: &SqlitePool, since_month: &str) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query(
        "SELECT substr(enrolled_at, 1, 7) AS month, COUNT(*) AS n
         FROM enrollments
         WHERE paid = 1 AND substr(enrolled_at, 1, 7) >= ?
         GROUP BY month ORDER BY month",
    )
    .bind(since_month)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(|row| (row.get("month"), row.get("n"))).collect())
}

/// Delete all enrollments of a course
pub async fn delete_by_course(pool: &SqlitePool, course_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM enrollments WHERE course_id = ?")
        .bind(course_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete all enrollments of a student
pub async fn delete_by_student(pool: &SqlitePool, student_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM enrollments WHERE student_id = ?")
        .bind(student_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::courses::{insert_course, Course};
    use crate::db::users::{insert_user, User};
    use lms_common::models::Role;

    async fn setup() -> (SqlitePool, Uuid, Uuid) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        lms_common::db::init::create_all_tables(&pool).await.unwrap();

        let user = User::new("S".to_string(), "s@example.com".to_string(), Role::Student);
        insert_user(&pool, &user).await.unwrap();
        let course = Course::new("C".to_string(), None, None, 100.0, None, None);
        insert_course(&pool, &course).await.unwrap();
        (pool, user.id, course.id)
    }

    #[tokio::test]
    async fn upsert_is_single_row() {
        let (pool, student, course) = setup().await;

        upsert_paid(&pool, student, course).await.unwrap();
        upsert_paid(&pool, student, course).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM enrollments")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let enrollment = load(&pool, student, course).await.unwrap().unwrap();
        assert!(enrollment.paid);
    }

    #[tokio::test]
    async fn unpaid_enrollments_filtered_from_paid_list() {
        let (pool, student, course) = setup().await;

        upsert_paid(&pool, student, course).await.unwrap();
        let enrollment = load(&pool, student, course).await.unwrap().unwrap();
        set_paid(&pool, enrollment.id, false).await.unwrap();

        assert!(list_paid_by_student(&pool, student).await.unwrap().is_empty());
    }
}
