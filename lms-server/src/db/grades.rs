//! Grade persistence

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_ts, parse_uuid, parse_uuid_opt};

#[derive(Debug, Clone)]
pub struct Grade {
    pub id: Uuid,
    pub student_id: Uuid,
    pub teacher_id: Option<Uuid>,
    pub course_id: Option<Uuid>,
    pub grade: String,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn row_to_grade(row: &sqlx::sqlite::SqliteRow) -> Result<Grade> {
    Ok(Grade {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        student_id: parse_uuid(&row.get::<String, _>("student_id"))?,
        teacher_id: parse_uuid_opt(row.get("teacher_id"))?,
        course_id: parse_uuid_opt(row.get("course_id"))?,
        grade: row.get("grade"),
        remarks: row.get("remarks"),
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
    })
}

/// Record a grade for a student
pub async fn insert_grade(
    pool: &SqlitePool,
    student_id: Uuid,
    teacher_id: Option<Uuid>,
    course_id: Option<Uuid>,
    grade: &str,
    remarks: Option<&str>,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO grades (id, student_id, teacher_id, course_id, grade, remarks, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(student_id.to_string())
    .bind(teacher_id.map(|t| t.to_string()))
    .bind(course_id.map(|c| c.to_string()))
    .bind(grade)
    .bind(remarks)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(id)
}

/// A student's grades, newest first
pub async fn list_by_student(pool: &SqlitePool, student_id: Uuid) -> Result<Vec<Grade>> {
    let rows = sqlx::query(
        "SELECT id, student_id, teacher_id, course_id, grade, remarks, created_at
         FROM grades WHERE student_id = ? ORDER BY created_at DESC",
    )
    .bind(student_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_grade).collect()
}

/// Enrollments in a teacher's courses that have no grade yet from that
/// teacher
pub async fn pending_grading_count(pool: &SqlitePool, teacher_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM enrollments e
        JOIN courses c ON c.id = e.course_id
        WHERE c.teacher_id = ?
          AND NOT EXISTS (
              SELECT 1 FROM grades g
              WHERE g.student_id = e.student_id AND g.course_id = e.course_id
          )
        "#,
    )
    .bind(teacher_id.to_string())
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Null out the course link (course deletion detaches grades)
pub async fn detach_course(pool: &SqlitePool, course_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE grades SET course_id = NULL WHERE course_id = ?")
        .bind(course_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete a student's grades
pub async fn delete_by_student(pool: &SqlitePool, student_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM grades WHERE student_id = ?")
        .bind(student_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete grades assigned by a teacher
pub async fn delete_by_teacher(pool: &SqlitePool, teacher_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM grades WHERE teacher_id = ?")
        .bind(teacher_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::courses::{insert_course, Course};
    use crate::db::enrollments;
    use crate::db::teachers::insert_teacher;
    use crate::db::users::{insert_user, User};
    use lms_common::models::Role;

    #[tokio::test]
    async fn pending_grading_counts_ungraded_enrollments() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        lms_common::db::init::create_all_tables(&pool).await.unwrap();

        let teacher_user = User::new("T".to_string(), "t@example.com".to_string(), Role::Teacher);
        insert_user(&pool, &teacher_user).await.unwrap();
        let teacher_id = insert_teacher(&pool, teacher_user.id, None, None, None).await.unwrap();

        let course = Course::new("C".to_string(), None, None, 0.0, None, Some(teacher_id));
        insert_course(&pool, &course).await.unwrap();

        let s1 = User::new("S1".to_string(), "s1@example.com".to_string(), Role::Student);
        let s2 = User::new("S2".to_string(), "s2@example.com".to_string(), Role::Student);
        insert_user(&pool, &s1).await.unwrap();
        insert_user(&pool, &s2).await.unwrap();
        enrollments::upsert_paid(&pool, s1.id, course.id).await.unwrap();
        enrollments::upsert_paid(&pool, s2.id, course.id).await.unwrap();

        assert_eq!(pending_grading_count(&pool, teacher_id).await.unwrap(), 2);

        insert_grade(&pool, s1.id, Some(teacher_id), Some(course.id), "A", None)
            .await
            .unwrap();
        assert_eq!(pending_grading_count(&pool, teacher_id).await.unwrap(), 1);
    }
}
