//! Teacher subject and class assignments
//!
//! Subject assignment gates online-test creation: a teacher may only
//! publish tests for subjects assigned here.

use anyhow::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

#[derive(Debug, Clone)]
pub struct SubjectAssignment {
    pub id: Uuid,
    pub teacher_id: Uuid,
    pub subject: String,
}

#[derive(Debug, Clone)]
pub struct ClassAssignment {
    pub id: Uuid,
    pub teacher_id: Uuid,
    pub class_name: String,
}

/// Check whether a subject is already assigned, case-insensitively
pub async fn subject_assigned(pool: &SqlitePool, teacher_id: Uuid, subject: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM teacher_subjects
         WHERE teacher_id = ? AND subject = ? COLLATE NOCASE",
    )
    .bind(teacher_id.to_string())
    .bind(subject.trim())
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Assign a subject to a teacher
pub async fn assign_subject(
    pool: &SqlitePool,
    teacher_id: Uuid,
    subject: &str,
) -> Result<SubjectAssignment> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO teacher_subjects (id, teacher_id, subject, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(teacher_id.to_string())
    .bind(subject.trim())
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(SubjectAssignment {
        id,
        teacher_id,
        subject: subject.trim().to_string(),
    })
}

/// List a teacher's subjects
pub async fn list_subjects(pool: &SqlitePool, teacher_id: Uuid) -> Result<Vec<SubjectAssignment>> {
    let rows = sqlx::query(
        "SELECT id, teacher_id, subject FROM teacher_subjects WHERE teacher_id = ? ORDER BY subject",
    )
    .bind(teacher_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(SubjectAssignment {
                id: parse_uuid(&row.get::<String, _>("id"))?,
                teacher_id: parse_uuid(&row.get::<String, _>("teacher_id"))?,
                subject: row.get("subject"),
            })
        })
        .collect()
}

/// Remove a subject assignment, returning whether a row existed
pub async fn delete_subject(pool: &SqlitePool, assignment_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM teacher_subjects WHERE id = ?")
        .bind(assignment_id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Remove all subject assignments for a teacher
pub async fn delete_subjects_by_teacher(pool: &SqlitePool, teacher_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM teacher_subjects WHERE teacher_id = ?")
        .bind(teacher_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Check whether a class is already assigned, case-insensitively
pub async fn class_assigned(pool: &SqlitePool, teacher_id: Uuid, class_name: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM teacher_classes
         WHERE teacher_id = ? AND class_name = ? COLLATE NOCASE",
    )
    .bind(teacher_id.to_string())
    .bind(class_name.trim())
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Assign a class to a teacher
pub async fn assign_class(
    pool: &SqlitePool,
    teacher_id: Uuid,
    class_name: &str,
) -> Result<ClassAssignment> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO teacher_classes (id, teacher_id, class_name, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(teacher_id.to_string())
    .bind(class_name.trim())
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(ClassAssignment {
        id,
        teacher_id,
        class_name: class_name.trim().to_string(),
    })
}

/// List a teacher's classes
pub async fn list_classes(pool: &SqlitePool, teacher_id: Uuid) -> Result<Vec<ClassAssignment>> {
    let rows = sqlx::query(
        "SELECT id, teacher_id, class_name FROM teacher_classes WHERE teacher_id = ? ORDER BY class_name",
    )
    .bind(teacher_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(ClassAssignment {
                id: parse_uuid(&row.get::<String, _>("id"))?,
                teacher_id: parse_uuid(&row.get::<String, _>("teacher_id"))?,
                class_name: row.get("class_name"),
            })
        })
        .collect()
}

/// Remove a class assignment, returning whether a row existed
pub async fn delete_class(pool: &SqlitePool, assignment_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM teacher_classes WHERE id = ?")
        .bind(assignment_id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Remove all class assignments for a teacher
pub async fn delete_classes_by_teacher(pool: &SqlitePool, teacher_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM teacher_classes WHERE teacher_id = ?")
        .bind(teacher_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::teachers::insert_teacher;
    use crate::db::users::{insert_user, User};
    use lms_common::models::Role;

    async fn setup() -> (SqlitePool, Uuid) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        lms_common::db::init::create_all_tables(&pool).await.unwrap();

        let user = User::new("T".to_string(), "t@example.com".to_string(), Role::Teacher);
        insert_user(&pool, &user).await.unwrap();
        let teacher_id = insert_teacher(&pool, user.id, None, None, None).await.unwrap();
        (pool, teacher_id)
    }

    #[tokio::test]
    async fn subject_uniqueness_ignores_case() {
        let (pool, teacher_id) = setup().await;

        assign_subject(&pool, teacher_id, "Physics").await.unwrap();
        assert!(subject_assigned(&pool, teacher_id, "physics").await.unwrap());
        assert!(assign_subject(&pool, teacher_id, "PHYSICS").await.is_err());
    }

    #[tokio::test]
    async fn delete_reports_missing_rows() {
        let (pool, teacher_id) = setup().await;

        let assignment = assign_subject(&pool, teacher_id, "Maths").await.unwrap();
        assert!(delete_subject(&pool, assignment.id).await.unwrap());
        assert!(!delete_subject(&pool, assignment.id).await.unwrap());
    }
}
