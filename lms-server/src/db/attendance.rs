//! Attendance persistence

use anyhow::Result;
use chrono::Utc;
use lms_common::models::AttendanceStatus;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_uuid, parse_uuid_opt};

#[derive(Debug, Clone)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub teacher_id: Option<Uuid>,
    pub course_id: Option<Uuid>,
    /// Calendar day, "YYYY-MM-DD"
    pub date: String,
    pub status: AttendanceStatus,
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<AttendanceRecord> {
    let status_str: String = row.get("status");
    let status = AttendanceStatus::parse(&status_str)
        .ok_or_else(|| anyhow::anyhow!("Unknown attendance status in database: {}", status_str))?;

    Ok(AttendanceRecord {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        student_id: parse_uuid(&row.get::<String, _>("student_id"))?,
        teacher_id: parse_uuid_opt(row.get("teacher_id"))?,
        course_id: parse_uuid_opt(row.get("course_id"))?,
        date: row.get("date"),
        status,
    })
}

/// Insert an attendance mark
pub async fn insert_record(
    pool: &SqlitePool,
    student_id: Uuid,
    teacher_id: Option<Uuid>,
    course_id: Option<Uuid>,
    date: &str,
    status: AttendanceStatus,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO attendance (id, student_id, teacher_id, course_id, date, status, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(student_id.to_string())
    .bind(teacher_id.map(|t| t.to_string()))
    .bind(course_id.map(|c| c.to_string()))
    .bind(date)
    .bind(status.as_str())
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(id)
}

/// A student's attendance, newest day first
pub async fn list_by_student(pool: &SqlitePool, student_id: Uuid) -> Result<Vec<AttendanceRecord>> {
    let rows = sqlx::query(
        "SELECT id, student_id, teacher_id, course_id, date, status
         FROM attendance WHERE student_id = ? ORDER BY date DESC",
    )
    .bind(student_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_record).collect()
}

/// Present and total counts for a student
pub async fn summary_by_student(pool: &SqlitePool, student_id: Uuid) -> Result<(i64, i64)> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN status = 'PRESENT' THEN 1 ELSE 0 END), 0) AS present
         FROM attendance WHERE student_id = ?",
    )
    .bind(student_id.to_string())
    .fetch_one(pool)
    .await?;

    Ok((row.get("present"), row.get("total")))
}

/// Overall attendance percentage across all records (0.0 when empty)
pub async fn overall_percentage(pool: &SqlitePool) -> Result<f64> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN status = 'PRESENT' THEN 1 ELSE 0 END), 0) AS present
         FROM attendance",
    )
    .fetch_one(pool)
    .await?;

    let total: i64 = row.get("total");
    let present: i64 = row.get("present");
    if total == 0 {
        return Ok(0.0);
    }
    Ok(present as f64 * 100.0 / total as f64)
}

/// Attendance percentage of records marked by one teacher
pub async fn percentage_by_teacher(pool: &SqlitePool, teacher_id: Uuid) -> Result<f64> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN status = 'PRESENT' THEN 1 ELSE 0 END), 0) AS present
         FROM attendance WHERE teacher_id = ?",
    )
    .bind(teacher_id.to_string())
    .fetch_one(pool)
    .await?;

    let total: i64 = row.get("total");
    let present: i64 = row.get("present");
    if total == 0 {
        return Ok(0.0);
    }
    Ok(present as f64 * 100.0 / total as f64)
}

/// Monthly attendance percentage ("YYYY-MM" buckets)
pub async fn monthly_percentages(
    pool: &SqlitePool,
    since_month: &str,
) -> Result<Vec<(String, f64)>> {
    let rows = sqlx::query(
        "SELECT substr(date, 1, 7) AS month,
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN status = 'PRESENT' THEN 1 ELSE 0 END), 0) AS present
         FROM attendance
         WHERE substr(date, 1, 7) >= ?
         GROUP BY month ORDER BY month",
    )
    .bind(since_month)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let total: i64 = row.get("total");
            let present: i64 = row.get("present");
            let pct = if total == 0 {
                0.0
            } else {
                present as f64 * 100.0 / total as f64
            };
            (row.get("month"), pct)
        })
        .collect())
}

/// Per-student attendance leaders: (student_id, present, total), best
/// percentage first
pub async fn top_performers(pool: &SqlitePool, limit: i64) -> Result<Vec<(Uuid, i64, i64)>> {
    let rows = sqlx::query(
        "SELECT student_id,
                COALESCE(SUM(CASE WHEN status = 'PRESENT' THEN 1 ELSE 0 END), 0) AS present,
                COUNT(*) AS total
         FROM attendance
         GROUP BY student_id
         HAVING total > 0
         ORDER BY CAST(present AS REAL) / total DESC, total DESC
         LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok((
                parse_uuid(&row.get::<String, _>("student_id"))?,
                row.get("present"),
                row.get("total"),
            ))
        })
        .collect()
}

/// Null out the course link (course deletion detaches attendance)
pub async fn detach_course(pool: &SqlitePool, course_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE attendance SET course_id = NULL WHERE course_id = ?")
        .bind(course_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete a student's attendance
pub async fn delete_by_student(pool: &SqlitePool, student_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM attendance WHERE student_id = ?")
        .bind(student_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete attendance marked by a teacher
pub async fn delete_by_teacher(pool: &SqlitePool, teacher_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM attendance WHERE teacher_id = ?")
        .bind(teacher_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::users::{insert_user, User};
    use lms_common::models::Role;

    async fn setup() -> (SqlitePool, Uuid) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        lms_common::db::init::create_all_tables(&pool).await.unwrap();

        let user = User::new("S".to_string(), "s@example.com".to_string(), Role::Student);
        insert_user(&pool, &user).await.unwrap();
        (pool, user.id)
    }

    #[tokio::test]
    async fn summary_counts_present_and_total() {
        let (pool, student) = setup().await;

        insert_record(&pool, student, None, None, "2026-08-01", AttendanceStatus::Present)
            .await
            .unwrap();
        insert_record(&pool, student, None, None, "2026-08-02", AttendanceStatus::Absent)
            .await
            .unwrap();
        insert_record(&pool, student, None, None, "2026-08-03", AttendanceStatus::Present)
            .await
            .unwrap();

        let (present, total) = summary_by_student(&pool, student).await.unwrap();
        assert_eq!(present, 2);
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn top_performers_ordered_by_percentage() {
        let (pool, good) = setup().await;
        let poor = User::new("P".to_string(), "p@example.com".to_string(), Role::Student);
        insert_user(&pool, &poor).await.unwrap();

        for day in ["2026-08-01", "2026-08-02"] {
            insert_record(&pool, good, None, None, day, AttendanceStatus::Present)
                .await
                .unwrap();
            insert_record(&pool, poor.id, None, None, day, AttendanceStatus::Absent)
                .await
                .unwrap();
        }

        let leaders = top_performers(&pool, 5).await.unwrap();
        assert_eq!(leaders.len(), 2);
        assert_eq!(leaders[0].0, good);
        assert_eq!(leaders[0].1, 2);
    }

    #[tokio::test]
    async fn empty_percentage_is_zero() {
        let (pool, _) = setup().await;
        assert_eq!(overall_percentage(&pool).await.unwrap(), 0.0);
    }
}
