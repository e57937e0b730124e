//! Student help request persistence

use anyhow::Result;
use chrono::{DateTime, Utc};
use lms_common::models::HelpStatus;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_ts, parse_ts_opt, parse_uuid};

#[derive(Debug, Clone)]
pub struct HelpRequest {
    pub id: Uuid,
    pub student_id: Uuid,
    pub issue: String,
    pub status: HelpStatus,
    pub reply: Option<String>,
    pub replied_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<HelpRequest> {
    let status_str: String = row.get("status");
    let status = HelpStatus::parse(&status_str)
        .ok_or_else(|| anyhow::anyhow!("Unknown help status in database: {}", status_str))?;

    Ok(HelpRequest {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        student_id: parse_uuid(&row.get::<String, _>("student_id"))?,
        issue: row.get("issue"),
        status,
        reply: row.get("reply"),
        replied_at: parse_ts_opt(row.get("replied_at"))?,
        resolved_at: parse_ts_opt(row.get("resolved_at"))?,
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
    })
}

const HELP_COLUMNS: &str =
    "id, student_id, issue, status, reply, replied_at, resolved_at, created_at";

/// File a new request
pub async fn insert_request(pool: &SqlitePool, student_id: Uuid, issue: &str) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO help_requests (id, student_id, issue, status, created_at)
        VALUES (?, ?, ?, 'PENDING', ?)
        "#,
    )
    .bind(id.to_string())
    .bind(student_id.to_string())
    .bind(issue)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(id)
}

/// Load one request
pub async fn load_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<HelpRequest>> {
    let row = sqlx::query(&format!("SELECT {} FROM help_requests WHERE id = ?", HELP_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_request).transpose()
}

/// A student's own requests, newest first
pub async fn list_by_student(pool: &SqlitePool, student_id: Uuid) -> Result<Vec<HelpRequest>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM help_requests WHERE student_id = ? ORDER BY created_at DESC",
        HELP_COLUMNS
    ))
    .bind(student_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_request).collect()
}

/// Request joined with the student's name for the admin queue
#[derive(Debug, Clone)]
pub struct HelpReportRow {
    pub request: HelpRequest,
    pub student_name: Option<String>,
    pub student_email: Option<String>,
}

/// Every request with student identity, newest first
pub async fn list_all(pool: &SqlitePool) -> Result<Vec<HelpReportRow>> {
    let rows = sqlx::query(
        "SELECT h.id, h.student_id, h.issue, h.status, h.reply, h.replied_at, h.resolved_at,
                h.created_at, u.name AS student_name, u.email AS student_email
         FROM help_requests h
         LEFT JOIN users u ON u.id = h.student_id
         ORDER BY h.created_at DESC",
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(HelpReportRow {
                request: row_to_request(row)?,
                student_name: row.get("student_name"),
                student_email: row.get("student_email"),
            })
        })
        .collect()
}

/// Pending and resolved counts
pub async fn status_counts(pool: &SqlitePool) -> Result<(i64, i64)> {
    let row = sqlx::query(
        "SELECT COALESCE(SUM(CASE WHEN status = 'PENDING' THEN 1 ELSE 0 END), 0) AS pending,
                COALESCE(SUM(CASE WHEN status = 'RESOLVED' THEN 1 ELSE 0 END), 0) AS resolved
         FROM help_requests",
    )
    .fetch_one(pool)
    .await?;

    Ok((row.get("pending"), row.get("resolved")))
}

/// Set a request's status; resolving stamps resolved_at
pub async fn set_status(pool: &SqlitePool, id: Uuid, status: HelpStatus) -> Result<()> {
    let resolved_at = match status {
        HelpStatus::Resolved => Some(Utc::now().to_rfc3339()),
        HelpStatus::Pending => None,
    };
    sqlx::query("UPDATE help_requests SET status = ?, resolved_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(resolved_at)
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Store the one-shot reply and resolve the request
pub async fn set_reply(pool: &SqlitePool, id: Uuid, reply: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        UPDATE help_requests
        SET reply = ?, status = 'RESOLVED', replied_at = ?, resolved_at = ?
        WHERE id = ?
        "#,
    )
    .bind(reply)
    .bind(&now)
    .bind(&now)
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Delete a student's requests
pub async fn delete_by_student(pool: &SqlitePool, student_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM help_requests WHERE student_id = ?")
        .bind(student_id.to_string())
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
    async fn reply_resolves_request() {
        let (pool, student) = setup().await;

        let id = insert_request(&pool, student, "Video will not play").await.unwrap();
        set_reply(&pool, id, "Cleared the cache on our side, try again").await.unwrap();

        let request = load_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(request.status, HelpStatus::Resolved);
        assert!(request.reply.is_some());
        assert!(request.replied_at.is_some());
        assert!(request.resolved_at.is_some());
    }

    #[tokio::test]
    async fn status_counts_split_by_state() {
        let (pool, student) = setup().await;

        insert_request(&pool, student, "a").await.unwrap();
        let resolved = insert_request(&pool, student, "b").await.unwrap();
        set_status(&pool, resolved, HelpStatus::Resolved).await.unwrap();

        let (pending, done) = status_counts(&pool).await.unwrap();
        assert_eq!(pending, 1);
        assert_eq!(done, 1);
    }
}
