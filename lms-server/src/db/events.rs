//! Upcoming event persistence

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_ts, parse_uuid};

#[derive(Debug, Clone)]
pub struct UpcomingEvent {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub event_at: DateTime<Utc>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<UpcomingEvent> {
    Ok(UpcomingEvent {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        title: row.get("title"),
        description: row.get("description"),
        event_at: parse_ts(&row.get::<String, _>("event_at"))?,
        enabled: row.get::<i64, _>("enabled") != 0,
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
    })
}

const EVENT_COLUMNS: &str = "id, title, description, event_at, enabled, created_at";

/// Create an event
pub async fn insert_event(
    pool: &SqlitePool,
    title: &str,
    description: Option<&str>,
    event_at: DateTime<Utc>,
    enabled: bool,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO upcoming_events (id, title, description, event_at, enabled, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(title)
    .bind(description)
    .bind(event_at.to_rfc3339())
    .bind(enabled as i64)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(id)
}

/// Load one event
pub async fn load_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<UpcomingEvent>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM upcoming_events WHERE id = ?",
        EVENT_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_event).transpose()
}

/// Update an event's fields
pub async fn update_event(
    pool: &SqlitePool,
    id: Uuid,
    title: &str,
    description: Option<&str>,
    event_at: DateTime<Utc>,
    enabled: bool,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE upcoming_events
        SET title = ?, description = ?, event_at = ?, enabled = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(title)
    .bind(description)
    .bind(event_at.to_rfc3339())
    .bind(enabled as i64)
    .bind(Utc::now().to_rfc3339())
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Delete an event, returning whether a row existed
pub async fn delete_event(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM upcoming_events WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Enabled events that have not yet happened, soonest first
pub async fn list_upcoming(pool: &SqlitePool) -> Result<Vec<UpcomingEvent>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM upcoming_events WHERE enabled = 1 AND event_at >= ? ORDER BY event_at",
        EVENT_COLUMNS
    ))
    .bind(Utc::now().to_rfc3339())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_event).collect()
}

/// Every event regardless of state, for the admin listing
pub async fn list_all(pool: &SqlitePool) -> Result<Vec<UpcomingEvent>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM upcoming_events ORDER BY event_at",
        EVENT_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_event).collect()
}

/// Delete events more than 24 hours past their date, returning the
/// number removed
pub async fn delete_stale(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64> {
    let cutoff = (now - Duration::hours(24)).to_rfc3339();
    let result = sqlx::query("DELETE FROM upcoming_events WHERE event_at < ?")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        lms_common::db::init::create_all_tables(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn stale_cleanup_keeps_recent_past_events() {
        let pool = test_pool().await;
        let now = Utc::now();

        insert_event(&pool, "Old", None, now - Duration::hours(30), true).await.unwrap();
        insert_event(&pool, "Yesterday", None, now - Duration::hours(10), true).await.unwrap();
        insert_event(&pool, "Future", None, now + Duration::hours(5), true).await.unwrap();

        let removed = delete_stale(&pool, now).await.unwrap();
        assert_eq!(removed, 1);

        let remaining = list_all(&pool).await.unwrap();
        let titles: Vec<_> = remaining.iter().map(|e| e.title.as_str()).collect();
        assert!(titles.contains(&"Yesterday"));
        assert!(titles.contains(&"Future"));
        assert!(!titles.contains(&"Old"));
    }

    #[tokio::test]
    async fn upcoming_excludes_disabled_and_past() {
        let pool = test_pool().await;
        let now = Utc::now();

        insert_event(&pool, "Past", None, now - Duration::hours(1), true).await.unwrap();
        insert_event(&pool, "Off", None, now + Duration::hours(1), false).await.unwrap();
        insert_event(&pool, "Soon", None, now + Duration::hours(1), true).await.unwrap();

        let upcoming = list_upcoming(&pool).await.unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].title, "Soon");
    }
}
