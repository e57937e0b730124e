//! Background maintenance tasks

use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{info, warn};

/// Spawn the hourly sweep that deletes events more than 24 hours past
/// their date. Errors are logged and the loop keeps running.
pub fn spawn_event_cleanup(pool: SqlitePool) {
    tokio::spawn(async move {
        let interval_secs =
            lms_common::db::settings::get_setting_i64(&pool, "event_cleanup_interval_secs", 3600)
                .await
                .unwrap_or(3600);
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1) as u64));

        loop {
            interval.tick().await;
            match crate::db::events::delete_stale(&pool, chrono::Utc::now()).await {
                Ok(0) => {}
                Ok(n) => info!("Event cleanup removed {} stale event(s)", n),
                Err(e) => warn!("Event cleanup failed: {}", e),
            }
        }
    });
}
