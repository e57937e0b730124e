//! Key/value settings storage
//!
//! Runtime settings live here rather than in the TOML file so they
//! survive restarts and can be changed without redeploying. The token
//! signing secret is the main occupant.

use crate::Result;
use sqlx::SqlitePool;

/// Read a setting value, None if unset
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

/// Write a setting, inserting or replacing
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}

/// Read an integer setting with a fallback default
pub async fn get_setting_i64(pool: &SqlitePool, key: &str, default: i64) -> Result<i64> {
    let value = get_setting(pool, key).await?;
    Ok(value.and_then(|v| v.parse().ok()).unwrap_or(default))
}
