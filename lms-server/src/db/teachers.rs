//! Teacher profile persistence

use anyhow::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

#[derive(Debug, Clone)]
pub struct TeacherProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub contact: Option<String>,
    pub address: Option<String>,
    pub qualification: Option<String>,
}

fn row_to_profile(row: &sqlx::sqlite::SqliteRow) -> Result<TeacherProfile> {
    Ok(TeacherProfile {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
        contact: row.get("contact"),
        address: row.get("address"),
        qualification: row.get("qualification"),
    })
}

/// Create the profile row for a teacher user
pub async fn insert_teacher(
    pool: &SqlitePool,
    user_id: Uuid,
    contact: Option<&str>,
    address: Option<&str>,
    qualification: Option<&str>,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO teachers (id, user_id, contact, address, qualification, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(user_id.to_string())
    .bind(contact)
    .bind(address)
    .bind(qualification)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(id)
}

/// Load a teacher profile by its user id
pub async fn load_by_user_id(pool: &SqlitePool, user_id: Uuid) -> Result<Option<TeacherProfile>> {
    let row = sqlx::query(
        "SELECT id, user_id, contact, address, qualification FROM teachers WHERE user_id = ?",
    )
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_profile).transpose()
}

/// Load a teacher profile by its own id
pub async fn load_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<TeacherProfile>> {
    let row = sqlx::query(
        "SELECT id, user_id, contact, address, qualification FROM teachers WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_profile).transpose()
}

/// Update qualification, contact and address
pub async fn update_profile(
    pool: &SqlitePool,
    user_id: Uuid,
    contact: Option<&str>,
    address: Option<&str>,
    qualification: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE teachers SET contact = ?, address = ?, qualification = ?, updated_at = ? WHERE user_id = ?",
    )
    .bind(contact)
    .bind(address)
    .bind(qualification)
    .bind(Utc::now().to_rfc3339())
    .bind(user_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Delete the profile row for a user
pub async fn delete_by_user_id(pool: &SqlitePool, user_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM teachers WHERE user_id = ?")
        .bind(user_id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}
