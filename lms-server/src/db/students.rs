//! Student profile persistence
//!
//! One row per STUDENT user; holds the contact fields that don't belong
//! on the shared users table.

use anyhow::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

#[derive(Debug, Clone)]
pub struct StudentProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub contact: Option<String>,
    pub address: Option<String>,
}

fn row_to_profile(row: &sqlx::sqlite::SqliteRow) -> Result<StudentProfile> {
    Ok(StudentProfile {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
        contact: row.get("contact"),
        address: row.get("address"),
    })
}

/// Create the profile row for a student user
pub async fn insert_student(
    pool: &SqlitePool,
    user_id: Uuid,
    contact: Option<&str>,
    address: Option<&str>,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO students (id, user_id, contact, address, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(user_id.to_string())
    .bind(contact)
    .bind(address)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(id)
}

/// Load a student profile by its user id
pub async fn load_by_user_id(pool: &SqlitePool, user_id: Uuid) -> Result<Option<StudentProfile>> {
    let row = sqlx::query("SELECT id, user_id, contact, address FROM students WHERE user_id = ?")
        .bind(user_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_profile).transpose()
}

/// Update contact and address
pub async fn update_profile(
    pool: &SqlitePool,
    user_id: Uuid,
    contact: Option<&str>,
    address: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE students SET contact = ?, address = ?, updated_at = ? WHERE user_id = ?",
    )
    .bind(contact)
    .bind(address)
    .bind(Utc::now().to_rfc3339())
    .bind(user_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Delete the profile row for a user
pub async fn delete_by_user_id(pool: &SqlitePool, user_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM students WHERE user_id = ?")
        .bind(user_id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::users::{insert_user, User};
    use lms_common::models::Role;

    #[tokio::test]
    async fn profile_round_trip() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        lms_common::db::init::create_all_tables(&pool).await.unwrap();

        let user = User::new("S".to_string(), "s@example.com".to_string(), Role::Student);
        insert_user(&pool, &user).await.unwrap();
        insert_student(&pool, user.id, Some("555-0101"), None).await.unwrap();

        let profile = load_by_user_id(&pool, user.id).await.unwrap().unwrap();
        assert_eq!(profile.contact.as_deref(), Some("555-0101"));
        assert!(profile.address.is_none());

        update_profile(&pool, user.id, Some("555-0102"), Some("12 Lake Rd")).await.unwrap();
        let updated = load_by_user_id(&pool, user.id).await.unwrap().unwrap();
        assert_eq!(updated.address.as_deref(), Some("12 Lake Rd"));

        delete_by_user_id(&pool, user.id).await.unwrap();
        assert!(load_by_user_id(&pool, user.id).await.unwrap().is_none());
    }
}
