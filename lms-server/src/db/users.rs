//! User account persistence

use anyhow::Result;
use chrono::{DateTime, Utc};
use lms_common::models::Role;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_ts, parse_ts_opt, parse_uuid};

/// User account record
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub password_salt: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub profile_photo: Option<String>,
    pub approved: bool,
    pub otp: Option<String>,
    pub otp_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new account record. Students start unapproved; teachers
    /// and admins are active immediately.
    pub fn new(name: String, email: String, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            email,
            password_hash: None,
            password_salt: None,
            phone: None,
            role,
            profile_photo: None,
            approved: role != Role::Student,
            otp: None,
            otp_expires_at: None,
            created_at: Utc::now(),
        }
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let role_str: String = row.get("role");
    let role = Role::parse(&role_str)
        .ok_or_else(|| anyhow::anyhow!("Unknown role in database: {}", role_str))?;

    let created_at_str: String = row.get("created_at");

    Ok(User {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        password_salt: row.get("password_salt"),
        phone: row.get("phone"),
        role,
        profile_photo: row.get("profile_photo"),
        approved: row.get::<i64, _>("approved") != 0,
        otp: row.get("otp"),
        otp_expires_at: parse_ts_opt(row.get("otp_expires_at"))?,
        created_at: parse_ts(&created_at_str)?,
    })
}

const USER_COLUMNS: &str = "id, name, email, password_hash, password_salt, phone, role, \
                            profile_photo, approved, otp, otp_expires_at, created_at";

/// Insert a new user
pub async fn insert_user(pool: &SqlitePool, user: &User) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO users (id, name, email, password_hash, password_salt, phone, role,
                           profile_photo, approved, otp, otp_expires_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user.id.to_string())
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.password_salt)
    .bind(&user.phone)
    .bind(user.role.as_str())
    .bind(&user.profile_photo)
    .bind(user.approved as i64)
    .bind(&user.otp)
    .bind(user.otp_expires_at.map(|t| t.to_rfc3339()))
    .bind(user.created_at.to_rfc3339())
    .bind(user.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load user by email
pub async fn load_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
        .bind(email)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_user).transpose()
}

/// Load user by id
pub async fn load_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_user).transpose()
}

/// Update name, phone and email
pub async fn update_user(
    pool: &SqlitePool,
    id: Uuid,
    name: &str,
    phone: Option<&str>,
    email: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET name = ?, phone = ?, email = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(name)
    .bind(phone)
    .bind(email)
    .bind(Utc::now().to_rfc3339())
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Set or clear the profile photo path
pub async fn set_photo(pool: &SqlitePool, id: Uuid, photo: Option<&str>) -> Result<()> {
    sqlx::query("UPDATE users SET profile_photo = ?, updated_at = ? WHERE id = ?")
        .bind(photo)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

/// Replace the password hash and salt
pub async fn set_password(pool: &SqlitePool, id: Uuid, hash: &str, salt: &str) -> Result<()> {
    sqlx::query("UPDATE users SET password_hash = ?, password_salt = ?, updated_at = ? WHERE id = ?")
        .bind(hash)
        .bind(salt)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

/// Store or clear the password-reset OTP
pub async fn set_otp(
    pool: &SqlitePool,
    id: Uuid,
    otp: Option<&str>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<()> {
    sqlx::query("UPDATE users SET otp = ?, otp_expires_at = ?, updated_at = ? WHERE id = ?")
        .bind(otp)
        .bind(expires_at.map(|t| t.to_rfc3339()))
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

/// Flip the approval flag
pub async fn set_approved(pool: &SqlitePool, id: Uuid, approved: bool) -> Result<()> {
    sqlx::query("UPDATE users SET approved = ?, updated_at = ? WHERE id = ?")
        .bind(approved as i64)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

/// Delete a user row
pub async fn delete_user(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

/// Count users with the given role
pub async fn count_by_role(pool: &SqlitePool, role: Role) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = ?")
        .bind(role.as_str())
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Sort fields accepted by role listings; anything else falls back to
/// created_at so request parameters never reach ORDER BY verbatim.
fn sort_column(field: Option<&str>) -> &'static str {
    match field {
        Some("name") => "name",
        Some("email") => "email",
        Some("createdAt") | Some("created_at") => "created_at",
        _ => "created_at",
    }
}

/// List users of a role with optional keyword search over name, email
/// and phone
pub async fn list_by_role(
    pool: &SqlitePool,
    role: Role,
    search: Option<&str>,
    sort_field: Option<&str>,
    sort_desc: bool,
) -> Result<Vec<User>> {
    let direction = if sort_desc { "DESC" } else { "ASC" };
    let sql = format!(
        "SELECT {} FROM users
         WHERE role = ?
           AND (? IS NULL OR name LIKE ? COLLATE NOCASE
                OR email LIKE ? COLLATE NOCASE
                OR phone LIKE ? COLLATE NOCASE)
         ORDER BY {} {}",
        USER_COLUMNS,
        sort_column(sort_field),
        direction
    );

    let pattern = search.map(|s| format!("%{}%", s.trim()));
    let rows = sqlx::query(&sql)
        .bind(role.as_str())
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(pool)
        .await?;

    rows.iter().map(row_to_user).collect()
}

/// Most recently created users of a role
pub async fn recent_by_role(pool: &SqlitePool, role: Role, limit: i64) -> Result<Vec<User>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM users WHERE role = ? ORDER BY created_at DESC LIMIT ?",
        USER_COLUMNS
    ))
    .bind(role.as_str())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_user).collect()
}

/// Students awaiting admission approval
pub async fn list_pending_students(pool: &SqlitePool) -> Result<Vec<User>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM users WHERE role = 'STUDENT' AND approved = 0 ORDER BY created_at DESC",
        USER_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_user).collect()
}

/// Count of students awaiting approval
pub async fn count_pending_students(pool: &SqlitePool) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'STUDENT' AND approved = 0")
            .fetch_one(pool)
            .await?;
    Ok(count)
}

/// Name and email for every user of a role, for broadcast notifications
pub async fn contacts_by_role(pool: &SqlitePool, role: Role) -> Result<Vec<(String, String)>> {
    let rows = sqlx::query("SELECT name, email FROM users WHERE role = ?")
        .bind(role.as_str())
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get("name"), row.get("email")))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        lms_common::db::init::create_all_tables(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn insert_and_load_by_email() {
        let pool = test_pool().await;

        let user = User::new("Asha".to_string(), "asha@example.com".to_string(), Role::Student);
        insert_user(&pool, &user).await.unwrap();

        let loaded = load_by_email(&pool, "asha@example.com")
            .await
            .unwrap()
            .expect("user not found");
        assert_eq!(loaded.id, user.id);
        assert_eq!(loaded.role, Role::Student);
        assert!(!loaded.approved);
    }

    #[tokio::test]
    async fn teachers_start_approved() {
        let user = User::new("T".to_string(), "t@example.com".to_string(), Role::Teacher);
        assert!(user.approved);
    }

    #[tokio::test]
    async fn duplicate_email_rejected() {
        let pool = test_pool().await;

        let a = User::new("A".to_string(), "dup@example.com".to_string(), Role::Student);
        let b = User::new("B".to_string(), "dup@example.com".to_string(), Role::Student);
        insert_user(&pool, &a).await.unwrap();
        assert!(insert_user(&pool, &b).await.is_err());
    }

    #[tokio::test]
    async fn search_matches_name_case_insensitive() {
        let pool = test_pool().await;

        let user = User::new("Ravi Kumar".to_string(), "ravi@example.com".to_string(), Role::Student);
        insert_user(&pool, &user).await.unwrap();

        let hits = list_by_role(&pool, Role::Student, Some("ravi"), None, false)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let misses = list_by_role(&pool, Role::Student, Some("zzz"), None, false)
            .await
            .unwrap();
        assert!(misses.is_empty());
    }

    #[tokio::test]
    async fn otp_set_and_clear() {
        let pool = test_pool().await;

        let user = User::new("O".to_string(), "o@example.com".to_string(), Role::Student);
        insert_user(&pool, &user).await.unwrap();

        let expiry = Utc::now() + chrono::Duration::minutes(10);
        set_otp(&pool, user.id, Some("123456"), Some(expiry)).await.unwrap();
        let loaded = load_by_id(&pool, user.id).await.unwrap().unwrap();
        assert_eq!(loaded.otp.as_deref(), Some("123456"));
        assert!(loaded.otp_expires_at.is_some());

        set_otp(&pool, user.id, None, None).await.unwrap();
        let cleared = load_by_id(&pool, user.id).await.unwrap().unwrap();
        assert!(cleared.otp.is_none());
    }
}
