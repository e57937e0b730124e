//! Database initialization
//!
//! Creates the database file on first run and brings the schema up
//! idempotently. All tables use TEXT UUID primary keys and RFC3339 TEXT
//! timestamps; relational links are TEXT foreign keys, nullable where a
//! parent may be detached rather than cascaded.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    // WAL mode: concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_all_tables(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create every table (idempotent - safe to call multiple times)
///
/// Also used by tests against in-memory databases.
pub async fn create_all_tables(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_users_table(pool).await?;
    create_students_table(pool).await?;
    create_teachers_table(pool).await?;
    create_teacher_subjects_table(pool).await?;
    create_teacher_classes_table(pool).await?;
    create_courses_table(pool).await?;
    create_course_contents_table(pool).await?;
    create_enrollments_table(pool).await?;
    create_payments_table(pool).await?;
    create_course_progress_table(pool).await?;
    create_attendance_table(pool).await?;
    create_grades_table(pool).await?;
    create_announcements_table(pool).await?;
    create_online_tests_table(pool).await?;
    create_online_test_questions_table(pool).await?;
    create_online_test_submissions_table(pool).await?;
    create_online_test_answers_table(pool).await?;
    create_upcoming_events_table(pool).await?;
    create_help_requests_table(pool).await?;
    Ok(())
}

pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT,
            password_salt TEXT,
            phone TEXT,
            role TEXT NOT NULL DEFAULT 'STUDENT',
            profile_photo TEXT,
            approved INTEGER NOT NULL DEFAULT 0,
            otp TEXT,
            otp_expires_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_role ON users(role)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn create_students_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS students (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE REFERENCES users(id),
            contact TEXT,
            address TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_teachers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS teachers (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE REFERENCES users(id),
            contact TEXT,
            address TEXT,
            qualification TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_teacher_subjects_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS teacher_subjects (
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL REFERENCES teachers(id),
            subject TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Case-insensitive uniqueness per teacher
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_teacher_subjects_unique
         ON teacher_subjects(teacher_id, subject COLLATE NOCASE)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_teacher_classes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS teacher_classes (
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL REFERENCES teachers(id),
            class_name TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_teacher_classes_unique
         ON teacher_classes(teacher_id, class_name COLLATE NOCASE)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_courses_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS courses (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            category TEXT,
            price REAL NOT NULL DEFAULT 0,
            thumbnail TEXT,
            teacher_id TEXT REFERENCES teachers(id),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_courses_category ON courses(category)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn create_course_contents_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS course_contents (
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL REFERENCES courses(id),
            title TEXT NOT NULL,
            video_url TEXT,
            duration_minutes INTEGER NOT NULL DEFAULT 0,
            order_index INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_course_contents_course
         ON course_contents(course_id, order_index)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_enrollments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS enrollments (
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL REFERENCES users(id),
            course_id TEXT NOT NULL REFERENCES courses(id),
            paid INTEGER NOT NULL DEFAULT 0,
            enrolled_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // At most one enrollment per (student, course)
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_enrollments_unique
         ON enrollments(student_id, course_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_payments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS payments (
            id TEXT PRIMARY KEY,
            student_id TEXT REFERENCES users(id),
            course_id TEXT REFERENCES courses(id),
            amount REAL NOT NULL,
            currency TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING',
            order_id TEXT UNIQUE,
            payment_id TEXT,
            signature TEXT,
            paid_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_payments_student_course
         ON payments(student_id, course_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_course_progress_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS course_progress (
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL REFERENCES users(id),
            course_id TEXT NOT NULL REFERENCES courses(id),
            content_id TEXT NOT NULL REFERENCES course_contents(id),
            completed INTEGER NOT NULL DEFAULT 0,
            watched_at TEXT,
            completed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_course_progress_unique
         ON course_progress(student_id, content_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_attendance_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS attendance (
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL REFERENCES users(id),
            teacher_id TEXT REFERENCES teachers(id),
            course_id TEXT REFERENCES courses(id),
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance(student_id, date)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_grades_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS grades (
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL REFERENCES users(id),
            teacher_id TEXT REFERENCES teachers(id),
            course_id TEXT REFERENCES courses(id),
            grade TEXT NOT NULL,
            remarks TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_grades_student ON grades(student_id)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn create_announcements_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS announcements (
            id TEXT PRIMARY KEY,
            teacher_id TEXT REFERENCES teachers(id),
            course_id TEXT REFERENCES courses(id),
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_online_tests_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS online_tests (
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL REFERENCES teachers(id),
            title TEXT NOT NULL,
            subject TEXT NOT NULL,
            description TEXT,
            max_marks INTEGER NOT NULL,
            published INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_online_test_questions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS online_test_questions (
            id TEXT PRIMARY KEY,
            test_id TEXT NOT NULL REFERENCES online_tests(id),
            question_text TEXT NOT NULL,
            option_a TEXT NOT NULL,
            option_b TEXT NOT NULL,
            option_c TEXT NOT NULL,
            option_d TEXT NOT NULL,
            correct_option TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_test_questions_test ON online_test_questions(test_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_online_test_submissions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS online_test_submissions (
            id TEXT PRIMARY KEY,
            test_id TEXT NOT NULL REFERENCES online_tests(id),
            student_id TEXT NOT NULL REFERENCES users(id),
            score INTEGER NOT NULL,
            total_correct INTEGER NOT NULL,
            submitted_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One attempt per student
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_test_submissions_unique
         ON online_test_submissions(test_id, student_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_online_test_answers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS online_test_answers (
            id TEXT PRIMARY KEY,
            submission_id TEXT NOT NULL REFERENCES online_test_submissions(id),
            question_id TEXT NOT NULL REFERENCES online_test_questions(id),
            selected_option TEXT,
            correct INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_upcoming_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS upcoming_events (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            event_at TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_help_requests_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS help_requests (
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL REFERENCES users(id),
            issue TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING',
            reply TEXT,
            replied_at TEXT,
            resolved_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert default settings without overwriting operator changes
pub async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, "event_cleanup_interval_secs", "3600").await?;
    ensure_setting(pool, "otp_validity_minutes", "10").await?;
    Ok(())
}

/// Insert a setting only if it doesn't already exist
pub async fn ensure_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_creation_is_idempotent() {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");

        create_all_tables(&pool).await.unwrap();
        create_all_tables(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'users'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn ensure_setting_does_not_overwrite() {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        create_settings_table(&pool).await.unwrap();

        ensure_setting(&pool, "otp_validity_minutes", "10").await.unwrap();
        ensure_setting(&pool, "otp_validity_minutes", "99").await.unwrap();

        let value: String =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = 'otp_validity_minutes'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(value, "10");
    }
}
