//! Payment persistence
//!
//! One row per checkout attempt; the same (student, course) pair may
//! accumulate several rows across retries. Reconciliation lives in
//! `services::payments`; this module only moves rows.

use anyhow::Result;
use chrono::{DateTime, Utc};
use lms_common::models::PaymentStatus;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_ts, parse_ts_opt, parse_uuid, parse_uuid_opt};

#[derive(Debug, Clone)]
pub struct Payment {
    pub id: Uuid,
    pub student_id: Option<Uuid>,
    pub course_id: Option<Uuid>,
    pub amount: f64,
    pub currency: String,
    pub status: PaymentStatus,
    pub order_id: Option<String>,
    pub payment_id: Option<String>,
    pub signature: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Fresh PENDING attempt for a checkout
    pub fn new_pending(student_id: Uuid, course_id: Uuid, amount: f64, currency: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id: Some(student_id),
            course_id: Some(course_id),
            amount,
            currency: currency.to_string(),
            status: PaymentStatus::Pending,
            order_id: None,
            payment_id: None,
            signature: None,
            paid_at: None,
            created_at: Utc::now(),
        }
    }
}

const PAYMENT_COLUMNS: &str = "id, student_id, course_id, amount, currency, status, order_id, \
                               payment_id, signature, paid_at, created_at";

fn row_to_payment(row: &sqlx::sqlite::SqliteRow) -> Result<Payment> {
    let status_str: String = row.get("status");
    let status = PaymentStatus::parse(&status_str)
        .ok_or_else(|| anyhow::anyhow!("Unknown payment status in database: {}", status_str))?;

    Ok(Payment {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        student_id: parse_uuid_opt(row.get("student_id"))?,
        course_id: parse_uuid_opt(row.get("course_id"))?,
        amount: row.get("amount"),
        currency: row.get("currency"),
        status,
        order_id: row.get("order_id"),
        payment_id: row.get("payment_id"),
        signature: row.get("signature"),
        paid_at: parse_ts_opt(row.get("paid_at"))?,
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
    })
}

/// Insert a payment row
pub async fn insert_payment(pool: &SqlitePool, payment: &Payment) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO payments (id, student_id, course_id, amount, currency, status, order_id,
                              payment_id, signature, paid_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payment.id.to_string())
    .bind(payment.student_id.map(|id| id.to_string()))
    .bind(payment.course_id.map(|id| id.to_string()))
    .bind(payment.amount)
    .bind(&payment.currency)
    .bind(payment.status.as_str())
    .bind(&payment.order_id)
    .bind(&payment.payment_id)
    .bind(&payment.signature)
    .bind(payment.paid_at.map(|t| t.to_rfc3339()))
    .bind(payment.created_at.to_rfc3339())
    .bind(payment.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load by gateway order reference
pub async fn load_by_order_id(pool: &SqlitePool, order_id: &str) -> Result<Option<Payment>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM payments WHERE order_id = ?",
        PAYMENT_COLUMNS
    ))
    .bind(order_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_payment).transpose()
}

/// All attempts for a (student, course) pair, newest first
pub async fn list_by_student_course(
    pool: &SqlitePool,
    student_id: Uuid,
    course_id: Uuid,
) -> Result<Vec<Payment>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM payments WHERE student_id = ? AND course_id = ? ORDER BY created_at DESC",
        PAYMENT_COLUMNS
    ))
    .bind(student_id.to_string())
    .bind(course_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_payment).collect()
}

/// All payments of a student, newest first
pub async fn list_by_student(pool: &SqlitePool, student_id: Uuid) -> Result<Vec<Payment>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM payments WHERE student_id = ? ORDER BY created_at DESC",
        PAYMENT_COLUMNS
    ))
    .bind(student_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_payment).collect()
}

/// Re-arm a reused attempt for a new checkout: fresh order reference,
/// amount and PENDING status
pub async fn rearm_for_checkout(
    pool: &SqlitePool,
    id: Uuid,
    order_id: &str,
    amount: f64,
    currency: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE payments
        SET order_id = ?, amount = ?, currency = ?, status = 'PENDING',
            payment_id = NULL, signature = NULL, paid_at = NULL, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(order_id)
    .bind(amount)
    .bind(currency)
    .bind(Utc::now().to_rfc3339())
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Set a payment's status
pub async fn set_status(pool: &SqlitePool, id: Uuid, status: PaymentStatus) -> Result<()> {
    sqlx::query("UPDATE payments SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Mark a payment verified: SUCCESS with gateway references and paid_at
pub async fn mark_success(
    pool: &SqlitePool,
    id: Uuid,
    payment_id: &str,
    signature: &str,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        UPDATE payments
        SET status = 'SUCCESS', payment_id = ?, signature = ?, paid_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(payment_id)
    .bind(signature)
    .bind(&now)
    .bind(&now)
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Demote every other PENDING/FAILED attempt for the pair to the given
/// status
pub async fn demote_siblings(
    pool: &SqlitePool,
    student_id: Uuid,
    course_id: Uuid,
    exclude_id: Uuid,
    to_status: PaymentStatus,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE payments
        SET status = ?, updated_at = ?
        WHERE student_id = ? AND course_id = ? AND id != ?
          AND status IN ('PENDING', 'FAILED')
        "#,
    )
    .bind(to_status.as_str())
    .bind(Utc::now().to_rfc3339())
    .bind(student_id.to_string())
    .bind(course_id.to_string())
    .bind(exclude_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Whether a SUCCESS payment exists for the pair
pub async fn has_success(pool: &SqlitePool, student_id: Uuid, course_id: Uuid) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM payments
         WHERE student_id = ? AND course_id = ? AND status = 'SUCCESS'",
    )
    .bind(student_id.to_string())
    .bind(course_id.to_string())
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// SUCCESS payment joined with student and course names, for reports
#[derive(Debug, Clone)]
pub struct PaymentReportRow {
    pub payment: Payment,
    pub student_name: Option<String>,
    pub student_email: Option<String>,
    pub course_title: Option<String>,
    pub course_category: Option<String>,
}

fn row_to_report(row: &sqlx::sqlite::SqliteRow) -> Result<PaymentReportRow> {
    Ok(PaymentReportRow {
        payment: row_to_payment(row)?,
        student_name: row.get("student_name"),
        student_email: row.get("student_email"),
        course_title: row.get("course_title"),
        course_category: row.get("course_category"),
    })
}

const REPORT_SELECT: &str = "SELECT p.id, p.student_id, p.course_id, p.amount, p.currency, \
     p.status, p.order_id, p.payment_id, p.signature, p.paid_at, p.created_at, \
     u.name AS student_name, u.email AS student_email, \
     c.title AS course_title, c.category AS course_category \
     FROM payments p \
     LEFT JOIN users u ON u.id = p.student_id \
     LEFT JOIN courses c ON c.id = p.course_id";

/// Admin payment report: SUCCESS rows with optional keyword and
/// category filters
pub async fn report(
    pool: &SqlitePool,
    keyword: Option<&str>,
    category: Option<&str>,
) -> Result<Vec<PaymentReportRow>> {
    let sql = format!(
        "{} WHERE p.status = 'SUCCESS'
           AND (? IS NULL OR u.name LIKE ? COLLATE NOCASE
                OR u.email LIKE ? COLLATE NOCASE
                OR c.title LIKE ? COLLATE NOCASE)
           AND (? IS NULL OR c.category = ? COLLATE NOCASE)
         ORDER BY p.paid_at DESC",
        REPORT_SELECT
    );

    let pattern = keyword.map(|s| format!("%{}%", s.trim()));
    let category = category.map(|s| s.trim().to_string());
    let rows = sqlx::query(&sql)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&category)
        .bind(&category)
        .fetch_all(pool)
        .await?;

    rows.iter().map(row_to_report).collect()
}

/// SUCCESS payments for one course
pub async fn report_by_course(pool: &SqlitePool, course_id: Uuid) -> Result<Vec<PaymentReportRow>> {
    let sql = format!(
        "{} WHERE p.status = 'SUCCESS' AND p.course_id = ? ORDER BY p.paid_at DESC",
        REPORT_SELECT
    );
    let rows = sqlx::query(&sql)
        .bind(course_id.to_string())
        .fetch_all(pool)
        .await?;

    rows.iter().map(row_to_report).collect()
}

/// Revenue totals: overall, current calendar month, current year
pub async fn revenue_stats(pool: &SqlitePool) -> Result<(f64, f64, f64)> {
    let now = Utc::now();
    let month = now.format("%Y-%m").to_string();
    let year = now.format("%Y").to_string();

    let row = sqlx::query(
        r#"
        SELECT COALESCE(SUM(amount), 0.0) AS total,
               COALESCE(SUM(CASE WHEN substr(paid_at, 1, 7) = ? THEN amount ELSE 0 END), 0.0) AS month,
               COALESCE(SUM(CASE WHEN substr(paid_at, 1, 4) = ? THEN amount ELSE 0 END), 0.0) AS year
        FROM payments WHERE status = 'SUCCESS'
        "#,
    )
    .bind(&month)
    .bind(&year)
    .fetch_one(pool)
    .await?;

    Ok((row.get("total"), row.get("month"), row.get("year")))
}

/// Revenue bucketed by calendar month ("YYYY-MM")
pub async fn monthly_revenue(pool: &SqlitePool, since_month: &str) -> Result<Vec<(String, f64)>> {
    let rows = sqlx::query(
        "SELECT substr(paid_at, 1, 7) AS month, COALESCE(SUM(amount), 0) AS total
         FROM payments
         WHERE status = 'SUCCESS' AND substr(paid_at, 1, 7) >= ?
         GROUP BY month ORDER BY month",
    )
    .bind(since_month)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(|row| (row.get("month"), row.get("total"))).collect())
}

/// Null out the course link (course deletion detaches payments)
pub async fn detach_course(pool: &SqlitePool, course_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE payments SET course_id = NULL, updated_at = ? WHERE course_id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(course_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Null out the student link (student deletion keeps the money trail)
pub async fn detach_student(pool: &SqlitePool, student_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE payments SET student_id = NULL, updated_at = ? WHERE student_id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(student_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::courses::{insert_course, Course};
    use crate::db::users::{insert_user, User};
    use lms_common::models::Role;

    async fn setup() -> (SqlitePool, Uuid, Uuid) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        lms_common::db::init::create_all_tables(&pool).await.unwrap();

        let user = User::new("S".to_string(), "s@example.com".to_string(), Role::Student);
        insert_user(&pool, &user).await.unwrap();
        let course = Course::new("C".to_string(), None, None, 500.0, None, None);
        insert_course(&pool, &course).await.unwrap();
        (pool, user.id, course.id)
    }

    #[tokio::test]
    async fn order_reference_lookup() {
        let (pool, student, course) = setup().await;

        let mut payment = Payment::new_pending(student, course, 500.0, "INR");
        payment.order_id = Some("order_abc".to_string());
        insert_payment(&pool, &payment).await.unwrap();

        let loaded = load_by_order_id(&pool, "order_abc").await.unwrap().unwrap();
        assert_eq!(loaded.id, payment.id);
        assert_eq!(loaded.status, PaymentStatus::Pending);
        assert!(load_by_order_id(&pool, "order_xyz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn demote_skips_success_and_excluded() {
        let (pool, student, course) = setup().await;

        let winner = Payment::new_pending(student, course, 500.0, "INR");
        let mut stale = Payment::new_pending(student, course, 500.0, "INR");
        stale.status = PaymentStatus::Failed;
        let mut done = Payment::new_pending(student, course, 500.0, "INR");
        done.status = PaymentStatus::Success;
        insert_payment(&pool, &winner).await.unwrap();
        insert_payment(&pool, &stale).await.unwrap();
        insert_payment(&pool, &done).await.unwrap();

        demote_siblings(&pool, student, course, winner.id, PaymentStatus::Cancelled)
            .await
            .unwrap();

        let all = list_by_student_course(&pool, student, course).await.unwrap();
        let status_of = |id: Uuid| all.iter().find(|p| p.id == id).unwrap().status;
        assert_eq!(status_of(winner.id), PaymentStatus::Pending);
        assert_eq!(status_of(stale.id), PaymentStatus::Cancelled);
        assert_eq!(status_of(done.id), PaymentStatus::Success);
    }

    #[tokio::test]
    async fn revenue_counts_only_success() {
        let (pool, student, course) = setup().await;

        let mut paid = Payment::new_pending(student, course, 300.0, "INR");
        paid.order_id = Some("order_1".to_string());
        insert_payment(&pool, &paid).await.unwrap();
        mark_success(&pool, paid.id, "pay_1", "sig").await.unwrap();

        let pending = Payment::new_pending(student, course, 999.0, "INR");
        insert_payment(&pool, &pending).await.unwrap();

        let (total, month, year) = revenue_stats(&pool).await.unwrap();
        assert_eq!(total, 300.0);
        assert_eq!(month, 300.0);
        assert_eq!(year, 300.0);
    }
}
