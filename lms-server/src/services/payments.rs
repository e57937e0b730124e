//! Payment reconciliation
//!
//! Checkout reuses the student's most recent PENDING/FAILED attempt for
//! the course instead of piling up rows, demoting the older ones to
//! FAILED. Verification is idempotent: a second callback for an
//! already-SUCCESS order is a no-op. Concurrent checkouts for the same
//! pair are last-writer-wins; the idempotency check plus sibling
//! demotion bounds the damage.

use lms_common::models::{PaymentStatus, Role};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use crate::db::{courses, enrollments, payments, users};
use crate::db::payments::Payment;
use crate::error::{ApiError, ApiResult};
use crate::services::gateway::PaymentGateway;

/// Checkout response handed to the frontend
#[derive(Debug, Clone)]
pub struct CheckoutOrder {
    pub order_id: String,
    pub amount: f64,
    pub currency: String,
    pub key_id: String,
}

/// Outcome of a verification callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified,
    AlreadyVerified,
}

/// Initiate a checkout for a (student, course) pair
pub async fn create_order(
    pool: &SqlitePool,
    gateway: &PaymentGateway,
    student_id: Uuid,
    course_id: Uuid,
) -> ApiResult<CheckoutOrder> {
    let student = users::load_by_id(pool, student_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Student not found".to_string()))?;
    if student.role != Role::Student {
        return Err(ApiError::Forbidden("Only students can purchase courses".to_string()));
    }

    let course = courses::load_by_id(pool, course_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))?;
    if course.price <= 0.0 {
        return Err(ApiError::BadRequest(
            "This course does not require payment".to_string(),
        ));
    }

    if let Some(enrollment) = enrollments::load(pool, student_id, course_id).await? {
        if enrollment.paid {
            return Err(ApiError::Conflict(
                "Already enrolled in this course".to_string(),
            ));
        }
    }

    // Reuse the newest PENDING/FAILED attempt; stale ones become FAILED
    let attempts = payments::list_by_student_course(pool, student_id, course_id).await?;
    let reusable: Vec<&Payment> = attempts
        .iter()
        .filter(|p| matches!(p.status, PaymentStatus::Pending | PaymentStatus::Failed))
        .collect();

    let payment_id = match reusable.first() {
        Some(payment) => {
            for stale in reusable.iter().skip(1) {
                payments::set_status(pool, stale.id, PaymentStatus::Failed).await?;
            }
            payment.id
        }
        None => {
            let payment = Payment::new_pending(student_id, course_id, course.price, gateway.currency());
            payments::insert_payment(pool, &payment).await?;
            payment.id
        }
    };

    let order_id = gateway
        .create_order(course.price, &payment_id.to_string())
        .await?;
    payments::rearm_for_checkout(pool, payment_id, &order_id, course.price, gateway.currency())
        .await?;

    info!(
        "Checkout order {} created for student {} course {}",
        order_id, student_id, course_id
    );

    Ok(CheckoutOrder {
        order_id,
        amount: course.price,
        currency: gateway.currency().to_string(),
        key_id: gateway.key_id().to_string(),
    })
}

/// Handle the gateway's payment callback. Idempotent per order.
pub async fn verify_payment(
    pool: &SqlitePool,
    gateway: &PaymentGateway,
    order_id: &str,
    gateway_payment_id: &str,
    signature: &str,
) -> ApiResult<VerifyOutcome> {
    let payment = payments::load_by_order_id(pool, order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No payment found for this order".to_string()))?;

    if payment.status == PaymentStatus::Success {
        return Ok(VerifyOutcome::AlreadyVerified);
    }

    if !gateway.verify_signature(order_id, gateway_payment_id, signature) {
        return Err(ApiError::BadRequest("Payment signature mismatch".to_string()));
    }

    payments::mark_success(pool, payment.id, gateway_payment_id, signature).await?;

    if let (Some(student_id), Some(course_id)) = (payment.student_id, payment.course_id) {
        payments::demote_siblings(pool, student_id, course_id, payment.id, PaymentStatus::Cancelled)
            .await?;
        enrollments::upsert_paid(pool, student_id, course_id).await?;
    }

    info!("Payment verified for order {}", order_id);
    Ok(VerifyOutcome::Verified)
}

/// A student's payment history with duplicate attempts collapsed
#[derive(Debug, Clone)]
pub struct PaymentHistory {
    pub entries: Vec<Payment>,
    pub total_paid: f64,
    pub pending_amount: f64,
    pub success_count: i64,
    pub pending_count: i64,
}

/// Collapse a student's attempts so each course shows its SUCCESS rows
/// when any exist, else the newest PENDING, else the newest FAILED.
pub async fn payment_history(pool: &SqlitePool, student_id: Uuid) -> ApiResult<PaymentHistory> {
    let all = payments::list_by_student(pool, student_id).await?;

    let mut by_course: HashMap<Option<Uuid>, Vec<Payment>> = HashMap::new();
    for payment in all {
        by_course.entry(payment.course_id).or_default().push(payment);
    }

    let mut entries: Vec<Payment> = Vec::new();
    for (_, attempts) in by_course {
        // attempts arrive newest first
        let successes: Vec<&Payment> = attempts
            .iter()
            .filter(|p| p.status == PaymentStatus::Success)
            .collect();
        if !successes.is_empty() {
            entries.extend(successes.into_iter().cloned());
            continue;
        }
        if let Some(pending) = attempts.iter().find(|p| p.status == PaymentStatus::Pending) {
            entries.push(pending.clone());
            continue;
        }
        if let Some(failed) = attempts.iter().find(|p| p.status == PaymentStatus::Failed) {
            entries.push(failed.clone());
        }
    }
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let total_paid = entries
        .iter()
        .filter(|p| p.status == PaymentStatus::Success)
        .map(|p| p.amount)
        .sum();
    let pending_amount = entries
        .iter()
        .filter(|p| p.status == PaymentStatus::Pending)
        .map(|p| p.amount)
        .sum();
    let success_count = entries
        .iter()
        .filter(|p| p.status == PaymentStatus::Success)
        .count() as i64;
    let pending_count = entries
        .iter()
        .filter(|p| p.status == PaymentStatus::Pending)
        .count() as i64;

    Ok(PaymentHistory {
        entries,
        total_paid,
        pending_amount,
        success_count,
        pending_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::courses::{insert_course, Course};
    use crate::db::users::{insert_user, User};
    use lms_common::config::GatewayConfig;

    async fn setup() -> (SqlitePool, PaymentGateway, Uuid, Uuid) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        lms_common::db::init::create_all_tables(&pool).await.unwrap();

        let gateway = PaymentGateway::from_config(&GatewayConfig::default());

        let student = User::new("S".to_string(), "s@example.com".to_string(), Role::Student);
        insert_user(&pool, &student).await.unwrap();
        let course = Course::new("C".to_string(), None, None, 500.0, None, None);
        insert_course(&pool, &course).await.unwrap();
        (pool, gateway, student.id, course.id)
    }

    #[tokio::test]
    async fn checkout_reuses_newest_attempt() {
        let (pool, gateway, student, course) = setup().await;

        let first = create_order(&pool, &gateway, student, course).await.unwrap();
        let second = create_order(&pool, &gateway, student, course).await.unwrap();
        assert_ne!(first.order_id, second.order_id);

        // One row, re-armed, not two
        let attempts = payments::list_by_student_course(&pool, student, course)
            .await
            .unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].order_id.as_deref(), Some(second.order_id.as_str()));
        assert_eq!(attempts[0].status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn verify_is_idempotent() {
        let (pool, gateway, student, course) = setup().await;

        let order = create_order(&pool, &gateway, student, course).await.unwrap();
        let sig = gateway.sign(&order.order_id, "pay_1");

        let first = verify_payment(&pool, &gateway, &order.order_id, "pay_1", &sig)
            .await
            .unwrap();
        assert_eq!(first, VerifyOutcome::Verified);

        let second = verify_payment(&pool, &gateway, &order.order_id, "pay_1", &sig)
            .await
            .unwrap();
        assert_eq!(second, VerifyOutcome::AlreadyVerified);

        let enrollment = enrollments::load(&pool, student, course).await.unwrap().unwrap();
        assert!(enrollment.paid);
    }

    #[tokio::test]
    async fn verify_rejects_bad_signature() {
        let (pool, gateway, student, course) = setup().await;

        let order = create_order(&pool, &gateway, student, course).await.unwrap();
        let result = verify_payment(&pool, &gateway, &order.order_id, "pay_1", "forged").await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
        assert!(enrollments::load(&pool, student, course).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn paid_course_blocks_new_checkout() {
        let (pool, gateway, student, course) = setup().await;

        let order = create_order(&pool, &gateway, student, course).await.unwrap();
        let sig = gateway.sign(&order.order_id, "pay_1");
        verify_payment(&pool, &gateway, &order.order_id, "pay_1", &sig)
            .await
            .unwrap();

        let result = create_order(&pool, &gateway, student, course).await;
        assert!(matches!(result, Err(ApiError::Conflict(_))));
    }

    #[tokio::test]
    async fn history_collapses_to_success() {
        let (pool, gateway, student, course) = setup().await;

        // Two abandoned checkouts, then a successful one
        create_order(&pool, &gateway, student, course).await.unwrap();
        create_order(&pool, &gateway, student, course).await.unwrap();
        let order = create_order(&pool, &gateway, student, course).await.unwrap();
        let sig = gateway.sign(&order.order_id, "pay_1");
        verify_payment(&pool, &gateway, &order.order_id, "pay_1", &sig)
            .await
            .unwrap();

        let history = payment_history(&pool, student).await.unwrap();
        assert_eq!(history.entries.len(), 1);
        assert_eq!(history.entries[0].status, PaymentStatus::Success);
        assert_eq!(history.total_paid, 500.0);
        assert_eq!(history.pending_count, 0);
    }
}
