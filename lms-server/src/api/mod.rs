//! HTTP handlers, grouped by actor prefix

pub mod admin;
pub mod auth;
pub mod courses;
pub mod extract;
pub mod health;
pub mod payments;
pub mod student;
pub mod teacher;
pub mod users;

use axum::Json;
use serde_json::{json, Value};

use crate::db::announcements::Announcement;
use crate::db::events::UpcomingEvent;
use crate::db::payments::Payment;
use crate::db::users::User;

/// Uniform response envelope: every endpoint answers {message, data}
pub(crate) fn envelope(message: &str, data: Value) -> Json<Value> {
    Json(json!({
        "message": message,
        "data": data,
    }))
}

/// Public projection of a user account (no credentials, no OTP)
pub(crate) fn user_json(user: &User) -> Value {
    json!({
        "id": user.id,
        "name": user.name,
        "email": user.email,
        "phone": user.phone,
        "role": user.role,
        "profile_photo": user.profile_photo,
        "approved": user.approved,
        "created_at": user.created_at,
    })
}

pub(crate) fn announcement_json(a: &Announcement) -> Value {
    json!({
        "id": a.id,
        "teacher_id": a.teacher_id,
        "course_id": a.course_id,
        "title": a.title,
        "message": a.message,
        "created_at": a.created_at,
    })
}

pub(crate) fn event_json(e: &UpcomingEvent) -> Value {
    json!({
        "id": e.id,
        "title": e.title,
        "description": e.description,
        "event_at": e.event_at,
        "enabled": e.enabled,
        "created_at": e.created_at,
    })
}

pub(crate) fn payment_json(p: &Payment) -> Value {
    json!({
        "id": p.id,
        "student_id": p.student_id,
        "course_id": p.course_id,
        "amount": p.amount,
        "currency": p.currency,
        "status": p.status,
        "order_id": p.order_id,
        "payment_id": p.payment_id,
        "paid_at": p.paid_at,
        "created_at": p.created_at,
    })
}
