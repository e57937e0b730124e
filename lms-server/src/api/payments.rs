//! Payment gateway checkout endpoints

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use lms_common::models::Role;
use serde::Deserialize;
use serde_json::json;

use super::envelope;
use super::extract::AuthUser;
use crate::db::{enrollments, payments};
use crate::services::payments as payment_service;
use crate::services::payments::VerifyOutcome;
use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(rename = "courseId")]
    pub course_id: uuid::Uuid,
}

/// POST /api/payment/create-order
pub async fn create_order(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateOrderRequest>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Student)?;

    let order = payment_service::create_order(
        &state.db,
        &state.gateway,
        auth.user_id,
        payload.course_id,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        envelope(
            "Order created",
            json!({
                "order_id": order.order_id,
                "amount": order.amount,
                "currency": order.currency,
                "key_id": order.key_id,
            }),
        ),
    ))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(rename = "orderId")]
    pub order_id: String,
    #[serde(rename = "paymentId")]
    pub payment_id: String,
    pub signature: String,
}

/// POST /api/payment/verify
pub async fn verify_payment(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<VerifyRequest>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Student)?;

    let outcome = payment_service::verify_payment(
        &state.db,
        &state.gateway,
        &payload.order_id,
        &payload.payment_id,
        &payload.signature,
    )
    .await?;

    let message = match outcome {
        VerifyOutcome::Verified => "Payment verified",
        VerifyOutcome::AlreadyVerified => "Payment already verified",
    };
    Ok(envelope(message, json!({ "order_id": payload.order_id })))
}

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    #[serde(rename = "courseId")]
    pub course_id: uuid::Uuid,
}

/// GET /api/payment/check?courseId=...
pub async fn check_enrollment(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<CheckQuery>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Student)?;

    let paid = enrollments::load(&state.db, auth.user_id, query.course_id)
        .await?
        .map(|e| e.paid)
        .unwrap_or(false);
    let enrolled =
        paid && payments::has_success(&state.db, auth.user_id, query.course_id).await?;

    Ok(envelope("Enrollment checked", json!({ "enrolled": enrolled })))
}

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/api/payment/create-order", post(create_order))
        .route("/api/payment/verify", post(verify_payment))
        .route("/api/payment/check", get(check_enrollment))
}
