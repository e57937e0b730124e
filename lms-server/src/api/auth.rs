//! Authentication endpoints: registration, login, password reset
//!
//! Forgot-password always answers 200 with a neutral message so the
//! endpoint cannot be used to enumerate accounts. The OTP mail is the
//! one notification whose delivery failure is surfaced; on failure the
//! stored OTP is cleared so a half-sent code cannot linger.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use lms_common::models::Role;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::{envelope, user_json};
use crate::db::{students, teachers, users};
use crate::services::{auth as auth_service, tokens};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub role: Option<Role>,
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = payload.email.trim().to_lowercase();
    if payload.name.trim().is_empty() || email.is_empty() {
        return Err(ApiError::BadRequest("Name and email are required".to_string()));
    }
    if !email.contains('@') {
        return Err(ApiError::BadRequest("Invalid email address".to_string()));
    }
    if payload.password.len() < 6 {
        return Err(ApiError::BadRequest(
            "Password must be at least 6 characters".to_string(),
        ));
    }

    if users::load_by_email(&state.db, &email).await?.is_some() {
        return Err(ApiError::Conflict("Email is already registered".to_string()));
    }

    let role = payload.role.unwrap_or(Role::Student);
    let mut user = users::User::new(payload.name.trim().to_string(), email, role);
    user.phone = payload.phone;
    let salt = auth_service::generate_salt();
    user.password_hash = Some(auth_service::hash_password(&salt, &payload.password));
    user.password_salt = Some(salt);
    users::insert_user(&state.db, &user).await?;

    match role {
        Role::Student => {
            students::insert_student(&state.db, user.id, user.phone.as_deref(), None).await?;
        }
        Role::Teacher => {
            teachers::insert_teacher(&state.db, user.id, None, None, None).await?;
        }
        Role::Admin => {}
    }

    info!("Registered new {} account {}", role.as_str(), user.email);

    let message = if role == Role::Student {
        "Registration received, awaiting admission approval"
    } else {
        "Registration successful"
    };
    Ok((StatusCode::CREATED, envelope(message, user_json(&user))))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = payload.email.trim().to_lowercase();
    let user = users::load_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid email or password".to_string()))?;

    let valid = match (&user.password_salt, &user.password_hash) {
        (Some(salt), Some(hash)) => auth_service::verify_password(salt, hash, &payload.password),
        _ => false,
    };
    if !valid {
        return Err(ApiError::Unauthorized("Invalid email or password".to_string()));
    }

    // Correct credentials are not enough for an unapproved student
    if user.role == Role::Student && !user.approved {
        return Err(ApiError::Forbidden(
            "Your admission is pending approval".to_string(),
        ));
    }

    let token = tokens::issue(user.id, &user.email, user.role, &state.token_secret);
    Ok(envelope(
        "Login successful",
        json!({
            "token": token,
            "user": user_json(&user),
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// POST /api/auth/forgot-password
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = payload.email.trim().to_lowercase();
    let neutral = "If an account exists for that email, an OTP has been sent";

    let user = match users::load_by_email(&state.db, &email).await? {
        Some(user) => user,
        None => return Ok(envelope(neutral, json!(null))),
    };

    let validity =
        lms_common::db::settings::get_setting_i64(&state.db, "otp_validity_minutes", 10).await?;
    let otp = auth_service::generate_otp();
    let expires_at = Utc::now() + Duration::minutes(validity);
    users::set_otp(&state.db, user.id, Some(&otp), Some(expires_at)).await?;

    let body = format!(
        "Your password reset code is {}. It expires in {} minutes.",
        otp, validity
    );
    if let Err(e) = state.mailer.send(&user.email, "Password reset code", &body).await {
        // A code the student never received must not stay usable
        warn!("OTP mail to {} failed: {}", user.email, e);
        users::set_otp(&state.db, user.id, None, None).await?;
        return Err(ApiError::Internal(
            "Failed to send the reset code, try again later".to_string(),
        ));
    }

    Ok(envelope(neutral, json!(null)))
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

async fn check_otp(state: &AppState, email: &str, otp: &str) -> ApiResult<users::User> {
    let user = users::load_by_email(&state.db, email)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Invalid or expired OTP".to_string()))?;

    let (stored, expires_at) = match (&user.otp, user.otp_expires_at) {
        (Some(stored), Some(expires_at)) => (stored.clone(), expires_at),
        _ => return Err(ApiError::BadRequest("Invalid or expired OTP".to_string())),
    };

    if expires_at < Utc::now() {
        users::set_otp(&state.db, user.id, None, None).await?;
        return Err(ApiError::BadRequest("Invalid or expired OTP".to_string()));
    }
    if stored != otp.trim() {
        return Err(ApiError::BadRequest("Invalid or expired OTP".to_string()));
    }

    Ok(user)
}

/// POST /api/auth/verify-otp
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = payload.email.trim().to_lowercase();
    check_otp(&state, &email, &payload.otp).await?;
    Ok(envelope("OTP verified", json!(null)))
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub otp: String,
    pub new_password: String,
}

/// POST /api/auth/reset-password
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    if payload.new_password.len() < 6 {
        return Err(ApiError::BadRequest(
            "Password must be at least 6 characters".to_string(),
        ));
    }

    let email = payload.email.trim().to_lowercase();
    let user = check_otp(&state, &email, &payload.otp).await?;

    let salt = auth_service::generate_salt();
    let hash = auth_service::hash_password(&salt, &payload.new_password);
    users::set_password(&state.db, user.id, &hash, &salt).await?;
    users::set_otp(&state.db, user.id, None, None).await?;

    info!("Password reset for {}", user.email);
    Ok(envelope("Password has been reset", json!(null)))
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/forgot-password", post(forgot_password))
        .route("/api/auth/verify-otp", post(verify_otp))
        .route("/api/auth/reset-password", post(reset_password))
}
