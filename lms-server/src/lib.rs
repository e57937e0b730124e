//! lms-server library interface
//!
//! Exposes application state and router construction for the binary and
//! for integration tests.

pub mod api;
pub mod db;
pub mod error;
pub mod services;
pub mod tasks;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use lms_common::config::Config;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::services::gateway::PaymentGateway;
use crate::services::mailer::Mailer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Server configuration
    pub config: Arc<Config>,
    /// Payment gateway client
    pub gateway: Arc<PaymentGateway>,
    /// Mail relay client
    pub mailer: Arc<Mailer>,
    /// Secret used to sign bearer tokens, persisted in settings
    pub token_secret: String,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        config: Arc<Config>,
        gateway: Arc<PaymentGateway>,
        mailer: Arc<Mailer>,
        token_secret: String,
    ) -> Self {
        Self {
            db,
            config,
            gateway,
            mailer,
            token_secret,
        }
    }
}

/// Build application router
///
/// Routes are grouped by actor prefix; uploaded profile photos are
/// served back as static files under /uploads.
pub fn build_router(state: AppState) -> Router {
    let upload_dir = state.config.upload_dir.clone();

    Router::new()
        .merge(api::auth::auth_routes())
        .merge(api::courses::course_routes())
        .merge(api::payments::payment_routes())
        .merge(api::student::student_routes())
        .merge(api::teacher::teacher_routes())
        .merge(api::admin::admin_routes())
        .merge(api::users::user_routes())
        .merge(api::health::health_routes())
        .nest_service("/uploads", ServeDir::new(upload_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
