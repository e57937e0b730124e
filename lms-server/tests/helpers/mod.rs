//! Shared helpers for API integration tests

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use lms_common::config::Config;
use lms_common::models::Role;
use serde_json::Value;
use sqlx::SqlitePool;
use tower::util::ServiceExt;
use uuid::Uuid;

use lms_server::db::{students, teachers, users};
use lms_server::services::auth as auth_service;
use lms_server::services::gateway::PaymentGateway;
use lms_server::services::mailer::Mailer;
use lms_server::services::tokens;
use lms_server::AppState;

pub const TEST_SECRET: &str = "integration-test-secret";

/// Build a router over a fresh in-memory database
pub async fn create_test_app() -> (Router, AppState) {
    let pool = SqlitePool::connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    lms_common::db::init::create_all_tables(&pool)
        .await
        .expect("Failed to create schema");
    lms_common::db::init::init_default_settings(&pool)
        .await
        .expect("Failed to seed settings");

    let mut config = Config::default();
    config.upload_dir = std::env::temp_dir().join(format!("lms-test-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&config.upload_dir).expect("Failed to create upload dir");
    let config = Arc::new(config);

    let gateway = Arc::new(PaymentGateway::from_config(&config.gateway));
    let mailer = Arc::new(Mailer::from_config(&config.mail));
    let state = AppState::new(
        pool,
        config,
        gateway,
        mailer,
        TEST_SECRET.to_string(),
    );

    (lms_server::build_router(state.clone()), state)
}

/// Insert an approved user with the given role and return (user_id, token)
pub async fn seed_user(pool: &SqlitePool, role: Role, email: &str) -> (Uuid, String) {
    let mut user = users::User::new(format!("Test {}", role.as_str()), email.to_string(), role);
    let salt = auth_service::generate_salt();
    user.password_hash = Some(auth_service::hash_password(&salt, "secret123"));
    user.password_salt = Some(salt);
    user.approved = true;
    users::insert_user(pool, &user).await.expect("insert user");

    match role {
        Role::Student => {
            students::insert_student(pool, user.id, None, None)
                .await
                .expect("insert student profile");
        }
        Role::Teacher => {
            teachers::insert_teacher(pool, user.id, None, None, None)
                .await
                .expect("insert teacher profile");
        }
        Role::Admin => {}
    }

    let token = tokens::issue(user.id, email, role, TEST_SECRET);
    (user.id, token)
}

/// Seed a teacher and return the teachers-table profile id alongside
pub async fn seed_teacher(pool: &SqlitePool, email: &str) -> (Uuid, Uuid, String) {
    let (user_id, token) = seed_user(pool, Role::Teacher, email).await;
    let profile = teachers::load_by_user_id(pool, user_id)
        .await
        .expect("load teacher profile")
        .expect("teacher profile exists");
    (user_id, profile.id, token)
}

pub fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .expect("build request"),
        None => builder.body(Body::empty()).expect("build request"),
    }
}

/// Send a request and return (status, parsed body)
pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.expect("request failed");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body is JSON")
    };
    (status, body)
}
