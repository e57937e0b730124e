//! Integration tests for the course catalog and payment checkout

mod helpers;

use axum::http::StatusCode;
use lms_common::models::Role;
use serde_json::{json, Value};
use uuid::Uuid;

use helpers::{create_test_app, request, seed_user, send};
use lms_server::AppState;

async fn create_course(
    app: &axum::Router,
    admin_token: &str,
    title: &str,
    category: &str,
    price: f64,
) -> Uuid {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/api/courses/create",
            Some(admin_token),
            Some(json!({
                "title": title,
                "category": category,
                "price": price,
                "description": "A test course",
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"]["id"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .expect("course id")
}

async fn add_content(app: &axum::Router, admin_token: &str, course_id: Uuid, title: &str) -> Uuid {
    let (status, body) = send(
        app,
        request(
            "POST",
            &format!("/api/courses/{}/contents", course_id),
            Some(admin_token),
            Some(json!({
                "title": title,
                "video_url": format!("https://videos.example.com/{}.mp4", title),
                "duration_minutes": 12,
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"]["id"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .expect("content id")
}

/// Run an offline checkout to completion for a student
async fn purchase(app: &axum::Router, state: &AppState, token: &str, course_id: Uuid) {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/api/payment/create-order",
            Some(token),
            Some(json!({ "courseId": course_id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id = body["data"]["order_id"].as_str().expect("order id").to_string();

    let signature = state.gateway.sign(&order_id, "pay_test_1");
    let (status, _) = send(
        app,
        request(
            "POST",
            "/api/payment/verify",
            Some(token),
            Some(json!({
                "orderId": order_id,
                "paymentId": "pay_test_1",
                "signature": signature,
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn only_admins_create_courses() {
    let (app, state) = create_test_app().await;
    let (_, student_token) = seed_user(&state.db, Role::Student, "s@example.com").await;

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/api/courses/create",
            Some(&student_token),
            Some(json!({ "title": "Sneaky", "price": 100.0 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn catalog_search_reports_total_and_matched() {
    let (app, state) = create_test_app().await;
    let (_, admin_token) = seed_user(&state.db, Role::Admin, "a@example.com").await;

    create_course(&app, &admin_token, "Rust Fundamentals", "Programming", 499.0).await;
    create_course(&app, &admin_token, "Advanced Rust", "Programming", 799.0).await;
    create_course(&app, &admin_token, "Watercolor Basics", "Art", 299.0).await;

    let (status, body) = send(
        &app,
        request("GET", "/api/courses/all?search=rust", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], json!(3));
    assert_eq!(body["data"]["matched"], json!(2));

    let (status, body) = send(
        &app,
        request("GET", "/api/courses/all?category=Art", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["matched"], json!(1));
    assert_eq!(
        body["data"]["items"][0]["title"],
        json!("Watercolor Basics")
    );
}

#[tokio::test]
async fn hostile_sort_field_is_ignored() {
    let (app, state) = create_test_app().await;
    let (_, admin_token) = seed_user(&state.db, Role::Admin, "a@example.com").await;
    create_course(&app, &admin_token, "Course A", "General", 100.0).await;

    let (status, _) = send(
        &app,
        request(
            "GET",
            "/api/courses/all?sortField=price;%20DROP%20TABLE%20courses",
            None,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn anonymous_content_listing_hides_video_urls() {
    let (app, state) = create_test_app().await;
    let (_, admin_token) = seed_user(&state.db, Role::Admin, "a@example.com").await;
    let course_id = create_course(&app, &admin_token, "Locked Course", "General", 500.0).await;
    add_content(&app, &admin_token, course_id, "lesson-1").await;

    let (status, body) = send(
        &app,
        request("GET", &format!("/api/courses/{}/contents", course_id), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let item = &body["data"]["items"][0];
    assert_eq!(item["video_url"], Value::Null);
    assert_eq!(item["is_unlocked"], json!(false));
}

#[tokio::test]
async fn free_course_has_no_checkout() {
    let (app, state) = create_test_app().await;
    let (_, admin_token) = seed_user(&state.db, Role::Admin, "a@example.com").await;
    let (_, student_token) = seed_user(&state.db, Role::Student, "s@example.com").await;
    let course_id = create_course(&app, &admin_token, "Free Intro", "General", 0.0).await;

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/api/payment/create-order",
            Some(&student_token),
            Some(json!({ "courseId": course_id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn checkout_enrolls_after_signature_verification() {
    let (app, state) = create_test_app().await;
    let (_, admin_token) = seed_user(&state.db, Role::Admin, "a@example.com").await;
    let (_, student_token) = seed_user(&state.db, Role::Student, "s@example.com").await;
    let course_id = create_course(&app, &admin_token, "Paid Course", "General", 999.0).await;

    let (status, body) = send(
        &app,
        request(
            "GET",
            &format!("/api/payment/check?courseId={}", course_id),
            Some(&student_token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["enrolled"], json!(false));

    purchase(&app, &state, &student_token, course_id).await;

    let (status, body) = send(
        &app,
        request(
            "GET",
            &format!("/api/payment/check?courseId={}", course_id),
            Some(&student_token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["enrolled"], json!(true));

    // Buying the same course again is refused
    let (status, _) = send(
        &app,
        request(
            "POST",
            "/api/payment/create-order",
            Some(&student_token),
            Some(json!({ "courseId": course_id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn bad_signature_is_rejected_and_verify_is_idempotent() {
    let (app, state) = create_test_app().await;
    let (_, admin_token) = seed_user(&state.db, Role::Admin, "a@example.com").await;
    let (_, student_token) = seed_user(&state.db, Role::Student, "s@example.com").await;
    let course_id = create_course(&app, &admin_token, "Paid Course", "General", 750.0).await;

    let (_, body) = send(
        &app,
        request(
            "POST",
            "/api/payment/create-order",
            Some(&student_token),
            Some(json!({ "courseId": course_id })),
        ),
    )
    .await;
    let order_id = body["data"]["order_id"].as_str().expect("order id").to_string();

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/api/payment/verify",
            Some(&student_token),
            Some(json!({
                "orderId": order_id,
                "paymentId": "pay_1",
                "signature": "forged",
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let signature = state.gateway.sign(&order_id, "pay_1");
    let verify = json!({
        "orderId": order_id,
        "paymentId": "pay_1",
        "signature": signature,
    });
    let (status, body) = send(
        &app,
        request("POST", "/api/payment/verify", Some(&student_token), Some(verify.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], json!("Payment verified"));

    // Gateway retries of the same callback change nothing
    let (status, body) = send(
        &app,
        request("POST", "/api/payment/verify", Some(&student_token), Some(verify)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], json!("Payment already verified"));
}

#[tokio::test]
async fn abandoned_checkout_is_reused() {
    let (app, state) = create_test_app().await;
    let (_, admin_token) = seed_user(&state.db, Role::Admin, "a@example.com").await;
    let (_, student_token) = seed_user(&state.db, Role::Student, "s@example.com").await;
    let course_id = create_course(&app, &admin_token, "Paid Course", "General", 600.0).await;

    for _ in 0..3 {
        let (status, _) = send(
            &app,
            request(
                "POST",
                "/api/payment/create-order",
                Some(&student_token),
                Some(json!({ "courseId": course_id })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    // Three checkouts must not pile up three live payment rows
    let pending: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM payments WHERE course_id = ? AND status = 'PENDING'",
    )
    .bind(course_id.to_string())
    .fetch_one(&state.db)
    .await
    .expect("count");
    assert_eq!(pending, 1);
}

#[tokio::test]
async fn course_deletion_detaches_payments() {
    let (app, state) = create_test_app().await;
    let (_, admin_token) = seed_user(&state.db, Role::Admin, "a@example.com").await;
    let (_, student_token) = seed_user(&state.db, Role::Student, "s@example.com").await;

    let course_id = create_course(&app, &admin_token, "Doomed Course", "General", 450.0).await;
    add_content(&app, &admin_token, course_id, "lesson-1").await;
    purchase(&app, &state, &student_token, course_id).await;

    let (status, _) = send(
        &app,
        request(
            "DELETE",
            &format!("/api/courses/{}", course_id),
            Some(&admin_token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        request("GET", &format!("/api/courses/{}", course_id), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The revenue record survives with its course link cleared
    let orphaned: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM payments WHERE course_id IS NULL AND status = 'SUCCESS'",
    )
    .fetch_one(&state.db)
    .await
    .expect("count");
    assert_eq!(orphaned, 1);
}
