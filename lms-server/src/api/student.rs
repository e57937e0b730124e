//! Student-facing endpoints

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use lms_common::models::Role;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::extract::AuthUser;
use super::{announcement_json, envelope, event_json, payment_json, user_json};
use crate::db::{
    announcements, attendance, courses, enrollments, events, grades, help, payments as payments_db,
    progress, students, tests as tests_db, users,
};
use crate::services::grading::{self, AnswerInput};
use crate::services::payments as payment_service;
use crate::services::progress as progress_service;
use crate::{ApiError, ApiResult, AppState};

/// GET /api/student/my-courses
///
/// Enrollments whose paid flag has no surviving SUCCESS payment are
/// demoted on the way out, so a reversed payment drops the course.
pub async fn my_courses(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Student)?;

    let enrollments = enrollments::list_paid_by_student(&state.db, auth.user_id).await?;
    let mut items = Vec::with_capacity(enrollments.len());
    for enrollment in enrollments {
        if !payments_db::has_success(&state.db, auth.user_id, enrollment.course_id).await? {
            enrollments::set_paid(&state.db, enrollment.id, false).await?;
            continue;
        }
        let Some(course) = courses::load_by_id(&state.db, enrollment.course_id).await? else {
            continue;
        };

        let sequence = contents_count(&state.db, course.id).await?;
        let completed = progress::completed_content_ids(&state.db, auth.user_id, course.id)
            .await?
            .len() as i64;

        let mut body = super::courses::course_json(&state.db, &course).await?;
        body["enrolled_at"] = json!(enrollment.enrolled_at);
        body["completed_lessons"] = json!(completed);
        body["progress_percent"] = json!(if sequence > 0 {
            (completed as f64 / sequence as f64 * 100.0).round()
        } else {
            0.0
        });
        items.push(body);
    }

    Ok(envelope("Enrolled courses fetched", json!({ "items": items })))
}

async fn contents_count(pool: &sqlx::SqlitePool, course_id: Uuid) -> ApiResult<i64> {
    let (count, _) = crate::db::contents::course_stats(pool, course_id).await?;
    Ok(count)
}

/// POST /api/student/courses/:courseId/content/:contentId/mark-watched
pub async fn mark_watched(
    State(state): State<AppState>,
    Path((course_id, content_id)): Path<(Uuid, Uuid)>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Student)?;
    progress_service::mark_watched(&state.db, auth.user_id, course_id, content_id).await?;
    Ok(envelope("Content marked as watched", json!(null)))
}

/// GET /api/student/announcements
pub async fn list_announcements(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Student)?;
    let items: Vec<Value> = announcements::list_for_student(&state.db, auth.user_id)
        .await?
        .iter()
        .map(announcement_json)
        .collect();
    Ok(envelope("Announcements fetched", json!({ "items": items })))
}

/// GET /api/student/events
pub async fn list_events(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Student)?;
    let items: Vec<Value> = events::list_upcoming(&state.db)
        .await?
        .iter()
        .map(event_json)
        .collect();
    Ok(envelope("Upcoming events fetched", json!({ "items": items })))
}

/// GET /api/student/attendance
pub async fn my_attendance(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Student)?;

    let records = attendance::list_by_student(&state.db, auth.user_id).await?;
    let (present, total) = attendance::summary_by_student(&state.db, auth.user_id).await?;
    let percentage = if total > 0 {
        present as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    let items: Vec<Value> = records
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "course_id": r.course_id,
                "date": r.date,
                "status": r.status,
            })
        })
        .collect();

    Ok(envelope(
        "Attendance fetched",
        json!({
            "items": items,
            "present": present,
            "total": total,
            "percentage": (percentage * 10.0).round() / 10.0,
        }),
    ))
}

/// GET /api/student/grades
pub async fn my_grades(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Student)?;

    let records = grades::list_by_student(&state.db, auth.user_id).await?;
    let labels: Vec<String> = records.iter().map(|g| g.grade.clone()).collect();
    let average = grading::average_grade_points(&labels);

    let items: Vec<Value> = records
        .iter()
        .map(|g| {
            json!({
                "id": g.id,
                "course_id": g.course_id,
                "grade": g.grade,
                "remarks": g.remarks,
                "created_at": g.created_at,
            })
        })
        .collect();

    Ok(envelope(
        "Grades fetched",
        json!({ "items": items, "average_points": average }),
    ))
}

/// GET /api/student/profile
pub async fn get_profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Student)?;

    let user = users::load_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    let profile = students::load_by_user_id(&state.db, auth.user_id).await?;

    let mut body = user_json(&user);
    body["contact"] = json!(profile.as_ref().and_then(|p| p.contact.clone()));
    body["address"] = json!(profile.as_ref().and_then(|p| p.address.clone()));
    Ok(envelope("Profile fetched", body))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: String,
    pub phone: Option<String>,
    pub contact: Option<String>,
    pub address: Option<String>,
}

/// PUT /api/student/profile
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Student)?;

    if payload.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Name is required".to_string()));
    }
    let user = users::load_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    users::update_user(
        &state.db,
        auth.user_id,
        payload.name.trim(),
        payload.phone.as_deref(),
        &user.email,
    )
    .await?;
    students::update_profile(
        &state.db,
        auth.user_id,
        payload.contact.as_deref(),
        payload.address.as_deref(),
    )
    .await?;

    Ok(envelope("Profile updated", json!(null)))
}

/// GET /api/student/payments
pub async fn my_payments(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Student)?;

    let history = payment_service::payment_history(&state.db, auth.user_id).await?;
    let items: Vec<Value> = history.entries.iter().map(payment_json).collect();

    Ok(envelope(
        "Payments fetched",
        json!({
            "items": items,
            "total_paid": history.total_paid,
            "pending_amount": history.pending_amount,
            "success_count": history.success_count,
            "pending_count": history.pending_count,
        }),
    ))
}

/// GET /api/student/payments/pending-count
pub async fn pending_payment_count(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Student)?;
    let history = payment_service::payment_history(&state.db, auth.user_id).await?;
    Ok(envelope(
        "Pending payments counted",
        json!({ "pending_count": history.pending_count }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct HelpRequestBody {
    pub issue: String,
}

/// POST /api/student/help
pub async fn file_help_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<HelpRequestBody>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Student)?;

    if payload.issue.trim().is_empty() {
        return Err(ApiError::BadRequest("Issue description is required".to_string()));
    }
    let id = help::insert_request(&state.db, auth.user_id, payload.issue.trim()).await?;
    Ok((
        StatusCode::CREATED,
        envelope("Help request submitted", json!({ "id": id })),
    ))
}

/// GET /api/student/help
pub async fn my_help_requests(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Student)?;

    let items: Vec<Value> = help::list_by_student(&state.db, auth.user_id)
        .await?
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "issue": r.issue,
                "status": r.status,
                "reply": r.reply,
                "replied_at": r.replied_at,
                "resolved_at": r.resolved_at,
                "created_at": r.created_at,
            })
        })
        .collect();
    Ok(envelope("Help requests fetched", json!({ "items": items })))
}

/// GET /api/student/tests
pub async fn list_tests(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Student)?;

    let tests = tests_db::list_published(&state.db).await?;
    let mut items = Vec::with_capacity(tests.len());
    for test in &tests {
        let attempted = tests_db::load_submission(&state.db, test.id, auth.user_id)
            .await?
            .is_some();
        items.push(json!({
            "id": test.id,
            "title": test.title,
            "subject": test.subject,
            "description": test.description,
            "max_marks": test.max_marks,
            "created_at": test.created_at,
            "attempted": attempted,
        }));
    }
    Ok(envelope("Tests fetched", json!({ "items": items })))
}

/// GET /api/student/tests/:id
///
/// Correct options stay hidden until the student has attempted the test.
pub async fn get_test(
    State(state): State<AppState>,
    Path(test_id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Student)?;

    let test = tests_db::load_test(&state.db, test_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Test not found".to_string()))?;
    if !test.published {
        return Err(ApiError::NotFound("Test not found".to_string()));
    }

    let submission = tests_db::load_submission(&state.db, test_id, auth.user_id).await?;
    let attempted = submission.is_some();

    let questions: Vec<Value> = tests_db::questions_by_test(&state.db, test_id)
        .await?
        .iter()
        .map(|q| {
            let mut body = json!({
                "id": q.id,
                "question_text": q.question_text,
                "option_a": q.option_a,
                "option_b": q.option_b,
                "option_c": q.option_c,
                "option_d": q.option_d,
            });
            if attempted {
                body["correct_option"] = json!(q.correct_option);
            }
            body
        })
        .collect();

    Ok(envelope(
        "Test fetched",
        json!({
            "id": test.id,
            "title": test.title,
            "subject": test.subject,
            "description": test.description,
            "max_marks": test.max_marks,
            "attempted": attempted,
            "score": submission.as_ref().map(|s| s.score),
            "questions": questions,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct SubmitTestRequest {
    pub answers: Vec<AnswerInput>,
}

/// POST /api/student/tests/:id/submit
pub async fn submit_test(
    State(state): State<AppState>,
    Path(test_id): Path<Uuid>,
    auth: AuthUser,
    Json(payload): Json<SubmitTestRequest>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Student)?;

    let (score, correct, total) =
        grading::submit_test(&state.db, auth.user_id, test_id, &payload.answers).await?;
    Ok(envelope(
        "Test submitted",
        json!({ "score": score, "correct": correct, "total_questions": total }),
    ))
}

/// GET /api/student/tests/results
pub async fn test_results(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Student)?;

    let items: Vec<Value> = tests_db::submissions_by_student(&state.db, auth.user_id)
        .await?
        .iter()
        .map(|row| {
            json!({
                "test_id": row.submission.test_id,
                "test_title": row.test_title,
                "test_subject": row.test_subject,
                "score": row.submission.score,
                "total_correct": row.submission.total_correct,
                "max_marks": row.max_marks,
                "submitted_at": row.submission.submitted_at,
            })
        })
        .collect();
    Ok(envelope("Results fetched", json!({ "items": items })))
}

pub fn student_routes() -> Router<AppState> {
    Router::new()
        .route("/api/student/my-courses", get(my_courses))
        .route(
            "/api/student/courses/:course_id/content/:content_id/mark-watched",
            post(mark_watched),
        )
        .route("/api/student/announcements", get(list_announcements))
        .route("/api/student/events", get(list_events))
        .route("/api/student/attendance", get(my_attendance))
        .route("/api/student/grades", get(my_grades))
        .route(
            "/api/student/profile",
            get(get_profile).put(update_profile),
        )
        .route("/api/student/payments", get(my_payments))
        .route(
            "/api/student/payments/pending-count",
            get(pending_payment_count),
        )
        .route("/api/student/help", get(my_help_requests).post(file_help_request))
        .route("/api/student/tests", get(list_tests))
        .route("/api/student/tests/results", get(test_results))
        .route("/api/student/tests/:id", get(get_test))
        .route("/api/student/tests/:id/submit", post(submit_test))
}
