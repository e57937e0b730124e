//! Administrator endpoints: people management, reporting, events,
//! assignments and the help queue

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Datelike, Utc};
use lms_common::models::{HelpStatus, Role};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::extract::AuthUser;
use super::{envelope, event_json, payment_json, user_json};
use crate::db::{
    announcements, attendance, courses, enrollments, events, grades, help, payments as payments_db,
    progress, students, subjects, teachers, tests as tests_db, users,
};
use crate::services::auth as auth_service;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    #[serde(rename = "sortField")]
    pub sort_field: Option<String>,
    #[serde(rename = "sortDirection")]
    pub sort_direction: Option<String>,
}

/// GET /api/admin/students
pub async fn list_students(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    let sort_desc = matches!(query.sort_direction.as_deref(), Some("desc") | Some("DESC"));
    let users = users::list_by_role(
        &state.db,
        Role::Student,
        query.search.as_deref().filter(|s| !s.trim().is_empty()),
        query.sort_field.as_deref(),
        sort_desc,
    )
    .await?;

    let mut items = Vec::with_capacity(users.len());
    for user in &users {
        let profile = students::load_by_user_id(&state.db, user.id).await?;
        let mut body = user_json(user);
        body["contact"] = json!(profile.as_ref().and_then(|p| p.contact.clone()));
        body["address"] = json!(profile.as_ref().and_then(|p| p.address.clone()));
        items.push(body);
    }
    Ok(envelope("Students fetched", json!({ "items": items })))
}

/// GET /api/admin/teachers
pub async fn list_teachers(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    let sort_desc = matches!(query.sort_direction.as_deref(), Some("desc") | Some("DESC"));
    let users = users::list_by_role(
        &state.db,
        Role::Teacher,
        query.search.as_deref().filter(|s| !s.trim().is_empty()),
        query.sort_field.as_deref(),
        sort_desc,
    )
    .await?;

    let mut items = Vec::with_capacity(users.len());
    for user in &users {
        let profile = teachers::load_by_user_id(&state.db, user.id).await?;
        let mut body = user_json(user);
        body["teacher_id"] = json!(profile.as_ref().map(|p| p.id));
        body["contact"] = json!(profile.as_ref().and_then(|p| p.contact.clone()));
        body["qualification"] = json!(profile.as_ref().and_then(|p| p.qualification.clone()));
        items.push(body);
    }
    Ok(envelope("Teachers fetched", json!({ "items": items })))
}

#[derive(Debug, Deserialize)]
pub struct CreateTeacherRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub contact: Option<String>,
    pub address: Option<String>,
    pub qualification: Option<String>,
}

/// POST /api/admin/teachers
pub async fn create_teacher(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateTeacherRequest>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    let email = payload.email.trim().to_lowercase();
    if payload.name.trim().is_empty() || !email.contains('@') {
        return Err(ApiError::BadRequest(
            "Name and a valid email are required".to_string(),
        ));
    }
    if payload.password.len() < 6 {
        return Err(ApiError::BadRequest(
            "Password must be at least 6 characters".to_string(),
        ));
    }
    if users::load_by_email(&state.db, &email).await?.is_some() {
        return Err(ApiError::BadRequest(
            "Email is already registered".to_string(),
        ));
    }

    let mut user = users::User::new(payload.name.trim().to_string(), email, Role::Teacher);
    user.phone = payload.phone;
    let salt = auth_service::generate_salt();
    user.password_hash = Some(auth_service::hash_password(&salt, &payload.password));
    user.password_salt = Some(salt);
    users::insert_user(&state.db, &user).await?;

    let teacher_id = teachers::insert_teacher(
        &state.db,
        user.id,
        payload.contact.as_deref(),
        payload.address.as_deref(),
        payload.qualification.as_deref(),
    )
    .await?;

    info!("Teacher account {} created", user.email);
    let mut body = user_json(&user);
    body["teacher_id"] = json!(teacher_id);
    Ok((StatusCode::CREATED, envelope("Teacher created", body)))
}

/// GET /api/admin/stats
pub async fn stats(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    let total_students = users::count_by_role(&state.db, Role::Student).await?;
    let total_teachers = users::count_by_role(&state.db, Role::Teacher).await?;
    let total_courses = courses::count_courses(&state.db).await?;
    let enrolled_students = enrollments::count_distinct_paid_students(&state.db).await?;
    let pending_admissions = users::count_pending_students(&state.db).await?;
    let attendance_pct = attendance::overall_percentage(&state.db).await?;
    let (revenue_total, revenue_month, revenue_year) =
        payments_db::revenue_stats(&state.db).await?;

    Ok(envelope(
        "Stats fetched",
        json!({
            "total_students": total_students,
            "total_teachers": total_teachers,
            "total_courses": total_courses,
            "enrolled_students": enrolled_students,
            "pending_admissions": pending_admissions,
            "attendance_percentage": (attendance_pct * 10.0).round() / 10.0,
            "revenue": {
                "total": revenue_total,
                "this_month": revenue_month,
                "this_year": revenue_year,
            },
        }),
    ))
}

/// Labels for the trailing `count` calendar months, oldest first
fn month_labels(count: usize) -> Vec<String> {
    let now = Utc::now();
    let mut year = now.year();
    let mut month = now.month() as i32;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(format!("{:04}-{:02}", year, month));
        month -= 1;
        if month == 0 {
            month = 12;
            year -= 1;
        }
    }
    out.reverse();
    out
}

/// GET /api/admin/reports/analytics
///
/// Six month enrollment, attendance and revenue trends plus the course
/// category distribution. Months without data report zero.
pub async fn analytics(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    let labels = month_labels(6);
    let since = labels[0].clone();

    let enrollment_by_month: HashMap<String, i64> = enrollments::monthly_counts(&state.db, &since)
        .await?
        .into_iter()
        .collect();
    let attendance_by_month: HashMap<String, f64> =
        attendance::monthly_percentages(&state.db, &since)
            .await?
            .into_iter()
            .collect();
    let revenue_by_month: HashMap<String, f64> = payments_db::monthly_revenue(&state.db, &since)
        .await?
        .into_iter()
        .collect();

    let months: Vec<Value> = labels
        .iter()
        .map(|label| {
            json!({
                "month": label,
                "enrollments": enrollment_by_month.get(label).copied().unwrap_or(0),
                "attendance_percentage": attendance_by_month.get(label).copied().unwrap_or(0.0),
                "revenue": revenue_by_month.get(label).copied().unwrap_or(0.0),
            })
        })
        .collect();

    let categories: Vec<Value> = courses::category_distribution(&state.db)
        .await?
        .into_iter()
        .map(|(category, count)| json!({ "category": category, "courses": count }))
        .collect();

    Ok(envelope(
        "Analytics fetched",
        json!({ "months": months, "categories": categories }),
    ))
}

/// GET /api/admin/recent-admissions
pub async fn recent_admissions(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    let items: Vec<Value> = users::recent_by_role(&state.db, Role::Student, 10)
        .await?
        .iter()
        .map(user_json)
        .collect();
    Ok(envelope("Recent admissions fetched", json!({ "items": items })))
}

/// GET /api/admin/pending-admissions
pub async fn pending_admissions(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    let items: Vec<Value> = users::list_pending_students(&state.db)
        .await?
        .iter()
        .map(user_json)
        .collect();
    Ok(envelope("Pending admissions fetched", json!({ "items": items })))
}

/// POST /api/admin/approve-admission/:id
pub async fn approve_admission(
    State(state): State<AppState>,
    Path(student_id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    let user = users::load_by_id(&state.db, student_id)
        .await?
        .filter(|u| u.role == Role::Student)
        .ok_or_else(|| ApiError::NotFound("Student not found".to_string()))?;
    if user.approved {
        return Err(ApiError::BadRequest("Admission is already approved".to_string()));
    }

    users::set_approved(&state.db, student_id, true).await?;
    state
        .mailer
        .send_best_effort(
            &user.email,
            "Admission approved",
            &format!("Hello {}, your admission has been approved. You can now log in.", user.name),
        )
        .await;

    info!("Admission approved for {}", user.email);
    Ok(envelope("Admission approved", json!(null)))
}

/// GET /api/admin/top-performers
pub async fn top_performers(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    let leaders = attendance::top_performers(&state.db, 10).await?;
    let mut items = Vec::with_capacity(leaders.len());
    for (student_id, present, total) in leaders {
        let Some(user) = users::load_by_id(&state.db, student_id).await? else {
            continue;
        };
        let pct = if total > 0 {
            present as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        items.push(json!({
            "student_id": student_id,
            "name": user.name,
            "email": user.email,
            "present": present,
            "total": total,
            "percentage": (pct * 10.0).round() / 10.0,
        }));
    }
    Ok(envelope("Top performers fetched", json!({ "items": items })))
}

/// DELETE /api/admin/students/:id
///
/// Removes the student's activity outright but only detaches payments,
/// keeping the revenue record.
pub async fn delete_student(
    State(state): State<AppState>,
    Path(student_id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    users::load_by_id(&state.db, student_id)
        .await?
        .filter(|u| u.role == Role::Student)
        .ok_or_else(|| ApiError::NotFound("Student not found".to_string()))?;

    tests_db::delete_submissions_by_student(&state.db, student_id).await?;
    progress::delete_by_student(&state.db, student_id).await?;
    help::delete_by_student(&state.db, student_id).await?;
    enrollments::delete_by_student(&state.db, student_id).await?;
    attendance::delete_by_student(&state.db, student_id).await?;
    grades::delete_by_student(&state.db, student_id).await?;
    payments_db::detach_student(&state.db, student_id).await?;
    students::delete_by_user_id(&state.db, student_id).await?;
    users::delete_user(&state.db, student_id).await?;

    info!("Student {} deleted", student_id);
    Ok(envelope("Student deleted", json!(null)))
}

/// DELETE /api/admin/teachers/:id
///
/// `:id` is the user id. The teacher's courses survive with the
/// teacher link cleared; their tests and submissions do not.
pub async fn delete_teacher(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    users::load_by_id(&state.db, user_id)
        .await?
        .filter(|u| u.role == Role::Teacher)
        .ok_or_else(|| ApiError::NotFound("Teacher not found".to_string()))?;

    if let Some(profile) = teachers::load_by_user_id(&state.db, user_id).await? {
        subjects::delete_subjects_by_teacher(&state.db, profile.id).await?;
        subjects::delete_classes_by_teacher(&state.db, profile.id).await?;
        courses::detach_teacher(&state.db, profile.id).await?;
        grades::delete_by_teacher(&state.db, profile.id).await?;
        announcements::delete_by_teacher(&state.db, profile.id).await?;
        attendance::delete_by_teacher(&state.db, profile.id).await?;
        tests_db::delete_tests_by_teacher(&state.db, profile.id).await?;
    }
    teachers::delete_by_user_id(&state.db, user_id).await?;
    users::delete_user(&state.db, user_id).await?;

    info!("Teacher {} deleted", user_id);
    Ok(envelope("Teacher deleted", json!(null)))
}

/// GET /api/admin/events
pub async fn list_events(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    let items: Vec<Value> = events::list_all(&state.db)
        .await?
        .iter()
        .map(event_json)
        .collect();
    Ok(envelope("Events fetched", json!({ "items": items })))
}

#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub title: String,
    pub description: Option<String>,
    pub event_at: DateTime<Utc>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// POST /api/admin/events
///
/// Students are notified best effort when an enabled event is created.
pub async fn create_event(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<EventRequest>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    if payload.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Event title is required".to_string()));
    }

    let id = events::insert_event(
        &state.db,
        payload.title.trim(),
        payload.description.as_deref(),
        payload.event_at,
        payload.enabled,
    )
    .await?;

    if payload.enabled {
        for (name, email) in users::contacts_by_role(&state.db, Role::Student).await? {
            state
                .mailer
                .send_best_effort(
                    &email,
                    &format!("Upcoming event: {}", payload.title.trim()),
                    &format!(
                        "Hello {}, a new event \"{}\" is scheduled for {}.",
                        name,
                        payload.title.trim(),
                        payload.event_at.to_rfc3339()
                    ),
                )
                .await;
        }
    }

    Ok((
        StatusCode::CREATED,
        envelope("Event created", json!({ "id": id })),
    ))
}

/// PUT /api/admin/events/:id
pub async fn update_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    auth: AuthUser,
    Json(payload): Json<EventRequest>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    events::load_by_id(&state.db, event_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Event not found".to_string()))?;
    if payload.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Event title is required".to_string()));
    }

    events::update_event(
        &state.db,
        event_id,
        payload.title.trim(),
        payload.description.as_deref(),
        payload.event_at,
        payload.enabled,
    )
    .await?;
    Ok(envelope("Event updated", json!(null)))
}

/// DELETE /api/admin/events/:id
pub async fn delete_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    if !events::delete_event(&state.db, event_id).await? {
        return Err(ApiError::NotFound("Event not found".to_string()));
    }
    Ok(envelope("Event deleted", json!(null)))
}

#[derive(Debug, Deserialize)]
pub struct AssignSubjectRequest {
    pub teacher_id: Uuid,
    pub subject: String,
}

/// POST /api/admin/assign-subject
pub async fn assign_subject(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<AssignSubjectRequest>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    if payload.subject.trim().is_empty() {
        return Err(ApiError::BadRequest("Subject is required".to_string()));
    }
    teachers::load_by_id(&state.db, payload.teacher_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Teacher not found".to_string()))?;
    if subjects::subject_assigned(&state.db, payload.teacher_id, payload.subject.trim()).await? {
        return Err(ApiError::Conflict(
            "Subject is already assigned to this teacher".to_string(),
        ));
    }

    let assignment =
        subjects::assign_subject(&state.db, payload.teacher_id, payload.subject.trim()).await?;
    Ok((
        StatusCode::CREATED,
        envelope(
            "Subject assigned",
            json!({ "id": assignment.id, "teacher_id": assignment.teacher_id, "subject": assignment.subject }),
        ),
    ))
}

#[derive(Debug, Deserialize)]
pub struct AssignClassRequest {
    pub teacher_id: Uuid,
    pub class_name: String,
}

/// POST /api/admin/assign-class
pub async fn assign_class(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<AssignClassRequest>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    if payload.class_name.trim().is_empty() {
        return Err(ApiError::BadRequest("Class name is required".to_string()));
    }
    teachers::load_by_id(&state.db, payload.teacher_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Teacher not found".to_string()))?;
    if subjects::class_assigned(&state.db, payload.teacher_id, payload.class_name.trim()).await? {
        return Err(ApiError::Conflict(
            "Class is already assigned to this teacher".to_string(),
        ));
    }

    let assignment =
        subjects::assign_class(&state.db, payload.teacher_id, payload.class_name.trim()).await?;
    Ok((
        StatusCode::CREATED,
        envelope(
            "Class assigned",
            json!({ "id": assignment.id, "teacher_id": assignment.teacher_id, "class_name": assignment.class_name }),
        ),
    ))
}

/// GET /api/admin/teachers/:id/assignments
pub async fn teacher_assignments(
    State(state): State<AppState>,
    Path(teacher_id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    teachers::load_by_id(&state.db, teacher_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Teacher not found".to_string()))?;

    let subject_items: Vec<Value> = subjects::list_subjects(&state.db, teacher_id)
        .await?
        .iter()
        .map(|s| json!({ "id": s.id, "subject": s.subject }))
        .collect();
    let class_items: Vec<Value> = subjects::list_classes(&state.db, teacher_id)
        .await?
        .iter()
        .map(|c| json!({ "id": c.id, "class_name": c.class_name }))
        .collect();

    Ok(envelope(
        "Assignments fetched",
        json!({ "subjects": subject_items, "classes": class_items }),
    ))
}

/// DELETE /api/admin/subjects/:id
pub async fn delete_subject(
    State(state): State<AppState>,
    Path(assignment_id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    if !subjects::delete_subject(&state.db, assignment_id).await? {
        return Err(ApiError::NotFound("Assignment not found".to_string()));
    }
    Ok(envelope("Subject assignment removed", json!(null)))
}

/// DELETE /api/admin/classes/:id
pub async fn delete_class(
    State(state): State<AppState>,
    Path(assignment_id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    if !subjects::delete_class(&state.db, assignment_id).await? {
        return Err(ApiError::NotFound("Assignment not found".to_string()));
    }
    Ok(envelope("Class assignment removed", json!(null)))
}

#[derive(Debug, Deserialize)]
pub struct PaymentReportQuery {
    pub search: Option<String>,
    pub category: Option<String>,
}

fn payment_report_json(row: &payments_db::PaymentReportRow) -> Value {
    let mut body = payment_json(&row.payment);
    body["student_name"] = json!(row.student_name);
    body["student_email"] = json!(row.student_email);
    body["course_title"] = json!(row.course_title);
    body["course_category"] = json!(row.course_category);
    body
}

/// GET /api/admin/payments
pub async fn payment_report(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<PaymentReportQuery>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    let rows = payments_db::report(
        &state.db,
        query.search.as_deref().filter(|s| !s.trim().is_empty()),
        query.category.as_deref().filter(|s| !s.trim().is_empty()),
    )
    .await?;

    let total: f64 = rows.iter().map(|r| r.payment.amount).sum();
    let items: Vec<Value> = rows.iter().map(payment_report_json).collect();
    let categories = courses::distinct_categories(&state.db).await?;
    Ok(envelope(
        "Payments fetched",
        json!({ "items": items, "total_amount": total, "categories": categories }),
    ))
}

/// GET /api/admin/payments/course/:id
pub async fn payments_by_course(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    courses::load_by_id(&state.db, course_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))?;

    let rows = payments_db::report_by_course(&state.db, course_id).await?;
    let total: f64 = rows.iter().map(|r| r.payment.amount).sum();
    let items: Vec<Value> = rows.iter().map(payment_report_json).collect();
    Ok(envelope(
        "Course payments fetched",
        json!({ "items": items, "total_amount": total }),
    ))
}

/// GET /api/admin/student-help
pub async fn help_queue(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    let rows = help::list_all(&state.db).await?;
    let (pending, resolved) = help::status_counts(&state.db).await?;

    let items: Vec<Value> = rows
        .iter()
        .map(|row| {
            json!({
                "id": row.request.id,
                "student_id": row.request.student_id,
                "student_name": row.student_name,
                "student_email": row.student_email,
                "issue": row.request.issue,
                "status": row.request.status,
                "reply": row.request.reply,
                "replied_at": row.request.replied_at,
                "resolved_at": row.request.resolved_at,
                "created_at": row.request.created_at,
            })
        })
        .collect();

    Ok(envelope(
        "Help requests fetched",
        json!({ "items": items, "pending": pending, "resolved": resolved }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct HelpStatusRequest {
    pub status: HelpStatus,
}

/// PUT /api/admin/student-help/:id/status
pub async fn set_help_status(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    auth: AuthUser,
    Json(payload): Json<HelpStatusRequest>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    help::load_by_id(&state.db, request_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Help request not found".to_string()))?;
    help::set_status(&state.db, request_id, payload.status).await?;
    Ok(envelope("Status updated", json!(null)))
}

#[derive(Debug, Deserialize)]
pub struct HelpReplyRequest {
    pub reply: String,
}

/// POST /api/admin/student-help/:id/reply
pub async fn reply_to_help(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    auth: AuthUser,
    Json(payload): Json<HelpReplyRequest>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    if payload.reply.trim().is_empty() {
        return Err(ApiError::BadRequest("Reply is required".to_string()));
    }
    let request = help::load_by_id(&state.db, request_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Help request not found".to_string()))?;
    if request.reply.is_some() {
        return Err(ApiError::BadRequest(
            "This request has already been replied to".to_string(),
        ));
    }

    help::set_reply(&state.db, request_id, payload.reply.trim()).await?;

    if let Some(student) = users::load_by_id(&state.db, request.student_id).await? {
        state
            .mailer
            .send_best_effort(
                &student.email,
                "Reply to your help request",
                &format!("Hello {},\n\n{}", student.name, payload.reply.trim()),
            )
            .await;
    }

    Ok(envelope("Reply sent", json!(null)))
}

#[derive(Debug, Deserialize)]
pub struct TestReportQuery {
    pub search: Option<String>,
    #[serde(rename = "testId")]
    pub test_id: Option<Uuid>,
}

/// GET /api/admin/test-reports
pub async fn test_reports(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<TestReportQuery>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    let rows = tests_db::submissions_report(
        &state.db,
        query.search.as_deref().filter(|s| !s.trim().is_empty()),
        query.test_id,
    )
    .await?;

    let items: Vec<Value> = rows
        .iter()
        .map(|row| {
            json!({
                "test_id": row.submission.test_id,
                "test_title": row.test_title,
                "test_subject": row.test_subject,
                "student_id": row.submission.student_id,
                "student_name": row.student_name,
                "student_email": row.student_email,
                "score": row.submission.score,
                "total_correct": row.submission.total_correct,
                "max_marks": row.max_marks,
                "submitted_at": row.submission.submitted_at,
            })
        })
        .collect();

    Ok(envelope("Test reports fetched", json!({ "items": items })))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/students", get(list_students))
        .route("/api/admin/students/:id", delete(delete_student))
        .route(
            "/api/admin/teachers",
            get(list_teachers).post(create_teacher),
        )
        .route("/api/admin/teachers/:id", delete(delete_teacher))
        .route(
            "/api/admin/teachers/:id/assignments",
            get(teacher_assignments),
        )
        .route("/api/admin/stats", get(stats))
        .route("/api/admin/reports/analytics", get(analytics))
        .route("/api/admin/recent-admissions", get(recent_admissions))
        .route("/api/admin/pending-admissions", get(pending_admissions))
        .route("/api/admin/approve-admission/:id", post(approve_admission))
        .route("/api/admin/top-performers", get(top_performers))
        .route("/api/admin/events", get(list_events).post(create_event))
        .route(
            "/api/admin/events/:id",
            put(update_event).delete(delete_event),
        )
        .route("/api/admin/assign-subject", post(assign_subject))
        .route("/api/admin/assign-class", post(assign_class))
        .route("/api/admin/subjects/:id", delete(delete_subject))
        .route("/api/admin/classes/:id", delete(delete_class))
        .route("/api/admin/payments", get(payment_report))
        .route("/api/admin/payments/course/:id", get(payments_by_course))
        .route("/api/admin/student-help", get(help_queue))
        .route("/api/admin/student-help/:id/status", put(set_help_status))
        .route("/api/admin/student-help/:id/reply", post(reply_to_help))
        .route("/api/admin/test-reports", get(test_reports))
}
