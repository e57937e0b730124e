//! Teacher-facing endpoints

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use lms_common::models::{AttendanceStatus, Role};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::extract::AuthUser;
use super::{announcement_json, envelope, event_json, user_json};
use crate::db::teachers::TeacherProfile;
use crate::db::{
    announcements, attendance, courses, enrollments, events, grades, students, subjects,
    teachers, tests as tests_db, users,
};
use crate::services::grading::{self, QuestionInput};
use crate::{ApiError, ApiResult, AppState};

/// Resolve the teacher profile behind an authenticated user
async fn teacher_profile(state: &AppState, auth: &AuthUser) -> ApiResult<TeacherProfile> {
    auth.require(Role::Teacher)?;
    teachers::load_by_user_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Teacher profile not found".to_string()))
}

/// GET /api/teacher/dashboard
pub async fn dashboard(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    let profile = teacher_profile(&state, &auth).await?;

    let total_students = users::count_by_role(&state.db, Role::Student).await?;
    let my_courses = courses::list_by_teacher(&state.db, profile.id).await?.len() as i64;
    let pending_grading = grades::pending_grading_count(&state.db, profile.id).await?;
    let announcement_count = announcements::count_by_teacher(&state.db, profile.id).await?;
    let attendance_pct = attendance::percentage_by_teacher(&state.db, profile.id).await?;

    Ok(envelope(
        "Dashboard fetched",
        json!({
            "total_students": total_students,
            "active_courses": my_courses,
            "pending_grading": pending_grading,
            "announcements": announcement_count,
            "attendance_percentage": (attendance_pct * 10.0).round() / 10.0,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct StudentListQuery {
    pub search: Option<String>,
    #[serde(rename = "sortField")]
    pub sort_field: Option<String>,
    #[serde(rename = "sortDirection")]
    pub sort_direction: Option<String>,
}

/// GET /api/teacher/students
pub async fn list_students(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<StudentListQuery>,
) -> ApiResult<impl IntoResponse> {
    teacher_profile(&state, &auth).await?;

    let sort_desc = matches!(query.sort_direction.as_deref(), Some("desc") | Some("DESC"));
    let items: Vec<Value> = users::list_by_role(
        &state.db,
        Role::Student,
        query.search.as_deref().filter(|s| !s.trim().is_empty()),
        query.sort_field.as_deref(),
        sort_desc,
    )
    .await?
    .iter()
    .map(user_json)
    .collect();

    Ok(envelope("Students fetched", json!({ "items": items })))
}

/// GET /api/teacher/recent-students
pub async fn recent_students(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    teacher_profile(&state, &auth).await?;

    let items: Vec<Value> = users::recent_by_role(&state.db, Role::Student, 5)
        .await?
        .iter()
        .map(user_json)
        .collect();
    Ok(envelope("Recent students fetched", json!({ "items": items })))
}

/// GET /api/teacher/students/:id/profile
pub async fn student_profile(
    State(state): State<AppState>,
    Path(student_id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    teacher_profile(&state, &auth).await?;

    let user = users::load_by_id(&state.db, student_id)
        .await?
        .filter(|u| u.role == Role::Student)
        .ok_or_else(|| ApiError::NotFound("Student not found".to_string()))?;
    let profile = students::load_by_user_id(&state.db, student_id).await?;
    let (present, total) = attendance::summary_by_student(&state.db, student_id).await?;
    let grade_rows = grades::list_by_student(&state.db, student_id).await?;
    let enrolled = enrollments::list_paid_by_student(&state.db, student_id)
        .await?
        .len() as i64;

    let mut body = user_json(&user);
    body["contact"] = json!(profile.as_ref().and_then(|p| p.contact.clone()));
    body["address"] = json!(profile.as_ref().and_then(|p| p.address.clone()));
    body["attendance"] = json!({ "present": present, "total": total });
    body["enrolled_courses"] = json!(enrolled);
    body["grades"] = json!(grade_rows
        .iter()
        .map(|g| json!({ "grade": g.grade, "remarks": g.remarks, "created_at": g.created_at }))
        .collect::<Vec<Value>>());

    Ok(envelope("Student profile fetched", body))
}

#[derive(Debug, Deserialize)]
pub struct AttendanceEntry {
    pub student_id: Uuid,
    pub status: AttendanceStatus,
}

#[derive(Debug, Deserialize)]
pub struct MarkAttendanceRequest {
    /// Calendar day, "YYYY-MM-DD"
    pub date: String,
    pub course_id: Option<Uuid>,
    pub entries: Vec<AttendanceEntry>,
}

/// POST /api/teacher/attendance/mark
///
/// Absence notifications go out best effort; a mail failure never
/// fails the marking.
pub async fn mark_attendance(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<MarkAttendanceRequest>,
) -> ApiResult<impl IntoResponse> {
    let profile = teacher_profile(&state, &auth).await?;

    if payload.date.trim().is_empty() {
        return Err(ApiError::BadRequest("Date is required".to_string()));
    }
    if payload.entries.is_empty() {
        return Err(ApiError::BadRequest("No attendance entries given".to_string()));
    }

    let mut marked = 0;
    for entry in &payload.entries {
        let Some(student) = users::load_by_id(&state.db, entry.student_id)
            .await?
            .filter(|u| u.role == Role::Student)
        else {
            continue;
        };
        attendance::insert_record(
            &state.db,
            entry.student_id,
            Some(profile.id),
            payload.course_id,
            payload.date.trim(),
            entry.status,
        )
        .await?;
        marked += 1;

        if entry.status == AttendanceStatus::Absent {
            state
                .mailer
                .send_best_effort(
                    &student.email,
                    "Absence recorded",
                    &format!(
                        "Hello {}, you were marked absent on {}.",
                        student.name, payload.date
                    ),
                )
                .await;
        }
    }

    Ok(envelope("Attendance marked", json!({ "marked": marked })))
}

/// GET /api/teacher/courses
pub async fn my_courses(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    let profile = teacher_profile(&state, &auth).await?;

    let list = courses::list_by_teacher(&state.db, profile.id).await?;
    let mut items = Vec::with_capacity(list.len());
    for course in &list {
        let mut body = super::courses::course_json(&state.db, course).await?;
        let enrolled = enrollments::list_by_course(&state.db, course.id)
            .await?
            .iter()
            .filter(|e| e.paid)
            .count();
        body["enrolled_students"] = json!(enrolled);
        items.push(body);
    }
    Ok(envelope("Courses fetched", json!({ "items": items })))
}

/// GET /api/teacher/announcements
pub async fn list_announcements(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    let profile = teacher_profile(&state, &auth).await?;

    let items: Vec<Value> = announcements::list_by_teacher(&state.db, profile.id)
        .await?
        .iter()
        .map(announcement_json)
        .collect();
    Ok(envelope("Announcements fetched", json!({ "items": items })))
}

#[derive(Debug, Deserialize)]
pub struct CreateAnnouncementRequest {
    pub title: String,
    pub message: String,
    pub course_id: Option<Uuid>,
}

/// POST /api/teacher/announcements
///
/// Course announcements notify that course's paid students; general
/// ones notify every student. Mail is best effort.
pub async fn create_announcement(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateAnnouncementRequest>,
) -> ApiResult<impl IntoResponse> {
    let profile = teacher_profile(&state, &auth).await?;

    if payload.title.trim().is_empty() || payload.message.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Title and message are required".to_string(),
        ));
    }
    if let Some(course_id) = payload.course_id {
        courses::load_by_id(&state.db, course_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))?;
    }

    let id = announcements::insert_announcement(
        &state.db,
        Some(profile.id),
        payload.course_id,
        payload.title.trim(),
        payload.message.trim(),
    )
    .await?;

    let recipients: Vec<(String, String)> = match payload.course_id {
        Some(course_id) => {
            let mut out = Vec::new();
            for enrollment in enrollments::list_by_course(&state.db, course_id).await? {
                if !enrollment.paid {
                    continue;
                }
                if let Some(user) = users::load_by_id(&state.db, enrollment.student_id).await? {
                    out.push((user.name, user.email));
                }
            }
            out
        }
        None => users::contacts_by_role(&state.db, Role::Student).await?,
    };
    for (name, email) in recipients {
        state
            .mailer
            .send_best_effort(
                &email,
                &format!("Announcement: {}", payload.title.trim()),
                &format!("Hello {},\n\n{}", name, payload.message.trim()),
            )
            .await;
    }

    Ok((
        StatusCode::CREATED,
        envelope("Announcement published", json!({ "id": id })),
    ))
}

/// DELETE /api/teacher/announcements/:id
pub async fn delete_announcement(
    State(state): State<AppState>,
    Path(announcement_id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    let profile = teacher_profile(&state, &auth).await?;

    let announcement = announcements::load_by_id(&state.db, announcement_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Announcement not found".to_string()))?;
    if announcement.teacher_id != Some(profile.id) {
        return Err(ApiError::Forbidden(
            "You can only delete your own announcements".to_string(),
        ));
    }

    announcements::delete_announcement(&state.db, announcement_id).await?;
    Ok(envelope("Announcement deleted", json!(null)))
}

#[derive(Debug, Deserialize)]
pub struct AssignGradeRequest {
    pub student_id: Uuid,
    pub course_id: Option<Uuid>,
    pub grade: String,
    pub remarks: Option<String>,
}

/// POST /api/teacher/grading/assign
pub async fn assign_grade(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<AssignGradeRequest>,
) -> ApiResult<impl IntoResponse> {
    let profile = teacher_profile(&state, &auth).await?;

    if payload.grade.trim().is_empty() {
        return Err(ApiError::BadRequest("Grade is required".to_string()));
    }
    users::load_by_id(&state.db, payload.student_id)
        .await?
        .filter(|u| u.role == Role::Student)
        .ok_or_else(|| ApiError::NotFound("Student not found".to_string()))?;
    if let Some(course_id) = payload.course_id {
        courses::load_by_id(&state.db, course_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))?;
    }

    let id = grades::insert_grade(
        &state.db,
        payload.student_id,
        Some(profile.id),
        payload.course_id,
        payload.grade.trim(),
        payload.remarks.as_deref(),
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        envelope("Grade assigned", json!({ "id": id })),
    ))
}

/// GET /api/teacher/my-subjects
pub async fn my_subjects(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    let profile = teacher_profile(&state, &auth).await?;

    let subject_items: Vec<Value> = subjects::list_subjects(&state.db, profile.id)
        .await?
        .iter()
        .map(|s| json!({ "id": s.id, "subject": s.subject }))
        .collect();
    let class_items: Vec<Value> = subjects::list_classes(&state.db, profile.id)
        .await?
        .iter()
        .map(|c| json!({ "id": c.id, "class_name": c.class_name }))
        .collect();

    Ok(envelope(
        "Assignments fetched",
        json!({ "subjects": subject_items, "classes": class_items }),
    ))
}

/// GET /api/teacher/events
pub async fn list_events(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    teacher_profile(&state, &auth).await?;

    let items: Vec<Value> = events::list_upcoming(&state.db)
        .await?
        .iter()
        .map(event_json)
        .collect();
    Ok(envelope("Upcoming events fetched", json!({ "items": items })))
}

/// GET /api/teacher/profile
pub async fn get_profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    let profile = teacher_profile(&state, &auth).await?;

    let user = users::load_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let mut body = user_json(&user);
    body["teacher_id"] = json!(profile.id);
    body["contact"] = json!(profile.contact);
    body["address"] = json!(profile.address);
    body["qualification"] = json!(profile.qualification);
    Ok(envelope("Profile fetched", body))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTeacherProfileRequest {
    pub name: String,
    pub phone: Option<String>,
    pub contact: Option<String>,
    pub address: Option<String>,
    pub qualification: Option<String>,
}

/// POST /api/teacher/profile
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<UpdateTeacherProfileRequest>,
) -> ApiResult<impl IntoResponse> {
    teacher_profile(&state, &auth).await?;

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
    teachers::update_profile(
        &state.db,
        auth.user_id,
        payload.contact.as_deref(),
        payload.address.as_deref(),
        payload.qualification.as_deref(),
    )
    .await?;

    Ok(envelope("Profile updated", json!(null)))
}

/// GET /api/teacher/tests
pub async fn list_tests(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    let profile = teacher_profile(&state, &auth).await?;

    let tests = tests_db::list_by_teacher(&state.db, profile.id).await?;
    let mut items = Vec::with_capacity(tests.len());
    for test in &tests {
        let submissions = tests_db::submission_count(&state.db, test.id).await?;
        items.push(json!({
            "id": test.id,
            "title": test.title,
            "subject": test.subject,
            "description": test.description,
            "max_marks": test.max_marks,
            "created_at": test.created_at,
            "submissions": submissions,
        }));
    }
    Ok(envelope("Tests fetched", json!({ "items": items })))
}

#[derive(Debug, Deserialize)]
pub struct CreateTestRequest {
    pub title: String,
    pub subject: String,
    pub description: Option<String>,
    pub max_marks: i64,
    pub questions: Vec<QuestionInput>,
}

/// POST /api/teacher/tests
pub async fn create_test(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateTestRequest>,
) -> ApiResult<impl IntoResponse> {
    let profile = teacher_profile(&state, &auth).await?;

    let id = grading::create_test(
        &state.db,
        profile.id,
        &payload.title,
        &payload.subject,
        payload.description.as_deref(),
        payload.max_marks,
        &payload.questions,
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        envelope("Test created", json!({ "id": id })),
    ))
}

/// GET /api/teacher/tests/:id/submissions
pub async fn test_submissions(
    State(state): State<AppState>,
    Path(test_id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    let profile = teacher_profile(&state, &auth).await?;

    let test = tests_db::load_test(&state.db, test_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Test not found".to_string()))?;
    if test.teacher_id != profile.id {
        return Err(ApiError::Forbidden(
            "You can only view submissions for your own tests".to_string(),
        ));
    }

    let items: Vec<Value> = tests_db::submissions_by_test(&state.db, test_id)
        .await?
        .iter()
        .map(|row| {
            json!({
                "student_id": row.submission.student_id,
                "student_name": row.student_name,
                "student_email": row.student_email,
                "score": row.submission.score,
                "total_correct": row.submission.total_correct,
                "submitted_at": row.submission.submitted_at,
            })
        })
        .collect();

    Ok(envelope(
        "Submissions fetched",
        json!({ "test_id": test_id, "max_marks": test.max_marks, "items": items }),
    ))
}

pub fn teacher_routes() -> Router<AppState> {
    Router::new()
        .route("/api/teacher/dashboard", get(dashboard))
        .route("/api/teacher/students", get(list_students))
        .route("/api/teacher/recent-students", get(recent_students))
        .route("/api/teacher/students/:id/profile", get(student_profile))
        .route("/api/teacher/attendance/mark", post(mark_attendance))
        .route("/api/teacher/courses", get(my_courses))
        .route(
            "/api/teacher/announcements",
            get(list_announcements).post(create_announcement),
        )
        .route(
            "/api/teacher/announcements/:id",
            axum::routing::delete(delete_announcement),
        )
        .route("/api/teacher/grading/assign", post(assign_grade))
        .route("/api/teacher/my-subjects", get(my_subjects))
        .route("/api/teacher/events", get(list_events))
        .route("/api/teacher/profile", get(get_profile).post(update_profile))
        .route("/api/teacher/tests", get(list_tests).post(create_test))
        .route("/api/teacher/tests/:id/submissions", get(test_submissions))
}
