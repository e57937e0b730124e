//! Course catalog endpoints

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use lms_common::models::{format_duration_minutes, Role};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use super::extract::AuthUser;
use super::envelope;
use crate::db::courses::Course;
use crate::db::{
    announcements, attendance, contents, courses, enrollments, grades, payments, progress,
    teachers, users,
};
use crate::services::progress as progress_service;
use crate::{ApiError, ApiResult, AppState};

/// Course projection with lesson stats and teacher name
pub(crate) async fn course_json(pool: &SqlitePool, course: &Course) -> ApiResult<Value> {
    let (lessons, minutes) = contents::course_stats(pool, course.id).await?;

    let teacher_name = match course.teacher_id {
        Some(teacher_id) => match teachers::load_by_id(pool, teacher_id).await? {
            Some(profile) => users::load_by_id(pool, profile.user_id)
                .await?
                .map(|u| u.name),
            None => None,
        },
        None => None,
    };

    Ok(json!({
        "id": course.id,
        "title": course.title,
        "description": course.description,
        "category": course.category,
        "price": course.price,
        "thumbnail": course.thumbnail,
        "teacher_id": course.teacher_id,
        "teacher_name": teacher_name,
        "lesson_count": lessons,
        "total_minutes": minutes,
        "duration": format_duration_minutes(minutes),
        "created_at": course.created_at,
    }))
}

pub(crate) fn content_view_json(view: &progress_service::ContentView) -> Value {
    json!({
        "id": view.content.id,
        "course_id": view.content.course_id,
        "title": view.content.title,
        "video_url": view.content.video_url,
        "duration_minutes": view.content.duration_minutes,
        "order_index": view.content.order_index,
        "is_unlocked": view.is_unlocked,
        "is_watched": view.is_watched,
    })
}

#[derive(Debug, Deserialize)]
pub struct CreateCourseRequest {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: f64,
    pub thumbnail: Option<String>,
    pub teacher_id: Option<Uuid>,
}

/// POST /api/courses/create
pub async fn create_course(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateCourseRequest>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    if payload.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Course title is required".to_string()));
    }
    if payload.price < 0.0 {
        return Err(ApiError::BadRequest("Price cannot be negative".to_string()));
    }
    if let Some(teacher_id) = payload.teacher_id {
        teachers::load_by_id(&state.db, teacher_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Teacher not found".to_string()))?;
    }

    let course = Course::new(
        payload.title.trim().to_string(),
        payload.description,
        payload.category,
        payload.price,
        payload.thumbnail,
        payload.teacher_id,
    );
    courses::insert_course(&state.db, &course).await?;

    info!("Course {} created", course.id);
    let body = course_json(&state.db, &course).await?;
    Ok((StatusCode::CREATED, envelope("Course created", body)))
}

#[derive(Debug, Deserialize)]
pub struct CatalogQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "sortField")]
    pub sort_field: Option<String>,
    #[serde(rename = "sortDirection")]
    pub sort_direction: Option<String>,
}

/// GET /api/courses/all
pub async fn list_courses(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> ApiResult<impl IntoResponse> {
    let sort_desc = matches!(query.sort_direction.as_deref(), Some("desc") | Some("DESC"));
    let matches = courses::search(
        &state.db,
        query.search.as_deref().filter(|s| !s.trim().is_empty()),
        query.category.as_deref().filter(|s| !s.trim().is_empty()),
        query.sort_field.as_deref(),
        sort_desc,
    )
    .await?;
    let total = courses::count_courses(&state.db).await?;

    let mut items = Vec::with_capacity(matches.len());
    for course in &matches {
        items.push(course_json(&state.db, course).await?);
    }

    Ok(envelope(
        "Courses fetched",
        json!({
            "items": items,
            "total": total,
            "matched": matches.len(),
        }),
    ))
}

/// GET /api/courses/:id
pub async fn get_course(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let course = courses::load_by_id(&state.db, course_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))?;

    let body = course_json(&state.db, &course).await?;
    Ok(envelope("Course fetched", body))
}

#[derive(Debug, Deserialize)]
pub struct AddContentRequest {
    pub title: String,
    pub video_url: Option<String>,
    pub duration_minutes: Option<i64>,
    pub order_index: Option<i64>,
}

/// POST /api/courses/:id/contents
pub async fn add_content(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
    auth: AuthUser,
    Json(payload): Json<AddContentRequest>,
) -> ApiResult<impl IntoResponse> {
    if auth.role == Role::Student {
        return Err(ApiError::Forbidden(
            "You do not have permission for this action".to_string(),
        ));
    }

    courses::load_by_id(&state.db, course_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))?;
    if payload.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Content title is required".to_string()));
    }

    let content = contents::insert_content(
        &state.db,
        course_id,
        payload.title.trim(),
        payload.video_url.as_deref(),
        payload.duration_minutes.unwrap_or(0),
        payload.order_index,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        envelope(
            "Content added",
            json!({
                "id": content.id,
                "course_id": content.course_id,
                "title": content.title,
                "video_url": content.video_url,
                "duration_minutes": content.duration_minutes,
                "order_index": content.order_index,
            }),
        ),
    ))
}

/// GET /api/courses/:id/contents
///
/// Paid students get per-lesson lock and watch flags; anonymous
/// callers and students without a paid enrollment get a locked preview
/// with the video URLs stripped; staff get the raw sequence.
pub async fn list_contents(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
    viewer: Option<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    courses::load_by_id(&state.db, course_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))?;

    let views = match viewer {
        Some(auth) if auth.role == Role::Student => {
            let paid = enrollments::load(&state.db, auth.user_id, course_id)
                .await?
                .map(|e| e.paid)
                .unwrap_or(false);
            if paid {
                progress_service::listing_for_student(&state.db, auth.user_id, course_id).await?
            } else {
                progress_service::preview(contents::list_by_course(&state.db, course_id).await?)
            }
        }
        Some(_) => {
            let sequence = contents::list_by_course(&state.db, course_id).await?;
            sequence
                .into_iter()
                .map(|content| progress_service::ContentView {
                    content,
                    is_unlocked: true,
                    is_watched: false,
                })
                .collect()
        }
        None => progress_service::preview(contents::list_by_course(&state.db, course_id).await?),
    };

    let items: Vec<Value> = views.iter().map(content_view_json).collect();
    Ok(envelope("Contents fetched", json!({ "items": items })))
}

/// DELETE /api/courses/:id
///
/// Deletes progress, contents and enrollments outright; detaches
/// payments, attendance, grades and announcements so the money trail
/// and records survive.
pub async fn delete_course(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require(Role::Admin)?;

    courses::load_by_id(&state.db, course_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))?;

    progress::delete_by_course(&state.db, course_id).await?;
    contents::delete_by_course(&state.db, course_id).await?;
    enrollments::delete_by_course(&state.db, course_id).await?;
    payments::detach_course(&state.db, course_id).await?;
    attendance::detach_course(&state.db, course_id).await?;
    grades::detach_course(&state.db, course_id).await?;
    announcements::detach_course(&state.db, course_id).await?;
    courses::delete_course(&state.db, course_id).await?;

    info!("Course {} deleted", course_id);
    Ok(envelope("Course deleted", json!(null)))
}

pub fn course_routes() -> Router<AppState> {
    Router::new()
        .route("/api/courses/create", post(create_course))
        .route("/api/courses/all", get(list_courses))
        .route("/api/courses/:id", get(get_course).delete(delete_course))
        .route(
            "/api/courses/:id/contents",
            get(list_contents).post(add_content),
        )
}
