//! Account maintenance: profile edits and photo upload

use axum::extract::{Multipart, Path, State};
use axum::response::IntoResponse;
use axum::routing::{delete, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use super::extract::AuthUser;
use super::{envelope, user_json};
use crate::db::users;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

/// PUT /api/users/:id
pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    auth: AuthUser,
    Json(payload): Json<UpdateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    auth.require_self_or_admin(user_id)?;

    let user = users::load_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let email = payload.email.trim().to_lowercase();
    if payload.name.trim().is_empty() || !email.contains('@') {
        return Err(ApiError::BadRequest(
            "Name and a valid email are required".to_string(),
        ));
    }
    if email != user.email {
        if users::load_by_email(&state.db, &email).await?.is_some() {
            return Err(ApiError::Conflict("Email is already in use".to_string()));
        }
    }

    users::update_user(
        &state.db,
        user_id,
        payload.name.trim(),
        payload.phone.as_deref(),
        &email,
    )
    .await?;

    let updated = users::load_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(envelope("User updated", user_json(&updated)))
}

/// File extension for an accepted image content type
fn photo_extension(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// POST /api/users/:id/upload-photo
///
/// Accepts a single JPEG, PNG or WebP part; the previous photo file is
/// removed best effort.
pub async fn upload_photo(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    auth.require_self_or_admin(user_id)?;

    let user = users::load_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let field = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {}", e)))?
        .ok_or_else(|| ApiError::BadRequest("No file in upload".to_string()))?;

    let content_type = field
        .content_type()
        .map(|ct| ct.to_string())
        .ok_or_else(|| ApiError::BadRequest("Upload is missing a content type".to_string()))?;
    let extension = photo_extension(&content_type).ok_or_else(|| {
        ApiError::BadRequest("Only JPEG, PNG and WebP images are accepted".to_string())
    })?;

    let data = field
        .bytes()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {}", e)))?;
    if data.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
    }
    if data.len() > state.config.max_upload_bytes {
        return Err(ApiError::BadRequest(format!(
            "File exceeds the {} byte upload limit",
            state.config.max_upload_bytes
        )));
    }

    let filename = format!("{}_{}.{}", user_id, Uuid::new_v4().simple(), extension);
    let path = state.config.upload_dir.join(&filename);
    tokio::fs::write(&path, &data).await?;

    if let Some(old) = photo_file(&user.profile_photo) {
        let old_path = state.config.upload_dir.join(old);
        if let Err(e) = tokio::fs::remove_file(&old_path).await {
            warn!("Could not remove old photo {}: {}", old_path.display(), e);
        }
    }

    let url = format!("/uploads/{}", filename);
    users::set_photo(&state.db, user_id, Some(&url)).await?;

    Ok(envelope("Photo uploaded", json!({ "profile_photo": url })))
}

/// DELETE /api/users/:id/remove-photo
pub async fn remove_photo(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    auth.require_self_or_admin(user_id)?;

    let user = users::load_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    if let Some(old) = photo_file(&user.profile_photo) {
        let old_path = state.config.upload_dir.join(old);
        if let Err(e) = tokio::fs::remove_file(&old_path).await {
            warn!("Could not remove photo {}: {}", old_path.display(), e);
        }
    }
    users::set_photo(&state.db, user_id, None).await?;

    Ok(envelope("Photo removed", json!(null)))
}

/// Strip the URL prefix off a stored photo path
fn photo_file(photo: &Option<String>) -> Option<&str> {
    photo.as_deref().and_then(|p| p.strip_prefix("/uploads/"))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users/:id", put(update_user))
        .route("/api/users/:id/upload-photo", post(upload_photo))
        .route("/api/users/:id/remove-photo", delete(remove_photo))
}
