//! Sequential content gating
//!
//! A lesson is unlocked when it is first in the course sequence or its
//! immediate predecessor has a completed progress row. Unlock state is
//! recomputed from progress rows on every read.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::contents::{self, CourseContent};
use crate::db::{courses, enrollments, progress};
use crate::error::{ApiError, ApiResult};

/// A lesson with its viewer-specific lock and watch state
#[derive(Debug, Clone)]
pub struct ContentView {
    pub content: CourseContent,
    pub is_unlocked: bool,
    pub is_watched: bool,
}

/// Record a completed watch, enforcing the sequence
pub async fn mark_watched(
    pool: &SqlitePool,
    student_id: Uuid,
    course_id: Uuid,
    content_id: Uuid,
) -> ApiResult<()> {
    courses::load_by_id(pool, course_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))?;

    let content = contents::load_by_id(pool, content_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Content not found".to_string()))?;
    if content.course_id != course_id {
        return Err(ApiError::BadRequest(
            "Content does not belong to this course".to_string(),
        ));
    }

    let enrollment = enrollments::load(pool, student_id, course_id).await?;
    if !enrollment.map(|e| e.paid).unwrap_or(false) {
        return Err(ApiError::Forbidden(
            "You are not enrolled in this course".to_string(),
        ));
    }

    let sequence = contents::list_by_course(pool, course_id).await?;
    let position = sequence
        .iter()
        .position(|c| c.id == content_id)
        .ok_or_else(|| ApiError::NotFound("Content not found".to_string()))?;

    if position > 0 {
        let previous = &sequence[position - 1];
        let done = progress::load(pool, student_id, previous.id)
            .await?
            .map(|p| p.completed)
            .unwrap_or(false);
        if !done {
            return Err(ApiError::Forbidden(
                "Complete the previous lesson first".to_string(),
            ));
        }
    }

    progress::upsert_completed(pool, student_id, course_id, content_id).await?;
    Ok(())
}

/// Per-lesson unlock and watch flags for a paid student
pub async fn listing_for_student(
    pool: &SqlitePool,
    student_id: Uuid,
    course_id: Uuid,
) -> ApiResult<Vec<ContentView>> {
    let sequence = contents::list_by_course(pool, course_id).await?;
    let completed = progress::completed_content_ids(pool, student_id, course_id).await?;

    let mut views = Vec::with_capacity(sequence.len());
    let mut previous_completed = true; // first lesson is always unlocked
    for content in sequence {
        let is_watched = completed.contains(&content.id);
        views.push(ContentView {
            is_unlocked: previous_completed,
            is_watched,
            content,
        });
        previous_completed = is_watched;
    }
    Ok(views)
}

/// Locked preview for viewers without a paid enrollment: every lesson
/// locked, unwatched, video URLs stripped
pub fn preview(sequence: Vec<CourseContent>) -> Vec<ContentView> {
    sequence
        .into_iter()
        .map(|mut content| {
            content.video_url = None;
            ContentView {
                content,
                is_unlocked: false,
                is_watched: false,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::courses::{insert_course, Course};
    use crate::db::users::{insert_user, User};
    use lms_common::models::Role;

    async fn setup() -> (SqlitePool, Uuid, Uuid, Vec<CourseContent>) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        lms_common::db::init::create_all_tables(&pool).await.unwrap();

        let student = User::new("S".to_string(), "s@example.com".to_string(), Role::Student);
        insert_user(&pool, &student).await.unwrap();
        let course = Course::new("C".to_string(), None, None, 100.0, None, None);
        insert_course(&pool, &course).await.unwrap();

        let mut lessons = Vec::new();
        for title in ["One", "Two", "Three"] {
            lessons.push(
                contents::insert_content(&pool, course.id, title, Some("https://v/x"), 10, None)
                    .await
                    .unwrap(),
            );
        }
        (pool, student.id, course.id, lessons)
    }

    #[tokio::test]
    async fn unpaid_student_cannot_mark() {
        let (pool, student, course, lessons) = setup().await;

        let result = mark_watched(&pool, student, course, lessons[0].id).await;
        assert!(matches!(result, Err(ApiError::Forbidden(_))));
    }

    #[tokio::test]
    async fn sequence_gates_later_lessons() {
        let (pool, student, course, lessons) = setup().await;
        enrollments::upsert_paid(&pool, student, course).await.unwrap();

        // Lesson two before lesson one
        let result = mark_watched(&pool, student, course, lessons[1].id).await;
        assert!(matches!(result, Err(ApiError::Forbidden(_))));

        mark_watched(&pool, student, course, lessons[0].id).await.unwrap();
        mark_watched(&pool, student, course, lessons[1].id).await.unwrap();
    }

    #[tokio::test]
    async fn listing_unlocks_follow_completion() {
        let (pool, student, course, lessons) = setup().await;
        enrollments::upsert_paid(&pool, student, course).await.unwrap();

        let before = listing_for_student(&pool, student, course).await.unwrap();
        assert!(before[0].is_unlocked && !before[0].is_watched);
        assert!(!before[1].is_unlocked);
        assert!(!before[2].is_unlocked);

        mark_watched(&pool, student, course, lessons[0].id).await.unwrap();

        let after = listing_for_student(&pool, student, course).await.unwrap();
        assert!(after[0].is_watched);
        assert!(after[1].is_unlocked && !after[1].is_watched);
        assert!(!after[2].is_unlocked);
    }

    #[tokio::test]
    async fn foreign_content_rejected() {
        let (pool, student, course, _) = setup().await;
        enrollments::upsert_paid(&pool, student, course).await.unwrap();

        let other = Course::new("Other".to_string(), None, None, 0.0, None, None);
        insert_course(&pool, &other).await.unwrap();
        let stray = contents::insert_content(&pool, other.id, "X", None, 5, None)
            .await
            .unwrap();

        let result = mark_watched(&pool, student, course, stray.id).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn preview_strips_video_urls() {
        let (pool, _, course, _) = setup().await;

        let sequence = contents::list_by_course(&pool, course).await.unwrap();
        let views = preview(sequence);
        assert!(views.iter().all(|v| !v.is_unlocked && !v.is_watched));
        assert!(views.iter().all(|v| v.content.video_url.is_none()));
    }
}
