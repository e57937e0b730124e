//! Online test validation, auto-grading and grade averaging

use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::tests as tests_db;
use crate::db::{subjects, teachers};
use crate::error::{ApiError, ApiResult};

/// Marks range a test must fall inside
pub const MIN_MARKS: i64 = 30;
pub const MAX_MARKS: i64 = 50;

const VALID_OPTIONS: [&str; 4] = ["A", "B", "C", "D"];

/// Question payload for test creation
#[derive(Debug, Deserialize)]
pub struct QuestionInput {
    pub question_text: String,
    pub option_a: String,
    pub option_b: String,
    pub option_c: String,
    pub option_d: String,
    pub correct_option: String,
}

/// One answer in a submission; absent or unknown selections count wrong
#[derive(Debug, Deserialize)]
pub struct AnswerInput {
    pub question_id: Uuid,
    pub selected_option: Option<String>,
}

/// Validate and create a test with its questions
pub async fn create_test(
    pool: &SqlitePool,
    teacher_id: Uuid,
    title: &str,
    subject: &str,
    description: Option<&str>,
    max_marks: i64,
    questions: &[QuestionInput],
) -> ApiResult<Uuid> {
    teachers::load_by_id(pool, teacher_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Teacher not found".to_string()))?;

    if title.trim().is_empty() {
        return Err(ApiError::BadRequest("Test title is required".to_string()));
    }
    if !(MIN_MARKS..=MAX_MARKS).contains(&max_marks) {
        return Err(ApiError::BadRequest(format!(
            "Maximum marks must be between {} and {}",
            MIN_MARKS, MAX_MARKS
        )));
    }
    if questions.is_empty() {
        return Err(ApiError::BadRequest(
            "A test needs at least one question".to_string(),
        ));
    }
    for (i, q) in questions.iter().enumerate() {
        let options = [&q.option_a, &q.option_b, &q.option_c, &q.option_d];
        if q.question_text.trim().is_empty() || options.iter().any(|o| o.trim().is_empty()) {
            return Err(ApiError::BadRequest(format!(
                "Question {} is missing text or options",
                i + 1
            )));
        }
        let correct = q.correct_option.trim().to_uppercase();
        if !VALID_OPTIONS.contains(&correct.as_str()) {
            return Err(ApiError::BadRequest(format!(
                "Question {} has an invalid correct option",
                i + 1
            )));
        }
    }

    if !subjects::subject_assigned(pool, teacher_id, subject).await? {
        return Err(ApiError::Forbidden(
            "You are not assigned to this subject".to_string(),
        ));
    }

    let test_id =
        tests_db::insert_test(pool, teacher_id, title.trim(), subject.trim(), description, max_marks)
            .await?;
    for q in questions {
        tests_db::insert_question(
            pool,
            test_id,
            q.question_text.trim(),
            [&q.option_a, &q.option_b, &q.option_c, &q.option_d].map(|s| s.as_str()),
            &q.correct_option.trim().to_uppercase(),
        )
        .await?;
    }

    Ok(test_id)
}

/// Grade and record a student's single attempt
pub async fn submit_test(
    pool: &SqlitePool,
    student_id: Uuid,
    test_id: Uuid,
    answers: &[AnswerInput],
) -> ApiResult<(i64, i64, i64)> {
    let test = tests_db::load_test(pool, test_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Test not found".to_string()))?;
    if !test.published {
        return Err(ApiError::Forbidden("Test is not published".to_string()));
    }

    if tests_db::load_submission(pool, test_id, student_id).await?.is_some() {
        return Err(ApiError::BadRequest(
            "You have already attempted this test".to_string(),
        ));
    }

    let questions = tests_db::questions_by_test(pool, test_id).await?;
    if questions.is_empty() {
        return Err(ApiError::BadRequest("Test has no questions".to_string()));
    }

    let mut graded = Vec::with_capacity(questions.len());
    let mut correct_count = 0usize;
    for question in &questions {
        let selected = answers
            .iter()
            .find(|a| a.question_id == question.id)
            .and_then(|a| a.selected_option.as_deref())
            .map(|s| s.trim().to_uppercase());
        let correct = selected.as_deref() == Some(question.correct_option.as_str());
        if correct {
            correct_count += 1;
        }
        graded.push((question.id, selected, correct));
    }

    let score = compute_score(correct_count, questions.len(), test.max_marks);
    let submission_id =
        tests_db::insert_submission(pool, test_id, student_id, score, correct_count as i64).await?;
    for (question_id, selected, correct) in graded {
        tests_db::insert_answer(pool, submission_id, question_id, selected.as_deref(), correct)
            .await?;
    }

    Ok((score, correct_count as i64, questions.len() as i64))
}

/// score = round(correct * max_marks / questions), clamped to max_marks
pub fn compute_score(correct: usize, total_questions: usize, max_marks: i64) -> i64 {
    if total_questions == 0 {
        return 0;
    }
    let raw = correct as f64 * max_marks as f64 / total_questions as f64;
    (raw.round() as i64).min(max_marks)
}

/// 1-decimal average of the numeric or letter grades that map to points
pub fn average_grade_points(grades: &[String]) -> Option<f64> {
    let points: Vec<f64> = grades
        .iter()
        .filter_map(|g| lms_common::models::grade_points(g))
        .collect();
    if points.is_empty() {
        return None;
    }
    let avg = points.iter().sum::<f64>() / points.len() as f64;
    Some((avg * 10.0).round() / 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::teachers::insert_teacher;
    use crate::db::users::{insert_user, User};
    use lms_common::models::Role;

    fn question(text: &str, correct: &str) -> QuestionInput {
        QuestionInput {
            question_text: text.to_string(),
            option_a: "a".to_string(),
            option_b: "b".to_string(),
            option_c: "c".to_string(),
            option_d: "d".to_string(),
            correct_option: correct.to_string(),
        }
    }

    async fn setup() -> (SqlitePool, Uuid, Uuid) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        lms_common::db::init::create_all_tables(&pool).await.unwrap();

        let teacher_user = User::new("T".to_string(), "t@example.com".to_string(), Role::Teacher);
        insert_user(&pool, &teacher_user).await.unwrap();
        let teacher_id = insert_teacher(&pool, teacher_user.id, None, None, None).await.unwrap();
        subjects::assign_subject(&pool, teacher_id, "Maths").await.unwrap();

        let student = User::new("S".to_string(), "s@example.com".to_string(), Role::Student);
        insert_user(&pool, &student).await.unwrap();
        (pool, teacher_id, student.id)
    }

    #[test]
    fn score_rounds_and_clamps() {
        assert_eq!(compute_score(2, 3, 40), 27); // 26.67 rounds up
        assert_eq!(compute_score(3, 3, 40), 40);
        assert_eq!(compute_score(0, 3, 40), 0);
        assert_eq!(compute_score(5, 3, 40), 40); // clamped
        assert_eq!(compute_score(1, 0, 40), 0);
    }

    #[test]
    fn averages_mix_letters_and_numbers() {
        let grades = vec!["A".to_string(), "7".to_string(), "noise".to_string()];
        assert_eq!(average_grade_points(&grades), Some(8.0));
        assert_eq!(average_grade_points(&[]), None);
    }

    #[tokio::test]
    async fn unassigned_subject_blocks_creation() {
        let (pool, teacher, _) = setup().await;

        let result = create_test(&pool, teacher, "Quiz", "History", None, 40, &[question("q", "A")])
            .await;
        assert!(matches!(result, Err(ApiError::Forbidden(_))));
    }

    #[tokio::test]
    async fn marks_range_enforced() {
        let (pool, teacher, _) = setup().await;

        for bad in [29, 51] {
            let result =
                create_test(&pool, teacher, "Quiz", "Maths", None, bad, &[question("q", "A")]).await;
            assert!(matches!(result, Err(ApiError::BadRequest(_))));
        }
    }

    #[tokio::test]
    async fn submission_graded_and_single_attempt() {
        let (pool, teacher, student) = setup().await;

        let test_id = create_test(
            &pool,
            teacher,
            "Quiz",
            "Maths",
            None,
            30,
            &[question("q1", "A"), question("q2", "B"), question("q3", "C")],
        )
        .await
        .unwrap();

        let questions = tests_db::questions_by_test(&pool, test_id).await.unwrap();
        let answers = vec![
            AnswerInput {
                question_id: questions[0].id,
                selected_option: Some("a".to_string()), // case-insensitive
            },
            AnswerInput {
                question_id: questions[1].id,
                selected_option: Some("D".to_string()), // wrong
            },
            // question 3 unanswered
        ];

        let (score, correct, total) = submit_test(&pool, student, test_id, &answers).await.unwrap();
        assert_eq!((score, correct, total), (10, 1, 3));

        let repeat = submit_test(&pool, student, test_id, &answers).await;
        assert!(matches!(repeat, Err(ApiError::BadRequest(_))));
    }
}
