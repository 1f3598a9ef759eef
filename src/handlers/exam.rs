// src/handlers/exam.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, types::Json as SqlJson};

use crate::{
    config::{SIMULATION_MULTIPLE_COUNT, SIMULATION_SINGLE_COUNT},
    db,
    error::AppError,
    handlers::admin::ensure_topic_exists,
    models::{
        question::PublicQuestion,
        test_instance::{
            CreateTestRequest, HistoryEntry, ResultQuestion, SubmitTestRequest,
            SubmitTestResponse, TestInstance, TestPlan, TestResults, TestView,
        },
    },
    utils::{
        jwt::AuthUser,
        scoring::score_submission,
        selection::{assemble_simulation, ensure_standard_selection},
        timing::{remaining_seconds, time_taken},
    },
};

const INSTANCE_COLUMNS: &str = "id, user_id, topic_id, kind, timing_mode, duration_seconds, \
     requested_count, is_completed, user_answers, correct_count, incorrect_count, score, \
     accuracy, total_time_taken, created_at, completed_at";

/// Creates a test instance for the caller.
///
/// Standard tests take the first `question_count` questions of the topic in
/// id order. Simulation tests take 50 single-answer then 150 multi-answer
/// questions and fail with a capacity error when the topic has fewer.
/// The questions are linked by reference; the response never includes answers.
pub async fn create_test(
    State(pool): State<PgPool>,
    user: AuthUser,
    Json(payload): Json<CreateTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    let plan = payload.plan()?;

    let mut tx = pool.begin().await?;
    ensure_topic_exists(&mut tx, payload.topic_id).await?;

    let question_ids = match &plan {
        TestPlan::Standard { question_count, .. } => {
            let ids: Vec<i64> = sqlx::query_scalar(
                "SELECT id FROM questions WHERE topic_id = $1 ORDER BY id LIMIT $2",
            )
            .bind(payload.topic_id)
            .bind(*question_count)
            .fetch_all(&mut *tx)
            .await?;
            ensure_standard_selection(&ids)?;
            ids
        }
        TestPlan::Simulation => {
            let single = select_by_kind(&mut tx, payload.topic_id, false, SIMULATION_SINGLE_COUNT).await?;
            let multiple = select_by_kind(&mut tx, payload.topic_id, true, SIMULATION_MULTIPLE_COUNT).await?;
            assemble_simulation(&single, &multiple)?
        }
    };

    let instance = sqlx::query_as::<_, TestInstance>(&format!(
        r#"
        INSERT INTO test_instances (user_id, topic_id, kind, timing_mode, duration_seconds, requested_count)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {}
        "#,
        INSTANCE_COLUMNS
    ))
    .bind(user.id)
    .bind(payload.topic_id)
    .bind(plan.kind().as_str())
    .bind(plan.timing_mode().as_str())
    .bind(plan.duration_seconds())
    .bind(question_ids.len() as i32)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create test instance: {:?}", e);
        AppError::from(e)
    })?;

    sqlx::query(
        r#"
        INSERT INTO test_instance_questions (instance_id, position, question_id)
        SELECT $1, (t.ord - 1)::INT, t.question_id
        FROM UNNEST($2::BIGINT[]) WITH ORDINALITY AS t(question_id, ord)
        "#,
    )
    .bind(instance.id)
    .bind(&question_ids)
    .execute(&mut *tx)
    .await?;

    let view = load_view(&mut tx, &instance, Utc::now()).await?;
    tx.commit().await?;

    tracing::info!(
        test_id = instance.id,
        user_id = user.id,
        kind = plan.kind().as_str(),
        questions = question_ids.len(),
        "Test created"
    );

    Ok((StatusCode::CREATED, Json(view)))
}

/// Session entry point: the test's questions (no answers) and the time left,
/// recomputed from the stored creation time.
pub async fn get_test(
    State(pool): State<PgPool>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    let instance = find_owned_instance(&mut conn, id, user.id, false).await?;
    let view = load_view(&mut conn, &instance, Utc::now()).await?;
    Ok(Json(view))
}

/// Scores a submission and completes the test, exactly once.
///
/// The instance row is locked for the whole transition and the final update
/// only applies while `is_completed` is still false, so a second submission
/// fails with `AlreadyCompleted` and leaves the stored result untouched.
pub async fn submit_test(
    State(pool): State<PgPool>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<SubmitTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    let instance = find_owned_instance(&mut tx, id, user.id, true).await?;
    if instance.kind()? != payload.test_kind {
        return Err(AppError::NotFound("Test not found".to_string()));
    }
    if instance.is_completed {
        return Err(AppError::AlreadyCompleted(
            "Test has already been submitted".to_string(),
        ));
    }

    let questions = db::fetch_instance_questions(&mut tx, id).await?;
    if payload.answers.len() > questions.len() {
        return Err(AppError::BadRequest(format!(
            "Submitted {} answers for {} questions",
            payload.answers.len(),
            questions.len()
        )));
    }

    let correct_sets: Vec<Vec<i64>> = questions.iter().map(|q| q.answer.clone()).collect();
    let summary = score_submission(&correct_sets, &payload.answers);

    let now = Utc::now();
    let taken = time_taken(
        instance.timing_mode()?,
        instance.duration_seconds,
        instance.created_at,
        now,
    );

    let result = sqlx::query(
        r#"
        UPDATE test_instances
        SET is_completed = TRUE,
            user_answers = $1,
            correct_count = $2,
            incorrect_count = $3,
            score = $4,
            accuracy = $5,
            total_time_taken = $6,
            completed_at = $7
        WHERE id = $8 AND is_completed = FALSE
        "#,
    )
    .bind(SqlJson(&payload.answers))
    .bind(summary.correct_count as i32)
    .bind(summary.incorrect_count as i32)
    .bind(summary.score)
    .bind(summary.accuracy)
    .bind(taken)
    .bind(now)
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to store test results: {:?}", e);
        AppError::from(e)
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::AlreadyCompleted(
            "Test has already been submitted".to_string(),
        ));
    }

    tx.commit().await?;

    tracing::info!(
        test_id = id,
        user_id = user.id,
        correct = summary.correct_count,
        total = questions.len(),
        "Test completed"
    );

    Ok(Json(SubmitTestResponse {
        score: summary.score,
        correct_count: summary.correct_count as i64,
        incorrect_count: summary.incorrect_count as i64,
        accuracy: summary.accuracy,
        total_questions: questions.len() as i64,
    }))
}

/// Results of a completed test with per-question correctness.
pub async fn get_results(
    State(pool): State<PgPool>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    let instance = find_owned_instance(&mut conn, id, user.id, false).await?;

    if !instance.is_completed {
        return Err(AppError::Conflict("Test is not completed yet".to_string()));
    }

    let topic_name: String = sqlx::query_scalar("SELECT name FROM topics WHERE id = $1")
        .bind(instance.topic_id)
        .fetch_one(&mut *conn)
        .await?;

    let questions = db::fetch_instance_questions(&mut conn, id).await?;
    let public = db::public_questions(&mut conn, &questions).await?;
    let user_answers = instance
        .user_answers
        .as_ref()
        .map(|answers| answers.0.clone())
        .unwrap_or_default();

    let correct_sets: Vec<Vec<i64>> = questions.iter().map(|q| q.answer.clone()).collect();
    let marks = score_submission(&correct_sets, &user_answers).per_question;

    let annotated: Vec<ResultQuestion> = correct_sets
        .into_iter()
        .zip(public)
        .zip(marks)
        .enumerate()
        .map(|(i, ((correct_answer, public), is_correct))| ResultQuestion {
            is_correct,
            correct_answer,
            user_answer: user_answers.get(i).cloned().unwrap_or_default(),
            question: public,
        })
        .collect();

    Ok(Json(TestResults {
        id: instance.id,
        kind: instance.kind()?,
        topic_id: instance.topic_id,
        topic_name,
        correct_count: instance.correct_count.unwrap_or(0),
        incorrect_count: instance.incorrect_count.unwrap_or(0),
        score: instance.score.unwrap_or(0.0),
        accuracy: instance.accuracy.unwrap_or(0.0),
        total_time_taken: instance.total_time_taken.unwrap_or(0),
        created_at: instance.created_at,
        completed_at: instance.completed_at,
        questions: annotated,
    }))
}

/// The caller's tests of both kinds, newest first.
pub async fn list_history(
    State(pool): State<PgPool>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let history = sqlx::query_as::<_, HistoryEntry>(
        r#"
        SELECT
            ti.id,
            ti.kind,
            ti.topic_id,
            t.name AS topic_name,
            ti.is_completed,
            ti.correct_count,
            (SELECT COUNT(*) FROM test_instance_questions tiq WHERE tiq.instance_id = ti.id) AS total_questions,
            ti.score,
            ti.created_at
        FROM test_instances ti
        JOIN topics t ON t.id = ti.topic_id
        WHERE ti.user_id = $1
        ORDER BY ti.created_at DESC, ti.id DESC
        "#,
    )
    .bind(user.id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch test history: {:?}", e);
        AppError::from(e)
    })?;

    Ok(Json(history))
}

async fn select_by_kind(
    conn: &mut PgConnection,
    topic_id: i64,
    is_multiple_answer: bool,
    limit: usize,
) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT id FROM questions WHERE topic_id = $1 AND is_multiple_answer = $2 ORDER BY id LIMIT $3",
    )
    .bind(topic_id)
    .bind(is_multiple_answer)
    .bind(limit as i64)
    .fetch_all(conn)
    .await
}

/// Loads an instance owned by `user_id`. Someone else's test is reported as missing.
async fn find_owned_instance(
    conn: &mut PgConnection,
    id: i64,
    user_id: i64,
    for_update: bool,
) -> Result<TestInstance, AppError> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    sqlx::query_as::<_, TestInstance>(&format!(
        "SELECT {} FROM test_instances WHERE id = $1 AND user_id = $2{}",
        INSTANCE_COLUMNS, lock
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Test not found".to_string()))
}

async fn load_view(
    conn: &mut PgConnection,
    instance: &TestInstance,
    now: DateTime<Utc>,
) -> Result<TestView, AppError> {
    let questions = db::fetch_instance_questions(&mut *conn, instance.id).await?;
    let public = db::public_questions(conn, &questions).await?;
    build_view(instance, public, now)
}

fn build_view(
    instance: &TestInstance,
    questions: Vec<PublicQuestion>,
    now: DateTime<Utc>,
) -> Result<TestView, AppError> {
    let timing_mode = instance.timing_mode()?;
    let remaining = if instance.is_completed {
        None
    } else {
        remaining_seconds(timing_mode, instance.duration_seconds, instance.created_at, now)
    };

    Ok(TestView {
        id: instance.id,
        topic_id: instance.topic_id,
        kind: instance.kind()?,
        timing_mode,
        duration_seconds: instance.duration_seconds,
        remaining_seconds: remaining,
        is_completed: instance.is_completed,
        created_at: instance.created_at,
        questions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn instance(timing_mode: &str, duration: i64, completed: bool) -> TestInstance {
        TestInstance {
            id: 9,
            user_id: 1,
            topic_id: 3,
            kind: "standard".to_string(),
            timing_mode: timing_mode.to_string(),
            duration_seconds: duration,
            requested_count: 2,
            is_completed: completed,
            user_answers: None,
            correct_count: None,
            incorrect_count: None,
            score: None,
            accuracy: None,
            total_time_taken: None,
            created_at: Utc::now() - Duration::seconds(30),
            completed_at: None,
        }
    }

    #[test]
    fn timed_view_reports_remaining_time() {
        let inst = instance("timed", 100, false);
        let view = build_view(&inst, vec![], inst.created_at + Duration::seconds(30)).unwrap();
        assert_eq!(view.remaining_seconds, Some(70));
        assert!(!view.is_completed);
    }

    #[test]
    fn untimed_and_completed_views_have_no_deadline() {
        let untimed = instance("untimed", 0, false);
        assert_eq!(build_view(&untimed, vec![], Utc::now()).unwrap().remaining_seconds, None);

        let done = instance("timed", 100, true);
        assert_eq!(build_view(&done, vec![], Utc::now()).unwrap().remaining_seconds, None);
    }

    #[test]
    fn corrupt_timing_mode_is_an_internal_error() {
        let broken = instance("sometimes", 0, false);
        assert!(matches!(
            build_view(&broken, vec![], Utc::now()),
            Err(AppError::InternalServerError(_))
        ));
    }
}
