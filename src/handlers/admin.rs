// src/handlers/admin.rs

use std::collections::HashSet;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    config::TITLE_MAX_CHARS,
    db::{self, QUESTION_COLUMNS},
    error::{AppError, is_foreign_key_violation, is_unique_violation},
    models::{
        question::{
            CreateQuestionRequest, PageParams, Question, QuestionPage, QuestionWithChoices,
            SearchParams, UpdateQuestionRequest, check_answer_count, derive_title,
        },
        topic::{CreateTopicRequest, Topic, TopicSummary},
    },
    utils::{
        html::{clean_all, clean_html},
        topic_name::normalize_topic_name,
    },
};

const SEARCH_LIMIT: i64 = 50;

/// Creates a topic. The name is normalized and must be unique.
/// Admin only.
pub async fn create_topic(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateTopicRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let name = normalize_topic_name(&payload.name)
        .ok_or_else(|| AppError::BadRequest("Topic name cannot be blank".to_string()))?;

    let topic = sqlx::query_as::<_, Topic>("INSERT INTO topics (name) VALUES ($1) RETURNING id, name")
        .bind(&name)
        .fetch_one(&pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("Topic '{}' already present", name))
            } else {
                tracing::error!("Failed to create topic: {:?}", e);
                AppError::from(e)
            }
        })?;

    tracing::info!(topic_id = topic.id, name = %topic.name, "Topic created");

    Ok((StatusCode::CREATED, Json(topic)))
}

/// Lists topics with their question counts.
/// Served to every signed-in user; learners pick a topic from it.
pub async fn list_topics(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let topics = sqlx::query_as::<_, TopicSummary>(
        r#"
        SELECT t.id, t.name, t.created_at, COUNT(q.id) AS question_count
        FROM topics t
        LEFT JOIN questions q ON q.topic_id = t.id
        GROUP BY t.id
        ORDER BY t.name
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list topics: {:?}", e);
        AppError::from(e)
    })?;

    Ok(Json(topics))
}

/// Pages through the questions of one topic, choices included.
/// Admin only.
pub async fn list_topic_questions(
    State(pool): State<PgPool>,
    Path(topic_id): Path<i64>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    let window = params.window()?;

    let mut conn = pool.acquire().await?;
    ensure_topic_exists(&mut conn, topic_id).await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE topic_id = $1")
        .bind(topic_id)
        .fetch_one(&mut *conn)
        .await?;

    let questions = sqlx::query_as::<_, Question>(&format!(
        "SELECT {} FROM questions q WHERE q.topic_id = $1 ORDER BY q.id LIMIT $2 OFFSET $3",
        QUESTION_COLUMNS
    ))
    .bind(topic_id)
    .bind(window.limit)
    .bind(window.offset)
    .fetch_all(&mut *conn)
    .await?;

    let data = attach_choices(&mut conn, questions).await?;

    Ok(Json(QuestionPage {
        data,
        total,
        total_pages: (total + window.limit - 1) / window.limit,
        current_page: window.page,
        page_size: window.limit,
    }))
}

/// Case-insensitive search over question prompts and titles.
/// Admin only.
pub async fn search_questions(
    State(pool): State<PgPool>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, AppError> {
    let pattern = params
        .like_pattern()
        .ok_or_else(|| AppError::BadRequest("Search keyword is required".to_string()))?;

    let mut conn = pool.acquire().await?;
    let questions = sqlx::query_as::<_, Question>(&format!(
        r#"
        SELECT {}
        FROM questions q
        WHERE (q.prompt ILIKE $1 ESCAPE '\' OR q.title ILIKE $1 ESCAPE '\')
          AND ($2::BIGINT IS NULL OR q.topic_id = $2)
        ORDER BY q.id
        LIMIT $3
        "#,
        QUESTION_COLUMNS
    ))
    .bind(&pattern)
    .bind(params.topic_id)
    .bind(SEARCH_LIMIT)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Json(attach_choices(&mut conn, questions).await?))
}

/// Fetches one question with its choices and answer set.
/// Admin only.
pub async fn get_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    Ok(Json(load_question(&mut conn, id).await?))
}

/// Creates a question and its choices in one transaction.
/// Admin only.
pub async fn create_question(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    payload.check_answer_key()?;

    let prompt = clean_html(&payload.prompt);
    let title = payload
        .title
        .as_deref()
        .map(clean_html)
        .unwrap_or_else(|| derive_title(&prompt, TITLE_MAX_CHARS));
    let choices = clean_all(&payload.choices);

    let mut tx = pool.begin().await?;
    ensure_topic_exists(&mut tx, payload.topic_id).await?;

    let id = insert_question(
        &mut tx,
        payload.topic_id,
        &title,
        &prompt,
        payload.is_multiple_answer,
        &choices,
        &payload.correct_choices,
    )
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        AppError::from(e)
    })?;

    let created = load_question(&mut tx, id).await?;
    tx.commit().await?;

    tracing::info!(question_id = id, topic_id = payload.topic_id, "Question created");

    Ok((StatusCode::CREATED, Json(created)))
}

/// Inserts a question, its choices in order, then the answer set built from
/// the `correct` choice indexes. Shared by the single create and the CSV import.
pub async fn insert_question(
    conn: &mut PgConnection,
    topic_id: i64,
    title: &str,
    prompt: &str,
    is_multiple_answer: bool,
    choices: &[String],
    correct: &[usize],
) -> Result<i64, sqlx::Error> {
    let question_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO questions (topic_id, title, prompt, is_multiple_answer)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(topic_id)
    .bind(title)
    .bind(prompt)
    .bind(is_multiple_answer)
    .fetch_one(&mut *conn)
    .await?;

    let mut choice_ids = Vec::with_capacity(choices.len());
    for (position, text) in choices.iter().enumerate() {
        let choice_id: i64 = sqlx::query_scalar(
            "INSERT INTO choices (question_id, text, position) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(question_id)
        .bind(text)
        .bind(position as i32)
        .fetch_one(&mut *conn)
        .await?;
        choice_ids.push(choice_id);
    }

    let answer: Vec<i64> = correct
        .iter()
        .filter_map(|&i| choice_ids.get(i).copied())
        .collect();
    sqlx::query("UPDATE questions SET answer = $1 WHERE id = $2")
        .bind(&answer)
        .bind(question_id)
        .execute(&mut *conn)
        .await?;

    Ok(question_id)
}

/// Updates a question by ID.
///
/// When `choices` is present it is the complete new choice list: entries with
/// an id edit that choice, entries without one are created, and existing
/// choices left out are deleted. The answer set is rebuilt from the `correct`
/// flags. An empty update returns the question unchanged.
/// Admin only.
pub async fn update_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate_all()?;

    let mut tx = pool.begin().await?;

    let current = sqlx::query_as::<_, Question>(&format!(
        "SELECT {} FROM questions q WHERE q.id = $1 FOR UPDATE",
        QUESTION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

    if payload.is_empty() {
        let unchanged = load_question(&mut tx, id).await?;
        tx.commit().await?;
        return Ok(Json(unchanged));
    }

    if let Some(topic_id) = payload.topic_id {
        ensure_topic_exists(&mut tx, topic_id).await?;
    }

    let is_multiple_answer = payload.is_multiple_answer.unwrap_or(current.is_multiple_answer);

    if payload.title.is_some()
        || payload.prompt.is_some()
        || payload.topic_id.is_some()
        || payload.is_multiple_answer.is_some()
    {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE questions SET ");
        let mut separated = builder.separated(", ");

        if let Some(title) = &payload.title {
            separated.push("title = ");
            separated.push_bind_unseparated(clean_html(title));
        }

        if let Some(prompt) = &payload.prompt {
            separated.push("prompt = ");
            separated.push_bind_unseparated(clean_html(prompt));
        }

        if let Some(topic_id) = payload.topic_id {
            separated.push("topic_id = ");
            separated.push_bind_unseparated(topic_id);
        }

        if let Some(multi) = payload.is_multiple_answer {
            separated.push("is_multiple_answer = ");
            separated.push_bind_unseparated(multi);
        }

        builder.push(" WHERE id = ");
        builder.push_bind(id);

        builder.build().execute(&mut *tx).await.map_err(|e| {
            tracing::error!("Failed to update question: {:?}", e);
            AppError::from(e)
        })?;
    }

    match &payload.choices {
        Some(inputs) => {
            let existing: Vec<i64> =
                sqlx::query_scalar("SELECT id FROM choices WHERE question_id = $1")
                    .bind(id)
                    .fetch_all(&mut *tx)
                    .await?;
            let existing: HashSet<i64> = existing.into_iter().collect();

            let mut kept = HashSet::new();
            let mut answer = Vec::new();

            for (position, input) in inputs.iter().enumerate() {
                let text = clean_html(&input.text);
                let choice_id = match input.id {
                    Some(choice_id) => {
                        if !existing.contains(&choice_id) {
                            return Err(AppError::BadRequest(format!(
                                "Choice {} does not belong to question {}",
                                choice_id, id
                            )));
                        }
                        if !kept.insert(choice_id) {
                            return Err(AppError::BadRequest(format!(
                                "Choice {} is listed twice",
                                choice_id
                            )));
                        }
                        sqlx::query("UPDATE choices SET text = $1, position = $2 WHERE id = $3")
                            .bind(&text)
                            .bind(position as i32)
                            .bind(choice_id)
                            .execute(&mut *tx)
                            .await?;
                        choice_id
                    }
                    None => {
                        sqlx::query_scalar::<_, i64>(
                            "INSERT INTO choices (question_id, text, position) VALUES ($1, $2, $3) RETURNING id",
                        )
                        .bind(id)
                        .bind(&text)
                        .bind(position as i32)
                        .fetch_one(&mut *tx)
                        .await?
                    }
                };
                if input.correct {
                    answer.push(choice_id);
                }
            }

            check_answer_count(is_multiple_answer, answer.len())?;

            let removed: Vec<i64> = existing.difference(&kept).copied().collect();
            if !removed.is_empty() {
                sqlx::query("DELETE FROM choices WHERE id = ANY($1)")
                    .bind(&removed)
                    .execute(&mut *tx)
                    .await?;
            }

            sqlx::query("UPDATE questions SET answer = $1 WHERE id = $2")
                .bind(&answer)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        None => check_answer_count(is_multiple_answer, current.answer.len())?,
    }

    let updated = load_question(&mut tx, id).await?;
    tx.commit().await?;

    tracing::info!(question_id = id, "Question updated");

    Ok(Json(updated))
}

/// Deletes a question and, through the foreign key, its choices.
/// Questions that belong to a test instance cannot be deleted.
/// Admin only.
pub async fn delete_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM questions WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                AppError::Conflict("Question is part of existing tests and cannot be deleted".to_string())
            } else {
                tracing::error!("Failed to delete question: {:?}", e);
                AppError::from(e)
            }
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    tracing::info!(question_id = id, "Question deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Deletes one choice and removes it from its question's answer set.
/// Refused with 409 when that would leave the question without a correct choice.
/// Admin only.
pub async fn delete_choice(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    let question_id: i64 = sqlx::query_scalar("DELETE FROM choices WHERE id = $1 RETURNING question_id")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Choice not found".to_string()))?;

    let (is_multiple_answer, remaining): (bool, i32) = sqlx::query_as(
        r#"
        UPDATE questions SET answer = array_remove(answer, $1)
        WHERE id = $2
        RETURNING is_multiple_answer, COALESCE(cardinality(answer), 0)
        "#,
    )
    .bind(id)
    .bind(question_id)
    .fetch_one(&mut *tx)
    .await?;

    // Dropping the transaction rolls the delete back.
    check_answer_count(is_multiple_answer, remaining as usize).map_err(|_| {
        AppError::Conflict("Cannot delete the last correct choice of a question".to_string())
    })?;

    tx.commit().await?;

    tracing::info!(choice_id = id, question_id, "Choice deleted");

    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn ensure_topic_exists(conn: &mut PgConnection, topic_id: i64) -> Result<(), AppError> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM topics WHERE id = $1")
        .bind(topic_id)
        .fetch_optional(conn)
        .await?;

    exists
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound("Topic not found".to_string()))
}

async fn load_question(conn: &mut PgConnection, id: i64) -> Result<QuestionWithChoices, AppError> {
    let question = db::fetch_question(&mut *conn, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

    let mut choices = db::fetch_choices(conn, &[id]).await?;
    Ok(QuestionWithChoices {
        choices: choices.remove(&id).unwrap_or_default(),
        question,
    })
}

async fn attach_choices(
    conn: &mut PgConnection,
    questions: Vec<Question>,
) -> Result<Vec<QuestionWithChoices>, AppError> {
    let ids: Vec<i64> = questions.iter().map(|q| q.id).collect();
    let mut choices = db::fetch_choices(conn, &ids).await?;

    Ok(questions
        .into_iter()
        .map(|question| QuestionWithChoices {
            choices: choices.remove(&question.id).unwrap_or_default(),
            question,
        })
        .collect())
}
