// src/handlers/import.rs

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use sqlx::PgPool;

use crate::{
    error::AppError,
    handlers::admin::{ensure_topic_exists, insert_question},
    utils::{
        csv_import::{SkippedRow, parse_question_csv},
        html::{clean_all, clean_html},
    },
};

#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub question_ids: Vec<i64>,
    pub skipped: Vec<SkippedRow>,
}

/// Bulk-imports questions into a topic from a CSV upload (multipart field `file`).
///
/// Columns: `question, choice1..choice5, answer`. Invalid rows are skipped and
/// reported; all valid rows are inserted in a single transaction.
/// Admin only.
pub async fn import_questions(
    State(pool): State<PgPool>,
    Path(topic_id): Path<i64>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut content = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::error!("Failed to read multipart field: {}", e);
        AppError::BadRequest(e.to_string())
    })? {
        if field.name() == Some("file") {
            let bytes = field.bytes().await.map_err(|e| {
                tracing::error!("Failed to read uploaded file: {}", e);
                AppError::BadRequest("Failed to read file upload".to_string())
            })?;
            content = Some(bytes);
        }
    }

    let content = content
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| AppError::BadRequest("No file uploaded".to_string()))?;

    let parsed = parse_question_csv(&content)?;

    let mut tx = pool.begin().await?;
    ensure_topic_exists(&mut tx, topic_id).await?;

    let mut question_ids = Vec::with_capacity(parsed.questions.len());
    for question in &parsed.questions {
        let id = insert_question(
            &mut tx,
            topic_id,
            &clean_html(&question.title),
            &clean_html(&question.prompt),
            question.is_multiple_answer,
            &clean_all(&question.choices),
            &question.correct,
        )
        .await
        .map_err(|e| {
            tracing::error!(row = question.row, "Failed to import question: {:?}", e);
            AppError::from(e)
        })?;
        question_ids.push(id);
    }

    tx.commit().await?;

    tracing::info!(
        topic_id,
        imported = question_ids.len(),
        skipped = parsed.skipped.len(),
        "CSV import finished"
    );

    Ok((
        StatusCode::CREATED,
        Json(ImportSummary {
            imported: question_ids.len(),
            question_ids,
            skipped: parsed.skipped,
        }),
    ))
}
