// src/models/question.rs

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

use crate::{
    config::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE},
    error::AppError,
};

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub topic_id: i64,

    /// Short label, derived from the prompt when not provided.
    pub title: String,

    /// The full question text.
    pub prompt: String,

    /// Single-answer questions accept exactly one choice.
    pub is_multiple_answer: bool,

    /// Ids of the correct choices (the answer set).
    pub answer: Vec<i64>,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Represents the 'choices' table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Choice {
    pub id: i64,
    pub question_id: i64,
    pub text: String,
    pub position: i32,
}

/// Admin view: a question with its choices and answer set.
#[derive(Debug, Serialize)]
pub struct QuestionWithChoices {
    #[serde(flatten)]
    pub question: Question,
    pub choices: Vec<Choice>,
}

/// Choice as sent to learners.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicChoice {
    pub id: i64,
    pub text: String,
}

/// DTO for sending a question to a learner (excludes the answer set).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicQuestion {
    pub id: i64,
    pub title: String,
    pub prompt: String,
    pub is_multiple_answer: bool,
    pub choices: Vec<PublicChoice>,
}

impl PublicQuestion {
    pub fn from_parts(question: &Question, choices: &[Choice]) -> Self {
        Self {
            id: question.id,
            title: question.title.clone(),
            prompt: question.prompt.clone(),
            is_multiple_answer: question.is_multiple_answer,
            choices: choices
                .iter()
                .map(|c| PublicChoice {
                    id: c.id,
                    text: c.text.clone(),
                })
                .collect(),
        }
    }
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    pub topic_id: i64,
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 5000))]
    pub prompt: String,
    #[validate(custom(function = validate_choices))]
    pub choices: Vec<String>,
    /// Indexes into `choices`.
    pub correct_choices: Vec<usize>,
    #[serde(default)]
    pub is_multiple_answer: bool,
}

impl CreateQuestionRequest {
    /// Checks that the answer key points at existing choices and fits the question kind.
    pub fn check_answer_key(&self) -> Result<(), AppError> {
        let mut seen = HashSet::new();
        for &idx in &self.correct_choices {
            if idx >= self.choices.len() {
                return Err(AppError::BadRequest(format!(
                    "Correct choice index {} is out of range",
                    idx
                )));
            }
            if !seen.insert(idx) {
                return Err(AppError::BadRequest(format!(
                    "Correct choice index {} is listed twice",
                    idx
                )));
            }
        }
        check_answer_count(self.is_multiple_answer, seen.len())
    }
}

/// Single-answer questions need exactly one correct choice, multi-answer at least one.
pub fn check_answer_count(is_multiple_answer: bool, correct: usize) -> Result<(), AppError> {
    match (is_multiple_answer, correct) {
        (_, 0) => Err(AppError::BadRequest(
            "A question needs at least one correct choice".to_string(),
        )),
        (false, n) if n > 1 => Err(AppError::BadRequest(
            "A single-answer question must have exactly one correct choice".to_string(),
        )),
        _ => Ok(()),
    }
}

fn validate_choices(choices: &[String]) -> Result<(), validator::ValidationError> {
    if choices.is_empty() {
        return Err(validator::ValidationError::new("choices_cannot_be_empty"));
    }
    if choices.len() > 10 {
        return Err(validator::ValidationError::new("too_many_choices"));
    }
    for choice in choices {
        if choice.trim().is_empty() {
            return Err(validator::ValidationError::new("choice_cannot_be_blank"));
        }
        if choice.len() > 500 {
            return Err(validator::ValidationError::new("choice_too_long"));
        }
    }
    Ok(())
}

/// One entry of the full choice list sent with an update.
/// Entries with an `id` edit that choice, entries without one create a new choice.
#[derive(Debug, Deserialize, Validate)]
pub struct ChoiceInput {
    pub id: Option<i64>,
    #[validate(length(min = 1, max = 500))]
    pub text: String,
    #[serde(default)]
    pub correct: bool,
}

/// DTO for updating a question. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuestionRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 5000))]
    pub prompt: Option<String>,
    pub topic_id: Option<i64>,
    pub is_multiple_answer: Option<bool>,
    pub choices: Option<Vec<ChoiceInput>>,
}

impl UpdateQuestionRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.prompt.is_none()
            && self.topic_id.is_none()
            && self.is_multiple_answer.is_none()
            && self.choices.is_none()
    }

    /// Validates the request and every entry of the replacement choice list.
    pub fn validate_all(&self) -> Result<(), AppError> {
        self.validate()?;
        if let Some(choices) = &self.choices {
            if choices.is_empty() {
                return Err(AppError::BadRequest(
                    "A question needs at least one choice".to_string(),
                ));
            }
            for choice in choices {
                choice.validate()?;
            }
        }
        Ok(())
    }
}

/// Query parameters for paging through a topic's questions.
#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// A resolved page request: 1-based page, clamped size and row offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: i64,
    pub limit: i64,
    pub offset: i64,
}

impl PageParams {
    pub fn window(&self) -> Result<PageWindow, AppError> {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1)
            .checked_mul(limit)
            .ok_or_else(|| AppError::BadRequest("Page number is out of range".to_string()))?;
        Ok(PageWindow { page, limit, offset })
    }
}

/// Query parameters for the admin question search.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub topic_id: Option<i64>,
}

impl SearchParams {
    /// `ILIKE` pattern matching the keyword anywhere, with `%`, `_` and `\`
    /// taken literally. `None` for a blank keyword.
    pub fn like_pattern(&self) -> Option<String> {
        let keyword = self.q.trim();
        if keyword.is_empty() {
            return None;
        }
        let mut pattern = String::with_capacity(keyword.len() + 2);
        pattern.push('%');
        for c in keyword.chars() {
            if matches!(c, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('%');
        Some(pattern)
    }
}

/// One page of questions.
#[derive(Debug, Serialize)]
pub struct QuestionPage {
    pub data: Vec<QuestionWithChoices>,
    pub total: i64,
    pub total_pages: i64,
    pub current_page: i64,
    pub page_size: i64,
}

/// Derives a title from the prompt: the first `max_chars` characters.
pub fn derive_title(prompt: &str, max_chars: usize) -> String {
    prompt.trim().chars().take(max_chars).collect()
}
