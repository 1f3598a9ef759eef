// src/models/topic.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'topics' table. Learners see this shape when picking a topic.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Topic {
    pub id: i64,
    pub name: String,
}

/// Admin listing row: topic plus how many questions it holds.
#[derive(Debug, Serialize, FromRow)]
pub struct TopicSummary {
    pub id: i64,
    pub name: String,
    pub question_count: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTopicRequest {
    #[validate(length(min = 1, max = 100, message = "Topic name must be between 1 and 100 characters."))]
    pub name: String,
}
