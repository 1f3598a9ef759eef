// src/models/test_instance.rs

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};

use crate::{
    config::{MAX_TEST_QUESTIONS, SIMULATION_DURATION_SECONDS},
    error::AppError,
    models::question::PublicQuestion,
};

/// The two shapes a test instance can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestKind {
    Standard,
    Simulation,
}

impl TestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestKind::Standard => "standard",
            TestKind::Simulation => "simulation",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "standard" => Ok(TestKind::Standard),
            "simulation" => Ok(TestKind::Simulation),
            other => Err(AppError::InternalServerError(format!(
                "Unknown test kind '{}' in storage",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingMode {
    Untimed,
    Timed,
    /// Fixed-profile simulation with its own fixed duration.
    Simulation,
}

impl TimingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimingMode::Untimed => "untimed",
            TimingMode::Timed => "timed",
            TimingMode::Simulation => "simulation",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "untimed" => Ok(TimingMode::Untimed),
            "timed" => Ok(TimingMode::Timed),
            "simulation" => Ok(TimingMode::Simulation),
            other => Err(AppError::InternalServerError(format!(
                "Unknown timing mode '{}' in storage",
                other
            ))),
        }
    }

    pub fn is_timed(&self) -> bool {
        !matches!(self, TimingMode::Untimed)
    }
}

/// Represents the 'test_instances' table.
#[derive(Debug, Clone, FromRow)]
pub struct TestInstance {
    pub id: i64,
    pub user_id: i64,
    pub topic_id: i64,
    pub kind: String,
    pub timing_mode: String,
    pub duration_seconds: i64,
    pub requested_count: i32,
    pub is_completed: bool,
    /// One list of choice ids per question, aligned by position. Set on completion only.
    pub user_answers: Option<Json<Vec<Vec<i64>>>>,
    pub correct_count: Option<i32>,
    pub incorrect_count: Option<i32>,
    pub score: Option<f64>,
    pub accuracy: Option<f64>,
    pub total_time_taken: Option<i64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TestInstance {
    pub fn kind(&self) -> Result<TestKind, AppError> {
        TestKind::parse(&self.kind)
    }

    pub fn timing_mode(&self) -> Result<TimingMode, AppError> {
        TimingMode::parse(&self.timing_mode)
    }
}

/// DTO for creating a test.
#[derive(Debug, Deserialize)]
pub struct CreateTestRequest {
    pub topic_id: i64,
    pub timing_mode: TimingMode,
    /// Required for standard tests, ignored for simulations.
    pub question_count: Option<i32>,
    /// Required when `timing_mode` is `timed`.
    pub duration_seconds: Option<i64>,
}

/// A validated creation request.
#[derive(Debug, Clone, PartialEq)]
pub enum TestPlan {
    Standard {
        question_count: i64,
        timing_mode: TimingMode,
        duration_seconds: i64,
    },
    Simulation,
}

impl TestPlan {
    pub fn kind(&self) -> TestKind {
        match self {
            TestPlan::Standard { .. } => TestKind::Standard,
            TestPlan::Simulation => TestKind::Simulation,
        }
    }

    pub fn timing_mode(&self) -> TimingMode {
        match self {
            TestPlan::Standard { timing_mode, .. } => *timing_mode,
            TestPlan::Simulation => TimingMode::Simulation,
        }
    }

    pub fn duration_seconds(&self) -> i64 {
        match self {
            TestPlan::Standard { duration_seconds, .. } => *duration_seconds,
            TestPlan::Simulation => SIMULATION_DURATION_SECONDS,
        }
    }
}

impl CreateTestRequest {
    /// Validates field combinations and resolves the timing configuration.
    pub fn plan(&self) -> Result<TestPlan, AppError> {
        if self.topic_id <= 0 {
            return Err(AppError::BadRequest("Topic ID is required".to_string()));
        }

        match self.timing_mode {
            TimingMode::Simulation => Ok(TestPlan::Simulation),
            mode => {
                let question_count = self.question_count.ok_or_else(|| {
                    AppError::BadRequest("Number of questions is required".to_string())
                })?;
                if question_count < 1 {
                    return Err(AppError::BadRequest(
                        "Number of questions must be at least 1".to_string(),
                    ));
                }
                if question_count > MAX_TEST_QUESTIONS {
                    return Err(AppError::BadRequest(format!(
                        "Number of questions must be at most {}",
                        MAX_TEST_QUESTIONS
                    )));
                }

                let duration_seconds = match mode {
                    TimingMode::Timed => {
                        let duration = self.duration_seconds.ok_or_else(|| {
                            AppError::BadRequest(
                                "Duration is required for timed tests".to_string(),
                            )
                        })?;
                        if duration < 1 {
                            return Err(AppError::BadRequest(
                                "Duration must be at least 1 second".to_string(),
                            ));
                        }
                        duration
                    }
                    _ => 0,
                };

                Ok(TestPlan::Standard {
                    question_count: i64::from(question_count),
                    timing_mode: mode,
                    duration_seconds,
                })
            }
        }
    }
}

/// What a learner needs to start or resume a test. Never carries answers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestView {
    pub id: i64,
    pub topic_id: i64,
    pub kind: TestKind,
    pub timing_mode: TimingMode,
    pub duration_seconds: i64,
    /// `None` for untimed tests.
    pub remaining_seconds: Option<i64>,
    pub is_completed: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub questions: Vec<PublicQuestion>,
}

/// DTO for submitting a test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTestRequest {
    pub test_kind: TestKind,
    /// One list of choice ids per question, in the test's question order.
    pub answers: Vec<Vec<i64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmitTestResponse {
    pub score: f64,
    pub correct_count: i64,
    pub incorrect_count: i64,
    pub accuracy: f64,
    pub total_questions: i64,
}

/// Row of a learner's test history.
#[derive(Debug, Serialize, FromRow)]
pub struct HistoryEntry {
    pub id: i64,
    pub kind: String,
    pub topic_id: i64,
    pub topic_name: String,
    pub is_completed: bool,
    pub correct_count: Option<i32>,
    pub total_questions: i64,
    pub score: Option<f64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// One question of a completed test with its correctness annotation.
#[derive(Debug, Serialize)]
pub struct ResultQuestion {
    #[serde(flatten)]
    pub question: PublicQuestion,
    pub correct_answer: Vec<i64>,
    pub user_answer: Vec<i64>,
    pub is_correct: bool,
}

/// Results view of a completed test.
#[derive(Debug, Serialize)]
pub struct TestResults {
    pub id: i64,
    pub kind: TestKind,
    pub topic_id: i64,
    pub topic_name: String,
    pub correct_count: i32,
    pub incorrect_count: i32,
    pub score: f64,
    pub accuracy: f64,
    pub total_time_taken: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub questions: Vec<ResultQuestion>,
}
