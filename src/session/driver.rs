// src/session/driver.rs

use std::fmt;

use async_trait::async_trait;

use super::{Checkpoint, CheckpointStore, SessionError, SessionPhase, StoreError, TestSession};
use crate::models::test_instance::{SubmitTestRequest, SubmitTestResponse, TestView};

#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    NotFound,
    /// The server already scored this test.
    AlreadyCompleted,
    Unauthorized,
    Rejected { status: u16, message: String },
    Transport(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::NotFound => write!(f, "test not found"),
            BackendError::AlreadyCompleted => write!(f, "test has already been submitted"),
            BackendError::Unauthorized => write!(f, "not signed in"),
            BackendError::Rejected { status, message } => {
                write!(f, "request rejected ({}): {}", status, message)
            }
            BackendError::Transport(msg) => write!(f, "request failed: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

/// The server side of a session.
#[async_trait]
pub trait TestBackend: Send + Sync {
    async fn fetch_test(&self, instance_id: i64) -> Result<TestView, BackendError>;

    async fn submit_test(
        &self,
        instance_id: i64,
        request: &SubmitTestRequest,
    ) -> Result<SubmitTestResponse, BackendError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Completed(SubmitTestResponse),
    /// Someone (another tab, a previous attempt) got there first.
    AlreadyCompleted,
}

/// Runs a `TestSession` against a backend, checkpointing after every change.
pub struct SessionDriver<B, S> {
    backend: B,
    store: S,
    session: TestSession,
}

impl<B: TestBackend, S: CheckpointStore> SessionDriver<B, S> {
    /// Fetches the test and resumes from the last checkpoint, if any.
    /// Remaining time always comes from the server.
    pub async fn open(backend: B, store: S, instance_id: i64) -> Result<Self, SessionError> {
        let view = backend.fetch_test(instance_id).await?;

        let mut session = TestSession::loading(instance_id);
        session.load(view)?;

        match session.phase() {
            SessionPhase::AlreadyCompleted => store.clear(instance_id).await?,
            _ => {
                if let Some(checkpoint) = load_checkpoint(&store, instance_id).await? {
                    session.restore(checkpoint)?;
                }
            }
        }

        tracing::debug!(instance_id, phase = ?session.phase(), "Session opened");

        Ok(Self {
            backend,
            store,
            session,
        })
    }

    pub fn session(&self) -> &TestSession {
        &self.session
    }

    pub async fn select(&mut self, choice_id: i64) -> Result<(), SessionError> {
        self.session.select(choice_id)?;
        self.persist().await
    }

    pub async fn next(&mut self) -> Result<(), SessionError> {
        self.session.next()?;
        self.persist().await
    }

    pub async fn previous(&mut self) -> Result<(), SessionError> {
        self.session.previous()?;
        self.persist().await
    }

    pub async fn skip(&mut self) -> Result<(), SessionError> {
        self.session.skip()?;
        self.persist().await
    }

    pub async fn go_to(&mut self, index: usize) -> Result<(), SessionError> {
        self.session.go_to(index)?;
        self.persist().await
    }

    pub fn request_submit(&mut self) -> Result<(), SessionError> {
        self.session.request_submit()
    }

    pub fn cancel_submit(&mut self) -> Result<(), SessionError> {
        self.session.cancel_submit()
    }

    pub async fn confirm_submit(&mut self) -> Result<SubmitOutcome, SessionError> {
        self.session.confirm_submit()?;
        self.submit().await
    }

    /// Advances the countdown by one second and submits when it runs out.
    pub async fn tick(&mut self) -> Result<Option<SubmitOutcome>, SessionError> {
        if self.session.tick() {
            return self.submit().await.map(Some);
        }
        Ok(None)
    }

    /// Sends the answers while `Submitting`, e.g. after an expired load or a
    /// failed attempt that was confirmed again.
    pub async fn submit(&mut self) -> Result<SubmitOutcome, SessionError> {
        if self.session.phase() != SessionPhase::Submitting {
            return Err(SessionError::InvalidTransition {
                phase: self.session.phase(),
                action: "submit",
            });
        }

        let instance_id = self.session.instance_id();
        let request = SubmitTestRequest {
            test_kind: self.session.kind(),
            answers: self.session.answer_sets(),
        };

        match self.backend.submit_test(instance_id, &request).await {
            Ok(response) => {
                self.session.submission_succeeded()?;
                self.store.clear(instance_id).await?;
                tracing::info!(instance_id, score = response.score, "Test submitted");
                Ok(SubmitOutcome::Completed(response))
            }
            Err(BackendError::AlreadyCompleted) => {
                self.session.mark_already_completed()?;
                self.store.clear(instance_id).await?;
                Ok(SubmitOutcome::AlreadyCompleted)
            }
            Err(e) => {
                tracing::warn!(instance_id, "Submission failed: {}", e);
                self.session.submission_failed()?;
                Err(e.into())
            }
        }
    }

    async fn persist(&self) -> Result<(), SessionError> {
        self.store.save(&self.session.checkpoint()).await?;
        Ok(())
    }
}

/// Reads the saved progress. A damaged checkpoint is dropped and the session
/// starts with no selections; the server still holds the test itself.
async fn load_checkpoint<S: CheckpointStore>(
    store: &S,
    instance_id: i64,
) -> Result<Option<Checkpoint>, SessionError> {
    match store.load(instance_id).await {
        Ok(checkpoint) => Ok(checkpoint),
        Err(StoreError::Format(e)) => {
            tracing::warn!(instance_id, "Discarding unreadable checkpoint: {}", e);
            store.clear(instance_id).await?;
            Ok(None)
        }
        Err(e) => {
            tracing::warn!(instance_id, "Checkpoint unavailable, starting fresh: {}", e);
            Ok(None)
        }
    }
}
