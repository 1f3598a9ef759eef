// src/session/mod.rs

//! Client-held test-taking session.
//!
//! `TestSession` is a synchronous state machine over a loaded test view.
//! `SessionDriver` runs it against a backend and checkpoints the learner's
//! progress so a reload resumes where it stopped.

pub mod driver;
pub mod store;

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use serde::{Deserialize, Serialize};

use crate::models::{
    question::PublicQuestion,
    test_instance::{TestKind, TestView, TimingMode},
};

pub use driver::{BackendError, SessionDriver, SubmitOutcome, TestBackend};
pub use store::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Loading,
    InProgress,
    ConfirmingSubmit,
    Submitting,
    Completed,
    /// The server already holds a result for this test.
    AlreadyCompleted,
}

/// Learner progress that survives a reload. Timing is never stored here,
/// the server recomputes it on every load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub instance_id: i64,
    pub pointer: usize,
    /// Selected choice ids keyed by question id.
    pub selections: BTreeMap<i64, Vec<i64>>,
}

#[derive(Debug)]
pub enum SessionError {
    InvalidTransition {
        phase: SessionPhase,
        action: &'static str,
    },
    UnknownChoice(i64),
    InstanceMismatch {
        expected: i64,
        found: i64,
    },
    Backend(BackendError),
    Store(StoreError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::InvalidTransition { phase, action } => {
                write!(f, "cannot {} while {:?}", action, phase)
            }
            SessionError::UnknownChoice(id) => {
                write!(f, "choice {} does not belong to the current question", id)
            }
            SessionError::InstanceMismatch { expected, found } => {
                write!(f, "expected test {} but got {}", expected, found)
            }
            SessionError::Backend(e) => write!(f, "backend error: {}", e),
            SessionError::Store(e) => write!(f, "checkpoint error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<BackendError> for SessionError {
    fn from(e: BackendError) -> Self {
        SessionError::Backend(e)
    }
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        SessionError::Store(e)
    }
}

#[derive(Debug, Clone)]
pub struct TestSession {
    instance_id: i64,
    kind: TestKind,
    timing_mode: TimingMode,
    phase: SessionPhase,
    questions: Vec<PublicQuestion>,
    pointer: usize,
    selections: BTreeMap<i64, BTreeSet<i64>>,
    remaining_seconds: Option<i64>,
}

impl TestSession {
    pub fn loading(instance_id: i64) -> Self {
        Self {
            instance_id,
            kind: TestKind::Standard,
            timing_mode: TimingMode::Untimed,
            phase: SessionPhase::Loading,
            questions: Vec::new(),
            pointer: 0,
            selections: BTreeMap::new(),
            remaining_seconds: None,
        }
    }

    /// Enters the session from a fetched view.
    ///
    /// A completed test goes straight to `AlreadyCompleted`. A timed test whose
    /// deadline has already passed goes straight to `Submitting`.
    pub fn load(&mut self, view: TestView) -> Result<(), SessionError> {
        self.expect_phase(SessionPhase::Loading, "load")?;
        if view.id != self.instance_id {
            return Err(SessionError::InstanceMismatch {
                expected: self.instance_id,
                found: view.id,
            });
        }

        self.kind = view.kind;
        self.timing_mode = view.timing_mode;
        self.questions = view.questions;
        self.pointer = 0;
        self.selections.clear();

        if view.is_completed {
            self.remaining_seconds = None;
            self.phase = SessionPhase::AlreadyCompleted;
            return Ok(());
        }

        self.remaining_seconds = if view.timing_mode.is_timed() {
            Some(view.remaining_seconds.unwrap_or(0).max(0))
        } else {
            None
        };

        self.phase = if self.remaining_seconds == Some(0) {
            SessionPhase::Submitting
        } else {
            SessionPhase::InProgress
        };
        Ok(())
    }

    /// Re-applies saved progress. Selections for unknown questions or choices
    /// are dropped and the pointer is clamped to the question list.
    ///
    /// Also allowed while `Submitting` so a test reopened past its deadline
    /// still sends the answers given before the reload.
    pub fn restore(&mut self, checkpoint: Checkpoint) -> Result<(), SessionError> {
        if !matches!(self.phase, SessionPhase::InProgress | SessionPhase::Submitting) {
            return Err(SessionError::InvalidTransition {
                phase: self.phase,
                action: "restore",
            });
        }
        if checkpoint.instance_id != self.instance_id {
            return Err(SessionError::InstanceMismatch {
                expected: self.instance_id,
                found: checkpoint.instance_id,
            });
        }

        self.selections.clear();
        for question in &self.questions {
            let Some(saved) = checkpoint.selections.get(&question.id) else {
                continue;
            };
            let mut chosen: BTreeSet<i64> = saved
                .iter()
                .copied()
                .filter(|id| question.choices.iter().any(|c| c.id == *id))
                .collect();
            if !question.is_multiple_answer && chosen.len() > 1 {
                chosen = chosen.into_iter().take(1).collect();
            }
            if !chosen.is_empty() {
                self.selections.insert(question.id, chosen);
            }
        }
        self.pointer = checkpoint.pointer.min(self.last_index());
        Ok(())
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            instance_id: self.instance_id,
            pointer: self.pointer,
            selections: self
                .selections
                .iter()
                .map(|(question_id, chosen)| (*question_id, chosen.iter().copied().collect()))
                .collect(),
        }
    }

    pub fn instance_id(&self) -> i64 {
        self.instance_id
    }

    pub fn kind(&self) -> TestKind {
        self.kind
    }

    pub fn timing_mode(&self) -> TimingMode {
        self.timing_mode
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn questions(&self) -> &[PublicQuestion] {
        &self.questions
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn remaining_seconds(&self) -> Option<i64> {
        self.remaining_seconds
    }

    pub fn current_question(&self) -> Option<&PublicQuestion> {
        self.questions.get(self.pointer)
    }

    /// Currently selected choices of a question, in id order.
    pub fn selected(&self, question_id: i64) -> Vec<i64> {
        self.selections
            .get(&question_id)
            .map(|chosen| chosen.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Selects a choice of the current question.
    ///
    /// Single-answer questions keep at most one choice, so a new pick replaces
    /// the old one. Multi-answer questions toggle the choice.
    pub fn select(&mut self, choice_id: i64) -> Result<(), SessionError> {
        self.expect_phase(SessionPhase::InProgress, "select")?;
        let question = self
            .questions
            .get(self.pointer)
            .ok_or(SessionError::UnknownChoice(choice_id))?;
        if !question.choices.iter().any(|c| c.id == choice_id) {
            return Err(SessionError::UnknownChoice(choice_id));
        }

        let chosen = self.selections.entry(question.id).or_default();
        if question.is_multiple_answer {
            if !chosen.remove(&choice_id) {
                chosen.insert(choice_id);
            }
        } else {
            chosen.clear();
            chosen.insert(choice_id);
        }
        if chosen.is_empty() {
            self.selections.remove(&question.id);
        }
        Ok(())
    }

    pub fn next(&mut self) -> Result<(), SessionError> {
        self.expect_phase(SessionPhase::InProgress, "move to the next question")?;
        self.pointer = (self.pointer + 1).min(self.last_index());
        Ok(())
    }

    pub fn previous(&mut self) -> Result<(), SessionError> {
        self.expect_phase(SessionPhase::InProgress, "move to the previous question")?;
        self.pointer = self.pointer.saturating_sub(1);
        Ok(())
    }

    /// Moves on leaving the current question as it is.
    pub fn skip(&mut self) -> Result<(), SessionError> {
        self.expect_phase(SessionPhase::InProgress, "skip")?;
        self.pointer = (self.pointer + 1).min(self.last_index());
        Ok(())
    }

    pub fn go_to(&mut self, index: usize) -> Result<(), SessionError> {
        self.expect_phase(SessionPhase::InProgress, "jump")?;
        self.pointer = index.min(self.last_index());
        Ok(())
    }

    /// One second of countdown. Returns true when the deadline forced the
    /// session into `Submitting`.
    pub fn tick(&mut self) -> bool {
        if !matches!(
            self.phase,
            SessionPhase::InProgress | SessionPhase::ConfirmingSubmit
        ) {
            return false;
        }
        let Some(remaining) = self.remaining_seconds.as_mut() else {
            return false;
        };

        *remaining = (*remaining - 1).max(0);
        if *remaining == 0 {
            self.phase = SessionPhase::Submitting;
            return true;
        }
        false
    }

    pub fn request_submit(&mut self) -> Result<(), SessionError> {
        self.transition(SessionPhase::InProgress, SessionPhase::ConfirmingSubmit, "request submission")
    }

    pub fn confirm_submit(&mut self) -> Result<(), SessionError> {
        self.transition(SessionPhase::ConfirmingSubmit, SessionPhase::Submitting, "confirm submission")
    }

    pub fn cancel_submit(&mut self) -> Result<(), SessionError> {
        self.transition(SessionPhase::ConfirmingSubmit, SessionPhase::InProgress, "cancel submission")
    }

    /// One answer set per question in the test's fixed order. Unanswered
    /// questions give an empty set.
    pub fn answer_sets(&self) -> Vec<Vec<i64>> {
        self.questions.iter().map(|q| self.selected(q.id)).collect()
    }

    pub fn submission_succeeded(&mut self) -> Result<(), SessionError> {
        self.transition(SessionPhase::Submitting, SessionPhase::Completed, "complete")
    }

    /// The submission can be retried; selections are kept.
    pub fn submission_failed(&mut self) -> Result<(), SessionError> {
        self.transition(SessionPhase::Submitting, SessionPhase::InProgress, "resume after a failed submission")
    }

    pub fn mark_already_completed(&mut self) -> Result<(), SessionError> {
        self.transition(SessionPhase::Submitting, SessionPhase::AlreadyCompleted, "mark as already completed")
    }

    fn last_index(&self) -> usize {
        self.questions.len().saturating_sub(1)
    }

    fn expect_phase(&self, phase: SessionPhase, action: &'static str) -> Result<(), SessionError> {
        if self.phase != phase {
            return Err(SessionError::InvalidTransition {
                phase: self.phase,
                action,
            });
        }
        Ok(())
    }

    fn transition(
        &mut self,
        from: SessionPhase,
        to: SessionPhase,
        action: &'static str,
    ) -> Result<(), SessionError> {
        self.expect_phase(from, action)?;
        self.phase = to;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::question::PublicChoice;
    use chrono::Utc;

    pub(crate) fn question(id: i64, multiple: bool, choices: &[i64]) -> PublicQuestion {
        PublicQuestion {
            id,
            title: format!("q{}", id),
            prompt: format!("Question {}", id),
            is_multiple_answer: multiple,
            choices: choices
                .iter()
                .map(|c| PublicChoice {
                    id: *c,
                    text: format!("choice {}", c),
                })
                .collect(),
        }
    }

    pub(crate) fn view(id: i64, timing_mode: TimingMode, remaining: Option<i64>) -> TestView {
        TestView {
            id,
            topic_id: 1,
            kind: TestKind::Standard,
            timing_mode,
            duration_seconds: remaining.unwrap_or(0),
            remaining_seconds: remaining,
            is_completed: false,
            created_at: Utc::now(),
            questions: vec![
                question(10, false, &[101, 102, 103]),
                question(20, true, &[201, 202, 203]),
                question(30, false, &[301, 302]),
            ],
        }
    }

    fn started(timing_mode: TimingMode, remaining: Option<i64>) -> TestSession {
        let mut session = TestSession::loading(5);
        session.load(view(5, timing_mode, remaining)).unwrap();
        session
    }

    #[test]
    fn load_enters_progress_with_server_time() {
        let session = started(TimingMode::Timed, Some(90));
        assert_eq!(session.phase(), SessionPhase::InProgress);
        assert_eq!(session.remaining_seconds(), Some(90));
        assert_eq!(session.questions().len(), 3);

        let untimed = started(TimingMode::Untimed, Some(90));
        assert_eq!(untimed.remaining_seconds(), None);
    }

    #[test]
    fn completed_view_is_terminal() {
        let mut v = view(5, TimingMode::Untimed, None);
        v.is_completed = true;
        let mut session = TestSession::loading(5);
        session.load(v).unwrap();
        assert_eq!(session.phase(), SessionPhase::AlreadyCompleted);
        assert!(session.select(101).is_err());
    }

    #[test]
    fn expired_view_submits_immediately() {
        let session = started(TimingMode::Timed, Some(0));
        assert_eq!(session.phase(), SessionPhase::Submitting);
    }

    #[test]
    fn load_rejects_another_instance() {
        let mut session = TestSession::loading(5);
        assert!(matches!(
            session.load(view(6, TimingMode::Untimed, None)),
            Err(SessionError::InstanceMismatch { expected: 5, found: 6 })
        ));
    }

    #[test]
    fn single_answer_selection_replaces() {
        let mut session = started(TimingMode::Untimed, None);
        session.select(101).unwrap();
        session.select(103).unwrap();
        assert_eq!(session.selected(10), vec![103]);
    }

    #[test]
    fn multi_answer_selection_toggles() {
        let mut session = started(TimingMode::Untimed, None);
        session.next().unwrap();
        session.select(203).unwrap();
        session.select(201).unwrap();
        assert_eq!(session.selected(20), vec![201, 203]);
        session.select(203).unwrap();
        assert_eq!(session.selected(20), vec![201]);
    }

    #[test]
    fn foreign_choice_is_rejected() {
        let mut session = started(TimingMode::Untimed, None);
        assert!(matches!(session.select(201), Err(SessionError::UnknownChoice(201))));
    }

    #[test]
    fn navigation_is_clamped_and_keeps_selections() {
        let mut session = started(TimingMode::Untimed, None);
        session.select(102).unwrap();
        session.previous().unwrap();
        assert_eq!(session.pointer(), 0);
        session.skip().unwrap();
        session.next().unwrap();
        session.next().unwrap();
        assert_eq!(session.pointer(), 2);
        assert_eq!(session.selected(10), vec![102]);
    }

    #[test]
    fn answer_sets_follow_question_order() {
        let mut session = started(TimingMode::Untimed, None);
        session.go_to(2).unwrap();
        session.select(302).unwrap();
        session.go_to(1).unwrap();
        session.select(202).unwrap();
        session.select(201).unwrap();
        assert_eq!(session.answer_sets(), vec![vec![], vec![201, 202], vec![302]]);
    }

    #[test]
    fn confirmation_can_be_cancelled() {
        let mut session = started(TimingMode::Untimed, None);
        session.select(101).unwrap();
        session.request_submit().unwrap();
        assert_eq!(session.phase(), SessionPhase::ConfirmingSubmit);
        assert!(session.select(102).is_err());
        session.cancel_submit().unwrap();
        assert_eq!(session.phase(), SessionPhase::InProgress);
        assert_eq!(session.selected(10), vec![101]);

        session.request_submit().unwrap();
        session.confirm_submit().unwrap();
        assert_eq!(session.phase(), SessionPhase::Submitting);
    }

    #[test]
    fn countdown_forces_submission() {
        let mut session = started(TimingMode::Timed, Some(2));
        assert!(!session.tick());
        assert_eq!(session.remaining_seconds(), Some(1));
        session.request_submit().unwrap();
        assert!(session.tick());
        assert_eq!(session.phase(), SessionPhase::Submitting);
        assert!(!session.tick());
    }

    #[test]
    fn untimed_tick_does_nothing() {
        let mut session = started(TimingMode::Untimed, None);
        assert!(!session.tick());
        assert_eq!(session.phase(), SessionPhase::InProgress);
    }

    #[test]
    fn failed_submission_is_retryable() {
        let mut session = started(TimingMode::Untimed, None);
        session.select(101).unwrap();
        session.request_submit().unwrap();
        session.confirm_submit().unwrap();
        session.submission_failed().unwrap();
        assert_eq!(session.phase(), SessionPhase::InProgress);
        assert_eq!(session.answer_sets()[0], vec![101]);

        session.request_submit().unwrap();
        session.confirm_submit().unwrap();
        session.submission_succeeded().unwrap();
        assert_eq!(session.phase(), SessionPhase::Completed);
        assert!(session.submission_failed().is_err());
    }

    #[test]
    fn restore_filters_stale_entries() {
        let mut session = started(TimingMode::Untimed, None);
        let checkpoint = Checkpoint {
            instance_id: 5,
            pointer: 40,
            selections: BTreeMap::from([
                (10, vec![101, 102]),
                (20, vec![201, 999]),
                (77, vec![1]),
            ]),
        };
        session.restore(checkpoint).unwrap();
        assert_eq!(session.pointer(), 2);
        assert_eq!(session.selected(10), vec![101]);
        assert_eq!(session.selected(20), vec![201]);
        assert_eq!(session.selected(77), Vec::<i64>::new());
    }

    #[test]
    fn expired_session_restores_saved_answers() {
        let mut session = started(TimingMode::Timed, Some(0));
        session
            .restore(Checkpoint {
                instance_id: 5,
                pointer: 1,
                selections: BTreeMap::from([(10, vec![101]), (20, vec![202, 201]), (30, vec![302])]),
            })
            .unwrap();
        assert_eq!(session.phase(), SessionPhase::Submitting);
        assert_eq!(session.answer_sets(), vec![vec![101], vec![201, 202], vec![302]]);
    }

    #[test]
    fn completed_session_refuses_restore() {
        let mut v = view(5, TimingMode::Untimed, None);
        v.is_completed = true;
        let mut session = TestSession::loading(5);
        session.load(v).unwrap();
        let checkpoint = Checkpoint {
            instance_id: 5,
            pointer: 0,
            selections: BTreeMap::new(),
        };
        assert!(matches!(
            session.restore(checkpoint),
            Err(SessionError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn checkpoint_captures_progress() {
        let mut session = started(TimingMode::Untimed, None);
        session.select(103).unwrap();
        session.next().unwrap();
        let checkpoint = session.checkpoint();
        assert_eq!(checkpoint.instance_id, 5);
        assert_eq!(checkpoint.pointer, 1);
        assert_eq!(checkpoint.selections.get(&10), Some(&vec![103]));

        let json = serde_json::to_string(&checkpoint).unwrap();
        let back: Checkpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, checkpoint);
    }
}
