// src/utils/scoring.rs

use std::collections::BTreeSet;

/// Outcome of scoring one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSummary {
    pub correct_count: usize,
    pub incorrect_count: usize,
    /// Percentage of all questions answered correctly.
    pub score: f64,
    /// Percentage of submitted entries answered correctly.
    pub accuracy: f64,
    /// Correctness per question position.
    pub per_question: Vec<bool>,
}

/// Set equality of two choice-id lists. Order and repeats do not matter.
pub fn is_answer_correct(submitted: &[i64], correct: &[i64]) -> bool {
    let submitted: BTreeSet<i64> = submitted.iter().copied().collect();
    let correct: BTreeSet<i64> = correct.iter().copied().collect();
    submitted == correct
}

/// Scores a submission against the stored answer sets.
///
/// `correct_sets` is in the test's fixed question order. A position with no
/// submitted entry counts as an empty selection. The score divides by the
/// number of questions while the accuracy divides by the number of submitted
/// entries, so the two diverge when a client sends fewer entries.
pub fn score_submission(correct_sets: &[Vec<i64>], submitted: &[Vec<i64>]) -> ScoreSummary {
    let per_question: Vec<bool> = correct_sets
        .iter()
        .enumerate()
        .map(|(i, correct)| {
            let answer = submitted.get(i).map(Vec::as_slice).unwrap_or(&[]);
            is_answer_correct(answer, correct)
        })
        .collect();

    let total = correct_sets.len();
    let correct_count = per_question.iter().filter(|c| **c).count();

    ScoreSummary {
        correct_count,
        incorrect_count: total - correct_count,
        score: percentage(correct_count, total),
        accuracy: percentage(correct_count, submitted.len()),
        per_question,
    }
}

/// `100 * part / whole`, rounded to two decimals. Zero when `whole` is zero.
fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    let raw = part as f64 / whole as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}
