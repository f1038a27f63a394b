//! Reliability heuristic for a completed evaluation.
//!
//! Starts at 100 and subtracts a fixed penalty for every missing signal.
//! Low-confidence evaluations should be reviewed by a planner before they
//! reach a student; [`FeedbackWorkflow`](crate::workflow::FeedbackWorkflow)
//! applies that policy.

use crate::model::Evaluation;

pub const MISSING_PRONUNCIATION_PENALTY: u8 = 30;
pub const MISSING_GRAMMAR_PENALTY: u8 = 20;
pub const MISSING_VOCABULARY_PENALTY: u8 = 20;
pub const MISSING_STRENGTHS_PENALTY: u8 = 15;
pub const MISSING_IMPROVEMENTS_PENALTY: u8 = 15;
pub const DEGRADED_PENALTY: u8 = 20;

/// Confidence in `evaluation`, 0–100.
pub fn score(evaluation: &Evaluation) -> u8 {
    let penalties = [
        (evaluation.pronunciation().is_none(), MISSING_PRONUNCIATION_PENALTY),
        (
            evaluation.grammar_corrections().map_or(true, |c| c.is_empty()),
            MISSING_GRAMMAR_PENALTY,
        ),
        (evaluation.vocabulary().is_none(), MISSING_VOCABULARY_PENALTY),
        (evaluation.strengths().is_empty(), MISSING_STRENGTHS_PENALTY),
        (
            evaluation.improvement_areas().is_empty(),
            MISSING_IMPROVEMENTS_PENALTY,
        ),
        (evaluation.is_degraded(), DEGRADED_PENALTY),
    ];
    penalties
        .iter()
        .filter(|(missing, _)| *missing)
        .fold(100u8, |confidence, (_, penalty)| confidence.saturating_sub(*penalty))
}

/// Whether an evaluation with this confidence needs a planner's review.
pub fn requires_review(confidence: u8, threshold: u8) -> bool {
    confidence < threshold
}
