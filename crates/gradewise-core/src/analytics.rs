//! Per-student progress statistics over delivered feedback.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Feedback, FeedbackStatus};

/// One delivered feedback in a student's score history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorePoint {
    pub feedback_id: String,
    pub homework_id: String,
    pub score: f64,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentAnalytics {
    pub student_id: String,
    /// Feedback items that reached the student.
    pub feedback_count: usize,
    pub average_score: f64,
    /// Mean planner score per rubric criterion.
    pub criterion_averages: BTreeMap<String, f64>,
    /// Effective scores, oldest first.
    pub trend: Vec<ScorePoint>,
}

/// Aggregate the feedback a student has been sent. Unsent feedback is
/// ignored; with none sent the result is zeroed.
pub fn compute_student_analytics(student_id: &str, feedback: &[Feedback]) -> StudentAnalytics {
    let sent: Vec<&Feedback> = feedback
        .iter()
        .filter(|f| f.student_id == student_id && f.status == FeedbackStatus::SentToStudent)
        .collect();

    if sent.is_empty() {
        return StudentAnalytics {
            student_id: student_id.to_string(),
            ..Default::default()
        };
    }

    let mut trend: Vec<ScorePoint> = sent
        .iter()
        .map(|f| ScorePoint {
            feedback_id: f.id.clone(),
            homework_id: f.homework_id.clone(),
            score: f.effective_score(),
            sent_at: f.sent_at.unwrap_or(f.created_at),
        })
        .collect();
    trend.sort_by_key(|p| p.sent_at);

    let average_score = trend.iter().map(|p| p.score).sum::<f64>() / trend.len() as f64;

    let mut per_criterion: BTreeMap<String, (f64, u32)> = BTreeMap::new();
    for criterion in sent
        .iter()
        .filter_map(|f| f.planner_evaluation.as_ref())
        .flat_map(|p| p.criteria.iter())
    {
        let entry = per_criterion
            .entry(criterion.criterion.clone())
            .or_insert((0.0, 0));
        entry.0 += criterion.score;
        entry.1 += 1;
    }
    let criterion_averages = per_criterion
        .into_iter()
        .map(|(name, (sum, count))| (name, sum / count as f64))
        .collect();

    StudentAnalytics {
        student_id: student_id.to_string(),
        feedback_count: trend.len(),
        average_score,
        criterion_averages,
        trend,
    }
}
