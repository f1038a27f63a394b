//! Feedback lifecycle: generation, planner review, delivery and analytics.
//!
//! ```text
//! ai_generated ──add_planner_review──▶ planner_reviewed ──send──▶ sent_to_student
//! ```
//!
//! Each operation checks every transition it needs before writing anything,
//! so a rejected call leaves both the feedback and its submission unchanged.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::analytics::{compute_student_analytics, StudentAnalytics};
use crate::confidence;
use crate::error::{PipelineError, PipelineResult};
use crate::model::{
    Feedback, FeedbackStatus, PlannerEvaluation, PlannerFeedback, Submission, SubmissionStatus,
};
use crate::orchestrator::EvaluationOrchestrator;
use crate::store::{FeedbackStore, SubmissionStore};
use crate::traits::{Notification, NotificationEvent, Notifier};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Feedback below this confidence is flagged for planner review.
    pub review_confidence_threshold: u8,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            review_confidence_threshold: 60,
        }
    }
}

pub struct FeedbackWorkflow {
    submissions: Arc<dyn SubmissionStore>,
    feedback: Arc<dyn FeedbackStore>,
    orchestrator: Arc<EvaluationOrchestrator>,
    notifier: Arc<dyn Notifier>,
    config: WorkflowConfig,
    /// One gate per submission with a `generate` call in progress.
    generating: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FeedbackWorkflow {
    pub fn new(
        submissions: Arc<dyn SubmissionStore>,
        feedback: Arc<dyn FeedbackStore>,
        orchestrator: Arc<EvaluationOrchestrator>,
        notifier: Arc<dyn Notifier>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            submissions,
            feedback,
            orchestrator,
            notifier,
            config,
            generating: Mutex::new(HashMap::new()),
        }
    }

    /// Wrap a submission's evaluation as `ai_generated` feedback, evaluating
    /// it first if that has not happened yet.
    ///
    /// Feedback that already exists for the submission is returned unchanged.
    /// Concurrent calls for one submission are serialised, so at most one
    /// feedback record is ever created for it.
    #[instrument(skip(self))]
    pub async fn generate(&self, submission_id: &str) -> PipelineResult<Feedback> {
        let gate = self.generation_gate(submission_id);
        let result = {
            let _held = gate.lock().await;
            self.generate_once(submission_id).await
        };
        self.release_generation_gate(submission_id, gate);
        result
    }

    fn generation_gate(&self, submission_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self.generating.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(gates.entry(submission_id.to_string()).or_default())
    }

    fn release_generation_gate(&self, submission_id: &str, gate: Arc<tokio::sync::Mutex<()>>) {
        let mut gates = self.generating.lock().unwrap_or_else(PoisonError::into_inner);
        // Held only by the map and this caller: nobody is waiting on it.
        if Arc::strong_count(&gate) == 2 {
            gates.remove(submission_id);
        }
    }

    async fn generate_once(&self, submission_id: &str) -> PipelineResult<Feedback> {
        let submission = self.load_submission(submission_id).await?;
        if let Some(existing) = self.feedback.find_feedback_by_submission(submission_id).await? {
            tracing::debug!(feedback = %existing.id, "feedback already generated");
            return Ok(existing);
        }

        let evaluation = match (submission.status, &submission.evaluation) {
            (SubmissionStatus::Submitted, _) => self.orchestrator.evaluate(submission_id).await?,
            (SubmissionStatus::AiEvaluated, Some(evaluation)) => {
                tracing::debug!("using persisted evaluation");
                evaluation.clone()
            }
            (status, _) => {
                return Err(PipelineError::InvalidState(format!(
                    "submission {submission_id} is {status} but has no feedback"
                )))
            }
        };
        let confidence = confidence::score(&evaluation);
        let requires_review =
            confidence::requires_review(confidence, self.config.review_confidence_threshold);

        let feedback = Feedback {
            id: Uuid::new_v4().to_string(),
            submission_id: submission.id.clone(),
            student_id: submission.student_id.clone(),
            homework_id: submission.homework_id.clone(),
            planner_id: None,
            ai_evaluation: evaluation,
            confidence,
            requires_review,
            planner_evaluation: None,
            status: FeedbackStatus::AiGenerated,
            student_viewed: false,
            viewed_at: None,
            created_at: Utc::now(),
            reviewed_at: None,
            sent_at: None,
        };
        self.feedback.put_feedback(&feedback).await?;

        tracing::info!(
            feedback = %feedback.id,
            confidence,
            requires_review,
            "feedback generated"
        );
        Ok(feedback)
    }

    /// Record a planner's review and mark the submission reviewed.
    #[instrument(skip(self, review), fields(planner = %review.planner_id))]
    pub async fn add_planner_review(
        &self,
        feedback_id: &str,
        review: PlannerEvaluation,
    ) -> PipelineResult<Feedback> {
        validate_review(&review)?;

        let mut feedback = self.load_feedback(feedback_id).await?;
        let mut submission = self.load_submission(&feedback.submission_id).await?;
        feedback.advance(FeedbackStatus::PlannerReviewed)?;
        submission.advance(SubmissionStatus::Reviewed)?;

        let now = Utc::now();
        submission.planner_feedback = Some(PlannerFeedback {
            score: review.score,
            comments: review.comments.clone(),
            reviewed_at: now,
        });
        feedback.planner_id = Some(review.planner_id.clone());
        feedback.planner_evaluation = Some(review);
        feedback.reviewed_at = Some(now);

        self.feedback.put_feedback(&feedback).await?;
        self.submissions.put_submission(&submission).await?;

        tracing::info!(score = feedback.effective_score(), "planner review recorded");
        Ok(feedback)
    }

    /// Deliver reviewed feedback and notify the student.
    #[instrument(skip(self))]
    pub async fn send(&self, feedback_id: &str) -> PipelineResult<Feedback> {
        let mut feedback = self.load_feedback(feedback_id).await?;
        let mut submission = self.load_submission(&feedback.submission_id).await?;
        feedback.advance(FeedbackStatus::SentToStudent)?;
        submission.advance(SubmissionStatus::Completed)?;

        feedback.sent_at = Some(Utc::now());
        self.feedback.put_feedback(&feedback).await?;
        self.submissions.put_submission(&submission).await?;

        let notification = Notification {
            student_id: feedback.student_id.clone(),
            event: NotificationEvent::FeedbackSent,
            payload: serde_json::json!({
                "feedback_id": feedback.id,
                "homework_id": feedback.homework_id,
                "score": feedback.effective_score(),
            }),
        };
        // Delivery is already committed; a lost notification is not fatal.
        if let Err(e) = self.notifier.notify(notification).await {
            tracing::warn!("failed to notify student {}: {e:#}", feedback.student_id);
        }

        tracing::info!("feedback sent");
        Ok(feedback)
    }

    /// Record that the student opened the feedback. Repeat calls keep the
    /// first view time.
    #[instrument(skip(self))]
    pub async fn mark_viewed(&self, feedback_id: &str) -> PipelineResult<Feedback> {
        let mut feedback = self.load_feedback(feedback_id).await?;
        if feedback.status != FeedbackStatus::SentToStudent {
            return Err(PipelineError::InvalidState(format!(
                "feedback {feedback_id} is {} and has not been sent",
                feedback.status
            )));
        }
        if feedback.student_viewed {
            return Ok(feedback);
        }
        feedback.student_viewed = true;
        feedback.viewed_at = Some(Utc::now());
        self.feedback.put_feedback(&feedback).await?;
        Ok(feedback)
    }

    #[instrument(skip(self))]
    pub async fn analytics(&self, student_id: &str) -> PipelineResult<StudentAnalytics> {
        let feedback = self.feedback.find_feedback_by_student(student_id).await?;
        Ok(compute_student_analytics(student_id, &feedback))
    }

    async fn load_submission(&self, id: &str) -> PipelineResult<Submission> {
        self.submissions
            .get_submission(id)
            .await?
            .ok_or_else(|| PipelineError::not_found("submission", id))
    }

    async fn load_feedback(&self, id: &str) -> PipelineResult<Feedback> {
        self.feedback
            .get_feedback(id)
            .await?
            .ok_or_else(|| PipelineError::not_found("feedback", id))
    }
}

fn validate_review(review: &PlannerEvaluation) -> PipelineResult<()> {
    let in_range = |score: f64| (0.0..=100.0).contains(&score);
    if !in_range(review.score) {
        return Err(PipelineError::Validation(format!(
            "score {} is outside 0-100",
            review.score
        )));
    }
    if let Some(bad) = review.criteria.iter().find(|c| !in_range(c.score)) {
        return Err(PipelineError::Validation(format!(
            "criterion '{}' score {} is outside 0-100",
            bad.criterion, bad.score
        )));
    }
    Ok(())
}
