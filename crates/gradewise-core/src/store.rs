//! Document persistence.
//!
//! Submissions, homework and feedback are read and written as whole
//! documents. `MemoryStore` implements every store trait and backs the tests
//! and single-process deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::{Feedback, Homework, Submission};

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn get_submission(&self, id: &str) -> anyhow::Result<Option<Submission>>;
    async fn put_submission(&self, submission: &Submission) -> anyhow::Result<()>;
}

#[async_trait]
pub trait HomeworkStore: Send + Sync {
    async fn get_homework(&self, id: &str) -> anyhow::Result<Option<Homework>>;
}

#[async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn get_feedback(&self, id: &str) -> anyhow::Result<Option<Feedback>>;
    async fn put_feedback(&self, feedback: &Feedback) -> anyhow::Result<()>;
    async fn find_feedback_by_submission(
        &self,
        submission_id: &str,
    ) -> anyhow::Result<Option<Feedback>>;
    async fn find_feedback_by_student(&self, student_id: &str) -> anyhow::Result<Vec<Feedback>>;
}

/// In-memory document store.
#[derive(Default)]
pub struct MemoryStore {
    submissions: RwLock<HashMap<String, Submission>>,
    homework: RwLock<HashMap<String, Homework>>,
    feedback: RwLock<HashMap<String, Feedback>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a homework assignment. Homework is authored elsewhere, so the
    /// store trait exposes no writer for it.
    pub async fn insert_homework(&self, homework: Homework) {
        self.homework
            .write()
            .await
            .insert(homework.id.clone(), homework);
    }

    pub async fn feedback_count(&self) -> usize {
        self.feedback.read().await.len()
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn get_submission(&self, id: &str) -> anyhow::Result<Option<Submission>> {
        Ok(self.submissions.read().await.get(id).cloned())
    }

    async fn put_submission(&self, submission: &Submission) -> anyhow::Result<()> {
        self.submissions
            .write()
            .await
            .insert(submission.id.clone(), submission.clone());
        Ok(())
    }
}

#[async_trait]
impl HomeworkStore for MemoryStore {
    async fn get_homework(&self, id: &str) -> anyhow::Result<Option<Homework>> {
        Ok(self.homework.read().await.get(id).cloned())
    }
}

#[async_trait]
impl FeedbackStore for MemoryStore {
    async fn get_feedback(&self, id: &str) -> anyhow::Result<Option<Feedback>> {
        Ok(self.feedback.read().await.get(id).cloned())
    }

    async fn put_feedback(&self, feedback: &Feedback) -> anyhow::Result<()> {
        self.feedback
            .write()
            .await
            .insert(feedback.id.clone(), feedback.clone());
        Ok(())
    }

    async fn find_feedback_by_submission(
        &self,
        submission_id: &str,
    ) -> anyhow::Result<Option<Feedback>> {
        Ok(self
            .feedback
            .read()
            .await
            .values()
            .find(|f| f.submission_id == submission_id)
            .cloned())
    }

    async fn find_feedback_by_student(&self, student_id: &str) -> anyhow::Result<Vec<Feedback>> {
        Ok(self
            .feedback
            .read()
            .await
            .values()
            .filter(|f| f.student_id == student_id)
            .cloned()
            .collect())
    }
}
