//! Trait definitions for the external services the pipeline consumes.
//!
//! These async traits are implemented over HTTP by `gradewise-providers`.
//! Every call made through them by an evaluator goes through a
//! [`ResilientClient`](crate::resilience::ResilientClient).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

// ---------------------------------------------------------------------------
// Pronunciation assessment
// ---------------------------------------------------------------------------

/// Speech service that scores a recording against a reference transcript.
#[async_trait]
pub trait PronunciationAssessor: Send + Sync {
    /// Human-readable service name (e.g. "azure-speech").
    fn name(&self) -> &str;

    async fn assess(
        &self,
        audio: &[u8],
        reference_text: &str,
    ) -> Result<PronunciationAssessment, ServiceError>;
}

/// Scores returned by a pronunciation-assessment service, all 0–100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PronunciationAssessment {
    pub overall_score: f64,
    pub accuracy_score: f64,
    pub fluency_score: f64,
    pub completeness_score: f64,
    #[serde(default)]
    pub words: Vec<AssessedWord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessedWord {
    pub word: String,
    pub accuracy_score: f64,
    #[serde(default)]
    pub error_type: Option<String>,
}

// ---------------------------------------------------------------------------
// Text generation
// ---------------------------------------------------------------------------

/// Text-generation service: one prompt in, one completion out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, ServiceError>;
}

// ---------------------------------------------------------------------------
// Object store
// ---------------------------------------------------------------------------

/// Resolves an answer's opaque audio reference to bytes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, ServiceError>;
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    FeedbackSent,
}

/// A message for the notification service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub student_id: String,
    pub event: NotificationEvent,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> anyhow::Result<()>;
}
