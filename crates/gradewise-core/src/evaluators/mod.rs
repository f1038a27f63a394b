//! Per-answer-type evaluation strategies.
//!
//! Each evaluator turns one answer into an [`EvaluationFragment`]. Evaluators
//! that call external services do so through a
//! [`ResilientClient`](crate::resilience::ResilientClient) and absorb any
//! remaining failure into a [`DegradedFragment`], so evaluation itself never
//! fails.

pub mod audio;
pub mod choice;
pub mod text;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::breaker::BreakerRegistry;
use crate::error::ServiceError;
use crate::model::{
    Answer, AnswerType, ChoiceSummary, GrammarAssessment, PronunciationScore, Question,
    VocabularyFeedback,
};
use crate::resilience::RetryPolicy;
use crate::traits::{ObjectStore, PronunciationAssessor, TextGenerator};

pub use audio::AudioEvaluator;
pub use choice::ChoiceEvaluator;
pub use text::TextEvaluator;

/// Breaker name for the pronunciation-assessment service.
pub const ASSESSMENT_DEPENDENCY: &str = "pronunciation-assessment";
/// Breaker name for the text-generation service.
pub const GENERATION_DEPENDENCY: &str = "text-generation";
/// Breaker name for the object store.
pub const OBJECT_STORE_DEPENDENCY: &str = "object-store";

/// Partial evaluation produced from one answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationFragment {
    pub pronunciation: Option<PronunciationScore>,
    pub grammar: Option<GrammarAssessment>,
    pub vocabulary: Option<VocabularyFeedback>,
    pub choice: Option<ChoiceSummary>,
    pub strengths: Vec<String>,
    pub improvement_areas: Vec<String>,
}

/// Placeholder used when the external service could not be reached.
#[derive(Debug, Clone)]
pub struct DegradedFragment {
    pub question_id: String,
    pub fragment: EvaluationFragment,
    pub error: ServiceError,
}

#[derive(Debug, Clone)]
pub enum FragmentOutcome {
    Scored(EvaluationFragment),
    Degraded(DegradedFragment),
}

impl FragmentOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, FragmentOutcome::Degraded(_))
    }

    pub fn fragment(&self) -> &EvaluationFragment {
        match self {
            FragmentOutcome::Scored(fragment) => fragment,
            FragmentOutcome::Degraded(degraded) => &degraded.fragment,
        }
    }
}

#[async_trait]
pub trait AnswerEvaluator: Send + Sync {
    /// The answer type this evaluator handles.
    fn answer_type(&self) -> AnswerType;

    async fn evaluate(&self, answer: &Answer, question: &Question) -> FragmentOutcome;
}

/// Evaluators keyed by the answer type they handle.
#[derive(Default, Clone)]
pub struct EvaluatorSet {
    evaluators: HashMap<AnswerType, Arc<dyn AnswerEvaluator>>,
}

impl EvaluatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The audio, text and choice evaluators wired to the given services.
    /// Clients share breakers from `registry`.
    pub fn standard(
        assessor: Arc<dyn PronunciationAssessor>,
        generator: Arc<dyn TextGenerator>,
        object_store: Arc<dyn ObjectStore>,
        registry: &BreakerRegistry,
        retry: RetryPolicy,
    ) -> Self {
        Self::new()
            .with(Arc::new(AudioEvaluator::new(
                assessor,
                object_store,
                registry,
                retry.clone(),
            )))
            .with(Arc::new(TextEvaluator::new(generator, registry, retry)))
            .with(Arc::new(ChoiceEvaluator))
    }

    /// Register `evaluator`, replacing any evaluator for the same answer type.
    pub fn with(mut self, evaluator: Arc<dyn AnswerEvaluator>) -> Self {
        self.evaluators.insert(evaluator.answer_type(), evaluator);
        self
    }

    pub fn get(&self, answer_type: AnswerType) -> Option<&Arc<dyn AnswerEvaluator>> {
        self.evaluators.get(&answer_type)
    }
}
