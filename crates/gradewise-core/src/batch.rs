//! Bounded-concurrency evaluation of many submissions.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::model::Evaluation;
use crate::orchestrator::EvaluationOrchestrator;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum submissions evaluated at once.
    pub parallelism: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { parallelism: 4 }
    }
}

/// A submission that could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub id: String,
    pub error: String,
}

/// Every distinct input id lands in exactly one of the two lists.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub successful: Vec<String>,
    pub failed: Vec<BatchFailure>,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.successful.len() + self.failed.len()
    }
}

/// Observer for batch progress.
pub trait BatchProgress: Send + Sync {
    fn on_submission_evaluated(&self, id: &str, evaluation: &Evaluation);
    fn on_submission_failed(&self, id: &str, error: &str);
    fn on_batch_complete(&self, succeeded: usize, failed: usize, elapsed: Duration);
}

pub struct NoopProgress;

impl BatchProgress for NoopProgress {
    fn on_submission_evaluated(&self, _: &str, _: &Evaluation) {}
    fn on_submission_failed(&self, _: &str, _: &str) {}
    fn on_batch_complete(&self, _: usize, _: usize, _: Duration) {}
}

pub struct BatchCoordinator {
    orchestrator: Arc<EvaluationOrchestrator>,
    config: BatchConfig,
}

impl BatchCoordinator {
    pub fn new(orchestrator: Arc<EvaluationOrchestrator>, config: BatchConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    pub async fn batch_evaluate(&self, ids: &[String]) -> BatchOutcome {
        self.batch_evaluate_with_progress(ids, &NoopProgress).await
    }

    /// Evaluate each distinct id; individual failures never abort the batch.
    #[tracing::instrument(skip_all, fields(submissions = ids.len()))]
    pub async fn batch_evaluate_with_progress(
        &self,
        ids: &[String],
        progress: &dyn BatchProgress,
    ) -> BatchOutcome {
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));

        let mut seen = HashSet::new();
        let mut futures = FuturesUnordered::new();
        for id in ids {
            if !seen.insert(id.as_str()) {
                tracing::debug!(submission = %id, "duplicate id in batch, skipping");
                continue;
            }
            let orchestrator = Arc::clone(&self.orchestrator);
            let semaphore = Arc::clone(&semaphore);
            let id = id.clone();
            futures.push(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => orchestrator
                        .evaluate(&id)
                        .await
                        .map_err(|e| e.to_string()),
                    Err(_) => Err("batch semaphore closed".to_string()),
                };
                (id, result)
            });
        }

        let mut outcome = BatchOutcome::default();
        while let Some((id, result)) = futures.next().await {
            match result {
                Ok(evaluation) => {
                    tracing::info!(
                        submission = %id,
                        overall_score = evaluation.overall_score(),
                        "batch item evaluated"
                    );
                    progress.on_submission_evaluated(&id, &evaluation);
                    outcome.successful.push(id);
                }
                Err(error) => {
                    tracing::warn!(submission = %id, "batch item failed: {error}");
                    progress.on_submission_failed(&id, &error);
                    outcome.failed.push(BatchFailure { id, error });
                }
            }
        }

        let elapsed = start.elapsed();
        progress.on_batch_complete(outcome.successful.len(), outcome.failed.len(), elapsed);
        tracing::info!(
            succeeded = outcome.successful.len(),
            failed = outcome.failed.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "batch complete"
        );
        outcome
    }
}
