//! In-process service doubles for exercising the pipeline without network
//! access.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use gradewise_core::error::ServiceError;
use gradewise_core::traits::{
    Notification, Notifier, ObjectStore, PronunciationAssessment, PronunciationAssessor,
    TextGenerator,
};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Text generator returning canned completions.
///
/// Responses are chosen by prompt substring, falling back to a default.
/// Queued failures are returned first, one per call.
pub struct MockGenerator {
    responses: Vec<(String, String)>,
    default_response: String,
    failures: Mutex<VecDeque<ServiceError>>,
    call_count: AtomicU32,
    last_prompt: Mutex<Option<String>>,
}

impl MockGenerator {
    pub fn new(responses: Vec<(String, String)>, default_response: &str) -> Self {
        Self {
            responses,
            default_response: default_response.to_string(),
            failures: Mutex::new(VecDeque::new()),
            call_count: AtomicU32::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn with_fixed_response(response: &str) -> Self {
        Self::new(Vec::new(), response)
    }

    /// Fail the next calls with these errors, in order.
    pub fn failing_with(self, failures: impl IntoIterator<Item = ServiceError>) -> Self {
        lock(&self.failures).extend(failures);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_prompt(&self) -> Option<String> {
        lock(&self.last_prompt).clone()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *lock(&self.last_prompt) = Some(prompt.to_string());
        if let Some(error) = lock(&self.failures).pop_front() {
            return Err(error);
        }

        Ok(self
            .responses
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| self.default_response.clone()))
    }
}

/// Pronunciation assessor with a fixed result and optional scripted failures.
pub struct MockAssessor {
    result: Result<PronunciationAssessment, ServiceError>,
    failures: Mutex<VecDeque<ServiceError>>,
    call_count: AtomicU32,
    last_reference: Mutex<Option<String>>,
}

impl MockAssessor {
    pub fn new(assessment: PronunciationAssessment) -> Self {
        Self::with_result(Ok(assessment))
    }

    /// Every call fails with `error`.
    pub fn always_failing(error: ServiceError) -> Self {
        Self::with_result(Err(error))
    }

    fn with_result(result: Result<PronunciationAssessment, ServiceError>) -> Self {
        Self {
            result,
            failures: Mutex::new(VecDeque::new()),
            call_count: AtomicU32::new(0),
            last_reference: Mutex::new(None),
        }
    }

    pub fn failing_with(self, failures: impl IntoIterator<Item = ServiceError>) -> Self {
        lock(&self.failures).extend(failures);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_reference(&self) -> Option<String> {
        lock(&self.last_reference).clone()
    }
}

#[async_trait]
impl PronunciationAssessor for MockAssessor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn assess(
        &self,
        _audio: &[u8],
        reference_text: &str,
    ) -> Result<PronunciationAssessment, ServiceError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *lock(&self.last_reference) = Some(reference_text.to_string());
        if let Some(error) = lock(&self.failures).pop_front() {
            return Err(error);
        }
        self.result.clone()
    }
}

/// Object store backed by a map; unknown keys answer 404.
#[derive(Default)]
pub struct MockObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(self, key: &str, bytes: &[u8]) -> Self {
        lock(&self.objects).insert(key.to_string(), bytes.to_vec());
        self
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, ServiceError> {
        lock(&self.objects)
            .get(key)
            .cloned()
            .ok_or_else(|| ServiceError::ApiError {
                status: 404,
                message: format!("no object at {key}"),
            })
    }
}

/// Notifier that keeps every notification it is handed.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> anyhow::Result<()> {
        tracing::debug!(student = %notification.student_id, "recording notification");
        lock(&self.sent).push(notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gradewise_core::traits::NotificationEvent;

    #[tokio::test]
    async fn generator_matches_prompt_and_replays_failures() {
        let generator = MockGenerator::new(
            vec![("school".to_string(), "STRENGTHS:\n- Clear".to_string())],
            "fallback",
        )
        .failing_with([ServiceError::Timeout(1)]);

        assert!(generator.generate("school").await.is_err());
        assert_eq!(generator.generate("about school").await.unwrap(), "STRENGTHS:\n- Clear");
        assert_eq!(generator.generate("other").await.unwrap(), "fallback");
        assert_eq!(generator.call_count(), 3);
        assert_eq!(generator.last_prompt().as_deref(), Some("other"));
    }

    #[tokio::test]
    async fn assessor_records_reference_text() {
        let assessor = MockAssessor::always_failing(ServiceError::NetworkError("down".into()));
        assert!(assessor.assess(b"x", "I went").await.is_err());
        assert_eq!(assessor.last_reference().as_deref(), Some("I went"));
        assert_eq!(assessor.call_count(), 1);
    }

    #[tokio::test]
    async fn object_store_and_notifier() {
        let store = MockObjectStore::new().with_object("a.wav", b"RIFF");
        assert_eq!(store.fetch("a.wav").await.unwrap(), b"RIFF");
        assert!(store.fetch("b.wav").await.is_err());

        let notifier = RecordingNotifier::new();
        notifier
            .notify(Notification {
                student_id: "s1".into(),
                event: NotificationEvent::FeedbackSent,
                payload: serde_json::json!({}),
            })
            .await
            .unwrap();
        assert_eq!(notifier.sent().len(), 1);
    }
}
