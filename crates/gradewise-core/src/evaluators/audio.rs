//! Spoken answers scored by the pronunciation-assessment service.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use super::{
    AnswerEvaluator, DegradedFragment, EvaluationFragment, FragmentOutcome,
    ASSESSMENT_DEPENDENCY, OBJECT_STORE_DEPENDENCY,
};
use crate::breaker::BreakerRegistry;
use crate::model::{Answer, AnswerType, PronunciationScore, Question, WordScore, FALLBACK_OVERALL_SCORE};
use crate::resilience::{ResilientClient, RetryPolicy};
use crate::traits::{ObjectStore, PronunciationAssessment, PronunciationAssessor};

/// Words scoring below this are listed for practice.
const WORD_PRACTICE_THRESHOLD: f64 = 60.0;
const MAX_PRACTICE_WORDS: usize = 5;

pub struct AudioEvaluator {
    assessor: Arc<dyn PronunciationAssessor>,
    object_store: Arc<dyn ObjectStore>,
    assessment: ResilientClient,
    storage: ResilientClient,
}

impl AudioEvaluator {
    pub fn new(
        assessor: Arc<dyn PronunciationAssessor>,
        object_store: Arc<dyn ObjectStore>,
        registry: &BreakerRegistry,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            assessor,
            object_store,
            assessment: ResilientClient::new(registry, ASSESSMENT_DEPENDENCY, retry.clone()),
            storage: ResilientClient::new(registry, OBJECT_STORE_DEPENDENCY, retry),
        }
    }
}

#[async_trait]
impl AnswerEvaluator for AudioEvaluator {
    fn answer_type(&self) -> AnswerType {
        AnswerType::Audio
    }

    #[instrument(skip_all, fields(question = %question.id))]
    async fn evaluate(&self, answer: &Answer, question: &Question) -> FragmentOutcome {
        let reference = question
            .target_answer
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&question.prompt);

        let assessed = async {
            let audio = self
                .storage
                .call(|| self.object_store.fetch(&answer.content))
                .await?;
            self.assessment
                .call(|| self.assessor.assess(&audio, reference))
                .await
        }
        .await;

        match assessed {
            Ok(assessment) => FragmentOutcome::Scored(fragment_from_assessment(&assessment)),
            Err(error) => {
                tracing::warn!(
                    assessor = self.assessor.name(),
                    "pronunciation assessment unavailable, degrading: {error}"
                );
                FragmentOutcome::Degraded(DegradedFragment {
                    question_id: question.id.clone(),
                    fragment: degraded_fragment(&question.id),
                    error,
                })
            }
        }
    }
}

/// Short feedback sentence for an overall pronunciation score.
pub fn pronunciation_band(score: f64) -> &'static str {
    if score >= 90.0 {
        "Excellent pronunciation! Your speech is clear and natural."
    } else if score >= 80.0 {
        "Good pronunciation with only minor issues."
    } else if score >= 70.0 {
        "Developing pronunciation. Keep practising the highlighted words."
    } else {
        "Pronunciation needs work. Listen to the model audio and try again."
    }
}

fn fragment_from_assessment(assessment: &PronunciationAssessment) -> EvaluationFragment {
    let words: Vec<WordScore> = assessment
        .words
        .iter()
        .map(|w| WordScore {
            word: w.word.clone(),
            accuracy: w.accuracy_score,
            error_type: w
                .error_type
                .clone()
                .filter(|e| !e.eq_ignore_ascii_case("none")),
        })
        .collect();

    let mut strengths = Vec::new();
    let mut improvement_areas = Vec::new();

    if assessment.fluency_score >= 80.0 {
        strengths.push("Speaks fluently with a natural rhythm".to_string());
    } else if assessment.fluency_score < 60.0 {
        improvement_areas.push("Practise speaking more smoothly, with fewer pauses".to_string());
    }
    if assessment.accuracy_score >= 85.0 {
        strengths.push("Accurate pronunciation of individual sounds".to_string());
    }
    if assessment.completeness_score < 80.0 {
        improvement_areas.push("Read the complete passage without skipping words".to_string());
    }

    let mut practice: Vec<&str> = Vec::new();
    for word in &words {
        let flagged = word.accuracy < WORD_PRACTICE_THRESHOLD || word.error_type.is_some();
        if flagged && !practice.contains(&word.word.as_str()) {
            practice.push(&word.word);
        }
    }
    if !practice.is_empty() {
        practice.truncate(MAX_PRACTICE_WORDS);
        improvement_areas.push(format!("Practise these words: {}", practice.join(", ")));
    }

    EvaluationFragment {
        pronunciation: Some(PronunciationScore {
            overall_score: assessment.overall_score,
            accuracy: assessment.accuracy_score,
            fluency: assessment.fluency_score,
            completeness: assessment.completeness_score,
            words,
            feedback: pronunciation_band(assessment.overall_score).to_string(),
        }),
        strengths,
        improvement_areas,
        ..Default::default()
    }
}

fn degraded_fragment(question_id: &str) -> EvaluationFragment {
    EvaluationFragment {
        pronunciation: Some(PronunciationScore {
            overall_score: FALLBACK_OVERALL_SCORE,
            accuracy: FALLBACK_OVERALL_SCORE,
            fluency: FALLBACK_OVERALL_SCORE,
            completeness: FALLBACK_OVERALL_SCORE,
            words: Vec::new(),
            feedback: "Pronunciation could not be assessed automatically.".to_string(),
        }),
        improvement_areas: vec![format!(
            "Your recording for question {question_id} could not be assessed. Please re-submit your recording."
        )],
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerConfig;
    use crate::error::ServiceError;
    use crate::traits::AssessedWord;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedStore;

    #[async_trait]
    impl ObjectStore for FixedStore {
        async fn fetch(&self, _key: &str) -> Result<Vec<u8>, ServiceError> {
            Ok(vec![0u8; 16])
        }
    }

    struct ScriptedAssessor {
        result: Result<PronunciationAssessment, ServiceError>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl PronunciationAssessor for ScriptedAssessor {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn assess(
            &self,
            _audio: &[u8],
            _reference_text: &str,
        ) -> Result<PronunciationAssessment, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn question() -> Question {
        Question {
            id: "q1".into(),
            prompt: "Read: I went to school".into(),
            answer_type: AnswerType::Audio,
            target_answer: Some("I went to school".into()),
            options: vec![],
        }
    }

    fn evaluator(result: Result<PronunciationAssessment, ServiceError>) -> (AudioEvaluator, Arc<ScriptedAssessor>) {
        let assessor = Arc::new(ScriptedAssessor {
            result,
            calls: AtomicU32::new(0),
        });
        let registry = BreakerRegistry::new(BreakerConfig::default());
        let evaluator = AudioEvaluator::new(
            assessor.clone(),
            Arc::new(FixedStore),
            &registry,
            RetryPolicy {
                max_retries: 2,
                initial_delay_ms: 10,
                max_delay_ms: 100,
            },
        );
        (evaluator, assessor)
    }

    #[test]
    fn bands() {
        assert!(pronunciation_band(95.0).starts_with("Excellent"));
        assert!(pronunciation_band(90.0).starts_with("Excellent"));
        assert!(pronunciation_band(85.0).starts_with("Good"));
        assert!(pronunciation_band(72.0).starts_with("Developing"));
        assert!(pronunciation_band(40.0).contains("needs work"));
    }

    #[tokio::test]
    async fn maps_assessment_into_fragment() {
        let (evaluator, _) = evaluator(Ok(PronunciationAssessment {
            overall_score: 84.0,
            accuracy_score: 88.0,
            fluency_score: 55.0,
            completeness_score: 100.0,
            words: vec![
                AssessedWord {
                    word: "went".into(),
                    accuracy_score: 45.0,
                    error_type: Some("Mispronunciation".into()),
                },
                AssessedWord {
                    word: "school".into(),
                    accuracy_score: 97.0,
                    error_type: Some("None".into()),
                },
            ],
        }));

        let outcome = evaluator
            .evaluate(&Answer::audio("q1", "audio/q1.wav", Some(3.0)), &question())
            .await;
        assert!(!outcome.is_degraded());

        let fragment = outcome.fragment();
        let pron = fragment.pronunciation.as_ref().unwrap();
        assert_eq!(pron.overall_score, 84.0);
        assert!(pron.feedback.starts_with("Good"));
        assert_eq!(pron.words.len(), 2);
        assert_eq!(pron.words[1].error_type, None);
        assert!(fragment
            .strengths
            .contains(&"Accurate pronunciation of individual sounds".to_string()));
        assert!(fragment
            .improvement_areas
            .iter()
            .any(|a| a.contains("fewer pauses")));
        assert!(fragment
            .improvement_areas
            .contains(&"Practise these words: went".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn service_outage_degrades_to_neutral_score() {
        let (evaluator, assessor) = evaluator(Err(ServiceError::Timeout(30)));

        let outcome = evaluator
            .evaluate(&Answer::audio("q1", "audio/q1.wav", None), &question())
            .await;

        let FragmentOutcome::Degraded(degraded) = outcome else {
            panic!("expected degraded outcome");
        };
        assert_eq!(assessor.calls.load(Ordering::SeqCst), 3);
        assert!(matches!(degraded.error, ServiceError::Timeout(30)));
        assert_eq!(
            degraded.fragment.pronunciation.unwrap().overall_score,
            FALLBACK_OVERALL_SCORE
        );
        assert!(degraded.fragment.improvement_areas[0].contains("re-submit"));
    }
}
