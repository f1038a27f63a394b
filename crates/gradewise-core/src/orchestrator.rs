//! Drives one submission through its evaluators.
//!
//! Answers are independent, so every answer is evaluated concurrently and the
//! fragments are merged into one [`Evaluation`] once all have finished. AI
//! outages never surface here; they arrive as degraded fragments.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::join_all;
use tracing::instrument;

use crate::error::{PipelineError, PipelineResult};
use crate::evaluators::audio::pronunciation_band;
use crate::evaluators::{EvaluatorSet, FragmentOutcome};
use crate::model::{
    ChoiceSummary, Evaluation, EvaluationParts, GrammarAssessment, PronunciationScore,
    SubmissionStatus, VocabularyFeedback,
};
use crate::store::{HomeworkStore, SubmissionStore};

/// Evaluates submissions and records the result on them.
pub struct EvaluationOrchestrator {
    submissions: Arc<dyn SubmissionStore>,
    homework: Arc<dyn HomeworkStore>,
    evaluators: EvaluatorSet,
    in_flight: Mutex<HashSet<String>>,
}

/// Exclusive right to evaluate one submission, released on drop.
struct Claim<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    submission_id: String,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.submission_id);
    }
}

impl EvaluationOrchestrator {
    pub fn new(
        submissions: Arc<dyn SubmissionStore>,
        homework: Arc<dyn HomeworkStore>,
        evaluators: EvaluatorSet,
    ) -> Self {
        Self {
            submissions,
            homework,
            evaluators,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    fn claim(&self, submission_id: &str) -> PipelineResult<Claim<'_>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(submission_id.to_string()) {
            return Err(PipelineError::InvalidState(format!(
                "submission {submission_id} is already being evaluated"
            )));
        }
        Ok(Claim {
            in_flight: &self.in_flight,
            submission_id: submission_id.to_string(),
        })
    }

    /// Evaluate a `submitted` submission and advance it to `ai_evaluated`.
    ///
    /// Submissions that were already evaluated, or are being evaluated by
    /// another caller, are rejected with [`PipelineError::InvalidState`] and
    /// left untouched.
    #[instrument(skip(self))]
    pub async fn evaluate(&self, submission_id: &str) -> PipelineResult<Evaluation> {
        let _claim = self.claim(submission_id)?;
        let mut submission = self
            .submissions
            .get_submission(submission_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("submission", submission_id))?;
        let homework = self
            .homework
            .get_homework(&submission.homework_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("homework", &submission.homework_id))?;

        if submission.status != SubmissionStatus::Submitted {
            return Err(PipelineError::InvalidState(format!(
                "submission {submission_id} is already {}",
                submission.status
            )));
        }

        let pending = submission.answers.iter().filter_map(|answer| {
            let Some(question) = homework.question(&answer.question_id) else {
                tracing::warn!(
                    question = %answer.question_id,
                    "question no longer on homework, skipping answer"
                );
                return None;
            };
            if question.answer_type != answer.answer_type {
                tracing::warn!(
                    question = %question.id,
                    expected = %question.answer_type,
                    got = %answer.answer_type,
                    "question type changed since submission, skipping answer"
                );
                return None;
            }
            let Some(evaluator) = self.evaluators.get(answer.answer_type) else {
                tracing::warn!(kind = %answer.answer_type, "no evaluator registered");
                return None;
            };
            Some(evaluator.evaluate(answer, question))
        });
        let outcomes = join_all(pending).await;

        let degraded = outcomes.iter().filter(|o| o.is_degraded()).count();
        let evaluation = merge_fragments(&outcomes);

        submission.attach_evaluation(evaluation.clone())?;
        self.submissions.put_submission(&submission).await?;

        tracing::info!(
            answers = outcomes.len(),
            degraded,
            overall_score = evaluation.overall_score(),
            "submission evaluated"
        );
        Ok(evaluation)
    }
}

/// Combine evaluator outcomes into a single evaluation.
pub fn merge_fragments(outcomes: &[FragmentOutcome]) -> Evaluation {
    let mut parts = EvaluationParts::default();
    let mut pronunciations = Vec::new();
    let mut grammars = Vec::new();
    let mut vocabularies = Vec::new();

    for outcome in outcomes {
        parts.degraded |= outcome.is_degraded();
        let fragment = outcome.fragment();
        pronunciations.extend(fragment.pronunciation.as_ref());
        grammars.extend(fragment.grammar.as_ref());
        vocabularies.extend(fragment.vocabulary.as_ref());
        if let Some(choice) = fragment.choice {
            let summary = parts.choice.get_or_insert_with(ChoiceSummary::default);
            summary.correct += choice.correct;
            summary.total += choice.total;
        }
        parts.strengths.extend(fragment.strengths.iter().cloned());
        parts
            .improvement_areas
            .extend(fragment.improvement_areas.iter().cloned());
    }

    parts.pronunciation = merge_pronunciation(&pronunciations);
    parts.grammar = merge_grammar(&grammars);
    parts.vocabulary = merge_vocabulary(&vocabularies);
    Evaluation::from_parts(parts)
}

fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

fn merge_pronunciation(scores: &[&PronunciationScore]) -> Option<PronunciationScore> {
    match scores {
        [] => None,
        [single] => Some((*single).clone()),
        many => {
            let overall_score = mean(many.iter().map(|p| p.overall_score))?;
            Some(PronunciationScore {
                overall_score,
                accuracy: mean(many.iter().map(|p| p.accuracy))?,
                fluency: mean(many.iter().map(|p| p.fluency))?,
                completeness: mean(many.iter().map(|p| p.completeness))?,
                words: many.iter().flat_map(|p| p.words.iter().cloned()).collect(),
                feedback: pronunciation_band(overall_score).to_string(),
            })
        }
    }
}

fn merge_grammar(assessments: &[&GrammarAssessment]) -> Option<GrammarAssessment> {
    Some(GrammarAssessment {
        score: mean(assessments.iter().map(|g| g.score))?,
        corrections: assessments
            .iter()
            .flat_map(|g| g.corrections.iter().cloned())
            .collect(),
    })
}

fn merge_vocabulary(feedback: &[&VocabularyFeedback]) -> Option<VocabularyFeedback> {
    if feedback.is_empty() {
        return None;
    }
    let mut merged = VocabularyFeedback::default();
    for vocabulary in feedback {
        for word in &vocabulary.used_words {
            if !merged.used_words.contains(word) {
                merged.used_words.push(word.clone());
            }
        }
        for word in &vocabulary.suggested_words {
            if !merged.suggested_words.contains(word) {
                merged.suggested_words.push(word.clone());
            }
        }
    }
    // The weakest assessed level is the one to report.
    merged.level = feedback.iter().filter_map(|v| v.level).min();
    merged.score = mean(feedback.iter().filter_map(|v| v.score));
    Some(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::evaluators::{AnswerEvaluator, DegradedFragment, EvaluationFragment};
    use crate::model::{
        Answer, AnswerType, GrammarCorrection, Homework, ProficiencyLevel, Question, Submission,
        FALLBACK_OVERALL_SCORE,
    };
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::Barrier;

    fn pron(score: f64) -> PronunciationScore {
        PronunciationScore {
            overall_score: score,
            accuracy: score,
            fluency: score,
            completeness: score,
            words: vec![],
            feedback: String::new(),
        }
    }

    fn scored(fragment: EvaluationFragment) -> FragmentOutcome {
        FragmentOutcome::Scored(fragment)
    }

    /// Evaluator returning the same outcome for every answer.
    struct Canned(AnswerType, FragmentOutcome);

    #[async_trait]
    impl AnswerEvaluator for Canned {
        fn answer_type(&self) -> AnswerType {
            self.0
        }

        async fn evaluate(&self, _: &Answer, _: &Question) -> FragmentOutcome {
            self.1.clone()
        }
    }

    /// Audio evaluator that only finishes once two evaluations are in flight.
    struct Rendezvous(Arc<Barrier>);

    #[async_trait]
    impl AnswerEvaluator for Rendezvous {
        fn answer_type(&self) -> AnswerType {
            AnswerType::Audio
        }

        async fn evaluate(&self, _: &Answer, _: &Question) -> FragmentOutcome {
            self.0.wait().await;
            scored(EvaluationFragment {
                pronunciation: Some(pron(90.0)),
                ..Default::default()
            })
        }
    }

    /// Text evaluator that takes a while and counts its calls.
    #[derive(Default)]
    struct Slow(AtomicU32);

    #[async_trait]
    impl AnswerEvaluator for Slow {
        fn answer_type(&self) -> AnswerType {
            AnswerType::Text
        }

        async fn evaluate(&self, _: &Answer, _: &Question) -> FragmentOutcome {
            self.0.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            scored(EvaluationFragment::default())
        }
    }

    fn question(id: &str, answer_type: AnswerType) -> Question {
        Question {
            id: id.into(),
            prompt: format!("question {id}"),
            answer_type,
            target_answer: None,
            options: vec![],
        }
    }

    async fn seed(store: &MemoryStore, questions: Vec<Question>, answers: Vec<Answer>) -> Submission {
        let homework = Homework {
            id: "hw-1".into(),
            title: "Week 3".into(),
            due_at: None,
            questions,
        };
        store.insert_homework(homework.clone()).await;
        let submission = Submission::new(&homework, "student-1", answers).unwrap();
        store.put_submission(&submission).await.unwrap();
        submission
    }

    fn orchestrator(store: &Arc<MemoryStore>, evaluators: EvaluatorSet) -> EvaluationOrchestrator {
        EvaluationOrchestrator::new(store.clone(), store.clone(), evaluators)
    }

    #[test]
    fn merge_averages_present_sub_scores() {
        let evaluation = merge_fragments(&[
            scored(EvaluationFragment {
                pronunciation: Some(pron(80.0)),
                strengths: vec!["Fluent".into()],
                ..Default::default()
            }),
            scored(EvaluationFragment {
                pronunciation: Some(pron(90.0)),
                ..Default::default()
            }),
            scored(EvaluationFragment {
                grammar: Some(GrammarAssessment {
                    corrections: vec![GrammarCorrection {
                        original: "a".into(),
                        corrected: "b".into(),
                        explanation: "c".into(),
                    }],
                    score: 90.0,
                }),
                improvement_areas: vec!["Tenses".into()],
                ..Default::default()
            }),
            scored(EvaluationFragment {
                choice: Some(ChoiceSummary {
                    correct: 0,
                    total: 1,
                }),
                ..Default::default()
            }),
        ]);

        assert_eq!(evaluation.pronunciation().unwrap().overall_score, 85.0);
        assert_eq!(evaluation.grammar_corrections().unwrap().len(), 1);
        assert_eq!(evaluation.choice().unwrap().total, 1);
        // (85 + 90 + 0) / 3
        assert!((evaluation.overall_score() - 175.0 / 3.0).abs() < 1e-9);
        assert_eq!(evaluation.strengths(), ["Fluent"]);
        assert_eq!(evaluation.improvement_areas(), ["Tenses"]);
        assert!(!evaluation.is_degraded());
    }

    #[test]
    fn merge_without_scores_uses_fallback_and_flags_degraded() {
        let evaluation = merge_fragments(&[FragmentOutcome::Degraded(DegradedFragment {
            question_id: "q2".into(),
            fragment: EvaluationFragment {
                improvement_areas: vec!["Please re-submit".into()],
                ..Default::default()
            },
            error: ServiceError::Timeout(30),
        })]);
        assert_eq!(evaluation.overall_score(), FALLBACK_OVERALL_SCORE);
        assert!(evaluation.is_degraded());

        assert_eq!(
            merge_fragments(&[]).overall_score(),
            FALLBACK_OVERALL_SCORE
        );
    }

    #[test]
    fn merge_vocabulary_unions_words_and_keeps_weakest_level() {
        let a = VocabularyFeedback {
            used_words: vec!["school".into(), "went".into()],
            suggested_words: vec!["attended".into()],
            level: Some(ProficiencyLevel::Advanced),
            score: Some(90.0),
        };
        let b = VocabularyFeedback {
            used_words: vec!["went".into()],
            suggested_words: vec![],
            level: Some(ProficiencyLevel::Beginner),
            score: Some(60.0),
        };
        let merged = merge_vocabulary(&[&a, &b]).unwrap();
        assert_eq!(merged.used_words, vec!["school", "went"]);
        assert_eq!(merged.level, Some(ProficiencyLevel::Beginner));
        assert_eq!(merged.score, Some(75.0));
    }

    #[tokio::test]
    async fn evaluate_persists_and_advances_status() {
        let store = Arc::new(MemoryStore::new());
        let submission = seed(
            &store,
            vec![question("q1", AnswerType::Text)],
            vec![Answer::text("q1", "I went home.")],
        )
        .await;
        let evaluators = EvaluatorSet::new().with(Arc::new(Canned(
            AnswerType::Text,
            scored(EvaluationFragment {
                grammar: Some(GrammarAssessment {
                    corrections: vec![],
                    score: 100.0,
                }),
                ..Default::default()
            }),
        )));

        let evaluation = orchestrator(&store, evaluators)
            .evaluate(&submission.id)
            .await
            .unwrap();
        assert_eq!(evaluation.overall_score(), 100.0);

        let stored = store.get_submission(&submission.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubmissionStatus::AiEvaluated);
        assert_eq!(stored.evaluation, Some(evaluation));
    }

    #[tokio::test]
    async fn re_evaluation_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let submission = seed(
            &store,
            vec![question("q1", AnswerType::Choice)],
            vec![Answer::choice("q1", "a")],
        )
        .await;
        let orchestrator = orchestrator(
            &store,
            EvaluatorSet::new().with(Arc::new(Canned(
                AnswerType::Choice,
                scored(EvaluationFragment::default()),
            ))),
        );

        let first = orchestrator.evaluate(&submission.id).await.unwrap();
        let err = orchestrator.evaluate(&submission.id).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidState(_)));

        let stored = store.get_submission(&submission.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubmissionStatus::AiEvaluated);
        assert_eq!(stored.evaluation, Some(first));
    }

    #[tokio::test]
    async fn concurrent_evaluations_of_one_submission_run_once() {
        let store = Arc::new(MemoryStore::new());
        let submission = seed(
            &store,
            vec![question("q1", AnswerType::Text)],
            vec![Answer::text("q1", "I went home.")],
        )
        .await;
        let slow = Arc::new(Slow::default());
        let orchestrator = orchestrator(&store, EvaluatorSet::new().with(slow.clone()));

        let (a, b) = tokio::join!(
            orchestrator.evaluate(&submission.id),
            orchestrator.evaluate(&submission.id)
        );
        assert!(a.is_ok() ^ b.is_ok());
        let err = a.err().or(b.err()).unwrap();
        assert!(matches!(err, PipelineError::InvalidState(ref m) if m.contains("being evaluated")));
        assert_eq!(slow.0.load(Ordering::SeqCst), 1);

        // The claim is released once the winner has persisted.
        let err = orchestrator.evaluate(&submission.id).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidState(ref m) if m.contains("ai_evaluated")));
    }

    #[tokio::test]
    async fn missing_documents_are_not_found() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = orchestrator(&store, EvaluatorSet::new());
        let err = orchestrator.evaluate("nope").await.unwrap_err();
        assert!(err.is_not_found());

        let homework = Homework {
            id: "hw-gone".into(),
            title: "t".into(),
            due_at: None,
            questions: vec![question("q1", AnswerType::Text)],
        };
        let submission = Submission::new(&homework, "s", vec![Answer::text("q1", "x")]).unwrap();
        store.put_submission(&submission).await.unwrap();
        let err = orchestrator.evaluate(&submission.id).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { kind: "homework", .. }));
    }

    #[tokio::test]
    async fn answers_for_removed_questions_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let submission = seed(
            &store,
            vec![question("q1", AnswerType::Text), question("q2", AnswerType::Text)],
            vec![Answer::text("q1", "one"), Answer::text("q2", "two")],
        )
        .await;
        // Homework edited after the student submitted.
        store
            .insert_homework(Homework {
                id: "hw-1".into(),
                title: "Week 3".into(),
                due_at: None,
                questions: vec![question("q1", AnswerType::Text)],
            })
            .await;

        let evaluators = EvaluatorSet::new().with(Arc::new(Canned(
            AnswerType::Text,
            scored(EvaluationFragment {
                strengths: vec!["ok".into()],
                ..Default::default()
            }),
        )));
        let evaluation = orchestrator(&store, evaluators)
            .evaluate(&submission.id)
            .await
            .unwrap();
        assert_eq!(evaluation.strengths().len(), 1);
    }

    #[tokio::test]
    async fn answers_are_evaluated_concurrently() {
        let store = Arc::new(MemoryStore::new());
        let submission = seed(
            &store,
            vec![question("q1", AnswerType::Audio), question("q2", AnswerType::Audio)],
            vec![
                Answer::audio("q1", "a.wav", None),
                Answer::audio("q2", "b.wav", None),
            ],
        )
        .await;
        let evaluators = EvaluatorSet::new().with(Arc::new(Rendezvous(Arc::new(Barrier::new(2)))));

        let evaluation = tokio::time::timeout(
            Duration::from_secs(5),
            orchestrator(&store, evaluators).evaluate(&submission.id),
        )
        .await
        .expect("sequential evaluation would never pass the barrier")
        .unwrap();
        assert_eq!(evaluation.overall_score(), 90.0);
    }
}
