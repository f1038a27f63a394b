//! Written answers evaluated by the text-generation service.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use super::{AnswerEvaluator, DegradedFragment, EvaluationFragment, FragmentOutcome, GENERATION_DEPENDENCY};
use crate::breaker::BreakerRegistry;
use crate::model::{Answer, AnswerType, GrammarAssessment, Question, VocabularyFeedback};
use crate::parser::{parse_feedback, ParsedFeedback};
use crate::resilience::{ResilientClient, RetryPolicy};
use crate::traits::TextGenerator;

/// Points deducted from the grammar score per correction.
const GRAMMAR_PENALTY: f64 = 10.0;

pub struct TextEvaluator {
    generator: Arc<dyn TextGenerator>,
    client: ResilientClient,
}

impl TextEvaluator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        registry: &BreakerRegistry,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            generator,
            client: ResilientClient::new(registry, GENERATION_DEPENDENCY, retry),
        }
    }
}

#[async_trait]
impl AnswerEvaluator for TextEvaluator {
    fn answer_type(&self) -> AnswerType {
        AnswerType::Text
    }

    #[instrument(skip_all, fields(question = %question.id))]
    async fn evaluate(&self, answer: &Answer, question: &Question) -> FragmentOutcome {
        if answer.content.trim().is_empty() {
            return FragmentOutcome::Scored(EvaluationFragment {
                improvement_areas: vec![format!(
                    "No written answer was provided for question {}",
                    question.id
                )],
                ..Default::default()
            });
        }

        let prompt = build_prompt(question, &answer.content);
        match self.client.call(|| self.generator.generate(&prompt)).await {
            Ok(response) => FragmentOutcome::Scored(fragment_from_parsed(parse_feedback(&response))),
            Err(error) => {
                tracing::warn!(
                    generator = self.generator.name(),
                    "text evaluation unavailable, degrading: {error}"
                );
                FragmentOutcome::Degraded(DegradedFragment {
                    question_id: question.id.clone(),
                    fragment: EvaluationFragment {
                        improvement_areas: vec![format!(
                            "Your written answer to question {} could not be evaluated automatically; your planner will review it.",
                            question.id
                        )],
                        ..Default::default()
                    },
                    error,
                })
            }
        }
    }
}

/// Grammar sub-score for a number of corrections.
pub fn grammar_score(corrections: usize) -> f64 {
    (100.0 - GRAMMAR_PENALTY * corrections as f64).max(0.0)
}

fn build_prompt(question: &Question, text: &str) -> String {
    let mut prompt = format!(
        "You are an English teacher evaluating a student's written homework answer.\n\n\
         Question: {}\nStudent answer: {}\n",
        question.prompt, text
    );
    if let Some(target) = question.target_answer.as_deref().filter(|t| !t.trim().is_empty()) {
        prompt.push_str(&format!("Expected answer: {target}\n"));
    }
    prompt.push_str(
        "\nRespond using exactly these four sections:\n\
         GRAMMAR CORRECTIONS:\n\
         - Original: <text> | Corrected: <text> | Explanation: <why>\n\
         VOCABULARY ASSESSMENT:\n\
         Used words: <comma-separated>\n\
         Suggested words: <comma-separated>\n\
         Level: <beginner|intermediate|advanced>\n\
         STRENGTHS:\n\
         - <strength>\n\
         IMPROVEMENT AREAS:\n\
         - <area>\n",
    );
    prompt
}

fn fragment_from_parsed(parsed: ParsedFeedback) -> EvaluationFragment {
    let vocabulary = parsed.has_vocabulary().then(|| VocabularyFeedback {
        score: parsed.vocabulary.level.map(|level| level.score()),
        ..parsed.vocabulary.clone()
    });
    EvaluationFragment {
        grammar: Some(GrammarAssessment {
            score: grammar_score(parsed.grammar_corrections.len()),
            corrections: parsed.grammar_corrections,
        }),
        vocabulary,
        strengths: parsed.strengths,
        improvement_areas: parsed.improvement_areas,
        ..Default::default()
    }
}
