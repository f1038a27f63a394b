//! Multiple-choice answers, checked offline against the target answer.

use async_trait::async_trait;

use super::{AnswerEvaluator, EvaluationFragment, FragmentOutcome};
use crate::model::{Answer, AnswerType, ChoiceSummary, Question};

pub struct ChoiceEvaluator;

#[async_trait]
impl AnswerEvaluator for ChoiceEvaluator {
    fn answer_type(&self) -> AnswerType {
        AnswerType::Choice
    }

    async fn evaluate(&self, answer: &Answer, question: &Question) -> FragmentOutcome {
        FragmentOutcome::Scored(check_choice(answer, question))
    }
}

/// Compare a choice with the question's target. Questions without a target
/// pass through with no score contribution.
pub fn check_choice(answer: &Answer, question: &Question) -> EvaluationFragment {
    let Some(target) = question
        .target_answer
        .as_deref()
        .filter(|t| !t.trim().is_empty())
    else {
        return EvaluationFragment::default();
    };

    let chosen = resolve_option(&answer.content, &question.options);
    let expected = resolve_option(target, &question.options);
    let correct = normalize(chosen) == normalize(expected);

    EvaluationFragment {
        choice: Some(ChoiceSummary {
            correct: u32::from(correct),
            total: 1,
        }),
        improvement_areas: if correct {
            Vec::new()
        } else {
            vec![format!(
                "Review question {}: the correct answer was \"{}\"",
                question.id,
                expected.trim()
            )]
        },
        ..Default::default()
    }
}

/// Map a single option letter ("b") to the option text, when options exist.
fn resolve_option<'a>(value: &'a str, options: &'a [String]) -> &'a str {
    let trimmed = value.trim();
    let mut chars = trimmed.chars();
    if let (Some(letter), None) = (chars.next(), chars.next()) {
        if letter.is_ascii_alphabetic() {
            let index = (letter.to_ascii_lowercase() as u8 - b'a') as usize;
            if let Some(option) = options.get(index) {
                return option;
            }
        }
    }
    trimmed
}

fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
