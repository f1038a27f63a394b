//! Core data model types for gradewise.
//!
//! Homework and questions are read-only inputs owned by the surrounding
//! system. Submissions, evaluations and feedback are the documents this crate
//! creates and advances.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};

/// Overall score used when no sub-score is present, e.g. when every
/// evaluator degraded.
pub const FALLBACK_OVERALL_SCORE: f64 = 70.0;

// ---------------------------------------------------------------------------
// Homework
// ---------------------------------------------------------------------------

/// Kind of response a question expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerType {
    Audio,
    Text,
    Choice,
}

impl fmt::Display for AnswerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerType::Audio => write!(f, "audio"),
            AnswerType::Text => write!(f, "text"),
            AnswerType::Choice => write!(f, "choice"),
        }
    }
}

impl FromStr for AnswerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "audio" | "speaking" => Ok(AnswerType::Audio),
            "text" | "writing" => Ok(AnswerType::Text),
            "choice" | "multiple_choice" => Ok(AnswerType::Choice),
            other => Err(format!("unknown answer type: {other}")),
        }
    }
}

/// A single question on a homework assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    /// Text shown to the student.
    pub prompt: String,
    #[serde(rename = "type")]
    pub answer_type: AnswerType,
    /// Reference transcript (audio), model answer (text) or correct option (choice).
    #[serde(default)]
    pub target_answer: Option<String>,
    /// Options offered for choice questions.
    #[serde(default)]
    pub options: Vec<String>,
}

/// A homework assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Homework {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl Homework {
    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Per-answer metadata captured at submit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerMetadata {
    /// Recording length for audio answers.
    #[serde(default)]
    pub duration_secs: Option<f64>,
    #[serde(default)]
    pub word_count: Option<u32>,
    pub submitted_at: DateTime<Utc>,
}

/// One question's response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: String,
    #[serde(rename = "type")]
    pub answer_type: AnswerType,
    /// Object-store key for audio, raw text otherwise.
    pub content: String,
    pub metadata: AnswerMetadata,
}

impl Answer {
    pub fn audio(question_id: &str, object_key: &str, duration_secs: Option<f64>) -> Self {
        Self {
            question_id: question_id.to_string(),
            answer_type: AnswerType::Audio,
            content: object_key.to_string(),
            metadata: AnswerMetadata {
                duration_secs,
                word_count: None,
                submitted_at: Utc::now(),
            },
        }
    }

    pub fn text(question_id: &str, text: &str) -> Self {
        Self {
            question_id: question_id.to_string(),
            answer_type: AnswerType::Text,
            content: text.to_string(),
            metadata: AnswerMetadata {
                duration_secs: None,
                word_count: Some(text.split_whitespace().count() as u32),
                submitted_at: Utc::now(),
            },
        }
    }

    pub fn choice(question_id: &str, choice: &str) -> Self {
        Self {
            question_id: question_id.to_string(),
            answer_type: AnswerType::Choice,
            content: choice.to_string(),
            metadata: AnswerMetadata {
                duration_secs: None,
                word_count: None,
                submitted_at: Utc::now(),
            },
        }
    }
}

/// Review stage of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Submitted,
    AiEvaluated,
    Reviewed,
    Completed,
}

impl SubmissionStatus {
    /// Whether `next` is the single forward step from `self`.
    pub fn can_advance_to(self, next: SubmissionStatus) -> bool {
        use SubmissionStatus::*;
        match (self, next) {
            (Submitted, AiEvaluated) | (AiEvaluated, Reviewed) | (Reviewed, Completed) => true,
            (Submitted | AiEvaluated | Reviewed | Completed, _) => false,
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionStatus::Submitted => write!(f, "submitted"),
            SubmissionStatus::AiEvaluated => write!(f, "ai_evaluated"),
            SubmissionStatus::Reviewed => write!(f, "reviewed"),
            SubmissionStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Planner score and comments mirrored onto the submission for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerFeedback {
    pub score: f64,
    pub comments: String,
    pub reviewed_at: DateTime<Utc>,
}

/// One student's response to one homework assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub homework_id: String,
    pub student_id: String,
    pub answers: Vec<Answer>,
    pub status: SubmissionStatus,
    #[serde(default)]
    pub evaluation: Option<Evaluation>,
    #[serde(default)]
    pub planner_feedback: Option<PlannerFeedback>,
    #[serde(default)]
    pub is_late: bool,
    pub attempts: u32,
    pub submitted_at: DateTime<Utc>,
}

impl Submission {
    /// Create a first submission, validating the answers against the homework.
    pub fn new(homework: &Homework, student_id: &str, answers: Vec<Answer>) -> PipelineResult<Self> {
        validate_answers(homework, &answers)?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            homework_id: homework.id.clone(),
            student_id: student_id.to_string(),
            answers,
            status: SubmissionStatus::Submitted,
            evaluation: None,
            planner_feedback: None,
            is_late: homework.due_at.is_some_and(|due| now > due),
            attempts: 1,
            submitted_at: now,
        })
    }

    /// Replace the answers of a submission that has not been evaluated yet.
    pub fn resubmit(&mut self, homework: &Homework, answers: Vec<Answer>) -> PipelineResult<()> {
        if self.status != SubmissionStatus::Submitted {
            return Err(PipelineError::InvalidState(format!(
                "submission {} is {} and can no longer be resubmitted",
                self.id, self.status
            )));
        }
        validate_answers(homework, &answers)?;
        let now = Utc::now();
        self.answers = answers;
        self.attempts += 1;
        self.submitted_at = now;
        self.is_late = homework.due_at.is_some_and(|due| now > due);
        Ok(())
    }

    /// Move one step forward in the review lifecycle.
    pub fn advance(&mut self, next: SubmissionStatus) -> PipelineResult<()> {
        if !self.status.can_advance_to(next) {
            return Err(PipelineError::InvalidState(format!(
                "submission {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Attach a fresh evaluation, replacing any previous one wholesale.
    pub fn attach_evaluation(&mut self, evaluation: Evaluation) -> PipelineResult<()> {
        self.advance(SubmissionStatus::AiEvaluated)?;
        self.evaluation = Some(evaluation);
        Ok(())
    }
}

fn validate_answers(homework: &Homework, answers: &[Answer]) -> PipelineResult<()> {
    for question in &homework.questions {
        let matching: Vec<&Answer> = answers
            .iter()
            .filter(|a| a.question_id == question.id)
            .collect();
        match matching.as_slice() {
            [answer] if answer.answer_type == question.answer_type => {}
            [answer] => {
                return Err(PipelineError::Validation(format!(
                    "question {} expects a {} answer, got {}",
                    question.id, question.answer_type, answer.answer_type
                )))
            }
            [] => {
                return Err(PipelineError::Validation(format!(
                    "question {} has no answer",
                    question.id
                )))
            }
            _ => {
                return Err(PipelineError::Validation(format!(
                    "question {} has {} answers",
                    question.id,
                    matching.len()
                )))
            }
        }
    }

    if let Some(stray) = answers.iter().find(|a| homework.question(&a.question_id).is_none()) {
        return Err(PipelineError::Validation(format!(
            "answer references unknown question {}",
            stray.question_id
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Accuracy for one spoken word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordScore {
    pub word: String,
    pub accuracy: f64,
    /// Service error tag such as "Mispronunciation" or "Omission".
    #[serde(default)]
    pub error_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PronunciationScore {
    pub overall_score: f64,
    pub accuracy: f64,
    pub fluency: f64,
    pub completeness: f64,
    #[serde(default)]
    pub words: Vec<WordScore>,
    pub feedback: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarCorrection {
    pub original: String,
    pub corrected: String,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrammarAssessment {
    pub corrections: Vec<GrammarCorrection>,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProficiencyLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl ProficiencyLevel {
    /// Vocabulary sub-score for this level.
    pub fn score(self) -> f64 {
        match self {
            ProficiencyLevel::Beginner => 60.0,
            ProficiencyLevel::Intermediate => 75.0,
            ProficiencyLevel::Advanced => 90.0,
        }
    }
}

impl fmt::Display for ProficiencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProficiencyLevel::Beginner => write!(f, "beginner"),
            ProficiencyLevel::Intermediate => write!(f, "intermediate"),
            ProficiencyLevel::Advanced => write!(f, "advanced"),
        }
    }
}

impl FromStr for ProficiencyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        if lower.starts_with("begin") || lower.starts_with("elementary") || lower == "basic" {
            Ok(ProficiencyLevel::Beginner)
        } else if lower.starts_with("intermediate") {
            Ok(ProficiencyLevel::Intermediate)
        } else if lower.starts_with("advanced") || lower == "proficient" {
            Ok(ProficiencyLevel::Advanced)
        } else {
            Err(format!("unknown proficiency level: {s}"))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VocabularyFeedback {
    #[serde(default)]
    pub used_words: Vec<String>,
    #[serde(default)]
    pub suggested_words: Vec<String>,
    #[serde(default)]
    pub level: Option<ProficiencyLevel>,
    /// Present only when a level was assessed.
    #[serde(default)]
    pub score: Option<f64>,
}

/// Tally of multiple-choice answers that had a target answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceSummary {
    pub correct: u32,
    pub total: u32,
}

impl ChoiceSummary {
    pub fn score(&self) -> Option<f64> {
        (self.total > 0).then(|| self.correct as f64 / self.total as f64 * 100.0)
    }
}

/// Inputs to [`Evaluation::from_parts`].
#[derive(Debug, Clone, Default)]
pub struct EvaluationParts {
    pub pronunciation: Option<PronunciationScore>,
    pub grammar: Option<GrammarAssessment>,
    pub vocabulary: Option<VocabularyFeedback>,
    pub choice: Option<ChoiceSummary>,
    pub strengths: Vec<String>,
    pub improvement_areas: Vec<String>,
    pub degraded: bool,
}

/// The aggregated AI assessment of a submission.
///
/// Immutable: the overall score is derived at construction and a new
/// evaluation replaces an old one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pronunciation: Option<PronunciationScore>,
    grammar: Option<GrammarAssessment>,
    vocabulary: Option<VocabularyFeedback>,
    choice: Option<ChoiceSummary>,
    overall_score: f64,
    strengths: Vec<String>,
    improvement_areas: Vec<String>,
    degraded: bool,
    generated_at: DateTime<Utc>,
}

impl Evaluation {
    pub fn from_parts(parts: EvaluationParts) -> Self {
        let mut evaluation = Self {
            pronunciation: parts.pronunciation,
            grammar: parts.grammar,
            vocabulary: parts.vocabulary,
            choice: parts.choice,
            overall_score: FALLBACK_OVERALL_SCORE,
            strengths: parts.strengths,
            improvement_areas: parts.improvement_areas,
            degraded: parts.degraded,
            generated_at: Utc::now(),
        };
        let sub_scores = evaluation.sub_scores();
        if !sub_scores.is_empty() {
            evaluation.overall_score = sub_scores.iter().sum::<f64>() / sub_scores.len() as f64;
        }
        evaluation
    }

    /// Sub-scores that feed the overall score, in a fixed order.
    pub fn sub_scores(&self) -> Vec<f64> {
        [
            self.pronunciation.as_ref().map(|p| p.overall_score),
            self.grammar.as_ref().map(|g| g.score),
            self.vocabulary.as_ref().and_then(|v| v.score),
            self.choice.as_ref().and_then(ChoiceSummary::score),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    pub fn overall_score(&self) -> f64 {
        self.overall_score
    }

    pub fn pronunciation(&self) -> Option<&PronunciationScore> {
        self.pronunciation.as_ref()
    }

    pub fn grammar(&self) -> Option<&GrammarAssessment> {
        self.grammar.as_ref()
    }

    /// Grammar corrections, if the grammar block was assessed.
    pub fn grammar_corrections(&self) -> Option<&[GrammarCorrection]> {
        self.grammar.as_ref().map(|g| g.corrections.as_slice())
    }

    pub fn vocabulary(&self) -> Option<&VocabularyFeedback> {
        self.vocabulary.as_ref()
    }

    pub fn choice(&self) -> Option<&ChoiceSummary> {
        self.choice.as_ref()
    }

    pub fn strengths(&self) -> &[String] {
        &self.strengths
    }

    pub fn improvement_areas(&self) -> &[String] {
        &self.improvement_areas
    }

    /// At least one evaluator fell back to a placeholder result.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }
}

// ---------------------------------------------------------------------------
// Feedback
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    AiGenerated,
    PlannerReviewed,
    SentToStudent,
}

impl FeedbackStatus {
    pub fn can_advance_to(self, next: FeedbackStatus) -> bool {
        use FeedbackStatus::*;
        match (self, next) {
            (AiGenerated, PlannerReviewed) | (PlannerReviewed, SentToStudent) => true,
            (AiGenerated | PlannerReviewed | SentToStudent, _) => false,
        }
    }
}

impl fmt::Display for FeedbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackStatus::AiGenerated => write!(f, "ai_generated"),
            FeedbackStatus::PlannerReviewed => write!(f, "planner_reviewed"),
            FeedbackStatus::SentToStudent => write!(f, "sent_to_student"),
        }
    }
}

/// Score for one rubric criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub criterion: String,
    pub score: f64,
}

/// A planner's review of an AI evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerEvaluation {
    pub planner_id: String,
    /// Override for the AI overall score.
    pub score: f64,
    #[serde(default)]
    pub comments: String,
    /// Object-store keys of attached files.
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub criteria: Vec<CriterionScore>,
}

/// Planner- and student-facing wrapper around an evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: String,
    pub submission_id: String,
    pub student_id: String,
    pub homework_id: String,
    #[serde(default)]
    pub planner_id: Option<String>,
    pub ai_evaluation: Evaluation,
    pub confidence: u8,
    /// Low confidence: a planner must review before this can be trusted.
    pub requires_review: bool,
    #[serde(default)]
    pub planner_evaluation: Option<PlannerEvaluation>,
    pub status: FeedbackStatus,
    #[serde(default)]
    pub student_viewed: bool,
    #[serde(default)]
    pub viewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
}

impl Feedback {
    /// Planner override if reviewed, otherwise the AI overall score.
    pub fn effective_score(&self) -> f64 {
        self.planner_evaluation
            .as_ref()
            .map(|p| p.score)
            .unwrap_or_else(|| self.ai_evaluation.overall_score())
    }

    pub fn advance(&mut self, next: FeedbackStatus) -> PipelineResult<()> {
        if !self.status.can_advance_to(next) {
            return Err(PipelineError::InvalidState(format!(
                "feedback {} is {} and cannot move to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn homework() -> Homework {
        Homework {
            id: "hw-1".into(),
            title: "Past tense".into(),
            due_at: None,
            questions: vec![
                Question {
                    id: "q1".into(),
                    prompt: "Read aloud".into(),
                    answer_type: AnswerType::Audio,
                    target_answer: Some("I went to school".into()),
                    options: vec![],
                },
                Question {
                    id: "q2".into(),
                    prompt: "Write a sentence".into(),
                    answer_type: AnswerType::Text,
                    target_answer: None,
                    options: vec![],
                },
            ],
        }
    }

    #[test]
    fn answer_type_display_and_parse() {
        assert_eq!(AnswerType::Audio.to_string(), "audio");
        assert_eq!("Text".parse::<AnswerType>().unwrap(), AnswerType::Text);
        assert_eq!(
            "multiple_choice".parse::<AnswerType>().unwrap(),
            AnswerType::Choice
        );
        assert!("video".parse::<AnswerType>().is_err());
    }

    #[test]
    fn submission_requires_one_matching_answer_per_question() {
        let hw = homework();
        let ok = Submission::new(
            &hw,
            "student-1",
            vec![Answer::audio("q1", "audio/1.wav", Some(4.2)), Answer::text("q2", "hi")],
        )
        .unwrap();
        assert_eq!(ok.status, SubmissionStatus::Submitted);
        assert_eq!(ok.attempts, 1);
        assert!(!ok.is_late);

        let missing = Submission::new(&hw, "student-1", vec![Answer::text("q2", "hi")]);
        assert!(matches!(missing, Err(PipelineError::Validation(_))));

        let wrong_type = Submission::new(
            &hw,
            "student-1",
            vec![Answer::text("q1", "oops"), Answer::text("q2", "hi")],
        );
        assert!(matches!(wrong_type, Err(PipelineError::Validation(_))));

        let stray = Submission::new(
            &hw,
            "student-1",
            vec![
                Answer::audio("q1", "a.wav", None),
                Answer::text("q2", "hi"),
                Answer::choice("q9", "b"),
            ],
        );
        assert!(matches!(stray, Err(PipelineError::Validation(_))));
    }

    #[test]
    fn late_flag_follows_due_date() {
        let mut hw = homework();
        hw.due_at = Some(Utc::now() - chrono::Duration::hours(1));
        let sub = Submission::new(
            &hw,
            "s",
            vec![Answer::audio("q1", "a.wav", None), Answer::text("q2", "hi")],
        )
        .unwrap();
        assert!(sub.is_late);
    }

    #[test]
    fn resubmit_only_before_evaluation() {
        let hw = homework();
        let answers = || vec![Answer::audio("q1", "a.wav", None), Answer::text("q2", "hi")];
        let mut sub = Submission::new(&hw, "s", answers()).unwrap();

        sub.resubmit(&hw, vec![Answer::audio("q1", "b.wav", None), Answer::text("q2", "hello")])
            .unwrap();
        assert_eq!(sub.attempts, 2);
        assert_eq!(sub.answers[0].content, "b.wav");

        sub.attach_evaluation(Evaluation::from_parts(EvaluationParts::default()))
            .unwrap();
        assert!(matches!(
            sub.resubmit(&hw, answers()),
            Err(PipelineError::InvalidState(_))
        ));
        assert_eq!(sub.attempts, 2);
    }

    #[test]
    fn status_only_moves_forward() {
        use SubmissionStatus::*;
        assert!(Submitted.can_advance_to(AiEvaluated));
        assert!(AiEvaluated.can_advance_to(Reviewed));
        assert!(Reviewed.can_advance_to(Completed));
        assert!(!AiEvaluated.can_advance_to(Submitted));
        assert!(!Submitted.can_advance_to(Completed));
        assert!(!Completed.can_advance_to(Completed));

        assert!(FeedbackStatus::AiGenerated.can_advance_to(FeedbackStatus::PlannerReviewed));
        assert!(!FeedbackStatus::AiGenerated.can_advance_to(FeedbackStatus::SentToStudent));
    }

    #[test]
    fn overall_score_is_mean_of_present_sub_scores() {
        let evaluation = Evaluation::from_parts(EvaluationParts {
            pronunciation: Some(PronunciationScore {
                overall_score: 80.0,
                accuracy: 80.0,
                fluency: 80.0,
                completeness: 80.0,
                words: vec![],
                feedback: String::new(),
            }),
            grammar: Some(GrammarAssessment {
                corrections: vec![],
                score: 90.0,
            }),
            vocabulary: Some(VocabularyFeedback {
                used_words: vec!["school".into()],
                ..Default::default()
            }),
            ..Default::default()
        });
        assert_eq!(evaluation.sub_scores(), vec![80.0, 90.0]);
        assert_eq!(evaluation.overall_score(), 85.0);
    }

    #[test]
    fn overall_score_falls_back_without_sub_scores() {
        let evaluation = Evaluation::from_parts(EvaluationParts {
            strengths: vec!["Clear handwriting".into()],
            ..Default::default()
        });
        assert_eq!(evaluation.overall_score(), FALLBACK_OVERALL_SCORE);

        let no_target = Evaluation::from_parts(EvaluationParts {
            choice: Some(ChoiceSummary::default()),
            ..Default::default()
        });
        assert_eq!(no_target.overall_score(), FALLBACK_OVERALL_SCORE);
    }

    #[test]
    fn proficiency_level_parse() {
        assert_eq!(
            "Intermediate (B1)".parse::<ProficiencyLevel>().unwrap(),
            ProficiencyLevel::Intermediate
        );
        assert_eq!(
            "beginner".parse::<ProficiencyLevel>().unwrap(),
            ProficiencyLevel::Beginner
        );
        assert!("fluent-ish".parse::<ProficiencyLevel>().is_err());
        assert!(ProficiencyLevel::Beginner < ProficiencyLevel::Advanced);
    }

    #[test]
    fn evaluation_serde_roundtrip_keeps_overall_score() {
        let evaluation = Evaluation::from_parts(EvaluationParts {
            choice: Some(ChoiceSummary {
                correct: 1,
                total: 2,
            }),
            ..Default::default()
        });
        let json = serde_json::to_string(&evaluation).unwrap();
        assert!(json.contains("\"overall_score\":50.0"));
        let back: Evaluation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, evaluation);
    }
}
