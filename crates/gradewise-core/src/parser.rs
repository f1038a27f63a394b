//! Best-effort parser for text-generation feedback.
//!
//! The generation service is asked for four labeled blocks:
//!
//! ```text
//! GRAMMAR CORRECTIONS:
//! - Original: I go to school yesterday. | Corrected: I went to school yesterday. | Explanation: ...
//! VOCABULARY ASSESSMENT:
//! Used words: school, yesterday
//! Suggested words: attended
//! Level: intermediate
//! STRENGTHS:
//! - Clear sentence structure
//! IMPROVEMENT AREAS:
//! - Past tense of irregular verbs
//! ```
//!
//! It returns prose, not JSON, and does not always follow the format. Parsing
//! never fails: a missing or malformed block yields empty values.

use crate::model::{GrammarCorrection, ProficiencyLevel, VocabularyFeedback};

/// Everything extracted from one generation response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFeedback {
    pub grammar_corrections: Vec<GrammarCorrection>,
    /// Vocabulary words and level. `score` is left for the caller to derive.
    pub vocabulary: VocabularyFeedback,
    pub strengths: Vec<String>,
    pub improvement_areas: Vec<String>,
}

impl ParsedFeedback {
    /// Whether the vocabulary block carried anything at all.
    pub fn has_vocabulary(&self) -> bool {
        !self.vocabulary.used_words.is_empty()
            || !self.vocabulary.suggested_words.is_empty()
            || self.vocabulary.level.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Grammar,
    Vocabulary,
    Strengths,
    Improvements,
}

// Longer names first so "grammar corrections" wins over "grammar".
const HEADERS: &[(&str, Section)] = &[
    ("grammar corrections", Section::Grammar),
    ("grammar correction", Section::Grammar),
    ("grammar", Section::Grammar),
    ("vocabulary assessment", Section::Vocabulary),
    ("vocabulary", Section::Vocabulary),
    ("strengths", Section::Strengths),
    ("improvement areas", Section::Improvements),
    ("areas for improvement", Section::Improvements),
    ("areas to improve", Section::Improvements),
    ("improvements", Section::Improvements),
];

const PLACEHOLDERS: &[&str] = &["none", "n/a", "na", "nothing", "-", "no corrections"];

/// Raw lines collected per block.
#[derive(Default)]
struct Blocks<'a> {
    grammar: Vec<&'a str>,
    vocabulary: Vec<&'a str>,
    strengths: Vec<&'a str>,
    improvements: Vec<&'a str>,
}

impl<'a> Blocks<'a> {
    fn push(&mut self, section: Section, line: &'a str) {
        match section {
            Section::Grammar => self.grammar.push(line),
            Section::Vocabulary => self.vocabulary.push(line),
            Section::Strengths => self.strengths.push(line),
            Section::Improvements => self.improvements.push(line),
        }
    }
}

/// Parse a generation response into its four blocks.
pub fn parse_feedback(response: &str) -> ParsedFeedback {
    let mut blocks = Blocks::default();
    let mut current: Option<Section> = None;

    for line in response.lines() {
        if let Some((section, inline)) = header_of(line) {
            current = Some(section);
            if !inline.is_empty() {
                blocks.push(section, inline);
            }
        } else if let Some(section) = current {
            blocks.push(section, line);
        }
    }

    ParsedFeedback {
        grammar_corrections: list_items(&blocks.grammar)
            .iter()
            .filter_map(|item| parse_correction(item))
            .collect(),
        vocabulary: parse_vocabulary(&blocks.vocabulary),
        strengths: plain_items(&blocks.strengths),
        improvement_areas: plain_items(&blocks.improvements),
    }
}

/// Recognise a block header, tolerating `#`, `**` and numbering. Returns the
/// section and any content following the header on the same line.
fn header_of(line: &str) -> Option<(Section, &str)> {
    let trimmed = line.trim();
    if trimmed.starts_with('-') {
        return None;
    }
    let stripped = trimmed.trim_start_matches(|c: char| {
        c == '#' || c == '*' || c == '.' || c == ')' || c.is_ascii_digit() || c.is_whitespace()
    });
    let lower = stripped.to_ascii_lowercase();

    for (name, section) in HEADERS {
        if !lower.starts_with(name) {
            continue;
        }
        let rest = stripped.get(name.len()..)?;
        let after = rest.trim_start();
        if !(after.is_empty() || after.starts_with(':') || after.starts_with('*')) {
            continue;
        }
        let inline = after
            .trim_start_matches(|c: char| c == '*' || c == ':' || c.is_whitespace())
            .trim_end_matches('*')
            .trim();
        return Some((*section, inline));
    }
    None
}

/// Group lines into dash-prefixed items; other non-empty lines continue the
/// previous item.
fn list_items(lines: &[&str]) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(item) = trimmed.strip_prefix('-') {
            items.push(item.trim().to_string());
        } else if let Some(last) = items.last_mut() {
            last.push('\n');
            last.push_str(trimmed);
        }
    }
    items
}

fn plain_items(lines: &[&str]) -> Vec<String> {
    list_items(lines)
        .into_iter()
        .map(|item| item.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|item| !is_placeholder(item))
        .collect()
}

fn is_placeholder(value: &str) -> bool {
    let normalized = value.trim().trim_end_matches('.').to_ascii_lowercase();
    normalized.is_empty() || PLACEHOLDERS.contains(&normalized.as_str())
}

const ORIGINAL: &str = "original:";
const CORRECTED: &str = "corrected:";
const EXPLANATION: &str = "explanation:";

/// Split a grammar item into its labeled parts. Items without both an
/// original and a corrected text are dropped.
fn parse_correction(item: &str) -> Option<GrammarCorrection> {
    let positions: Vec<(&str, usize)> = [ORIGINAL, CORRECTED, EXPLANATION]
        .into_iter()
        .filter_map(|label| find_ascii_ci(item, label).map(|pos| (label, pos)))
        .collect();

    let field = |label: &str| -> String {
        let Some(&(_, start)) = positions.iter().find(|(l, _)| *l == label) else {
            return String::new();
        };
        let value_start = start + label.len();
        let value_end = positions
            .iter()
            .map(|&(_, pos)| pos)
            .filter(|&pos| pos > start)
            .min()
            .unwrap_or(item.len());
        clean_value(&item[value_start..value_end])
    };

    let original = field(ORIGINAL);
    let corrected = field(CORRECTED);
    if original.is_empty() || corrected.is_empty() {
        return None;
    }
    Some(GrammarCorrection {
        original,
        corrected,
        explanation: field(EXPLANATION),
    })
}

fn clean_value(raw: &str) -> String {
    let joined = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    joined
        .trim_start_matches(|c: char| c == '*' || c.is_whitespace())
        .trim_end_matches(|c: char| matches!(c, '*' | '|' | ',' | ';') || c.is_whitespace())
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '“' || c == '”')
        .trim()
        .to_string()
}

/// Byte offset of `needle` (ASCII) in `haystack`, ignoring ASCII case.
fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.as_bytes();
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

fn parse_vocabulary(lines: &[&str]) -> VocabularyFeedback {
    let mut vocabulary = VocabularyFeedback::default();
    for line in lines {
        let line = line.trim().trim_start_matches('-').trim();
        if let Some(value) = label_value(line, &["used words", "words used"]) {
            vocabulary.used_words.extend(split_words(value));
        } else if let Some(value) = label_value(line, &["suggested words", "suggestions"]) {
            vocabulary.suggested_words.extend(split_words(value));
        } else if let Some(value) = label_value(line, &["proficiency level", "level"]) {
            if vocabulary.level.is_none() {
                vocabulary.level = value.parse::<ProficiencyLevel>().ok();
            }
        }
    }
    vocabulary
}

/// If `line` starts with one of `labels` followed by a colon, the text after it.
fn label_value<'a>(line: &'a str, labels: &[&str]) -> Option<&'a str> {
    let line = line.trim_start_matches('*');
    labels.iter().find_map(|label| {
        let head = line.get(..label.len())?;
        if !head.eq_ignore_ascii_case(label) {
            return None;
        }
        let rest = line[label.len()..].trim_start_matches('*').trim_start();
        rest.strip_prefix(':')
            .map(|value| value.trim_matches(|c: char| c == '*' || c.is_whitespace()))
    })
}

fn split_words(value: &str) -> Vec<String> {
    value
        .split([',', ';'])
        .map(clean_value)
        .filter(|word| !is_placeholder(word))
        .collect()
}
