use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

/// Number of questions a generated quiz must contain
pub const QUIZ_LENGTH: usize = 5;
/// Number of options each question must offer
pub const OPTION_COUNT: usize = 4;
/// Minimum score (percent) to pass a quiz
pub const PASS_THRESHOLD: i64 = 75;

/// A multiple-choice question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Question {
    /// The question text
    pub q: String,
    /// Exactly four answer options
    pub options: Vec<String>,
    /// The text of the correct option, must be one of `options`
    pub answer: String,
}

/// Quiz verdict for one video, as produced by an inference backend and as stored on the video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QuizPayload {
    /// false for intros, outros, vlogs, announcements and previews; true for lessons and tutorials
    #[serde(default, deserialize_with = "null_as_false")]
    pub has_quiz: bool,
    /// Brief explanation of the decision
    #[serde(default = "unknown_reason", deserialize_with = "null_as_unknown")]
    pub reason: String,
    /// Exactly 5 questions when has_quiz is true, otherwise empty
    #[serde(default, deserialize_with = "null_as_empty")]
    pub questions: Vec<Question>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub analysis_method: Option<String>,
}

fn unknown_reason() -> String {
    "Unknown".to_string()
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

fn null_as_unknown<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(unknown_reason))
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Question>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Question>>::deserialize(deserializer)?.unwrap_or_default())
}

impl QuizPayload {
    /// A verdict without questions
    pub fn no_quiz(reason: impl Into<String>) -> Self {
        Self {
            has_quiz: false,
            reason: reason.into(),
            questions: Vec::new(),
            analysis_method: None,
        }
    }

    /// Enforce `has_quiz <=> exactly 5 well-formed questions`.
    ///
    /// A verdict that claims a quiz but carries the wrong number of questions, or a question
    /// whose answer is not among its four options, is downgraded to `has_quiz = false`.
    pub fn normalize(mut self) -> Self {
        if !self.has_quiz {
            self.questions.clear();
            return self;
        }
        if let Some(problem) = self.structural_problem() {
            self.has_quiz = false;
            self.reason = format!("Discarded malformed quiz: {problem}");
            self.questions.clear();
        }
        self
    }

    fn structural_problem(&self) -> Option<String> {
        if self.questions.len() != QUIZ_LENGTH {
            return Some(format!(
                "expected {QUIZ_LENGTH} questions, got {}",
                self.questions.len()
            ));
        }
        for (i, question) in self.questions.iter().enumerate() {
            if question.options.len() != OPTION_COUNT {
                return Some(format!(
                    "question {i} has {} options",
                    question.options.len()
                ));
            }
            if !question.options.contains(&question.answer) {
                return Some(format!("question {i} answer is not one of its options"));
            }
        }
        None
    }

    /// Whether this payload is a complete quiz worth storing
    pub fn is_valid_quiz(&self) -> bool {
        self.has_quiz && self.questions.len() == QUIZ_LENGTH
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.analysis_method = Some(method.to_string());
        self
    }

    /// Grade answers keyed by question index
    pub fn grade(&self, answers: &BTreeMap<usize, String>) -> QuizGrade {
        let total = self.questions.len();
        let correct = self
            .questions
            .iter()
            .enumerate()
            .filter(|(i, q)| answers.get(i).is_some_and(|a| a.trim() == q.answer.trim()))
            .count();
        let score = if total == 0 {
            0
        } else {
            ((correct as f64 / total as f64) * 100.0).round() as i64
        };
        QuizGrade {
            correct,
            total,
            score,
            passed: total > 0 && score >= PASS_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizGrade {
    pub correct: usize,
    pub total: usize,
    pub score: i64,
    pub passed: bool,
}

#[cfg(test)]
pub(crate) fn sample_quiz() -> QuizPayload {
    let questions = (0..QUIZ_LENGTH)
        .map(|i| Question {
            q: format!("Question {i}?"),
            options: vec![
                format!("A{i}"),
                format!("B{i}"),
                format!("C{i}"),
                format!("D{i}"),
            ],
            answer: format!("B{i}"),
        })
        .collect();
    QuizPayload {
        has_quiz: true,
        reason: "Lecture on ownership".to_string(),
        questions,
        analysis_method: None,
    }
}
