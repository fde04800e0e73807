// src/models/question.rs

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::config::MAX_SCORE;

/// How a question is answered and scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// Free-form text, judged by the scoring oracle.
    Text,
    /// Pick one option key; compared deterministically.
    MultipleChoice,
    /// Photo submission referenced by URL, judged by the scoring oracle.
    Image,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Text => "text",
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::Image => "image",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(QuestionType::Text),
            "multiple_choice" => Ok(QuestionType::MultipleChoice),
            "image" => Ok(QuestionType::Image),
            other => Err(format!("unknown question type '{other}'")),
        }
    }
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    pub event_id: i64,

    /// Mapped from the database column 'type'.
    pub question_type: QuestionType,

    /// The text content of the question.
    pub content: String,

    /// Choice key -> label. Only present for multiple choice questions.
    pub options: Option<BTreeMap<String, String>>,

    /// For multiple choice this is an option key; otherwise a description
    /// the oracle compares the submission against.
    pub expected_answer: String,

    /// Minimum oracle score (0-10) for the answer to count as correct.
    pub ai_threshold: i32,

    pub hint_enabled: bool,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for sending question to client (excludes expected answer and threshold).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub id: i64,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub content: String,
    pub options: Option<BTreeMap<String, String>>,
    pub hint_enabled: bool,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            question_type: q.question_type,
            content: q.content.clone(),
            options: q.options.clone(),
            hint_enabled: q.hint_enabled,
        }
    }
}

/// DTO for creating a new question.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = validate_question_shape))]
pub struct CreateQuestionRequest {
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[validate(length(min = 1, max = 2000))]
    pub content: String,
    #[validate(custom(function = validate_options))]
    pub options: Option<BTreeMap<String, String>>,
    #[validate(length(min = 1, max = 2000))]
    pub expected_answer: String,
    #[validate(range(min = 0, max = 10))]
    #[serde(default = "default_threshold")]
    pub ai_threshold: i32,
    #[serde(default)]
    pub hint_enabled: bool,
}

/// DTO for editing a question. Fields are optional.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuestionRequest {
    #[serde(rename = "type")]
    pub question_type: Option<QuestionType>,
    pub content: Option<String>,
    pub options: Option<BTreeMap<String, String>>,
    pub expected_answer: Option<String>,
    pub ai_threshold: Option<i32>,
    pub hint_enabled: Option<bool>,
}

impl UpdateQuestionRequest {
    /// Overlays the edit onto the current question, producing a request that
    /// can be validated as a whole.
    pub fn merge_into(self, current: &Question) -> CreateQuestionRequest {
        let question_type = self.question_type.unwrap_or(current.question_type);
        let options = match (self.options, question_type) {
            (Some(opts), _) => Some(opts),
            (None, QuestionType::MultipleChoice) => current.options.clone(),
            (None, _) => None,
        };

        CreateQuestionRequest {
            question_type,
            content: self.content.unwrap_or_else(|| current.content.clone()),
            options,
            expected_answer: self
                .expected_answer
                .unwrap_or_else(|| current.expected_answer.clone()),
            ai_threshold: self.ai_threshold.unwrap_or(current.ai_threshold),
            hint_enabled: self.hint_enabled.unwrap_or(current.hint_enabled),
        }
    }
}

fn default_threshold() -> i32 {
    MAX_SCORE / 2
}

fn validate_options(options: &BTreeMap<String, String>) -> Result<(), validator::ValidationError> {
    if options.is_empty() {
        return Err(validator::ValidationError::new("options_cannot_be_empty"));
    }
    for (key, label) in options {
        if key.is_empty() || key.len() > 50 {
            return Err(validator::ValidationError::new("invalid_option_key"));
        }
        if label.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}

/// Multiple choice questions need options and an expected answer that is one
/// of the option keys; other types carry no options.
fn validate_question_shape(req: &CreateQuestionRequest) -> Result<(), validator::ValidationError> {
    match (req.question_type, &req.options) {
        (QuestionType::MultipleChoice, None) => {
            Err(validator::ValidationError::new("options_required"))
        }
        (QuestionType::MultipleChoice, Some(options)) => {
            if options.contains_key(&req.expected_answer) {
                Ok(())
            } else {
                Err(validator::ValidationError::new("expected_answer_not_an_option"))
            }
        }
        (_, Some(_)) => Err(validator::ValidationError::new("options_not_allowed")),
        (_, None) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mc_request(expected: &str) -> CreateQuestionRequest {
        CreateQuestionRequest {
            question_type: QuestionType::MultipleChoice,
            content: "Which statue faces the river?".to_string(),
            options: Some(BTreeMap::from([
                ("a".to_string(), "The lion".to_string()),
                ("b".to_string(), "The poet".to_string()),
            ])),
            expected_answer: expected.to_string(),
            ai_threshold: 5,
            hint_enabled: false,
        }
    }

    #[test]
    fn multiple_choice_expected_answer_must_be_option_key() {
        assert!(mc_request("a").validate().is_ok());
        assert!(mc_request("The lion").validate().is_err());
    }

    #[test]
    fn text_question_rejects_options() {
        let mut req = mc_request("a");
        req.question_type = QuestionType::Text;
        assert!(req.validate().is_err());

        req.options = None;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let mut req = mc_request("a");
        req.ai_threshold = 11;
        assert!(req.validate().is_err());
    }

    #[test]
    fn question_type_round_trips_through_str() {
        for ty in [QuestionType::Text, QuestionType::MultipleChoice, QuestionType::Image] {
            assert_eq!(ty.as_str().parse::<QuestionType>().unwrap(), ty);
        }
        assert!("essay".parse::<QuestionType>().is_err());
    }

    #[test]
    fn update_keeps_unchanged_fields() {
        let current = Question {
            id: 1,
            event_id: 1,
            question_type: QuestionType::Text,
            content: "Find the oldest tree".to_string(),
            options: None,
            expected_answer: "The oak by the gate".to_string(),
            ai_threshold: 6,
            hint_enabled: true,
            created_at: None,
        };
        let update = UpdateQuestionRequest {
            question_type: None,
            content: None,
            options: None,
            expected_answer: None,
            ai_threshold: Some(8),
            hint_enabled: None,
        };

        let merged = update.merge_into(&current);
        assert_eq!(merged.ai_threshold, 8);
        assert_eq!(merged.content, current.content);
        assert!(merged.hint_enabled);
        assert!(merged.validate().is_ok());
    }
}
