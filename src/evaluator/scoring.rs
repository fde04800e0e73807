//! Turning a submission into a graded result.

use url::Url;

use crate::{
    config::MAX_SCORE,
    evaluator::EvaluationError,
    models::{
        answer::{AnswerStatus, Submission},
        question::{Question, QuestionType},
    },
    oracle::Verdict,
};

const MAX_TEXT_LEN: usize = 2000;
const MAX_URL_LEN: usize = 2048;

/// Checks that the submission has the shape the question type expects.
pub fn validate_submission(
    question: &Question,
    submission: &Submission,
) -> Result<(), EvaluationError> {
    match (question.question_type, submission) {
        (QuestionType::Text, Submission::Text(text)) => {
            let text = text.trim();
            if text.is_empty() {
                return Err(EvaluationError::Validation(
                    "Submission cannot be empty".to_string(),
                ));
            }
            if text.chars().count() > MAX_TEXT_LEN {
                return Err(EvaluationError::Validation(format!(
                    "Submission must be at most {MAX_TEXT_LEN} characters"
                )));
            }
            Ok(())
        }
        (QuestionType::MultipleChoice, Submission::Text(key)) => {
            let valid = question
                .options
                .as_ref()
                .is_some_and(|options| options.contains_key(key));
            if valid {
                Ok(())
            } else {
                Err(EvaluationError::Validation(format!(
                    "'{key}' is not one of the options"
                )))
            }
        }
        (QuestionType::Image, Submission::Image { url }) => {
            if url.len() > MAX_URL_LEN {
                return Err(EvaluationError::Validation("Image URL is too long".to_string()));
            }
            match Url::parse(url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
                _ => Err(EvaluationError::Validation(
                    "Image submission needs an absolute http(s) URL".to_string(),
                )),
            }
        }
        (QuestionType::Image, Submission::Text(_)) => Err(EvaluationError::Validation(
            "Image questions expect a submission of the form {\"url\": ...}".to_string(),
        )),
        (_, Submission::Image { .. }) => Err(EvaluationError::Validation(
            "This question expects a text answer".to_string(),
        )),
    }
}

/// Multiple choice answers are compared by option key; no oracle involved.
pub fn grade_choice(question: &Question, key: &str) -> (Verdict, AnswerStatus) {
    if key == question.expected_answer {
        (
            Verdict {
                score: MAX_SCORE,
                explanation: "Correct choice.".to_string(),
            },
            AnswerStatus::Correct,
        )
    } else {
        (
            Verdict {
                score: 0,
                explanation: "That is not the right choice.".to_string(),
            },
            AnswerStatus::Incorrect,
        )
    }
}

/// Correct iff the score reaches the question's threshold.
pub fn status_for_score(score: i32, threshold: i32) -> AnswerStatus {
    if score >= threshold {
        AnswerStatus::Correct
    } else {
        AnswerStatus::Incorrect
    }
}
