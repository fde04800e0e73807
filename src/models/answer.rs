// src/models/answer.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::progress::ProgressStats;

/// Grading state of a stored answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStatus {
    /// Placeholder created by a hint request before any submission.
    Pending,
    Correct,
    Incorrect,
}

impl AnswerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerStatus::Pending => "pending",
            AnswerStatus::Correct => "correct",
            AnswerStatus::Incorrect => "incorrect",
        }
    }
}

impl fmt::Display for AnswerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnswerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AnswerStatus::Pending),
            "correct" => Ok(AnswerStatus::Correct),
            "incorrect" => Ok(AnswerStatus::Incorrect),
            other => Err(format!("unknown answer status '{other}'")),
        }
    }
}

/// What the participant submitted.
/// Text and multiple choice answers are raw strings; image answers are `{ "url": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Submission {
    Text(String),
    Image { url: String },
}

impl Submission {
    /// Short human readable form, used in prompts.
    pub fn describe(&self) -> String {
        match self {
            Submission::Text(text) => text.clone(),
            Submission::Image { url } => format!("[image] {url}"),
        }
    }
}

/// A graded attempt, kept on the answer row so hints can refer back to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub submission: Submission,
    pub ai_score: i32,
    pub status: AnswerStatus,
}

/// Represents the 'answers' table in the database.
/// At most one row per (progress, question).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub id: i64,
    pub progress_id: i64,
    pub question_id: i64,

    /// Latest submission. `None` for a hint placeholder.
    pub submission: Option<Submission>,

    pub ai_score: Option<i32>,

    pub status: AnswerStatus,

    /// Hints granted so far for this question.
    pub hint_count: i32,

    /// Most recent graded attempts, oldest first.
    pub recent_attempts: Vec<Attempt>,

    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Graded result to persist for a (progress, question) pair.
#[derive(Debug, Clone)]
pub struct AnswerWrite {
    pub progress_id: i64,
    pub question_id: i64,
    pub submission: Submission,
    pub status: AnswerStatus,
    pub ai_score: i32,
    pub recent_attempts: Vec<Attempt>,
}

/// DTO for submitting an answer.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerRequest {
    pub question_id: Option<i64>,
    pub submission: Option<Submission>,
    /// Explicitly replace an already-correct answer (only matters under the
    /// keep-correct resubmission policy).
    #[serde(default)]
    pub retry: bool,
}

/// DTO for requesting a hint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintRequest {
    pub question_id: Option<i64>,
}

/// Result of grading a submission. Same shape for every question type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResponse {
    pub status: AnswerStatus,
    pub ai_score: i32,
    pub explanation: String,
    pub completed: bool,
    pub stats: ProgressStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintResponse {
    pub hint: String,
    pub hint_count: i32,
    pub max_hints: i32,
}
