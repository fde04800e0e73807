//! Prompt construction and reply parsing.

use std::sync::LazyLock;

use regex::Regex;

use crate::{
    config::MAX_SCORE,
    models::{
        answer::{Attempt, Submission},
        question::{Question, QuestionType},
    },
    oracle::OraclePrompt,
};

static SCORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)score\s*:\s*(-?\d+)").expect("score regex is valid"));

static EXPLANATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)explanation\s*:\s*(.*)").expect("explanation regex is valid")
});

const SCORING_SYSTEM: &str = "You are the judge of a scavenger hunt. Compare the participant's answer with the expected answer and rate how well it matches on a scale from 0 (wrong) to 10 (exactly right). Reply in exactly this format:\nScore: <0-10>\n\nExplanation: <one or two sentences addressed to the participant>";

const IMAGE_SCORING_SYSTEM: &str = "You are the judge of a photo scavenger hunt. Look at the participant's photo and rate how well it shows what the task asks for, on a scale from 0 (not at all) to 10 (exactly). Reply in exactly this format:\nScore: <0-10>\n\nExplanation: <one or two sentences addressed to the participant>";

const HINT_SYSTEM: &str = "You give hints in a scavenger hunt. Never reveal the expected answer outright. Each further hint may be a little more specific than the last. Reply with the hint text only.";

/// Parsed oracle judgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Always within 0..=10.
    pub score: i32,
    pub explanation: String,
}

/// Extracts `Score: N` and the explanation from an oracle reply.
///
/// A missing, unparseable or out-of-range score yields 0.
pub fn parse_verdict(raw: &str) -> Verdict {
    let score = SCORE_RE
        .captures(raw)
        .and_then(|caps| caps[1].parse::<i64>().ok())
        .filter(|n| (0..=i64::from(MAX_SCORE)).contains(n))
        .map(|n| n as i32);

    if score.is_none() {
        tracing::warn!("unusable score in oracle reply, treating as 0");
    }

    let explanation = EXPLANATION_RE
        .captures(raw)
        .map(|caps| caps[1].trim().to_string())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| raw.trim().to_string());

    Verdict {
        score: score.unwrap_or(0),
        explanation,
    }
}

/// Builds the grading prompt for a text or image submission.
pub fn scoring_prompt(question: &Question, submission: &Submission) -> OraclePrompt {
    match (question.question_type, submission) {
        (QuestionType::Image, Submission::Image { url }) => OraclePrompt {
            system: IMAGE_SCORING_SYSTEM.to_string(),
            user: format!(
                "Task: {}\n\nWhat the photo should show: {}\n\nThe participant's photo is attached.",
                question.content, question.expected_answer
            ),
            image_url: Some(url.clone()),
        },
        _ => OraclePrompt {
            system: SCORING_SYSTEM.to_string(),
            user: format!(
                "Question: {}\n\nExpected answer: {}\n\nParticipant's answer: {}",
                question.content,
                question.expected_answer,
                submission.describe()
            ),
            image_url: None,
        },
    }
}

/// Builds the prompt for hint number `hint_number` (1-based), replaying the
/// participant's recent attempts so the hint can build on them.
pub fn hint_prompt(question: &Question, attempts: &[Attempt], hint_number: i32) -> OraclePrompt {
    let mut user = format!(
        "Question: {}\n\nExpected answer (keep secret): {}\n",
        question.content, question.expected_answer
    );

    if let Some(options) = &question.options {
        user.push_str("\nOptions:\n");
        for (key, label) in options {
            user.push_str(&format!("- {key}: {label}\n"));
        }
    }

    if attempts.is_empty() {
        user.push_str("\nThe participant has not submitted an answer yet.\n");
    } else {
        user.push_str("\nThe participant's previous attempts:\n");
        for (i, attempt) in attempts.iter().enumerate() {
            user.push_str(&format!(
                "{}. \"{}\" (score {}/{}, {})\n",
                i + 1,
                attempt.submission.describe(),
                attempt.ai_score,
                MAX_SCORE,
                attempt.status
            ));
        }
    }

    user.push_str(&format!("\nThis is hint number {hint_number}."));

    OraclePrompt {
        system: HINT_SYSTEM.to_string(),
        user,
        image_url: None,
    }
}
