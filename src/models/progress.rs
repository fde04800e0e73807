// src/models/progress.rs

use serde::{Deserialize, Serialize};

use crate::models::{answer::AnswerStatus, question::PublicQuestion};

/// Represents the 'progress' table in the database.
/// One row per (user, event): the participant's current attempt at the hunt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub id: i64,
    pub user_id: i64,
    pub event_id: i64,

    /// Question ids in the order this participant sees them.
    /// Shuffled at registration.
    pub question_order: Option<Vec<i64>>,

    /// Flips false -> true once every question is answered correctly.
    /// Only a fresh registration resets it.
    pub completed: bool,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Progress {
    /// Whether the question belongs to this attempt's question order.
    /// Progress rows without an order accept any question of the event.
    pub fn includes(&self, question_id: i64) -> bool {
        self.question_order
            .as_ref()
            .is_none_or(|order| order.contains(&question_id))
    }
}

/// Incremental progress counters ("1 of 3").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressStats {
    pub correct_count: i64,
    pub total_questions: i64,
}

/// DTO returned after registering for an event.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub progress_id: i64,
    pub total_questions: usize,
    pub completed: bool,
}

/// One question in the participant's view, with their answer state.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressQuestion {
    #[serde(flatten)]
    pub question: PublicQuestion,
    pub status: Option<AnswerStatus>,
    pub hint_count: i32,
}

/// DTO for the participant's progress page.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub progress_id: i64,
    pub completed: bool,
    pub stats: ProgressStats,
    pub questions: Vec<ProgressQuestion>,
}

/// Row of the admin dashboard.
#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub progress_id: i64,
    pub username: String,
    pub completed: bool,
    pub correct_count: i64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(order: Option<Vec<i64>>) -> Progress {
        Progress {
            id: 1,
            user_id: 1,
            event_id: 1,
            question_order: order,
            completed: false,
            created_at: None,
        }
    }

    #[test]
    fn includes_checks_question_order() {
        let p = progress(Some(vec![3, 1, 2]));
        assert!(p.includes(2));
        assert!(!p.includes(4));
    }

    #[test]
    fn missing_order_accepts_any_question() {
        assert!(progress(None).includes(42));
    }
}
