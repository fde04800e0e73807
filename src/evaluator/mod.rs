//! Answer evaluation: grade a submission, store it, and update completion.

pub mod completion;
pub mod hints;
pub mod scoring;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::instrument;

use crate::{
    config::{Config, HINT_HISTORY_LIMIT, ResubmissionPolicy},
    models::{
        answer::{AnswerStatus, AnswerWrite, Attempt, EvaluationResponse, Submission},
        progress::Progress,
        question::{Question, QuestionType},
    },
    oracle::{self, OracleError, ScoringOracle, scoring_prompt},
    store::{HuntStore, StoreError},
};

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("hints are disabled for this question")]
    HintsDisabled,

    #[error("hint limit of {max_hints} reached")]
    HintsExhausted { max_hints: i32 },

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct EvaluatorSettings {
    pub max_hints: i32,
    pub hint_history: usize,
    pub oracle_timeout: Duration,
    pub resubmission_policy: ResubmissionPolicy,
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            max_hints: crate::config::MAX_HINTS_PER_QUESTION,
            hint_history: HINT_HISTORY_LIMIT,
            oracle_timeout: Duration::from_secs(30),
            resubmission_policy: ResubmissionPolicy::LastWriteWins,
        }
    }
}

impl From<&Config> for EvaluatorSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_hints: config.max_hints,
            hint_history: HINT_HISTORY_LIMIT,
            oracle_timeout: config.oracle_timeout(),
            resubmission_policy: config.resubmission_policy,
        }
    }
}

pub struct AnswerEvaluator {
    store: Arc<dyn HuntStore>,
    oracle: Arc<dyn ScoringOracle>,
    settings: EvaluatorSettings,
}

impl AnswerEvaluator {
    pub fn new(
        store: Arc<dyn HuntStore>,
        oracle: Arc<dyn ScoringOracle>,
        settings: EvaluatorSettings,
    ) -> Self {
        Self {
            store,
            oracle,
            settings,
        }
    }

    /// Grades `submission` for the question and stores the result.
    ///
    /// Scoring happens before any storage transaction is opened. The answer
    /// upsert and the completion check then run in one transaction holding
    /// the progress row lock.
    #[instrument(skip(self, progress, submission), fields(progress_id = progress.id))]
    pub async fn evaluate_and_store(
        &self,
        progress: &Progress,
        question_id: i64,
        submission: Submission,
        retry: bool,
    ) -> Result<EvaluationResponse, EvaluationError> {
        let question = self.question_for(progress, question_id).await?;
        scoring::validate_submission(&question, &submission)?;

        let (verdict, status) = match (&question.question_type, &submission) {
            (QuestionType::MultipleChoice, Submission::Text(key)) => {
                scoring::grade_choice(&question, key)
            }
            _ => {
                let prompt = scoring_prompt(&question, &submission);
                let verdict =
                    oracle::score(self.oracle.as_ref(), &prompt, self.settings.oracle_timeout)
                        .await?;
                let status = scoring::status_for_score(verdict.score, question.ai_threshold);
                (verdict, status)
            }
        };

        let mut tx = self.store.begin().await?;
        let locked = tx.lock_progress(progress.id).await?;
        let existing = tx.find_answer(progress.id, question_id).await?;

        let keep_existing = self.settings.resubmission_policy == ResubmissionPolicy::KeepCorrect
            && !retry
            && status != AnswerStatus::Correct
            && existing
                .as_ref()
                .is_some_and(|a| a.status == AnswerStatus::Correct);

        let (stored_status, stored_score) = match existing {
            Some(answer) if keep_existing => {
                tracing::info!(question_id, "keeping correct answer over lower resubmission");
                (answer.status, answer.ai_score.unwrap_or(verdict.score))
            }
            previous => {
                let mut recent_attempts = previous.map(|a| a.recent_attempts).unwrap_or_default();
                recent_attempts.push(Attempt {
                    submission: submission.clone(),
                    ai_score: verdict.score,
                    status,
                });
                let overflow = recent_attempts
                    .len()
                    .saturating_sub(self.settings.hint_history);
                recent_attempts.drain(..overflow);

                let answer = tx
                    .upsert_answer(&AnswerWrite {
                        progress_id: progress.id,
                        question_id,
                        submission,
                        status,
                        ai_score: verdict.score,
                        recent_attempts,
                    })
                    .await?;
                (answer.status, verdict.score)
            }
        };

        let check = completion::recompute(tx.as_mut(), &locked).await?;
        tx.commit().await?;

        if check.newly_completed {
            tracing::info!(
                user_id = locked.user_id,
                event_id = locked.event_id,
                "progress completed"
            );
        }

        Ok(EvaluationResponse {
            status: stored_status,
            ai_score: stored_score,
            explanation: verdict.explanation,
            completed: check.completed,
            stats: check.stats,
        })
    }

    /// Loads a question of the progress' event that is part of its order.
    async fn question_for(
        &self,
        progress: &Progress,
        question_id: i64,
    ) -> Result<Question, EvaluationError> {
        let not_found = || EvaluationError::NotFound("Question not found in this event".to_string());

        if !progress.includes(question_id) {
            return Err(not_found());
        }

        self.store
            .find_question(progress.event_id, question_id)
            .await?
            .ok_or_else(not_found)
    }
}
