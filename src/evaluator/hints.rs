//! Rate-limited AI hints.

use std::sync::Arc;

use tracing::instrument;

use crate::{
    evaluator::{AnswerEvaluator, EvaluationError},
    models::{answer::HintResponse, progress::Progress},
    oracle::{self, hint_prompt},
    store::HuntStore,
};

impl AnswerEvaluator {
    /// Grants one hint for the question, up to `max_hints` per question.
    ///
    /// The counter is reserved in a transaction before the oracle is called, so
    /// an exhausted request never reaches the oracle and two concurrent
    /// requests cannot both take the last hint. The reservation is given back
    /// if the oracle call fails or the request is dropped before it returns.
    #[instrument(skip(self, progress), fields(progress_id = progress.id))]
    pub async fn request_hint(
        &self,
        progress: &Progress,
        question_id: i64,
    ) -> Result<HintResponse, EvaluationError> {
        let question = self.question_for(progress, question_id).await?;

        if !question.hint_enabled {
            return Err(EvaluationError::HintsDisabled);
        }

        let max_hints = self.settings.max_hints;

        let mut tx = self.store.begin().await?;
        tx.lock_progress(progress.id).await?;

        let existing = tx.find_answer(progress.id, question_id).await?;
        let used = existing.as_ref().map_or(0, |a| a.hint_count);
        if used >= max_hints {
            return Err(EvaluationError::HintsExhausted { max_hints });
        }

        let hint_count = used + 1;
        let answer = tx.set_hint_count(progress.id, question_id, hint_count).await?;
        tx.commit().await?;

        let reservation = HintReservation {
            store: Some(self.store.clone()),
            progress_id: progress.id,
            question_id,
        };

        let prompt = hint_prompt(&question, &answer.recent_attempts, hint_count);
        let hint = match oracle::complete_within(
            self.oracle.as_ref(),
            &prompt,
            self.settings.oracle_timeout,
        )
        .await
        {
            Ok(text) => {
                reservation.keep();
                text.trim().to_string()
            }
            Err(e) => {
                tracing::warn!("hint generation failed, releasing reservation: {}", e);
                reservation.release().await;
                return Err(e.into());
            }
        };

        tracing::info!(question_id, hint_count, "hint granted");

        Ok(HintResponse {
            hint,
            hint_count,
            max_hints,
        })
    }
}

/// A committed hint slot that has not been delivered yet.
/// Dropping it unresolved releases the slot on a background task.
struct HintReservation {
    store: Option<Arc<dyn HuntStore>>,
    progress_id: i64,
    question_id: i64,
}

impl HintReservation {
    fn keep(mut self) {
        self.store = None;
    }

    async fn release(mut self) {
        if let Some(store) = self.store.take() {
            release_hint(store.as_ref(), self.progress_id, self.question_id).await;
        }
    }
}

impl Drop for HintReservation {
    fn drop(&mut self) {
        if let Some(store) = self.store.take() {
            let (progress_id, question_id) = (self.progress_id, self.question_id);
            tracing::warn!(progress_id, question_id, "hint request dropped, releasing reservation");
            tokio::spawn(async move {
                release_hint(store.as_ref(), progress_id, question_id).await;
            });
        }
    }
}

async fn release_hint(store: &dyn HuntStore, progress_id: i64, question_id: i64) {
    let result = async {
        let mut tx = store.begin().await?;
        tx.lock_progress(progress_id).await?;
        if let Some(answer) = tx.find_answer(progress_id, question_id).await? {
            tx.set_hint_count(progress_id, question_id, (answer.hint_count - 1).max(0))
                .await?;
        }
        tx.commit().await
    }
    .await;

    if let Err(e) = result {
        tracing::error!("failed to release hint reservation: {}", e);
    }
}
