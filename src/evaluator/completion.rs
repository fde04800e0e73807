//! Deciding when a progress is complete.

use crate::{
    models::progress::{Progress, ProgressStats},
    store::{EvaluationTx, StoreError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionCheck {
    pub completed: bool,
    /// True only for the evaluation that performed the false -> true flip.
    pub newly_completed: bool,
    pub stats: ProgressStats,
}

/// Completion needs a non-empty question set with every question correct.
pub fn should_complete(correct_count: i64, total_questions: i64) -> bool {
    total_questions > 0 && correct_count >= total_questions
}

/// Counts correct answers inside the caller's transaction and flips the
/// progress to completed when the threshold is met. Never resets the flag.
pub async fn recompute(
    tx: &mut dyn EvaluationTx,
    progress: &Progress,
) -> Result<CompletionCheck, StoreError> {
    let correct_count = tx.count_correct(progress.id).await?;
    let total_questions = match &progress.question_order {
        Some(order) => order.len() as i64,
        None => tx.count_event_questions(progress.event_id).await?,
    };

    let mut completed = progress.completed;
    let mut newly_completed = false;

    if !completed && should_complete(correct_count, total_questions) {
        newly_completed = tx.mark_completed(progress.id).await?;
        completed = true;
    }

    Ok(CompletionCheck {
        completed,
        newly_completed,
        stats: ProgressStats {
            correct_count,
            total_questions,
        },
    })
}
