//! Storage collaborators of the evaluation workflow.
//!
//! Reads that need no isolation go through [`QuestionStore`], [`AnswerStore`]
//! and [`ProgressStore`]. Anything that writes an answer or flips completion
//! runs inside an [`EvaluationTx`] obtained from [`HuntStore::begin`], so the
//! answer upsert and the completion check either both apply or neither does.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    answer::{Answer, AnswerWrite},
    event::Event,
    progress::Progress,
    question::Question,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be mapped onto the domain model.
    #[error("failed to decode stored row: {0}")]
    Decode(String),

    #[error("progress {0} does not exist")]
    MissingProgress(i64),
}

#[async_trait]
pub trait QuestionStore: Send + Sync {
    async fn find_event_by_slug(&self, slug: &str) -> Result<Option<Event>, StoreError>;

    /// Only returns the question if it belongs to the event.
    async fn find_question(
        &self,
        event_id: i64,
        question_id: i64,
    ) -> Result<Option<Question>, StoreError>;

    async fn list_questions(&self, event_id: i64) -> Result<Vec<Question>, StoreError>;
}

#[async_trait]
pub trait AnswerStore: Send + Sync {
    async fn find_answer(
        &self,
        progress_id: i64,
        question_id: i64,
    ) -> Result<Option<Answer>, StoreError>;

    async fn list_answers(&self, progress_id: i64) -> Result<Vec<Answer>, StoreError>;

    async fn count_correct(&self, progress_id: i64) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn find_progress(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> Result<Option<Progress>, StoreError>;

    /// Creates the (user, event) progress or resets an existing one: new
    /// question order, `completed = false`, previous answers removed.
    async fn register_progress(
        &self,
        user_id: i64,
        event_id: i64,
        question_order: &[i64],
    ) -> Result<Progress, StoreError>;

    /// Length of the question order, or the event's question count when the
    /// progress has no order.
    async fn question_count(&self, progress_id: i64) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait HuntStore: QuestionStore + AnswerStore + ProgressStore {
    async fn begin(&self) -> Result<Box<dyn EvaluationTx>, StoreError>;
}

/// One storage transaction. Dropping it without [`EvaluationTx::commit`] rolls back.
#[async_trait]
pub trait EvaluationTx: Send {
    /// Loads the progress row and holds it locked until the transaction ends,
    /// serializing concurrent evaluations of the same progress.
    async fn lock_progress(&mut self, progress_id: i64) -> Result<Progress, StoreError>;

    async fn find_answer(
        &mut self,
        progress_id: i64,
        question_id: i64,
    ) -> Result<Option<Answer>, StoreError>;

    /// Inserts the answer or overwrites the existing row for the pair.
    /// The hint counter is left untouched.
    async fn upsert_answer(&mut self, write: &AnswerWrite) -> Result<Answer, StoreError>;

    /// Sets the hint counter, creating a pending placeholder answer if the
    /// pair has none yet.
    async fn set_hint_count(
        &mut self,
        progress_id: i64,
        question_id: i64,
        hint_count: i32,
    ) -> Result<Answer, StoreError>;

    async fn count_correct(&mut self, progress_id: i64) -> Result<i64, StoreError>;

    async fn count_event_questions(&mut self, event_id: i64) -> Result<i64, StoreError>;

    /// Sets `completed = true` if it was false. Returns whether it changed.
    async fn mark_completed(&mut self, progress_id: i64) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
