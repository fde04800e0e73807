//! In-process store, used by tests and local demos.
//!
//! A transaction takes the store lock, works on a copy of the state and
//! publishes it on commit, so transactions are fully serialized.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    models::{
        answer::{Answer, AnswerStatus, AnswerWrite},
        event::Event,
        progress::Progress,
        question::{Question, QuestionType},
    },
    store::{AnswerStore, EvaluationTx, HuntStore, ProgressStore, QuestionStore, StoreError},
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_id: i64,
    events: Vec<Event>,
    questions: Vec<Question>,
    progress: Vec<Progress>,
    answers: Vec<Answer>,
    completion_marks: usize,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn progress(&self, progress_id: i64) -> Result<&Progress, StoreError> {
        self.progress
            .iter()
            .find(|p| p.id == progress_id)
            .ok_or(StoreError::MissingProgress(progress_id))
    }

    fn answer_mut(&mut self, progress_id: i64, question_id: i64) -> Option<&mut Answer> {
        self.answers
            .iter_mut()
            .find(|a| a.progress_id == progress_id && a.question_id == question_id)
    }

    fn find_answer(&self, progress_id: i64, question_id: i64) -> Option<Answer> {
        self.answers
            .iter()
            .find(|a| a.progress_id == progress_id && a.question_id == question_id)
            .cloned()
    }

    fn count_correct(&self, progress_id: i64) -> i64 {
        self.answers
            .iter()
            .filter(|a| a.progress_id == progress_id && a.status == AnswerStatus::Correct)
            .count() as i64
    }

    fn count_event_questions(&self, event_id: i64) -> i64 {
        self.questions
            .iter()
            .filter(|q| q.event_id == event_id)
            .count() as i64
    }

    fn question_count(&self, progress_id: i64) -> Result<i64, StoreError> {
        let progress = self.progress(progress_id)?;
        Ok(match &progress.question_order {
            Some(order) => order.len() as i64,
            None => self.count_event_questions(progress.event_id),
        })
    }
}

/// Seed data for [`MemoryStore::insert_question`].
#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub question_type: QuestionType,
    pub content: String,
    pub options: Option<BTreeMap<String, String>>,
    pub expected_answer: String,
    pub ai_threshold: i32,
    pub hint_enabled: bool,
}

impl NewQuestion {
    pub fn text(content: &str, expected_answer: &str, ai_threshold: i32) -> Self {
        Self {
            question_type: QuestionType::Text,
            content: content.to_string(),
            options: None,
            expected_answer: expected_answer.to_string(),
            ai_threshold,
            hint_enabled: false,
        }
    }

    pub fn image(content: &str, expected_answer: &str, ai_threshold: i32) -> Self {
        Self {
            question_type: QuestionType::Image,
            ..Self::text(content, expected_answer, ai_threshold)
        }
    }

    pub fn multiple_choice(content: &str, options: &[(&str, &str)], expected_key: &str) -> Self {
        Self {
            question_type: QuestionType::MultipleChoice,
            options: Some(
                options
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Self::text(content, expected_key, 0)
        }
    }

    pub fn with_hints(mut self) -> Self {
        self.hint_enabled = true;
        self
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_event(&self, slug: &str, name: &str) -> Event {
        let mut state = self.state.lock().await;
        let event = Event {
            id: state.next_id(),
            slug: slug.to_string(),
            name: name.to_string(),
            description: None,
            created_at: Some(Utc::now()),
        };
        state.events.push(event.clone());
        event
    }

    pub async fn insert_question(&self, event_id: i64, new: NewQuestion) -> Question {
        let mut state = self.state.lock().await;
        let question = Question {
            id: state.next_id(),
            event_id,
            question_type: new.question_type,
            content: new.content,
            options: new.options,
            expected_answer: new.expected_answer,
            ai_threshold: new.ai_threshold,
            hint_enabled: new.hint_enabled,
            created_at: Some(Utc::now()),
        };
        state.questions.push(question.clone());
        question
    }

    /// Inserts a progress row as-is, bypassing registration.
    pub async fn insert_progress(
        &self,
        user_id: i64,
        event_id: i64,
        question_order: Option<Vec<i64>>,
    ) -> Progress {
        let mut state = self.state.lock().await;
        let progress = Progress {
            id: state.next_id(),
            user_id,
            event_id,
            question_order,
            completed: false,
            created_at: Some(Utc::now()),
        };
        state.progress.push(progress.clone());
        progress
    }

    pub async fn progress_by_id(&self, progress_id: i64) -> Option<Progress> {
        let state = self.state.lock().await;
        state.progress.iter().find(|p| p.id == progress_id).cloned()
    }

    pub async fn answers_for(&self, progress_id: i64) -> Vec<Answer> {
        let state = self.state.lock().await;
        state
            .answers
            .iter()
            .filter(|a| a.progress_id == progress_id)
            .cloned()
            .collect()
    }

    /// How many times `mark_completed` actually flipped a progress row.
    pub async fn completion_marks(&self) -> usize {
        self.state.lock().await.completion_marks
    }
}

#[async_trait]
impl QuestionStore for MemoryStore {
    async fn find_event_by_slug(&self, slug: &str) -> Result<Option<Event>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.events.iter().find(|e| e.slug == slug).cloned())
    }

    async fn find_question(
        &self,
        event_id: i64,
        question_id: i64,
    ) -> Result<Option<Question>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .questions
            .iter()
            .find(|q| q.id == question_id && q.event_id == event_id)
            .cloned())
    }

    async fn list_questions(&self, event_id: i64) -> Result<Vec<Question>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .questions
            .iter()
            .filter(|q| q.event_id == event_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AnswerStore for MemoryStore {
    async fn find_answer(
        &self,
        progress_id: i64,
        question_id: i64,
    ) -> Result<Option<Answer>, StoreError> {
        Ok(self.state.lock().await.find_answer(progress_id, question_id))
    }

    async fn list_answers(&self, progress_id: i64) -> Result<Vec<Answer>, StoreError> {
        Ok(self.answers_for(progress_id).await)
    }

    async fn count_correct(&self, progress_id: i64) -> Result<i64, StoreError> {
        Ok(self.state.lock().await.count_correct(progress_id))
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn find_progress(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> Result<Option<Progress>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .progress
            .iter()
            .find(|p| p.user_id == user_id && p.event_id == event_id)
            .cloned())
    }

    async fn register_progress(
        &self,
        user_id: i64,
        event_id: i64,
        question_order: &[i64],
    ) -> Result<Progress, StoreError> {
        let mut state = self.state.lock().await;

        let existing = state
            .progress
            .iter_mut()
            .find(|p| p.user_id == user_id && p.event_id == event_id);

        let progress = match existing {
            Some(progress) => {
                progress.question_order = Some(question_order.to_vec());
                progress.completed = false;
                progress.clone()
            }
            None => {
                let progress = Progress {
                    id: state.next_id(),
                    user_id,
                    event_id,
                    question_order: Some(question_order.to_vec()),
                    completed: false,
                    created_at: Some(Utc::now()),
                };
                state.progress.push(progress.clone());
                progress
            }
        };

        state.answers.retain(|a| a.progress_id != progress.id);
        Ok(progress)
    }

    async fn question_count(&self, progress_id: i64) -> Result<i64, StoreError> {
        self.state.lock().await.question_count(progress_id)
    }
}

#[async_trait]
impl HuntStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn EvaluationTx>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl EvaluationTx for MemoryTx {
    async fn lock_progress(&mut self, progress_id: i64) -> Result<Progress, StoreError> {
        self.working.progress(progress_id).cloned()
    }

    async fn find_answer(
        &mut self,
        progress_id: i64,
        question_id: i64,
    ) -> Result<Option<Answer>, StoreError> {
        Ok(self.working.find_answer(progress_id, question_id))
    }

    async fn upsert_answer(&mut self, write: &AnswerWrite) -> Result<Answer, StoreError> {
        let now = Utc::now();

        if let Some(answer) = self.working.answer_mut(write.progress_id, write.question_id) {
            answer.submission = Some(write.submission.clone());
            answer.status = write.status;
            answer.ai_score = Some(write.ai_score);
            answer.recent_attempts = write.recent_attempts.clone();
            answer.updated_at = now;
            return Ok(answer.clone());
        }

        let answer = Answer {
            id: self.working.next_id(),
            progress_id: write.progress_id,
            question_id: write.question_id,
            submission: Some(write.submission.clone()),
            ai_score: Some(write.ai_score),
            status: write.status,
            hint_count: 0,
            recent_attempts: write.recent_attempts.clone(),
            created_at: now,
            updated_at: now,
        };
        self.working.answers.push(answer.clone());
        Ok(answer)
    }

    async fn set_hint_count(
        &mut self,
        progress_id: i64,
        question_id: i64,
        hint_count: i32,
    ) -> Result<Answer, StoreError> {
        let now = Utc::now();

        if let Some(answer) = self.working.answer_mut(progress_id, question_id) {
            answer.hint_count = hint_count;
            answer.updated_at = now;
            return Ok(answer.clone());
        }

        let answer = Answer {
            id: self.working.next_id(),
            progress_id,
            question_id,
            submission: None,
            ai_score: None,
            status: AnswerStatus::Pending,
            hint_count,
            recent_attempts: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.working.answers.push(answer.clone());
        Ok(answer)
    }

    async fn count_correct(&mut self, progress_id: i64) -> Result<i64, StoreError> {
        Ok(self.working.count_correct(progress_id))
    }

    async fn count_event_questions(&mut self, event_id: i64) -> Result<i64, StoreError> {
        Ok(self.working.count_event_questions(event_id))
    }

    async fn mark_completed(&mut self, progress_id: i64) -> Result<bool, StoreError> {
        let progress = self
            .working
            .progress
            .iter_mut()
            .find(|p| p.id == progress_id)
            .ok_or(StoreError::MissingProgress(progress_id))?;

        if progress.completed {
            return Ok(false);
        }
        progress.completed = true;
        self.working.completion_marks += 1;
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::answer::Submission;

    fn write(progress_id: i64, question_id: i64, status: AnswerStatus) -> AnswerWrite {
        AnswerWrite {
            progress_id,
            question_id,
            submission: Submission::Text("x".to_string()),
            status,
            ai_score: 7,
            recent_attempts: Vec::new(),
        }
    }

    #[tokio::test]
    async fn uncommitted_transaction_is_discarded() {
        let store = MemoryStore::new();
        let event = store.insert_event("hunt", "Hunt").await;
        let progress = store.insert_progress(1, event.id, None).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.upsert_answer(&write(progress.id, 10, AnswerStatus::Correct))
                .await
                .unwrap();
            tx.mark_completed(progress.id).await.unwrap();
        }

        assert!(store.answers_for(progress.id).await.is_empty());
        assert!(!store.progress_by_id(progress.id).await.unwrap().completed);
    }

    #[tokio::test]
    async fn upsert_keeps_single_row_and_hint_count() {
        let store = MemoryStore::new();
        let event = store.insert_event("hunt", "Hunt").await;
        let progress = store.insert_progress(1, event.id, None).await;

        let mut tx = store.begin().await.unwrap();
        tx.set_hint_count(progress.id, 10, 1).await.unwrap();
        tx.upsert_answer(&write(progress.id, 10, AnswerStatus::Incorrect))
            .await
            .unwrap();
        let answer = tx
            .upsert_answer(&write(progress.id, 10, AnswerStatus::Correct))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(answer.hint_count, 1);
        let answers = store.answers_for(progress.id).await;
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].status, AnswerStatus::Correct);
    }

    #[tokio::test]
    async fn mark_completed_only_transitions_once() {
        let store = MemoryStore::new();
        let event = store.insert_event("hunt", "Hunt").await;
        let progress = store.insert_progress(1, event.id, Some(vec![1])).await;

        let mut tx = store.begin().await.unwrap();
        assert!(tx.mark_completed(progress.id).await.unwrap());
        assert!(!tx.mark_completed(progress.id).await.unwrap());
        tx.commit().await.unwrap();

        assert_eq!(store.completion_marks().await, 1);
    }

    #[tokio::test]
    async fn registration_resets_progress_and_answers() {
        let store = MemoryStore::new();
        let event = store.insert_event("hunt", "Hunt").await;
        let first = store.register_progress(7, event.id, &[1, 2]).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.upsert_answer(&write(first.id, 1, AnswerStatus::Correct))
            .await
            .unwrap();
        tx.mark_completed(first.id).await.unwrap();
        tx.commit().await.unwrap();

        let again = store.register_progress(7, event.id, &[2, 1]).await.unwrap();
        assert_eq!(again.id, first.id);
        assert!(!again.completed);
        assert_eq!(again.question_order, Some(vec![2, 1]));
        assert!(store.answers_for(first.id).await.is_empty());
    }
}
