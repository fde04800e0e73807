//! PostgreSQL implementation of the storage traits.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, Transaction, types::Json};

use crate::{
    models::{
        answer::{Answer, AnswerWrite, Attempt, Submission},
        event::Event,
        progress::Progress,
        question::Question,
    },
    store::{AnswerStore, EvaluationTx, HuntStore, ProgressStore, QuestionStore, StoreError},
};

const QUESTION_COLUMNS: &str = r#"
    id, event_id, type AS question_type, content, options,
    expected_answer, ai_threshold, hint_enabled, created_at
"#;

const ANSWER_COLUMNS: &str = r#"
    id, progress_id, question_id, submission, ai_score, status,
    hint_count, recent_attempts, created_at, updated_at
"#;

const PROGRESS_COLUMNS: &str = "id, user_id, event_id, question_order, completed, created_at";

/// Helper struct for reading question rows.
#[derive(FromRow)]
struct QuestionRow {
    id: i64,
    event_id: i64,
    question_type: String,
    content: String,
    options: Option<Json<BTreeMap<String, String>>>,
    expected_answer: String,
    ai_threshold: i32,
    hint_enabled: bool,
    created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TryFrom<QuestionRow> for Question {
    type Error = StoreError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        Ok(Question {
            id: row.id,
            event_id: row.event_id,
            question_type: row.question_type.parse().map_err(StoreError::Decode)?,
            content: row.content,
            options: row.options.map(|o| o.0),
            expected_answer: row.expected_answer,
            ai_threshold: row.ai_threshold,
            hint_enabled: row.hint_enabled,
            created_at: row.created_at,
        })
    }
}

/// Helper struct for reading answer rows.
#[derive(FromRow)]
struct AnswerRow {
    id: i64,
    progress_id: i64,
    question_id: i64,
    submission: Option<Json<Submission>>,
    ai_score: Option<i32>,
    status: String,
    hint_count: i32,
    recent_attempts: Json<Vec<Attempt>>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<AnswerRow> for Answer {
    type Error = StoreError;

    fn try_from(row: AnswerRow) -> Result<Self, Self::Error> {
        Ok(Answer {
            id: row.id,
            progress_id: row.progress_id,
            question_id: row.question_id,
            submission: row.submission.map(|s| s.0),
            ai_score: row.ai_score,
            status: row.status.parse().map_err(StoreError::Decode)?,
            hint_count: row.hint_count,
            recent_attempts: row.recent_attempts.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Helper struct for reading progress rows.
#[derive(FromRow)]
struct ProgressRow {
    id: i64,
    user_id: i64,
    event_id: i64,
    question_order: Option<Json<Vec<i64>>>,
    completed: bool,
    created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<ProgressRow> for Progress {
    fn from(row: ProgressRow) -> Self {
        Progress {
            id: row.id,
            user_id: row.user_id,
            event_id: row.event_id,
            question_order: row.question_order.map(|o| o.0),
            completed: row.completed,
            created_at: row.created_at,
        }
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuestionStore for PgStore {
    async fn find_event_by_slug(&self, slug: &str) -> Result<Option<Event>, StoreError> {
        let event = sqlx::query_as::<_, Event>(
            "SELECT id, slug, name, description, created_at FROM events WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(event)
    }

    async fn find_question(
        &self,
        event_id: i64,
        question_id: i64,
    ) -> Result<Option<Question>, StoreError> {
        let row = sqlx::query_as::<_, QuestionRow>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1 AND event_id = $2"
        ))
        .bind(question_id)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Question::try_from).transpose()
    }

    async fn list_questions(&self, event_id: i64) -> Result<Vec<Question>, StoreError> {
        let rows = sqlx::query_as::<_, QuestionRow>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE event_id = $1 ORDER BY id"
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Question::try_from).collect()
    }
}

#[async_trait]
impl AnswerStore for PgStore {
    async fn find_answer(
        &self,
        progress_id: i64,
        question_id: i64,
    ) -> Result<Option<Answer>, StoreError> {
        let row = sqlx::query_as::<_, AnswerRow>(&format!(
            "SELECT {ANSWER_COLUMNS} FROM answers WHERE progress_id = $1 AND question_id = $2"
        ))
        .bind(progress_id)
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Answer::try_from).transpose()
    }

    async fn list_answers(&self, progress_id: i64) -> Result<Vec<Answer>, StoreError> {
        let rows = sqlx::query_as::<_, AnswerRow>(&format!(
            "SELECT {ANSWER_COLUMNS} FROM answers WHERE progress_id = $1 ORDER BY id"
        ))
        .bind(progress_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Answer::try_from).collect()
    }

    async fn count_correct(&self, progress_id: i64) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM answers WHERE progress_id = $1 AND status = 'correct'",
        )
        .bind(progress_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

#[async_trait]
impl ProgressStore for PgStore {
    async fn find_progress(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> Result<Option<Progress>, StoreError> {
        let row = sqlx::query_as::<_, ProgressRow>(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM progress WHERE user_id = $1 AND event_id = $2"
        ))
        .bind(user_id)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Progress::from))
    }

    async fn register_progress(
        &self,
        user_id: i64,
        event_id: i64,
        question_order: &[i64],
    ) -> Result<Progress, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Upsert: a re-registration starts a fresh attempt
        let row = sqlx::query_as::<_, ProgressRow>(&format!(
            r#"
            INSERT INTO progress (user_id, event_id, question_order, completed)
            VALUES ($1, $2, $3, FALSE)
            ON CONFLICT (user_id, event_id) DO UPDATE SET
                question_order = EXCLUDED.question_order,
                completed = FALSE
            RETURNING {PROGRESS_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(event_id)
        .bind(Json(question_order))
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM answers WHERE progress_id = $1")
            .bind(row.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(row.into())
    }

    async fn question_count(&self, progress_id: i64) -> Result<i64, StoreError> {
        let count: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT COALESCE(
                jsonb_array_length(p.question_order)::BIGINT,
                (SELECT COUNT(*) FROM questions q WHERE q.event_id = p.event_id)
            )
            FROM progress p
            WHERE p.id = $1
            "#,
        )
        .bind(progress_id)
        .fetch_optional(&self.pool)
        .await?;

        count.ok_or(StoreError::MissingProgress(progress_id))
    }
}

#[async_trait]
impl HuntStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn EvaluationTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl EvaluationTx for PgTx {
    async fn lock_progress(&mut self, progress_id: i64) -> Result<Progress, StoreError> {
        let row = sqlx::query_as::<_, ProgressRow>(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM progress WHERE id = $1 FOR UPDATE"
        ))
        .bind(progress_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(Progress::from)
            .ok_or(StoreError::MissingProgress(progress_id))
    }

    async fn find_answer(
        &mut self,
        progress_id: i64,
        question_id: i64,
    ) -> Result<Option<Answer>, StoreError> {
        let row = sqlx::query_as::<_, AnswerRow>(&format!(
            "SELECT {ANSWER_COLUMNS} FROM answers WHERE progress_id = $1 AND question_id = $2"
        ))
        .bind(progress_id)
        .bind(question_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(Answer::try_from).transpose()
    }

    async fn upsert_answer(&mut self, write: &AnswerWrite) -> Result<Answer, StoreError> {
        let row = sqlx::query_as::<_, AnswerRow>(&format!(
            r#"
            INSERT INTO answers (progress_id, question_id, submission, status, ai_score, recent_attempts)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (progress_id, question_id) DO UPDATE SET
                submission = EXCLUDED.submission,
                status = EXCLUDED.status,
                ai_score = EXCLUDED.ai_score,
                recent_attempts = EXCLUDED.recent_attempts,
                updated_at = CURRENT_TIMESTAMP
            RETURNING {ANSWER_COLUMNS}
            "#
        ))
        .bind(write.progress_id)
        .bind(write.question_id)
        .bind(Json(&write.submission))
        .bind(write.status.as_str())
        .bind(write.ai_score)
        .bind(Json(&write.recent_attempts))
        .fetch_one(&mut *self.tx)
        .await?;

        row.try_into()
    }

    async fn set_hint_count(
        &mut self,
        progress_id: i64,
        question_id: i64,
        hint_count: i32,
    ) -> Result<Answer, StoreError> {
        let row = sqlx::query_as::<_, AnswerRow>(&format!(
            r#"
            INSERT INTO answers (progress_id, question_id, status, hint_count)
            VALUES ($1, $2, 'pending', $3)
            ON CONFLICT (progress_id, question_id) DO UPDATE SET
                hint_count = EXCLUDED.hint_count,
                updated_at = CURRENT_TIMESTAMP
            RETURNING {ANSWER_COLUMNS}
            "#
        ))
        .bind(progress_id)
        .bind(question_id)
        .bind(hint_count)
        .fetch_one(&mut *self.tx)
        .await?;

        row.try_into()
    }

    async fn count_correct(&mut self, progress_id: i64) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM answers WHERE progress_id = $1 AND status = 'correct'",
        )
        .bind(progress_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(count)
    }

    async fn count_event_questions(&mut self, event_id: i64) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE event_id = $1")
            .bind(event_id)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(count)
    }

    async fn mark_completed(&mut self, progress_id: i64) -> Result<bool, StoreError> {
        let result =
            sqlx::query("UPDATE progress SET completed = TRUE WHERE id = $1 AND completed = FALSE")
                .bind(progress_id)
                .execute(&mut *self.tx)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
