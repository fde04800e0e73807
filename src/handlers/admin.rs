// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, types::Json as SqlJson};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        event::{CreateEventRequest, Event},
        progress::ProgressSummary,
        question::{CreateQuestionRequest, UpdateQuestionRequest},
    },
    store::{PgStore, QuestionStore},
    utils::html::clean_html,
};

/// Creates a new event.
/// Admin only.
pub async fn create_event(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateEventRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let event = sqlx::query_as::<_, Event>(
        r#"
        INSERT INTO events (slug, name, description)
        VALUES ($1, $2, $3)
        RETURNING id, slug, name, description, created_at
        "#,
    )
    .bind(&payload.slug)
    .bind(clean_html(&payload.name))
    .bind(payload.description.as_deref().map(clean_html))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if e.to_string().contains("unique constraint") || e.to_string().contains("23505") {
            AppError::Conflict(format!("Event slug '{}' already exists", payload.slug))
        } else {
            tracing::error!("Failed to create event: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    Ok((StatusCode::CREATED, Json(event)))
}

/// Adds a question to an event.
/// Admin only.
pub async fn create_question(
    State(pool): State<PgPool>,
    Path(event_id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM events WHERE id = $1")
        .bind(event_id)
        .fetch_optional(&pool)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound("Event not found".to_string()));
    }

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO questions (event_id, type, content, options, expected_answer, ai_threshold, hint_enabled)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(event_id)
    .bind(payload.question_type.as_str())
    .bind(clean_html(&payload.content))
    .bind(payload.options.as_ref().map(SqlJson))
    .bind(&payload.expected_answer)
    .bind(payload.ai_threshold)
    .bind(payload.hint_enabled)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

/// Edits a question. The merged result is validated as a whole, so an edit
/// cannot leave a multiple choice question without a valid expected key.
/// Admin only.
pub async fn update_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let event_id = sqlx::query_scalar::<_, i64>("SELECT event_id FROM questions WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;

    let current = PgStore::new(pool.clone())
        .find_question(event_id, id)
        .await?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;

    let merged = payload.merge_into(&current);
    if let Err(validation_errors) = merged.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    sqlx::query(
        r#"
        UPDATE questions SET
            type = $1,
            content = $2,
            options = $3,
            expected_answer = $4,
            ai_threshold = $5,
            hint_enabled = $6
        WHERE id = $7
        "#,
    )
    .bind(merged.question_type.as_str())
    .bind(clean_html(&merged.content))
    .bind(merged.options.as_ref().map(SqlJson))
    .bind(&merged.expected_answer)
    .bind(merged.ai_threshold)
    .bind(merged.hint_enabled)
    .bind(id)
    .execute(&pool)
    .await
    .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(StatusCode::OK)
}

/// Deletes a question by ID.
/// Admin only.
///
/// The question also leaves every participant's stored order, and progress
/// whose remaining questions are all correct is marked completed.
pub async fn delete_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    let event_id = sqlx::query_scalar::<_, i64>("DELETE FROM questions WHERE id = $1 RETURNING event_id")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;

    let reordered = sqlx::query(
        r#"
        UPDATE progress SET question_order = COALESCE(
            (
                SELECT jsonb_agg(t.elem ORDER BY t.ord)
                FROM jsonb_array_elements(question_order) WITH ORDINALITY AS t(elem, ord)
                WHERE t.elem <> to_jsonb($1::BIGINT)
            ),
            '[]'::jsonb
        )
        WHERE event_id = $2 AND question_order @> to_jsonb(ARRAY[$1::BIGINT])
        "#,
    )
    .bind(id)
    .bind(event_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let completed = sqlx::query(
        r#"
        UPDATE progress p SET completed = TRUE
        WHERE p.event_id = $1
          AND p.completed = FALSE
          AND jsonb_array_length(p.question_order) > 0
          AND (
              SELECT COUNT(*) FROM answers a
              WHERE a.progress_id = p.id AND a.status = 'correct'
          ) >= jsonb_array_length(p.question_order)
        "#,
    )
    .bind(event_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    tx.commit().await?;

    tracing::info!(question_id = id, event_id, reordered, completed, "question deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Dashboard: every participant of an event with completion state.
/// Admin only.
pub async fn list_event_progress(
    State(pool): State<PgPool>,
    Path(event_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let rows = sqlx::query_as::<_, ProgressSummary>(
        r#"
        SELECT
            p.id AS progress_id,
            u.username,
            p.completed,
            COUNT(a.id) FILTER (WHERE a.status = 'correct') AS correct_count,
            p.created_at
        FROM progress p
        JOIN users u ON p.user_id = u.id
        LEFT JOIN answers a ON a.progress_id = p.id
        WHERE p.event_id = $1
        GROUP BY p.id, u.username
        ORDER BY p.completed DESC, correct_count DESC, p.created_at
        "#,
    )
    .bind(event_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to load event progress: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(rows))
}
