// src/handlers/answers.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{
    error::AppError,
    evaluator::AnswerEvaluator,
    handlers::hunt::{event_by_slug, progress_for},
    models::answer::{HintRequest, SubmitAnswerRequest},
    store::HuntStore,
    utils::jwt::Claims,
};

/// Submits an answer to one question of the caller's hunt.
///
/// * Validates the request before any storage or oracle access.
/// * Grades the submission (option key comparison or AI judgement).
/// * Stores it, replacing any earlier answer to the same question.
/// * Reports whether the hunt is now complete.
pub async fn submit_answer(
    State(store): State<Arc<dyn HuntStore>>,
    State(evaluator): State<Arc<AnswerEvaluator>>,
    Extension(claims): Extension<Claims>,
    Path(slug): Path<String>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let (Some(question_id), Some(submission)) = (req.question_id, req.submission) else {
        return Err(AppError::BadRequest(
            "questionId and submission are required".to_string(),
        ));
    };

    let event = event_by_slug(store.as_ref(), &slug).await?;
    let progress = progress_for(store.as_ref(), user_id, &event).await?;

    let result = evaluator
        .evaluate_and_store(&progress, question_id, submission, req.retry)
        .await?;

    Ok(Json(result))
}

/// Requests an AI hint for one question. Limited per question.
pub async fn request_hint(
    State(store): State<Arc<dyn HuntStore>>,
    State(evaluator): State<Arc<AnswerEvaluator>>,
    Extension(claims): Extension<Claims>,
    Path(slug): Path<String>,
    Json(req): Json<HintRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let Some(question_id) = req.question_id else {
        return Err(AppError::BadRequest("questionId is required".to_string()));
    };

    let event = event_by_slug(store.as_ref(), &slug).await?;
    let progress = progress_for(store.as_ref(), user_id, &event).await?;

    let hint = evaluator.request_hint(&progress, question_id).await?;

    Ok(Json(hint))
}
