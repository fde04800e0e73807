// src/handlers/hunt.rs

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use rand::seq::SliceRandom;

use crate::{
    error::AppError,
    models::{
        event::{Event, validate_slug},
        progress::{Progress, ProgressQuestion, ProgressStats, ProgressView, RegistrationResponse},
        question::PublicQuestion,
    },
    store::HuntStore,
    utils::jwt::Claims,
};

/// Looks up an event by slug, rejecting malformed slugs before touching storage.
pub(crate) async fn event_by_slug(store: &dyn HuntStore, slug: &str) -> Result<Event, AppError> {
    if validate_slug(slug).is_err() {
        return Err(AppError::BadRequest(format!("Malformed event slug '{slug}'")));
    }

    store
        .find_event_by_slug(slug)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))
}

/// The caller's progress for the event.
pub(crate) async fn progress_for(
    store: &dyn HuntStore,
    user_id: i64,
    event: &Event,
) -> Result<Progress, AppError> {
    store
        .find_progress(user_id, event.id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound("No progress found. Register for the event first.".to_string())
        })
}

fn shuffled(mut ids: Vec<i64>) -> Vec<i64> {
    ids.shuffle(&mut rand::thread_rng());
    ids
}

/// Registers the caller for an event.
///
/// * Shuffles the event's questions into a per-user order.
/// * Creates the progress row, or resets it (new order, not completed, no answers).
pub async fn register_for_event(
    State(store): State<Arc<dyn HuntStore>>,
    Extension(claims): Extension<Claims>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let event = event_by_slug(store.as_ref(), &slug).await?;

    let question_ids: Vec<i64> = store
        .list_questions(event.id)
        .await?
        .iter()
        .map(|q| q.id)
        .collect();

    if question_ids.is_empty() {
        return Err(AppError::BadRequest(
            "This event has no questions yet".to_string(),
        ));
    }

    let order = shuffled(question_ids);
    let progress = store.register_progress(user_id, event.id, &order).await?;

    tracing::info!(user_id, event_id = event.id, "registered for event");

    Ok((
        StatusCode::CREATED,
        Json(RegistrationResponse {
            progress_id: progress.id,
            total_questions: order.len(),
            completed: progress.completed,
        }),
    ))
}

/// Returns the caller's questions in their personal order with answer state.
pub async fn get_progress(
    State(store): State<Arc<dyn HuntStore>>,
    Extension(claims): Extension<Claims>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let event = event_by_slug(store.as_ref(), &slug).await?;
    let progress = progress_for(store.as_ref(), user_id, &event).await?;

    let questions = store.list_questions(event.id).await?;
    let answers: HashMap<i64, _> = store
        .list_answers(progress.id)
        .await?
        .into_iter()
        .map(|a| (a.question_id, a))
        .collect();

    let ordered = match &progress.question_order {
        Some(order) => order
            .iter()
            .filter_map(|id| questions.iter().find(|q| q.id == *id))
            .collect::<Vec<_>>(),
        None => questions.iter().collect(),
    };

    let view_questions = ordered
        .into_iter()
        .map(|q| {
            let answer = answers.get(&q.id);
            ProgressQuestion {
                question: PublicQuestion::from(q),
                status: answer.map(|a| a.status),
                hint_count: answer.map_or(0, |a| a.hint_count),
            }
        })
        .collect();

    let stats = ProgressStats {
        correct_count: store.count_correct(progress.id).await?,
        total_questions: store.question_count(progress.id).await?,
    };

    Ok(Json(ProgressView {
        progress_id: progress.id,
        completed: progress.completed,
        stats,
        questions: view_questions,
    }))
}
