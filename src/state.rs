// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::{config::Config, evaluator::AnswerEvaluator, store::HuntStore};

#[derive(Clone)]
pub struct AppState {
    /// Used directly by the auth and admin handlers.
    pub pool: PgPool,
    pub config: Config,
    /// Storage behind registration, progress and evaluation.
    pub store: Arc<dyn HuntStore>,
    pub evaluator: Arc<AnswerEvaluator>,
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<dyn HuntStore> {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for Arc<AnswerEvaluator> {
    fn from_ref(state: &AppState) -> Self {
        state.evaluator.clone()
    }
}
