// src/routes.rs

use axum::{
    Router,
    http::{Method, StatusCode},
    middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, answers, auth, hunt},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, events, admin).
/// * Applies global middleware (Trace, CORS, request timeout).
/// * Injects global state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            axum::http::HeaderValue::from_static("http://localhost:3000"),
            axum::http::HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    // Participant routes, all authenticated
    let event_routes = Router::new()
        .route("/{slug}/register", post(hunt::register_for_event))
        .route("/{slug}/progress", get(hunt::get_progress))
        .route("/{slug}/answers", post(answers::submit_answer))
        .route("/{slug}/hints", post(answers::request_hint))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/events", post(admin::create_event))
        .route("/events/{id}/questions", post(admin::create_question))
        .route("/events/{id}/progress", get(admin::list_event_progress))
        .route(
            "/questions/{id}",
            put(admin::update_question).delete(admin::delete_question),
        )
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let request_timeout = state.config.request_timeout();

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/events", event_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
