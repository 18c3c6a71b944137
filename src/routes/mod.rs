pub mod answer_keys;
pub mod attempts;
pub mod health;
pub mod me;
pub mod quizzes;
pub mod slots;

use axum::extract::DefaultBodyLimit;
use axum::Router;

use crate::middleware::request_id;
use crate::response::AppError;
use crate::state::AppState;

/// Maximum request body size: 256 KiB.
const MAX_BODY_SIZE: usize = 256 * 1024;

pub fn build_router(state: AppState) -> Router {
    let quiz_routes = quizzes::router()
        .merge(slots::quiz_router())
        .merge(attempts::quiz_router())
        .merge(me::router());

    let api_routes = Router::new()
        .nest("/quizzes", quiz_routes)
        .nest("/slots", slots::router())
        .nest("/attempts", attempts::router())
        .nest("/answer-keys", answer_keys::router())
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE));

    Router::new()
        .nest("/api", api_routes)
        .nest("/health", health::router())
        .fallback(fallback_404)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .with_state(state)
}

async fn fallback_404() -> AppError {
    AppError::not_found("Not found")
}
