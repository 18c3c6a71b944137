use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use serde::Serialize;

use crate::extractors::JsonBody;
use crate::quiz::engine::Actor;
use crate::quiz::grading::ResponseData;
use crate::response::{ok, AppError};
use crate::routes::quizzes::load_quiz;
use crate::state::AppState;
use crate::store::operations::quizzes::Quiz;

/// Routes nested under `/quizzes`.
pub fn quiz_router() -> Router<AppState> {
    Router::new().route("/:id/attempts/next", post(next_attempt))
}

/// Routes nested under `/attempts`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:id/submit", post(submit))
        .route("/:id/review", post(review))
}

/// The quiz an attempt belongs to, found through its participant.
fn quiz_of_attempt(state: &AppState, attempt_id: u64) -> Result<Quiz, AppError> {
    let attempt = state
        .store()
        .get_attempt(attempt_id)?
        .ok_or_else(|| AppError::not_found("Attempt not found"))?;
    let user = state
        .store()
        .get_quiz_user(attempt.user_id)?
        .ok_or_else(|| AppError::not_found("Attempt not found"))?;
    load_quiz(state, user.quiz_id)
}

async fn next_attempt(
    actor: Actor,
    Path(quiz_id): Path<u64>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = load_quiz(&state, quiz_id)?;
    Ok(ok(state.engine().next_attempt(&quiz, &actor)?))
}

async fn submit(
    actor: Actor,
    Path(attempt_id): Path<u64>,
    State(state): State<AppState>,
    JsonBody(response): JsonBody<ResponseData>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = quiz_of_attempt(&state, attempt_id)?;
    Ok(ok(state
        .engine()
        .submit(&quiz, &actor, attempt_id, &response)?))
}

#[derive(Debug, Serialize)]
struct ReviewResponse {
    reviewed: bool,
}

async fn review(
    actor: Actor,
    Path(attempt_id): Path<u64>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = quiz_of_attempt(&state, attempt_id)?;
    let reviewed = state.engine().review(&quiz, &actor, attempt_id)?;
    Ok(ok(ReviewResponse { reviewed }))
}
