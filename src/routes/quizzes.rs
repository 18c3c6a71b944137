use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::Router;
use serde::Deserialize;

use crate::auth::Instructor;
use crate::extractors::JsonBody;
use crate::quiz::config::QuizSettings;
use crate::quiz::engine::Actor;
use crate::response::{created, ok, AppError};
use crate::state::AppState;
use crate::store::operations::quizzes::Quiz;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::post(create_quiz))
        .route("/:id", get(get_quiz))
        .route("/:id/settings", put(update_settings))
}

/// Loads a quiz or answers 404.
pub(crate) fn load_quiz(state: &AppState, quiz_id: u64) -> Result<Quiz, AppError> {
    state
        .store()
        .get_quiz(quiz_id)?
        .ok_or_else(|| AppError::not_found("Quiz not found"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateQuizRequest {
    name: String,
    settings: Option<QuizSettings>,
}

async fn create_quiz(
    Instructor(actor): Instructor,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let settings = req
        .settings
        .unwrap_or_else(|| QuizSettings::from_env(&state.config().quiz));
    let quiz = state.store().create_quiz(&req.name, settings)?;
    tracing::info!(quiz_id = quiz.id, account_id = %actor.account_id, "Quiz created");
    Ok(created(quiz))
}

async fn get_quiz(
    _actor: Actor,
    Path(quiz_id): Path<u64>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(load_quiz(&state, quiz_id)?))
}

async fn update_settings(
    Instructor(actor): Instructor,
    Path(quiz_id): Path<u64>,
    State(state): State<AppState>,
    JsonBody(settings): JsonBody<QuizSettings>,
) -> Result<impl IntoResponse, AppError> {
    load_quiz(&state, quiz_id)?;
    let quiz = state.store().update_quiz_settings(quiz_id, settings)?;
    tracing::info!(quiz_id, account_id = %actor.account_id, "Quiz settings updated");
    Ok(ok(quiz))
}
