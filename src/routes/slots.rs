use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::Router;
use serde::Deserialize;

use crate::auth::Instructor;
use crate::extractors::JsonBody;
use crate::response::{created, ok, AppError};
use crate::routes::quizzes::load_quiz;
use crate::state::AppState;

/// Routes nested under `/quizzes`.
pub fn quiz_router() -> Router<AppState> {
    Router::new().route("/:id/slots", get(list_slots).post(create_slot))
}

/// Routes nested under `/slots`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:id", axum::routing::delete(delete_slot))
        .route("/:id/rating", put(rate_slot))
        .route("/:id/ratings", get(list_ratings))
}

async fn list_slots(
    _instructor: Instructor,
    Path(quiz_id): Path<u64>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    load_quiz(&state, quiz_id)?;
    Ok(ok(state.store().list_quiz_slots(quiz_id)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSlotRequest {
    question_id: String,
    rating: Option<f64>,
}

async fn create_slot(
    _instructor: Instructor,
    Path(quiz_id): Path<u64>,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateSlotRequest>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = load_quiz(&state, quiz_id)?;
    if !state.engine().knows_question(req.question_id.trim())? {
        return Err(AppError::bad_request(
            "UNKNOWN_QUESTION",
            &format!("no answer key for question {}", req.question_id.trim()),
        ));
    }
    let rating = req.rating.unwrap_or(quiz.settings.default_question_rating);
    let slot = state.store().create_slot(quiz.id, &req.question_id, rating)?;
    Ok(created(slot))
}

async fn delete_slot(
    _instructor: Instructor,
    Path(slot_id): Path<u64>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.store().delete_slot(slot_id)?))
}

#[derive(Debug, Deserialize)]
struct RateSlotRequest {
    rating: f64,
}

async fn rate_slot(
    _instructor: Instructor,
    Path(slot_id): Path<u64>,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RateSlotRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.store().rate_slot(slot_id, req.rating, true)?))
}

async fn list_ratings(
    _instructor: Instructor,
    Path(slot_id): Path<u64>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    if state.store().get_slot(slot_id)?.is_none() {
        return Err(AppError::not_found("Slot not found"));
    }
    Ok(ok(state.store().list_question_ratings(slot_id)?))
}
