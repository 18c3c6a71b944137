use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::auth::Instructor;
use crate::extractors::JsonBody;
use crate::response::{ok, AppError};
use crate::state::AppState;
use crate::store::operations::answer_keys::AcceptedAnswer;

pub fn router() -> Router<AppState> {
    Router::new().route("/:question_id", get(get_answer_key).put(put_answer_key))
}

#[derive(Debug, Deserialize)]
struct PutAnswerKeyRequest {
    answers: Vec<AcceptedAnswer>,
}

async fn put_answer_key(
    _instructor: Instructor,
    Path(question_id): Path<String>,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<PutAnswerKeyRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.store().put_answer_key(&question_id, req.answers)?))
}

async fn get_answer_key(
    _instructor: Instructor,
    Path(question_id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let key = state
        .store()
        .get_answer_key(&question_id)?
        .ok_or_else(|| AppError::not_found("Answer key not found"))?;
    Ok(ok(key))
}
