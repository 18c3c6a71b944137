use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Serialize;

use crate::quiz::engine::Actor;
use crate::response::{ok, AppError};
use crate::routes::quizzes::load_quiz;
use crate::state::AppState;
use crate::store::operations::grades::GradeEntry;
use crate::store::operations::quiz_users::QuizUser;

/// Routes nested under `/quizzes`, scoped to the acting account.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:id/me", get(profile))
        .route("/:id/me/ratings", get(rating_history))
        .route("/:id/me/attempts", get(attempt_history))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    user: QuizUser,
    max_stars: u32,
    stars_to_pass: u32,
    /// Rating required for the next star, absent at the top level.
    next_star_rating: Option<f64>,
    grade: Option<GradeEntry>,
}

async fn profile(
    actor: Actor,
    Path(quiz_id): Path<u64>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = load_quiz(&state, quiz_id)?;
    let user = state.engine().user(&quiz, &actor)?;
    let grade = state.store().get_grade(quiz.id, &actor.account_id)?;
    let next_star_rating = quiz
        .settings
        .star_ratings
        .get(user.highest_stars_achieved as usize)
        .copied();
    Ok(ok(ProfileResponse {
        max_stars: quiz.settings.max_stars(),
        stars_to_pass: quiz.settings.stars_to_pass,
        next_star_rating,
        grade,
        user,
    }))
}

async fn rating_history(
    actor: Actor,
    Path(quiz_id): Path<u64>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = load_quiz(&state, quiz_id)?;
    let user = state.engine().user(&quiz, &actor)?;
    Ok(ok(state.store().list_user_ratings(user.id)?))
}

async fn attempt_history(
    actor: Actor,
    Path(quiz_id): Path<u64>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = load_quiz(&state, quiz_id)?;
    let user = state.engine().user(&quiz, &actor)?;
    Ok(ok(state.store().list_user_attempts(user.id)?))
}
