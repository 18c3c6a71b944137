//! Elo rating model shared by students and questions.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum RatingError {
    #[error("probability {0} is outside the open interval (0, 1)")]
    ProbabilityOutOfRange(f64),
}

/// Expected score for player A against player B
pub fn expected_score(rating_a: f64, rating_b: f64) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf((rating_b - rating_a) / 400.0))
}

/// Rating after one game. `score` is 1.0 for a win, 0.0 for a loss and
/// anything in between for partial credit.
pub fn new_rating(k_factor: f64, score: f64, rating: f64, opponent_rating: f64) -> f64 {
    rating + k_factor * (score - expected_score(rating, opponent_rating))
}

/// Opponent rating against which `rating` wins with exactly `win_probability`.
pub fn ideal_opponent_rating(win_probability: f64, rating: f64) -> Result<f64, RatingError> {
    if !(win_probability > 0.0 && win_probability < 1.0) {
        return Err(RatingError::ProbabilityOutOfRange(win_probability));
    }
    Ok(rating + 400.0 * (1.0 / win_probability - 1.0).log10())
}

/// New ratings for two questions after one proved harder than the other.
///
/// The harder question takes the win, the easier one the loss.
/// Returns `(hard, easy)`.
pub fn question_contest(k_factor: f64, hard_rating: f64, easy_rating: f64) -> (f64, f64) {
    (
        new_rating(k_factor, 1.0, hard_rating, easy_rating),
        new_rating(k_factor, 0.0, easy_rating, hard_rating),
    )
}
