//! Picks the next slot for a student.
//!
//! The target difficulty is the rating a question would need for the student
//! to beat it with the quiz's configured win probability. The slots nearest
//! to that target form the candidate pool and one of them is drawn at random.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::quiz::config::SelectionStrategy;
use crate::quiz::elo::{self, RatingError};
use crate::store::operations::quiz_users::QuizUser;
use crate::store::operations::quizzes::Quiz;
use crate::store::operations::slots::Slot;
use crate::store::{Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Rating(#[from] RatingError),
}

#[derive(Debug, Clone)]
pub struct CandidatePool {
    pub target_rating: f64,
    pub excluded: HashSet<u64>,
    /// Nearest first.
    pub slots: Vec<Slot>,
}

pub fn candidate_pool(
    store: &Store,
    quiz: &Quiz,
    user: &QuizUser,
) -> Result<CandidatePool, SelectionError> {
    candidate_pool_skipping(store, quiz, user, &HashSet::new())
}

/// Like [`candidate_pool`], with `skip` excluded on top of the recently
/// reviewed slots.
pub fn candidate_pool_skipping(
    store: &Store,
    quiz: &Quiz,
    user: &QuizUser,
    skip: &HashSet<u64>,
) -> Result<CandidatePool, SelectionError> {
    match &quiz.settings.selection {
        SelectionStrategy::NearestRandom {
            user_win_probability,
            number_of_candidates,
            min_questions_until_reappearance,
        } => {
            let target_rating = elo::ideal_opponent_rating(*user_win_probability, user.rating)?;
            let mut excluded =
                store.recent_reviewed_slot_ids(user.id, *min_questions_until_reappearance)?;
            excluded.extend(skip.iter().copied());
            let slots =
                store.nearest_slots(quiz.id, target_rating, &excluded, *number_of_candidates)?;
            Ok(CandidatePool {
                target_rating,
                excluded,
                slots,
            })
        }
    }
}

/// `None` means the student has nothing left to answer right now.
pub fn select_slot<R: Rng + ?Sized>(
    store: &Store,
    quiz: &Quiz,
    user: &QuizUser,
    rng: &mut R,
) -> Result<Option<Slot>, SelectionError> {
    select_slot_skipping(store, quiz, user, &HashSet::new(), rng)
}

pub fn select_slot_skipping<R: Rng + ?Sized>(
    store: &Store,
    quiz: &Quiz,
    user: &QuizUser,
    skip: &HashSet<u64>,
    rng: &mut R,
) -> Result<Option<Slot>, SelectionError> {
    let pool = candidate_pool_skipping(store, quiz, user, skip)?;
    let picked = pool.slots.choose(rng).cloned();
    tracing::debug!(
        quiz_id = quiz.id,
        user_id = user.id,
        target_rating = pool.target_rating,
        excluded = pool.excluded.len(),
        candidates = pool.slots.len(),
        slot_id = ?picked.as_ref().map(|s| s.id),
        "Slot selection"
    );
    Ok(picked)
}
