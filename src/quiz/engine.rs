//! Attempt lifecycle: select, submit, review.
//!
//! Every finished submission commits in one store transaction: the grading
//! session, the student's new rating and snapshot, the star counters and
//! grade entry, the compared slots' ratings and snapshots, and the attempt
//! flags. sled re-runs the transaction on conflict, so the closure only reads
//! and writes through the transaction view.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::quiz::elo::{self, RatingError};
use crate::quiz::grading::{GradeOutcome, Grader, GradingError, ResponseData};
use crate::quiz::selector::{self, SelectionError};
use crate::quiz::stars::{self, StarProgress};
use crate::store::operations::attempts::{AnswerTx, Attempt};
use crate::store::operations::grades::GradeEntry;
use crate::store::operations::question_ratings::QuestionRating;
use crate::store::operations::quiz_users::QuizUser;
use crate::store::operations::quizzes::Quiz;
use crate::store::operations::slots::Slot;
use crate::store::operations::user_ratings::UserRating;
use crate::store::{abort, Store, StoreError, TxError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Instructor,
}

/// The account acting on a quiz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub account_id: String,
    pub role: Role,
}

impl Actor {
    pub fn student(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            role: Role::Student,
        }
    }

    pub fn instructor(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            role: Role::Instructor,
        }
    }

    pub fn is_instructor(&self) -> bool {
        self.role == Role::Instructor
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Rating(#[from] RatingError),
    #[error(transparent)]
    Grading(#[from] GradingError),
    #[error("attempt {attempt_id} does not belong to the acting user")]
    NotAttemptOwner { attempt_id: u64 },
    #[error("user already has active attempt {attempt_id}")]
    ActiveAttemptExists { attempt_id: u64 },
    #[error("attempt {0} not found")]
    AttemptNotFound(u64),
}

impl From<SelectionError> for EngineError {
    fn from(e: SelectionError) -> Self {
        match e {
            SelectionError::Store(e) => Self::Store(e),
            SelectionError::Rating(e) => Self::Rating(e),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "attempt", rename_all = "snake_case")]
pub enum NextAttempt {
    Resumed(Attempt),
    Created(Attempt),
    /// No slot is available for the student right now.
    Completed,
}

/// What happened to the question ratings on a finished submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SlotComparison {
    /// The attempt's slot was deleted while the attempt was open.
    SlotDeleted,
    Instructor,
    NoPreviousAttempt,
    PreviousSlotDeleted,
    SameSlot,
    SameOutcome,
    #[serde(rename_all = "camelCase")]
    Rated {
        hard_slot_id: u64,
        hard_rating: f64,
        easy_slot_id: u64,
        easy_rating: f64,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSummary {
    pub attempt: Attempt,
    pub outcome: GradeOutcome,
    pub user_rating_before: f64,
    pub user_rating_after: f64,
    pub stars: StarProgress,
    pub comparison: SlotComparison,
    pub grade: Option<GradeEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Answered(Box<AnswerSummary>),
    /// The question needs more interaction before it can be graded.
    Deferred,
    /// The attempt was answered before; nothing changed.
    AlreadyHandled,
}

/// Snapshot ids reserved before the transaction starts. sled cannot hand out
/// ids inside a transaction and the closure may run more than once.
struct ReservedIds {
    user_rating: u64,
    hard_rating: u64,
    easy_rating: u64,
}

pub struct QuizEngine {
    store: Arc<Store>,
    grader: Arc<dyn Grader>,
}

impl QuizEngine {
    pub fn new(store: Arc<Store>, grader: Arc<dyn Grader>) -> Self {
        Self { store, grader }
    }

    /// Whether a slot may be bound to `question_id`.
    pub fn knows_question(&self, question_id: &str) -> Result<bool, EngineError> {
        Ok(self.grader.knows_question(question_id)?)
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// The actor's participant record, created on first access.
    pub fn user(&self, quiz: &Quiz, actor: &Actor) -> Result<QuizUser, EngineError> {
        Ok(self.store.get_or_create_quiz_user(
            quiz.id,
            &actor.account_id,
            quiz.settings.default_user_rating,
        )?)
    }

    pub fn create_attempt(&self, quiz: &Quiz, actor: &Actor) -> Result<NextAttempt, EngineError> {
        self.create_attempt_with(quiz, actor, &mut rand::thread_rng())
    }

    pub fn create_attempt_with<R: Rng + ?Sized>(
        &self,
        quiz: &Quiz,
        actor: &Actor,
        rng: &mut R,
    ) -> Result<NextAttempt, EngineError> {
        let user = self.user(quiz, actor)?;
        if let Some(active) = self.store.get_active_attempt(user.id)? {
            tracing::warn!(
                quiz_id = quiz.id,
                user_id = user.id,
                attempt_id = active.id,
                "Attempt creation rejected, active attempt exists"
            );
            return Err(EngineError::ActiveAttemptExists {
                attempt_id: active.id,
            });
        }

        // Slots whose question the grader cannot serve are skipped so one bad
        // binding does not block the student.
        let mut unservable = HashSet::new();
        let (slot, session) = loop {
            let Some(slot) =
                selector::select_slot_skipping(&self.store, quiz, &user, &unservable, rng)?
            else {
                tracing::debug!(quiz_id = quiz.id, user_id = user.id, "No question available");
                return Ok(NextAttempt::Completed);
            };
            match self.grader.start_session(&slot.question_id) {
                Ok(session) => break (slot, session),
                Err(GradingError::UnknownQuestion(question_id)) => {
                    tracing::warn!(
                        quiz_id = quiz.id,
                        slot_id = slot.id,
                        question_id = %question_id,
                        "Skipping slot bound to an unknown question"
                    );
                    unservable.insert(slot.id);
                }
                Err(e) => return Err(e.into()),
            }
        };
        let attempt = Attempt {
            id: self.store.next_id()?,
            user_id: user.id,
            slot_id: slot.id,
            slot_rating: slot.rating,
            grading_session_id: session.id.clone(),
            answered: false,
            reviewed: false,
            correct: None,
            fraction: None,
            time_created: Utc::now(),
            time_answered: None,
            time_reviewed: None,
            user_prev_rating_id: None,
            user_rating_id: None,
            question_prev_rating_id: None,
            question_rating_id: None,
        };

        match self.store.create_attempt(&attempt, &session) {
            Ok(()) => {}
            Err(StoreError::Conflict { .. }) => {
                let attempt_id = self
                    .store
                    .get_active_attempt(user.id)?
                    .map(|a| a.id)
                    .unwrap_or_default();
                return Err(EngineError::ActiveAttemptExists { attempt_id });
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            quiz_id = quiz.id,
            user_id = user.id,
            attempt_id = attempt.id,
            slot_id = slot.id,
            slot_rating = slot.rating,
            "Attempt created"
        );
        Ok(NextAttempt::Created(attempt))
    }

    /// Resumes the active attempt or creates a new one.
    pub fn next_attempt(&self, quiz: &Quiz, actor: &Actor) -> Result<NextAttempt, EngineError> {
        self.next_attempt_with(quiz, actor, &mut rand::thread_rng())
    }

    pub fn next_attempt_with<R: Rng + ?Sized>(
        &self,
        quiz: &Quiz,
        actor: &Actor,
        rng: &mut R,
    ) -> Result<NextAttempt, EngineError> {
        let user = self.user(quiz, actor)?;
        if let Some(active) = self.store.get_active_attempt(user.id)? {
            return Ok(NextAttempt::Resumed(active));
        }
        match self.create_attempt_with(quiz, actor, rng) {
            // lost a race with a concurrent request for the same user
            Err(EngineError::ActiveAttemptExists { .. }) => self
                .store
                .get_active_attempt(user.id)?
                .map(NextAttempt::Resumed)
                .ok_or(EngineError::ActiveAttemptExists { attempt_id: 0 }),
            other => other,
        }
    }

    /// Loads an attempt of `quiz` owned by `actor`.
    fn owned_attempt(
        &self,
        quiz: &Quiz,
        actor: &Actor,
        attempt_id: u64,
    ) -> Result<(QuizUser, Attempt), EngineError> {
        let attempt = self
            .store
            .get_attempt(attempt_id)?
            .ok_or(EngineError::AttemptNotFound(attempt_id))?;
        let user = self
            .store
            .find_quiz_user(quiz.id, &actor.account_id)?
            .filter(|user| user.id == attempt.user_id);
        match user {
            Some(user) => Ok((user, attempt)),
            None => {
                tracing::warn!(
                    quiz_id = quiz.id,
                    attempt_id,
                    account_id = %actor.account_id,
                    "Attempt access rejected, not the owner"
                );
                Err(EngineError::NotAttemptOwner { attempt_id })
            }
        }
    }

    pub fn submit(
        &self,
        quiz: &Quiz,
        actor: &Actor,
        attempt_id: u64,
        response: &ResponseData,
    ) -> Result<SubmitOutcome, EngineError> {
        let (user, attempt) = self.owned_attempt(quiz, actor, attempt_id)?;
        if attempt.answered {
            tracing::debug!(attempt_id, "Submit ignored, attempt already answered");
            return Ok(SubmitOutcome::AlreadyHandled);
        }

        let session = self
            .store
            .get_grading_session(&attempt.grading_session_id)?
            .ok_or_else(|| {
                StoreError::not_found("grading_session", &attempt.grading_session_id)
            })?;
        if session.finished {
            return Ok(SubmitOutcome::AlreadyHandled);
        }

        let graded = self.grader.grade(&session, response)?;
        let outcome = graded.outcome;
        if !(0.0..=1.0).contains(&outcome.fraction) {
            return Err(GradingError::InvalidFraction(outcome.fraction).into());
        }

        if !outcome.finished {
            if !self.store.save_pending_response(attempt_id, &graded.session)? {
                return Ok(SubmitOutcome::AlreadyHandled);
            }
            tracing::debug!(attempt_id, "Submit deferred, question not finished");
            return Ok(SubmitOutcome::Deferred);
        }

        // sled transactions cannot scan, so the previous attempt is found up
        // front. Reviewed attempts never change again.
        let previous = self.store.last_reviewed_attempt(user.id)?;
        let ids = ReservedIds {
            user_rating: self.store.next_id()?,
            hard_rating: self.store.next_id()?,
            easy_rating: self.store.next_id()?,
        };
        let now = Utc::now();
        let past_due = quiz.settings.is_past_due(now);

        let summary = self.store.answer_transaction(|tx| {
            let Some(mut attempt) = tx.get_attempt(attempt_id)? else {
                return Err(abort(StoreError::not_found("attempt", attempt_id)));
            };
            if attempt.answered {
                return Ok(None);
            }

            let mut user = tx.get_user(attempt.user_id)?;
            let slot = tx.get_slot(attempt.slot_id)?;
            let opponent = slot.as_ref().map_or(attempt.slot_rating, |s| s.rating);

            let user_rating_before = user.rating;
            attempt.user_prev_rating_id = Some(user.rating_id);
            user.rating = elo::new_rating(
                quiz.settings.user_k_factor(),
                outcome.fraction,
                user.rating,
                opponent,
            );
            user.rating_id = ids.user_rating;
            tx.put_user_rating(&UserRating {
                id: ids.user_rating,
                user_id: user.id,
                attempt_id: Some(attempt.id),
                rating: user.rating,
                manual: false,
                created_at: now,
            })?;
            attempt.user_rating_id = Some(ids.user_rating);

            let star_progress = stars::apply_star_ratchet(&mut user, &quiz.settings, past_due);
            let grade = star_progress.graded_raised().then(|| {
                GradeEntry::new(
                    quiz.id,
                    &user.account_id,
                    user.highest_stars_graded,
                    quiz.settings.stars_to_pass,
                )
            });
            if let Some(grade) = &grade {
                tx.put_grade(grade)?;
            }
            tx.put_user(&user)?;

            attempt.correct = Some(outcome.correct);
            attempt.fraction = Some(outcome.fraction);
            let comparison = match slot {
                None => SlotComparison::SlotDeleted,
                Some(slot) => {
                    attempt.question_prev_rating_id = Some(slot.rating_id);
                    attempt.question_rating_id = Some(slot.rating_id);
                    if actor.is_instructor() {
                        SlotComparison::Instructor
                    } else {
                        compare_slots(tx, quiz, &mut attempt, slot, previous.as_ref(), &ids, now)?
                    }
                }
            };

            tx.put_grading_session(&graded.session)?;
            attempt.answered = true;
            attempt.time_answered = Some(now);
            tx.put_attempt(&attempt)?;

            Ok(Some(AnswerSummary {
                attempt,
                outcome,
                user_rating_before,
                user_rating_after: user.rating,
                stars: star_progress,
                comparison,
                grade,
            }))
        })?;

        let Some(summary) = summary else {
            tracing::debug!(attempt_id, "Submit lost the race, attempt already answered");
            return Ok(SubmitOutcome::AlreadyHandled);
        };

        tracing::info!(
            quiz_id = quiz.id,
            user_id = user.id,
            attempt_id,
            correct = outcome.correct,
            fraction = outcome.fraction,
            rating_before = summary.user_rating_before,
            rating_after = summary.user_rating_after,
            "Attempt answered"
        );
        if summary.stars.achieved_raised() {
            tracing::info!(
                quiz_id = quiz.id,
                user_id = user.id,
                stars = summary.stars.achieved_after,
                graded = summary.stars.graded_after,
                "Star level raised"
            );
        }
        if matches!(summary.comparison, SlotComparison::SlotDeleted) {
            tracing::warn!(
                attempt_id,
                slot_id = summary.attempt.slot_id,
                "Slot deleted before answer, question rating unchanged"
            );
        }

        Ok(SubmitOutcome::Answered(Box::new(summary)))
    }

    /// Acknowledges an answered attempt so the student can move on.
    /// Returns false when the attempt is not answered or already reviewed.
    pub fn review(&self, quiz: &Quiz, actor: &Actor, attempt_id: u64) -> Result<bool, EngineError> {
        let (user, _) = self.owned_attempt(quiz, actor, attempt_id)?;
        let reviewed = self.store.mark_attempt_reviewed(attempt_id)?;
        if reviewed {
            tracing::info!(quiz_id = quiz.id, user_id = user.id, attempt_id, "Attempt reviewed");
        } else {
            tracing::debug!(attempt_id, "Review ignored");
        }
        Ok(reviewed)
    }
}

/// Rates the attempt's slot against the slot of the previous reviewed attempt
/// when exactly one of the two was answered correctly.
fn compare_slots(
    tx: &AnswerTx<'_>,
    quiz: &Quiz,
    attempt: &mut Attempt,
    slot: Slot,
    previous: Option<&Attempt>,
    ids: &ReservedIds,
    now: chrono::DateTime<Utc>,
) -> Result<SlotComparison, TxError> {
    let Some(previous) = previous else {
        return Ok(SlotComparison::NoPreviousAttempt);
    };
    if previous.is_correct() == attempt.is_correct() {
        return Ok(SlotComparison::SameOutcome);
    }
    if previous.slot_id == slot.id {
        return Ok(SlotComparison::SameSlot);
    }
    let Some(previous_slot) = tx.get_slot(previous.slot_id)? else {
        return Ok(SlotComparison::PreviousSlotDeleted);
    };

    let current_is_hard = !attempt.is_correct();
    let (mut hard, mut easy) = if current_is_hard {
        (slot, previous_slot)
    } else {
        (previous_slot, slot)
    };
    let (hard_rating, easy_rating) =
        elo::question_contest(quiz.settings.question_k_factor(), hard.rating, easy.rating);

    for (slot, rating, snapshot_id) in [
        (&mut hard, hard_rating, ids.hard_rating),
        (&mut easy, easy_rating, ids.easy_rating),
    ] {
        slot.rating = rating;
        slot.rating_id = snapshot_id;
        tx.put_slot(slot)?;
        tx.put_question_rating(&QuestionRating {
            id: snapshot_id,
            slot_id: slot.id,
            rating,
            manual: false,
            created_at: now,
        })?;
    }

    attempt.question_rating_id = Some(if current_is_hard {
        ids.hard_rating
    } else {
        ids.easy_rating
    });

    Ok(SlotComparison::Rated {
        hard_slot_id: hard.id,
        hard_rating,
        easy_slot_id: easy.id,
        easy_rating,
    })
}
