use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::TransactionalTree;
use sled::Transactional;

use crate::store::keys;
use crate::store::operations::grades::GradeEntry;
use crate::store::operations::grading_sessions::GradingSession;
use crate::store::operations::question_ratings::QuestionRating;
use crate::store::operations::quiz_users::QuizUser;
use crate::store::operations::slots::Slot;
use crate::store::operations::user_ratings::UserRating;
use crate::store::{abort, Store, StoreError, TxError};

/// One question shown to one student.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub id: u64,
    pub user_id: u64,
    pub slot_id: u64,
    /// Slot rating when the attempt was selected. Used as the opponent when
    /// the slot is gone by the time the answer arrives.
    pub slot_rating: f64,
    pub grading_session_id: String,
    pub answered: bool,
    pub reviewed: bool,
    pub correct: Option<bool>,
    pub fraction: Option<f64>,
    pub time_created: DateTime<Utc>,
    pub time_answered: Option<DateTime<Utc>>,
    pub time_reviewed: Option<DateTime<Utc>>,
    pub user_prev_rating_id: Option<u64>,
    pub user_rating_id: Option<u64>,
    pub question_prev_rating_id: Option<u64>,
    pub question_rating_id: Option<u64>,
}

impl Attempt {
    pub fn is_active(&self) -> bool {
        !self.reviewed
    }

    pub fn is_correct(&self) -> bool {
        self.correct.unwrap_or(false)
    }
}

/// Typed view over the trees written by a finished submission.
pub struct AnswerTx<'a> {
    attempts: &'a TransactionalTree,
    quiz_users: &'a TransactionalTree,
    user_ratings: &'a TransactionalTree,
    slots: &'a TransactionalTree,
    question_ratings: &'a TransactionalTree,
    grading_sessions: &'a TransactionalTree,
    grades: &'a TransactionalTree,
}

impl AnswerTx<'_> {
    pub fn get_attempt(&self, attempt_id: u64) -> Result<Option<Attempt>, TxError> {
        match self.attempts.get(keys::attempt_key(attempt_id).as_bytes())? {
            Some(raw) => Ok(Some(Store::tx_deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn put_attempt(&self, attempt: &Attempt) -> Result<(), TxError> {
        self.attempts.insert(
            keys::attempt_key(attempt.id).as_bytes(),
            Store::tx_serialize(attempt)?,
        )?;
        Ok(())
    }

    pub fn get_user(&self, user_id: u64) -> Result<QuizUser, TxError> {
        let raw = self
            .quiz_users
            .get(keys::quiz_user_key(user_id).as_bytes())?
            .ok_or_else(|| abort(StoreError::not_found("quiz_user", user_id)))?;
        Store::tx_deserialize(&raw)
    }

    pub fn put_user(&self, user: &QuizUser) -> Result<(), TxError> {
        self.quiz_users.insert(
            keys::quiz_user_key(user.id).as_bytes(),
            Store::tx_serialize(user)?,
        )?;
        Ok(())
    }

    pub fn put_user_rating(&self, snapshot: &UserRating) -> Result<(), TxError> {
        self.user_ratings.insert(
            keys::user_rating_key(snapshot.user_id, snapshot.id).as_bytes(),
            Store::tx_serialize(snapshot)?,
        )?;
        Ok(())
    }

    pub fn get_slot(&self, slot_id: u64) -> Result<Option<Slot>, TxError> {
        match self.slots.get(keys::slot_key(slot_id).as_bytes())? {
            Some(raw) => Ok(Some(Store::tx_deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn put_slot(&self, slot: &Slot) -> Result<(), TxError> {
        self.slots
            .insert(keys::slot_key(slot.id).as_bytes(), Store::tx_serialize(slot)?)?;
        Ok(())
    }

    pub fn put_question_rating(&self, snapshot: &QuestionRating) -> Result<(), TxError> {
        self.question_ratings.insert(
            keys::question_rating_key(snapshot.slot_id, snapshot.id).as_bytes(),
            Store::tx_serialize(snapshot)?,
        )?;
        Ok(())
    }

    pub fn put_grading_session(&self, session: &GradingSession) -> Result<(), TxError> {
        self.grading_sessions.insert(
            keys::grading_session_key(&session.id).as_bytes(),
            Store::tx_serialize(session)?,
        )?;
        Ok(())
    }

    pub fn put_grade(&self, grade: &GradeEntry) -> Result<(), TxError> {
        self.grades.insert(
            keys::grade_key(grade.quiz_id, &grade.account_id).as_bytes(),
            Store::tx_serialize(grade)?,
        )?;
        Ok(())
    }
}

impl Store {
    /// Persists a freshly selected attempt and its grading session.
    ///
    /// Fails with `Conflict` when the user already has an active attempt.
    pub fn create_attempt(
        &self,
        attempt: &Attempt,
        session: &GradingSession,
    ) -> Result<(), StoreError> {
        let attempt_key = keys::attempt_key(attempt.id);
        let by_user_key = keys::attempts_by_user_key(attempt.user_id, attempt.id);
        let by_slot_key = keys::attempts_by_slot_key(attempt.slot_id, attempt.id);
        let active_key = keys::active_attempt_key(attempt.user_id);
        let session_key = keys::grading_session_key(&session.id);
        let attempt_bytes = Self::serialize(attempt)?;
        let session_bytes = Self::serialize(session)?;

        (
            &self.attempts,
            &self.attempts_by_user,
            &self.attempts_by_slot,
            &self.active_attempts,
            &self.grading_sessions,
        )
            .transaction(|(tx_attempts, tx_by_user, tx_by_slot, tx_active, tx_sessions)| {
                if tx_active.get(active_key.as_bytes())?.is_some() {
                    return Err(abort(StoreError::conflict("active_attempt", attempt.user_id)));
                }
                tx_attempts.insert(attempt_key.as_bytes(), attempt_bytes.as_slice())?;
                tx_by_user.insert(by_user_key.as_bytes(), &[] as &[u8])?;
                tx_by_slot.insert(by_slot_key.as_bytes(), &[] as &[u8])?;
                tx_active.insert(active_key.as_bytes(), attempt_key.as_bytes())?;
                tx_sessions.insert(session_key.as_bytes(), session_bytes.as_slice())?;
                Ok(())
            })
            .map_err(StoreError::from)
    }

    pub fn get_attempt(&self, attempt_id: u64) -> Result<Option<Attempt>, StoreError> {
        match self.attempts.get(keys::attempt_key(attempt_id).as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// The user's unreviewed attempt, if any.
    pub fn get_active_attempt(&self, user_id: u64) -> Result<Option<Attempt>, StoreError> {
        let Some(raw_id) = self
            .active_attempts
            .get(keys::active_attempt_key(user_id).as_bytes())?
        else {
            return Ok(None);
        };
        let Some(attempt_id) = keys::parse_id_key(&raw_id) else {
            tracing::warn!(user_id, "Malformed active attempt index entry");
            return Ok(None);
        };
        self.get_attempt(attempt_id)
    }

    /// Attempts of a user, oldest first.
    pub fn list_user_attempts(&self, user_id: u64) -> Result<Vec<Attempt>, StoreError> {
        let prefix = keys::attempts_by_user_prefix(user_id);
        let mut attempts = Vec::new();
        for item in self.attempts_by_user.scan_prefix(prefix.as_bytes()) {
            let (k, _) = item?;
            if let Some(attempt) = keys::trailing_id(&k)
                .map(|id| self.get_attempt(id))
                .transpose()?
                .flatten()
            {
                attempts.push(attempt);
            }
        }
        Ok(attempts)
    }

    /// Walks the user's reviewed attempts, newest first, until `visit`
    /// returns false.
    fn walk_reviewed_desc<F>(&self, user_id: u64, mut visit: F) -> Result<(), StoreError>
    where
        F: FnMut(Attempt) -> bool,
    {
        let prefix = keys::attempts_by_user_prefix(user_id);
        for item in self.attempts_by_user.scan_prefix(prefix.as_bytes()).rev() {
            let (k, _) = item?;
            let Some(attempt_id) = keys::trailing_id(&k) else {
                continue;
            };
            let Some(attempt) = self.get_attempt(attempt_id)? else {
                continue;
            };
            if attempt.reviewed && !visit(attempt) {
                break;
            }
        }
        Ok(())
    }

    pub fn last_reviewed_attempt(&self, user_id: u64) -> Result<Option<Attempt>, StoreError> {
        let mut last = None;
        self.walk_reviewed_desc(user_id, |attempt| {
            last = Some(attempt);
            false
        })?;
        Ok(last)
    }

    /// Up to `limit` distinct slot ids from the user's most recently reviewed
    /// attempts.
    pub fn recent_reviewed_slot_ids(
        &self,
        user_id: u64,
        limit: usize,
    ) -> Result<HashSet<u64>, StoreError> {
        let mut slot_ids = HashSet::new();
        if limit == 0 {
            return Ok(slot_ids);
        }
        self.walk_reviewed_desc(user_id, |attempt| {
            slot_ids.insert(attempt.slot_id);
            slot_ids.len() < limit
        })?;
        Ok(slot_ids)
    }

    /// Stores an intermediate grading session while the attempt is still
    /// waiting for its final response. Returns false when the attempt was
    /// answered in the meantime.
    pub fn save_pending_response(
        &self,
        attempt_id: u64,
        session: &GradingSession,
    ) -> Result<bool, StoreError> {
        let attempt_key = keys::attempt_key(attempt_id);
        let session_key = keys::grading_session_key(&session.id);
        let session_bytes = Self::serialize(session)?;

        let saved = (&self.attempts, &self.grading_sessions)
            .transaction(|(tx_attempts, tx_sessions)| {
                let raw = tx_attempts
                    .get(attempt_key.as_bytes())?
                    .ok_or_else(|| abort(StoreError::not_found("attempt", attempt_id)))?;
                let attempt: Attempt = Self::tx_deserialize(&raw)?;
                if attempt.answered {
                    return Ok(false);
                }
                tx_sessions.insert(session_key.as_bytes(), session_bytes.as_slice())?;
                Ok::<_, TxError>(true)
            })
            .map_err(StoreError::from)?;
        Ok(saved)
    }

    /// Runs `f` in one transaction over every tree a finished submission
    /// touches. sled re-runs `f` on conflict, so it must not have side effects
    /// outside the transaction.
    pub fn answer_transaction<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: Fn(&AnswerTx<'_>) -> Result<T, TxError>,
    {
        (
            &self.attempts,
            &self.quiz_users,
            &self.user_ratings,
            &self.slots,
            &self.question_ratings,
            &self.grading_sessions,
            &self.grades,
        )
            .transaction(
                |(attempts, quiz_users, user_ratings, slots, question_ratings, grading_sessions, grades)| {
                    f(&AnswerTx {
                        attempts,
                        quiz_users,
                        user_ratings,
                        slots,
                        question_ratings,
                        grading_sessions,
                        grades,
                    })
                },
            )
            .map_err(StoreError::from)
    }

    /// Marks an answered attempt as reviewed and frees the user for a new one.
    /// Returns false when the attempt is not answered yet or already reviewed.
    pub fn mark_attempt_reviewed(&self, attempt_id: u64) -> Result<bool, StoreError> {
        let attempt_key = keys::attempt_key(attempt_id);

        (&self.attempts, &self.active_attempts)
            .transaction(|(tx_attempts, tx_active)| {
                let raw = tx_attempts
                    .get(attempt_key.as_bytes())?
                    .ok_or_else(|| abort(StoreError::not_found("attempt", attempt_id)))?;
                let mut attempt: Attempt = Self::tx_deserialize(&raw)?;
                if !attempt.answered || attempt.reviewed {
                    return Ok(false);
                }
                attempt.reviewed = true;
                attempt.time_reviewed = Some(Utc::now());
                tx_attempts.insert(attempt_key.as_bytes(), Self::tx_serialize(&attempt)?)?;

                let active_key = keys::active_attempt_key(attempt.user_id);
                if tx_active.get(active_key.as_bytes())?.as_deref() == Some(attempt_key.as_bytes())
                {
                    tx_active.remove(active_key.as_bytes())?;
                }
                Ok::<_, TxError>(true)
            })
            .map_err(StoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::Attempt;
    use crate::store::operations::grading_sessions::GradingSession;
    use crate::store::{Store, StoreError};

    fn attempt(store: &Store, user_id: u64, slot_id: u64) -> (Attempt, GradingSession) {
        let session = GradingSession::new("q", serde_json::json!({}));
        let attempt = Attempt {
            id: store.next_id().unwrap(),
            user_id,
            slot_id,
            slot_rating: 1200.0,
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
        (attempt, session)
    }

    fn answer(store: &Store, attempt_id: u64, correct: bool) {
        store
            .answer_transaction(|tx| {
                let mut a = tx.get_attempt(attempt_id)?.unwrap();
                a.answered = true;
                a.correct = Some(correct);
                tx.put_attempt(&a)
            })
            .unwrap();
    }

    #[test]
    fn second_active_attempt_is_rejected() {
        let store = Store::temporary().unwrap();
        let (first, s1) = attempt(&store, 1, 10);
        store.create_attempt(&first, &s1).unwrap();

        let (second, s2) = attempt(&store, 1, 11);
        let err = store.create_attempt(&second, &s2).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert!(store.get_attempt(second.id).unwrap().is_none());
        assert_eq!(store.get_active_attempt(1).unwrap().unwrap().id, first.id);
    }

    #[test]
    fn review_requires_answer_and_happens_once() {
        let store = Store::temporary().unwrap();
        let (a, s) = attempt(&store, 1, 10);
        store.create_attempt(&a, &s).unwrap();

        assert!(!store.mark_attempt_reviewed(a.id).unwrap());
        answer(&store, a.id, true);
        assert!(store.mark_attempt_reviewed(a.id).unwrap());
        assert!(!store.mark_attempt_reviewed(a.id).unwrap());
        assert!(store.get_active_attempt(1).unwrap().is_none());
    }

    #[test]
    fn recent_reviewed_slots_are_distinct_and_newest_first() {
        let store = Store::temporary().unwrap();
        for slot_id in [10, 11, 10, 12] {
            let (a, s) = attempt(&store, 1, slot_id);
            store.create_attempt(&a, &s).unwrap();
            answer(&store, a.id, true);
            store.mark_attempt_reviewed(a.id).unwrap();
        }

        let last_two = store.recent_reviewed_slot_ids(1, 2).unwrap();
        assert_eq!(last_two, [12, 10].into_iter().collect());
        let all = store.recent_reviewed_slot_ids(1, 10).unwrap();
        assert_eq!(all.len(), 3);
        assert!(store.recent_reviewed_slot_ids(1, 0).unwrap().is_empty());
        assert_eq!(store.last_reviewed_attempt(1).unwrap().unwrap().slot_id, 12);
    }

    #[test]
    fn unreviewed_attempts_are_not_history() {
        let store = Store::temporary().unwrap();
        let (a, s) = attempt(&store, 1, 10);
        store.create_attempt(&a, &s).unwrap();
        answer(&store, a.id, false);
        assert!(store.last_reviewed_attempt(1).unwrap().is_none());
        assert!(store.recent_reviewed_slot_ids(1, 3).unwrap().is_empty());
    }

    #[test]
    fn pending_response_is_refused_after_answer() {
        let store = Store::temporary().unwrap();
        let (a, s) = attempt(&store, 1, 10);
        store.create_attempt(&a, &s).unwrap();
        assert!(store.save_pending_response(a.id, &s).unwrap());
        answer(&store, a.id, true);
        assert!(!store.save_pending_response(a.id, &s).unwrap());
    }

    #[test]
    fn slot_deletion_keeps_only_the_active_attempt() {
        let store = Store::temporary().unwrap();
        let slot = store.create_slot(1, "q1", 1200.0).unwrap();

        let (old, s1) = attempt(&store, 1, slot.id);
        store.create_attempt(&old, &s1).unwrap();
        answer(&store, old.id, true);
        store.mark_attempt_reviewed(old.id).unwrap();

        let (live, s2) = attempt(&store, 1, slot.id);
        store.create_attempt(&live, &s2).unwrap();

        let deletion = store.delete_slot(slot.id).unwrap();
        assert_eq!(deletion.attempts_removed, 1);
        assert_eq!(deletion.attempts_kept, 1);
        assert!(store.get_attempt(old.id).unwrap().is_none());
        assert!(store.get_attempt(live.id).unwrap().is_some());
        assert_eq!(store.list_user_attempts(1).unwrap().len(), 1);
    }
}
