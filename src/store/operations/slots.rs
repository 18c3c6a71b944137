use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Transactional;

use crate::store::keys;
use crate::store::operations::attempts::Attempt;
use crate::store::operations::question_ratings::QuestionRating;
use crate::store::{abort, Store, StoreError, TxError};

/// A question made available in one quiz, with its own difficulty rating.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub id: u64,
    pub quiz_id: u64,
    pub question_id: String,
    pub rating: f64,
    /// Latest entry of the slot's rating history.
    pub rating_id: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotDeletion {
    pub ratings_removed: usize,
    pub attempts_removed: usize,
    pub attempts_kept: usize,
}

const DELETE_SCAN_RETRIES: usize = 5;

/// Children of a slot found before its delete transaction.
#[derive(Default)]
struct SlotScan {
    rating_keys: Vec<sled::IVec>,
    newest_rating_id: Option<u64>,
    attempt_ids: Vec<u64>,
}

struct Candidate {
    distance: f64,
    slot: Slot,
}

fn nearest_first(a: &Candidate, b: &Candidate) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.slot.id.cmp(&b.slot.id))
}

fn retain_nearest_k(candidates: &mut Vec<Candidate>, k: usize) {
    if k == 0 {
        candidates.clear();
        return;
    }

    if candidates.len() > k {
        candidates.select_nth_unstable_by(k - 1, nearest_first);
        candidates.truncate(k);
    }
    candidates.sort_by(nearest_first);
}

impl Store {
    pub fn create_slot(
        &self,
        quiz_id: u64,
        question_id: &str,
        rating: f64,
    ) -> Result<Slot, StoreError> {
        let question_id = question_id.trim();
        if question_id.is_empty() {
            return Err(StoreError::Validation("question id must not be empty".to_string()));
        }
        if !rating.is_finite() {
            return Err(StoreError::Validation("slot rating must be finite".to_string()));
        }

        let now = Utc::now();
        let slot = Slot {
            id: self.next_id()?,
            quiz_id,
            question_id: question_id.to_string(),
            rating,
            rating_id: self.next_id()?,
            created_at: now,
        };
        let snapshot = QuestionRating {
            id: slot.rating_id,
            slot_id: slot.id,
            rating,
            manual: false,
            created_at: now,
        };

        let slot_key = keys::slot_key(slot.id);
        let index_key = keys::slots_by_quiz_key(quiz_id, slot.id);
        let binding_key = keys::slot_binding_key(quiz_id, &slot.question_id);
        let rating_key = keys::question_rating_key(slot.id, snapshot.id);
        let slot_bytes = Self::serialize(&slot)?;
        let snapshot_bytes = Self::serialize(&snapshot)?;

        (
            &self.slots,
            &self.slots_by_quiz,
            &self.slot_bindings,
            &self.question_ratings,
        )
            .transaction(|(tx_slots, tx_index, tx_bindings, tx_ratings)| {
                if tx_bindings.get(binding_key.as_bytes())?.is_some() {
                    return Err(abort(StoreError::conflict("slot_binding", &binding_key)));
                }
                tx_slots.insert(slot_key.as_bytes(), slot_bytes.as_slice())?;
                tx_index.insert(index_key.as_bytes(), &[] as &[u8])?;
                tx_bindings.insert(binding_key.as_bytes(), slot_key.as_bytes())?;
                tx_ratings.insert(rating_key.as_bytes(), snapshot_bytes.as_slice())?;
                Ok(())
            })
            .map_err(StoreError::from)?;

        tracing::info!(slot_id = slot.id, quiz_id, rating, "Slot created");
        Ok(slot)
    }

    pub fn get_slot(&self, slot_id: u64) -> Result<Option<Slot>, StoreError> {
        match self.slots.get(keys::slot_key(slot_id).as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Slots of a quiz in creation order.
    pub fn list_quiz_slots(&self, quiz_id: u64) -> Result<Vec<Slot>, StoreError> {
        let prefix = keys::slots_by_quiz_prefix(quiz_id);
        let mut slots = Vec::new();
        for item in self.slots_by_quiz.scan_prefix(prefix.as_bytes()) {
            let (k, _) = item?;
            let Some(slot_id) = keys::trailing_id(&k) else {
                tracing::warn!(key = ?k, "Malformed slots_by_quiz index key");
                continue;
            };
            if let Some(slot) = self.get_slot(slot_id)? {
                slots.push(slot);
            }
        }
        Ok(slots)
    }

    /// Up to `limit` slots of the quiz nearest to `target_rating`, skipping
    /// `excluded`. Ordered by absolute rating distance, ties by slot id.
    pub fn nearest_slots(
        &self,
        quiz_id: u64,
        target_rating: f64,
        excluded: &HashSet<u64>,
        limit: usize,
    ) -> Result<Vec<Slot>, StoreError> {
        let mut candidates: Vec<Candidate> = self
            .list_quiz_slots(quiz_id)?
            .into_iter()
            .filter(|slot| !excluded.contains(&slot.id))
            .map(|slot| Candidate {
                distance: (target_rating - slot.rating).abs(),
                slot,
            })
            .collect();

        retain_nearest_k(&mut candidates, limit);
        Ok(candidates.into_iter().map(|c| c.slot).collect())
    }

    /// Sets a slot's rating and appends the matching history entry.
    pub fn rate_slot(
        &self,
        slot_id: u64,
        rating: f64,
        manual: bool,
    ) -> Result<QuestionRating, StoreError> {
        if !rating.is_finite() {
            return Err(StoreError::Validation("slot rating must be finite".to_string()));
        }
        let snapshot = QuestionRating {
            id: self.next_id()?,
            slot_id,
            rating,
            manual,
            created_at: Utc::now(),
        };
        let slot_key = keys::slot_key(slot_id);
        let rating_key = keys::question_rating_key(slot_id, snapshot.id);
        let snapshot_bytes = Self::serialize(&snapshot)?;

        (&self.slots, &self.question_ratings)
            .transaction(|(tx_slots, tx_ratings)| {
                let raw = tx_slots
                    .get(slot_key.as_bytes())?
                    .ok_or_else(|| abort(StoreError::not_found("slot", slot_id)))?;
                let mut slot: Slot = Self::tx_deserialize(&raw)?;
                slot.rating = rating;
                slot.rating_id = snapshot.id;
                tx_slots.insert(slot_key.as_bytes(), Self::tx_serialize(&slot)?)?;
                tx_ratings.insert(rating_key.as_bytes(), snapshot_bytes.as_slice())?;
                Ok(())
            })
            .map_err(StoreError::from)?;

        tracing::info!(slot_id, rating, manual, "Slot rated");
        Ok(snapshot)
    }

    /// Deletes a slot together with its rating history and its attempts.
    ///
    /// An attempt that is still active keeps its dangling slot reference so
    /// its owner can finish it.
    pub fn delete_slot(&self, slot_id: u64) -> Result<SlotDeletion, StoreError> {
        for _ in 0..DELETE_SCAN_RETRIES {
            let scan = self.scan_slot_children(slot_id)?;
            let Some(mut deletion) = self.delete_scanned_slot(slot_id, &scan)? else {
                tracing::debug!(slot_id, "Slot rated during delete, rescanning");
                continue;
            };
            self.sweep_slot_attempts(slot_id, &mut deletion)?;

            tracing::info!(
                slot_id,
                ratings_removed = deletion.ratings_removed,
                attempts_removed = deletion.attempts_removed,
                attempts_kept = deletion.attempts_kept,
                "Slot deleted"
            );
            return Ok(deletion);
        }

        tracing::warn!(slot_id, "Slot delete kept racing with rating updates");
        Err(StoreError::conflict("slot", slot_id))
    }

    fn scan_slot_children(&self, slot_id: u64) -> Result<SlotScan, StoreError> {
        let mut scan = SlotScan::default();
        for item in self
            .question_ratings
            .scan_prefix(keys::question_rating_prefix(slot_id).as_bytes())
        {
            let (k, _) = item?;
            if let Some(rating_id) = keys::trailing_id(&k) {
                scan.newest_rating_id = scan.newest_rating_id.max(Some(rating_id));
            }
            scan.rating_keys.push(k);
        }

        for item in self
            .attempts_by_slot
            .scan_prefix(keys::attempts_by_slot_prefix(slot_id).as_bytes())
        {
            let (k, _) = item?;
            if let Some(attempt_id) = keys::trailing_id(&k) {
                scan.attempt_ids.push(attempt_id);
            }
        }
        Ok(scan)
    }

    /// Removes the slot and everything in `scan`. `None` when the slot's
    /// latest rating is not among the scanned ones, so the scan is stale.
    fn delete_scanned_slot(
        &self,
        slot_id: u64,
        scan: &SlotScan,
    ) -> Result<Option<SlotDeletion>, StoreError> {
        let slot_key = keys::slot_key(slot_id);

        let deletion = (
            &self.slots,
            &self.slots_by_quiz,
            &self.slot_bindings,
            &self.question_ratings,
            &self.attempts,
            &self.attempts_by_user,
            &self.attempts_by_slot,
        )
            .transaction(
                |(tx_slots, tx_index, tx_bindings, tx_ratings, tx_attempts, tx_by_user, tx_by_slot)| {
                    let raw = tx_slots
                        .get(slot_key.as_bytes())?
                        .ok_or_else(|| abort(StoreError::not_found("slot", slot_id)))?;
                    let slot: Slot = Self::tx_deserialize(&raw)?;
                    if scan.newest_rating_id != Some(slot.rating_id) {
                        return Ok(None);
                    }

                    tx_slots.remove(slot_key.as_bytes())?;
                    tx_index.remove(keys::slots_by_quiz_key(slot.quiz_id, slot_id).as_bytes())?;
                    tx_bindings
                        .remove(keys::slot_binding_key(slot.quiz_id, &slot.question_id).as_bytes())?;
                    for key in &scan.rating_keys {
                        tx_ratings.remove(key.clone())?;
                    }

                    let mut deletion = SlotDeletion {
                        ratings_removed: scan.rating_keys.len(),
                        ..SlotDeletion::default()
                    };
                    for attempt_id in &scan.attempt_ids {
                        tx_by_slot
                            .remove(keys::attempts_by_slot_key(slot_id, *attempt_id).as_bytes())?;
                        let attempt_key = keys::attempt_key(*attempt_id);
                        let Some(raw) = tx_attempts.get(attempt_key.as_bytes())? else {
                            continue;
                        };
                        let attempt: Attempt = Self::tx_deserialize(&raw)?;
                        if attempt.is_active() {
                            deletion.attempts_kept += 1;
                            continue;
                        }
                        tx_attempts.remove(attempt_key.as_bytes())?;
                        tx_by_user.remove(
                            keys::attempts_by_user_key(attempt.user_id, attempt.id).as_bytes(),
                        )?;
                        deletion.attempts_removed += 1;
                    }
                    Ok::<_, TxError>(Some(deletion))
                },
            )
            .map_err(StoreError::from)?;
        Ok(deletion)
    }

    /// Clears attempt index entries written for the slot after the scan.
    fn sweep_slot_attempts(
        &self,
        slot_id: u64,
        deletion: &mut SlotDeletion,
    ) -> Result<(), StoreError> {
        for item in self
            .attempts_by_slot
            .scan_prefix(keys::attempts_by_slot_prefix(slot_id).as_bytes())
        {
            let (k, _) = item?;
            self.attempts_by_slot.remove(&k)?;
            let Some(attempt_id) = keys::trailing_id(&k) else {
                continue;
            };
            let attempt_key = keys::attempt_key(attempt_id);
            let Some(raw) = self.attempts.get(attempt_key.as_bytes())? else {
                continue;
            };
            let attempt: Attempt = Self::deserialize(&raw)?;
            if attempt.is_active() {
                deletion.attempts_kept += 1;
                continue;
            }
            self.attempts.remove(attempt_key.as_bytes())?;
            self.attempts_by_user
                .remove(keys::attempts_by_user_key(attempt.user_id, attempt.id).as_bytes())?;
            deletion.attempts_removed += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::store::{keys, Store, StoreError};

    fn seed(store: &Store, quiz_id: u64, ratings: &[f64]) -> Vec<u64> {
        ratings
            .iter()
            .enumerate()
            .map(|(i, r)| store.create_slot(quiz_id, &format!("q{i}"), *r).unwrap().id)
            .collect()
    }

    #[test]
    fn create_slot_records_initial_snapshot() {
        let store = Store::temporary().unwrap();
        let slot = store.create_slot(1, "q1", 1100.0).unwrap();
        let history = store.list_question_ratings(slot.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, slot.rating_id);
        assert_eq!(history[0].rating, 1100.0);
        assert!(!history[0].manual);
    }

    #[test]
    fn same_question_cannot_be_bound_twice() {
        let store = Store::temporary().unwrap();
        store.create_slot(1, "q1", 1100.0).unwrap();
        let err = store.create_slot(1, "q1", 1200.0).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        // A different quiz may reuse the question.
        assert!(store.create_slot(2, "q1", 1200.0).is_ok());
    }

    #[test]
    fn nearest_slots_orders_by_distance_and_respects_limit() {
        let store = Store::temporary().unwrap();
        let ids = seed(&store, 1, &[800.0, 1000.0, 1200.0, 1450.0]);
        seed(&store, 2, &[1000.0]);

        let nearest = store.nearest_slots(1, 1100.0, &HashSet::new(), 3).unwrap();
        let got: Vec<u64> = nearest.iter().map(|s| s.id).collect();
        // 1000 and 1200 tie at distance 100; the older slot wins the tie.
        assert_eq!(got, vec![ids[1], ids[2], ids[0]]);
    }

    #[test]
    fn nearest_slots_skips_excluded() {
        let store = Store::temporary().unwrap();
        let ids = seed(&store, 1, &[800.0, 1000.0, 1200.0]);
        let excluded: HashSet<u64> = [ids[1]].into_iter().collect();
        let nearest = store.nearest_slots(1, 1000.0, &excluded, 1).unwrap();
        assert_eq!(nearest.len(), 1);
        assert_ne!(nearest[0].id, ids[1]);
    }

    #[test]
    fn nearest_slots_with_zero_limit_is_empty() {
        let store = Store::temporary().unwrap();
        seed(&store, 1, &[1000.0]);
        assert!(store.nearest_slots(1, 1000.0, &HashSet::new(), 0).unwrap().is_empty());
    }

    #[test]
    fn rate_slot_appends_history() {
        let store = Store::temporary().unwrap();
        let slot = store.create_slot(1, "q1", 1000.0).unwrap();
        let snapshot = store.rate_slot(slot.id, 1333.0, true).unwrap();

        let updated = store.get_slot(slot.id).unwrap().unwrap();
        assert_eq!(updated.rating, 1333.0);
        assert_eq!(updated.rating_id, snapshot.id);

        let history = store.list_question_ratings(slot.id).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[1].manual);
    }

    #[test]
    fn rate_missing_slot_is_not_found() {
        let store = Store::temporary().unwrap();
        let err = store.rate_slot(404, 1000.0, true).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn delete_slot_removes_history_and_binding() {
        let store = Store::temporary().unwrap();
        let slot = store.create_slot(1, "q1", 1000.0).unwrap();
        store.rate_slot(slot.id, 1010.0, false).unwrap();

        let deletion = store.delete_slot(slot.id).unwrap();
        assert_eq!(deletion.ratings_removed, 2);
        assert!(store.get_slot(slot.id).unwrap().is_none());
        assert!(store.list_question_ratings(slot.id).unwrap().is_empty());
        assert!(store.list_quiz_slots(1).unwrap().is_empty());
        // The binding is free again.
        assert!(store.create_slot(1, "q1", 1000.0).is_ok());
    }

    #[test]
    fn delete_rescans_when_slot_is_rated_after_the_scan() {
        let store = Store::temporary().unwrap();
        let slot = store.create_slot(1, "q1", 1000.0).unwrap();
        let scan = store.scan_slot_children(slot.id).unwrap();
        // A submit rates the slot between the scan and the delete.
        let late = store.rate_slot(slot.id, 1020.0, false).unwrap();

        assert!(store.delete_scanned_slot(slot.id, &scan).unwrap().is_none());
        assert!(store.get_slot(slot.id).unwrap().is_some());

        let deletion = store.delete_slot(slot.id).unwrap();
        assert_eq!(deletion.ratings_removed, 2);
        assert!(store.list_question_ratings(slot.id).unwrap().is_empty());
        let late_key = keys::question_rating_key(slot.id, late.id);
        assert!(store.question_ratings.get(late_key.as_bytes()).unwrap().is_none());
    }

    #[test]
    fn attempt_index_written_after_the_scan_is_swept() {
        let store = Store::temporary().unwrap();
        let slot = store.create_slot(1, "q1", 1000.0).unwrap();
        let scan = store.scan_slot_children(slot.id).unwrap();
        let late = keys::attempts_by_slot_key(slot.id, 9_999);
        store.attempts_by_slot.insert(late.as_bytes(), &[] as &[u8]).unwrap();

        let mut deletion = store.delete_scanned_slot(slot.id, &scan).unwrap().unwrap();
        store.sweep_slot_attempts(slot.id, &mut deletion).unwrap();
        assert_eq!(
            store
                .attempts_by_slot
                .scan_prefix(keys::attempts_by_slot_prefix(slot.id).as_bytes())
                .count(),
            0
        );
    }
}
