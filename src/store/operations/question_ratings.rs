use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

/// Immutable record of a slot's rating at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRating {
    pub id: u64,
    pub slot_id: u64,
    pub rating: f64,
    /// Set when an instructor overrode the rating by hand.
    pub manual: bool,
    pub created_at: DateTime<Utc>,
}

impl Store {
    /// Rating history of a slot, oldest first.
    pub fn list_question_ratings(&self, slot_id: u64) -> Result<Vec<QuestionRating>, StoreError> {
        let prefix = keys::question_rating_prefix(slot_id);
        let mut ratings = Vec::new();
        for item in self.question_ratings.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            ratings.push(Self::deserialize(&value)?);
        }
        Ok(ratings)
    }

    pub fn get_question_rating(
        &self,
        slot_id: u64,
        rating_id: u64,
    ) -> Result<Option<QuestionRating>, StoreError> {
        let key = keys::question_rating_key(slot_id, rating_id);
        match self.question_ratings.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }
}
