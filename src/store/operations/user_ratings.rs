use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

/// Immutable record of a student's rating at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRating {
    pub id: u64,
    pub user_id: u64,
    /// Attempt that caused the change; empty for the initial and manual entries.
    pub attempt_id: Option<u64>,
    pub rating: f64,
    pub manual: bool,
    pub created_at: DateTime<Utc>,
}

impl Store {
    /// Rating history of a student, oldest first.
    pub fn list_user_ratings(&self, user_id: u64) -> Result<Vec<UserRating>, StoreError> {
        let prefix = keys::user_rating_prefix(user_id);
        let mut ratings = Vec::new();
        for item in self.user_ratings.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            ratings.push(Self::deserialize(&value)?);
        }
        Ok(ratings)
    }
}
