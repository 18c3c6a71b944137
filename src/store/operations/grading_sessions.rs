use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

/// Response-collection session owned by the grading service.
///
/// `state` is opaque to the store and the engine; only the grader reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingSession {
    pub id: String,
    pub question_id: String,
    pub state: serde_json::Value,
    pub finished: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GradingSession {
    pub fn new(question_id: &str, state: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            question_id: question_id.to_string(),
            state,
            finished: false,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Store {
    pub fn get_grading_session(
        &self,
        session_id: &str,
    ) -> Result<Option<GradingSession>, StoreError> {
        let key = keys::grading_session_key(session_id);
        match self.grading_sessions.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }
}
