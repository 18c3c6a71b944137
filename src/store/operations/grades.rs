use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

/// Grade-book row for one student in one quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeEntry {
    pub quiz_id: u64,
    pub account_id: String,
    pub stars: u32,
    pub stars_to_pass: u32,
    pub passed: bool,
    pub updated_at: DateTime<Utc>,
}

impl GradeEntry {
    pub fn new(quiz_id: u64, account_id: &str, stars: u32, stars_to_pass: u32) -> Self {
        Self {
            quiz_id,
            account_id: account_id.to_string(),
            stars,
            stars_to_pass,
            passed: stars >= stars_to_pass,
            updated_at: Utc::now(),
        }
    }
}

impl Store {
    pub fn get_grade(
        &self,
        quiz_id: u64,
        account_id: &str,
    ) -> Result<Option<GradeEntry>, StoreError> {
        let key = keys::grade_key(quiz_id, account_id);
        match self.grades.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::GradeEntry;

    #[test]
    fn pass_flag_follows_threshold() {
        assert!(!GradeEntry::new(1, "a", 2, 3).passed);
        assert!(GradeEntry::new(1, "a", 3, 3).passed);
        assert!(GradeEntry::new(1, "a", 0, 0).passed);
    }
}
