use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Transactional;

use crate::store::keys;
use crate::store::operations::user_ratings::UserRating;
use crate::store::{abort, Store, StoreError, TxError};

/// One student's participation in one quiz.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizUser {
    pub id: u64,
    pub quiz_id: u64,
    /// Identity handed over by the web layer.
    pub account_id: String,
    pub rating: f64,
    /// Latest entry of the user's rating history.
    pub rating_id: u64,
    pub highest_stars_achieved: u32,
    pub highest_stars_graded: u32,
    pub created_at: DateTime<Utc>,
}

impl Store {
    pub fn get_quiz_user(&self, user_id: u64) -> Result<Option<QuizUser>, StoreError> {
        match self.quiz_users.get(keys::quiz_user_key(user_id).as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn find_quiz_user(
        &self,
        quiz_id: u64,
        account_id: &str,
    ) -> Result<Option<QuizUser>, StoreError> {
        let index_key = keys::quiz_user_account_key(quiz_id, account_id);
        let Some(raw_id) = self.quiz_users_by_account.get(index_key.as_bytes())? else {
            return Ok(None);
        };
        let Some(user_id) = keys::parse_id_key(&raw_id) else {
            tracing::warn!(quiz_id, account_id, "Malformed quiz user index entry");
            return Ok(None);
        };
        self.get_quiz_user(user_id)
    }

    /// Returns the participant record, creating it with `default_rating` and
    /// an initial history entry on first access.
    pub fn get_or_create_quiz_user(
        &self,
        quiz_id: u64,
        account_id: &str,
        default_rating: f64,
    ) -> Result<QuizUser, StoreError> {
        if let Some(user) = self.find_quiz_user(quiz_id, account_id)? {
            return Ok(user);
        }
        if account_id.trim().is_empty() {
            return Err(StoreError::Validation("account id must not be empty".to_string()));
        }

        let now = Utc::now();
        let user = QuizUser {
            id: self.next_id()?,
            quiz_id,
            account_id: account_id.to_string(),
            rating: default_rating,
            rating_id: self.next_id()?,
            highest_stars_achieved: 0,
            highest_stars_graded: 0,
            created_at: now,
        };
        let snapshot = UserRating {
            id: user.rating_id,
            user_id: user.id,
            attempt_id: None,
            rating: default_rating,
            manual: false,
            created_at: now,
        };

        let user_key = keys::quiz_user_key(user.id);
        let index_key = keys::quiz_user_account_key(quiz_id, account_id);
        let rating_key = keys::user_rating_key(user.id, snapshot.id);
        let user_bytes = Self::serialize(&user)?;
        let snapshot_bytes = Self::serialize(&snapshot)?;

        let created = (
            &self.quiz_users,
            &self.quiz_users_by_account,
            &self.user_ratings,
        )
            .transaction(|(tx_users, tx_index, tx_ratings)| {
                // Another request may have created the participant meanwhile.
                if let Some(raw_id) = tx_index.get(index_key.as_bytes())? {
                    let existing_key = String::from_utf8_lossy(&raw_id).to_string();
                    let raw = tx_users
                        .get(existing_key.as_bytes())?
                        .ok_or_else(|| abort(StoreError::not_found("quiz_user", &existing_key)))?;
                    return Self::tx_deserialize::<QuizUser>(&raw);
                }
                tx_users.insert(user_key.as_bytes(), user_bytes.as_slice())?;
                tx_index.insert(index_key.as_bytes(), user_key.as_bytes())?;
                tx_ratings.insert(rating_key.as_bytes(), snapshot_bytes.as_slice())?;
                Ok::<_, TxError>(user.clone())
            })
            .map_err(StoreError::from)?;

        if created.id == user.id {
            tracing::info!(user_id = user.id, quiz_id, rating = default_rating, "Quiz user created");
        }
        Ok(created)
    }

    /// Manual override of a student's rating.
    pub fn rate_quiz_user(
        &self,
        user_id: u64,
        rating: f64,
        manual: bool,
    ) -> Result<UserRating, StoreError> {
        if !rating.is_finite() {
            return Err(StoreError::Validation("user rating must be finite".to_string()));
        }
        let snapshot = UserRating {
            id: self.next_id()?,
            user_id,
            attempt_id: None,
            rating,
            manual,
            created_at: Utc::now(),
        };
        let user_key = keys::quiz_user_key(user_id);
        let rating_key = keys::user_rating_key(user_id, snapshot.id);
        let snapshot_bytes = Self::serialize(&snapshot)?;

        (&self.quiz_users, &self.user_ratings)
            .transaction(|(tx_users, tx_ratings)| {
                let raw = tx_users
                    .get(user_key.as_bytes())?
                    .ok_or_else(|| abort(StoreError::not_found("quiz_user", user_id)))?;
                let mut user: QuizUser = Self::tx_deserialize(&raw)?;
                user.rating = rating;
                user.rating_id = snapshot.id;
                tx_users.insert(user_key.as_bytes(), Self::tx_serialize(&user)?)?;
                tx_ratings.insert(rating_key.as_bytes(), snapshot_bytes.as_slice())?;
                Ok(())
            })
            .map_err(StoreError::from)?;

        Ok(snapshot)
    }
}
