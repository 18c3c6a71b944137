use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::quiz::config::QuizSettings;
use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: u64,
    pub name: String,
    pub settings: QuizSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    pub fn create_quiz(&self, name: &str, settings: QuizSettings) -> Result<Quiz, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("quiz name must not be empty".to_string()));
        }
        settings.validate().map_err(StoreError::Validation)?;

        let now = Utc::now();
        let quiz = Quiz {
            id: self.next_id()?,
            name: name.to_string(),
            settings,
            created_at: now,
            updated_at: now,
        };
        self.quizzes
            .insert(keys::quiz_key(quiz.id).as_bytes(), Self::serialize(&quiz)?)?;
        Ok(quiz)
    }

    /// Loads a quiz. Stored settings are validated again so a row written by
    /// an older build can never feed invalid parameters to the engine.
    pub fn get_quiz(&self, quiz_id: u64) -> Result<Option<Quiz>, StoreError> {
        let Some(raw) = self.quizzes.get(keys::quiz_key(quiz_id).as_bytes())? else {
            return Ok(None);
        };
        let quiz: Quiz = Self::deserialize(&raw)?;
        quiz.settings
            .validate()
            .map_err(|message| StoreError::Validation(format!("quiz {quiz_id}: {message}")))?;
        Ok(Some(quiz))
    }

    pub fn update_quiz_settings(
        &self,
        quiz_id: u64,
        settings: QuizSettings,
    ) -> Result<Quiz, StoreError> {
        settings.validate().map_err(StoreError::Validation)?;
        let mut quiz = self
            .get_quiz(quiz_id)?
            .ok_or_else(|| StoreError::not_found("quiz", quiz_id))?;
        quiz.settings = settings;
        quiz.updated_at = Utc::now();
        self.quizzes
            .insert(keys::quiz_key(quiz.id).as_bytes(), Self::serialize(&quiz)?)?;
        Ok(quiz)
    }
}
