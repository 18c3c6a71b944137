use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedAnswer {
    pub text: String,
    pub fraction: f64,
}

/// Accepted answers of a question for the built-in grader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerKey {
    pub question_id: String,
    pub answers: Vec<AcceptedAnswer>,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    pub fn put_answer_key(
        &self,
        question_id: &str,
        answers: Vec<AcceptedAnswer>,
    ) -> Result<AnswerKey, StoreError> {
        let question_id = question_id.trim();
        if question_id.is_empty() {
            return Err(StoreError::Validation("question id must not be empty".to_string()));
        }
        if answers.is_empty() {
            return Err(StoreError::Validation(
                "answer key needs at least one answer".to_string(),
            ));
        }
        if answers
            .iter()
            .any(|a| a.text.trim().is_empty() || !(0.0..=1.0).contains(&a.fraction))
        {
            return Err(StoreError::Validation(
                "answers need non-empty text and a fraction in [0,1]".to_string(),
            ));
        }

        let key = AnswerKey {
            question_id: question_id.to_string(),
            answers,
            updated_at: Utc::now(),
        };
        self.answer_keys.insert(
            keys::answer_key_key(question_id).as_bytes(),
            Self::serialize(&key)?,
        )?;
        Ok(key)
    }

    pub fn get_answer_key(&self, question_id: &str) -> Result<Option<AnswerKey>, StoreError> {
        match self
            .answer_keys
            .get(keys::answer_key_key(question_id).as_bytes())?
        {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }
}
