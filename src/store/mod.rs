pub mod keys;
pub mod migrate;
pub mod operations;
pub mod trees;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Db;
use thiserror::Error;

#[derive(Debug)]
pub struct Store {
    db: Db,
    pub quizzes: sled::Tree,
    pub slots: sled::Tree,
    pub slots_by_quiz: sled::Tree,
    pub slot_bindings: sled::Tree,
    pub question_ratings: sled::Tree,
    pub quiz_users: sled::Tree,
    pub quiz_users_by_account: sled::Tree,
    pub user_ratings: sled::Tree,
    pub attempts: sled::Tree,
    pub attempts_by_user: sled::Tree,
    pub attempts_by_slot: sled::Tree,
    pub active_attempts: sled::Tree,
    pub grading_sessions: sled::Tree,
    pub answer_keys: sled::Tree,
    pub grades: sled::Tree,
    pub config_versions: sled::Tree,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("conflict: entity={entity}, key={key}")]
    Conflict { entity: String, key: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("migration error at version {version}: {message}")]
    Migration { version: u32, message: String },
}

impl StoreError {
    pub fn not_found(entity: &str, key: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }

    pub fn conflict(entity: &str, key: impl ToString) -> Self {
        Self::Conflict {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }
}

/// Error type used inside sled transaction closures.
pub type TxError = ConflictableTransactionError<StoreError>;

impl From<TransactionError<StoreError>> for StoreError {
    fn from(error: TransactionError<StoreError>) -> Self {
        match error {
            TransactionError::Abort(store_error) => store_error,
            TransactionError::Storage(storage_error) => StoreError::Sled(storage_error),
        }
    }
}

/// Aborts the surrounding transaction with a store error.
pub fn abort(error: StoreError) -> TxError {
    ConflictableTransactionError::Abort(error)
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        Self::from_db(db)
    }

    /// Opens a throwaway database that lives only as long as the store.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, StoreError> {
        Ok(Self {
            quizzes: db.open_tree(trees::QUIZZES)?,
            slots: db.open_tree(trees::SLOTS)?,
            slots_by_quiz: db.open_tree(trees::SLOTS_BY_QUIZ)?,
            slot_bindings: db.open_tree(trees::SLOT_BINDINGS)?,
            question_ratings: db.open_tree(trees::QUESTION_RATINGS)?,
            quiz_users: db.open_tree(trees::QUIZ_USERS)?,
            quiz_users_by_account: db.open_tree(trees::QUIZ_USERS_BY_ACCOUNT)?,
            user_ratings: db.open_tree(trees::USER_RATINGS)?,
            attempts: db.open_tree(trees::ATTEMPTS)?,
            attempts_by_user: db.open_tree(trees::ATTEMPTS_BY_USER)?,
            attempts_by_slot: db.open_tree(trees::ATTEMPTS_BY_SLOT)?,
            active_attempts: db.open_tree(trees::ACTIVE_ATTEMPTS)?,
            grading_sessions: db.open_tree(trees::GRADING_SESSIONS)?,
            answer_keys: db.open_tree(trees::ANSWER_KEYS)?,
            grades: db.open_tree(trees::GRADES)?,
            config_versions: db.open_tree(trees::CONFIG_VERSIONS)?,
            db,
        })
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        migrate::run(self)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    /// Monotonic id shared by every entity; later rows always get larger ids.
    pub fn next_id(&self) -> Result<u64, StoreError> {
        Ok(self.db.generate_id()?)
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub(crate) fn tx_serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, TxError> {
        Self::serialize(value).map_err(abort)
    }

    pub(crate) fn tx_deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TxError> {
        Self::deserialize(bytes).map_err(abort)
    }
}
