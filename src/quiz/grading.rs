//! Seam to the question grading service.
//!
//! The engine never looks inside a question. It asks a [`Grader`] to open a
//! response session for a slot's question and later to grade a response
//! against that session. Graders are pure over the session value: the engine
//! persists the returned session in the same transaction as the ratings.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::operations::grading_sessions::GradingSession;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseData {
    #[serde(default)]
    pub answer: Option<String>,
    /// False saves the answer without finishing the question.
    #[serde(default = "default_finish")]
    pub finish: bool,
}

fn default_finish() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeOutcome {
    pub finished: bool,
    pub correct: bool,
    pub fraction: f64,
}

impl GradeOutcome {
    pub fn pending() -> Self {
        Self {
            finished: false,
            correct: false,
            fraction: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Graded {
    pub session: GradingSession,
    pub outcome: GradeOutcome,
}

#[derive(Debug, Error)]
pub enum GradingError {
    #[error("no answer key for question {0}")]
    UnknownQuestion(String),
    #[error("grading session {0} is already finished")]
    SessionFinished(String),
    #[error("grader returned fraction {0} outside [0,1]")]
    InvalidFraction(f64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub trait Grader: Send + Sync {
    /// Whether a session can be started for this question.
    fn knows_question(&self, question_id: &str) -> Result<bool, GradingError>;

    fn start_session(&self, question_id: &str) -> Result<GradingSession, GradingError>;

    fn grade(
        &self,
        session: &GradingSession,
        response: &ResponseData,
    ) -> Result<Graded, GradingError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SavedResponse {
    answer: Option<String>,
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Grades free-text responses against the answer keys in the store.
pub struct AnswerKeyGrader {
    store: Arc<Store>,
}

impl AnswerKeyGrader {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

impl Grader for AnswerKeyGrader {
    fn knows_question(&self, question_id: &str) -> Result<bool, GradingError> {
        Ok(self.store.get_answer_key(question_id)?.is_some())
    }

    fn start_session(&self, question_id: &str) -> Result<GradingSession, GradingError> {
        if self.store.get_answer_key(question_id)?.is_none() {
            return Err(GradingError::UnknownQuestion(question_id.to_string()));
        }
        let state = serde_json::to_value(SavedResponse::default()).map_err(StoreError::from)?;
        Ok(GradingSession::new(question_id, state))
    }

    fn grade(
        &self,
        session: &GradingSession,
        response: &ResponseData,
    ) -> Result<Graded, GradingError> {
        if session.finished {
            return Err(GradingError::SessionFinished(session.id.clone()));
        }

        let mut saved: SavedResponse =
            serde_json::from_value(session.state.clone()).map_err(StoreError::from)?;
        if let Some(answer) = &response.answer {
            saved.answer = Some(answer.clone());
        }

        let mut session = session.clone();
        session.state = serde_json::to_value(&saved).map_err(StoreError::from)?;
        session.updated_at = chrono::Utc::now();

        if !response.finish {
            return Ok(Graded {
                session,
                outcome: GradeOutcome::pending(),
            });
        }

        let key = self
            .store
            .get_answer_key(&session.question_id)?
            .ok_or_else(|| GradingError::UnknownQuestion(session.question_id.clone()))?;
        let given = saved.answer.as_deref().map(normalize);
        let fraction = given
            .map(|given| {
                key.answers
                    .iter()
                    .filter(|accepted| normalize(&accepted.text) == given)
                    .map(|accepted| accepted.fraction)
                    .fold(0.0_f64, f64::max)
            })
            .unwrap_or(0.0);

        session.finished = true;
        Ok(Graded {
            session,
            outcome: GradeOutcome {
                finished: true,
                correct: fraction >= 1.0,
                fraction,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::operations::answer_keys::AcceptedAnswer;

    fn grader() -> AnswerKeyGrader {
        let store = Arc::new(Store::temporary().unwrap());
        store
            .put_answer_key(
                "capital",
                vec![
                    AcceptedAnswer {
                        text: "Oslo".to_string(),
                        fraction: 1.0,
                    },
                    AcceptedAnswer {
                        text: "Christiania".to_string(),
                        fraction: 0.5,
                    },
                ],
            )
            .unwrap();
        AnswerKeyGrader::new(store)
    }

    fn respond(answer: &str, finish: bool) -> ResponseData {
        ResponseData {
            answer: Some(answer.to_string()),
            finish,
        }
    }

    #[test]
    fn unknown_question_cannot_start() {
        let err = grader().start_session("nope").unwrap_err();
        assert!(matches!(err, GradingError::UnknownQuestion(_)));
    }

    #[test]
    fn knows_only_questions_with_an_answer_key() {
        let g = grader();
        assert!(g.knows_question("capital").unwrap());
        assert!(!g.knows_question("nope").unwrap());
    }

    #[test]
    fn corrupt_saved_response_is_an_error() {
        let g = grader();
        let mut session = g.start_session("capital").unwrap();
        session.state = serde_json::json!({ "answer": 42 });
        let err = g.grade(&session, &respond("Oslo", true)).unwrap_err();
        assert!(matches!(err, GradingError::Store(StoreError::Serialization(_))));
    }

    #[test]
    fn exact_answer_is_correct_ignoring_case_and_spaces() {
        let g = grader();
        let session = g.start_session("capital").unwrap();
        let graded = g.grade(&session, &respond("  oslo ", true)).unwrap();
        assert!(graded.outcome.finished);
        assert!(graded.outcome.correct);
        assert_eq!(graded.outcome.fraction, 1.0);
        assert!(graded.session.finished);
    }

    #[test]
    fn partial_credit_is_not_correct() {
        let g = grader();
        let session = g.start_session("capital").unwrap();
        let graded = g.grade(&session, &respond("christiania", true)).unwrap();
        assert!(!graded.outcome.correct);
        assert_eq!(graded.outcome.fraction, 0.5);
    }

    #[test]
    fn unfinished_response_is_saved_for_later() {
        let g = grader();
        let session = g.start_session("capital").unwrap();
        let pending = g.grade(&session, &respond("Oslo", false)).unwrap();
        assert!(!pending.outcome.finished);
        assert!(!pending.session.finished);

        let finish_only = ResponseData {
            answer: None,
            finish: true,
        };
        let graded = g.grade(&pending.session, &finish_only).unwrap();
        assert!(graded.outcome.correct);
    }

    #[test]
    fn finished_session_is_immutable() {
        let g = grader();
        let session = g.start_session("capital").unwrap();
        let graded = g.grade(&session, &respond("Bergen", true)).unwrap();
        assert_eq!(graded.outcome.fraction, 0.0);
        let err = g.grade(&graded.session, &respond("Oslo", true)).unwrap_err();
        assert!(matches!(err, GradingError::SessionFinished(_)));
    }
}
