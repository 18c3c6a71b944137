use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::quiz::engine::QuizEngine;
use crate::quiz::grading::AnswerKeyGrader;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    store: Arc<Store>,
    engine: Arc<QuizEngine>,
    config: Arc<Config>,
    started_at: Instant,
}

impl AppState {
    /// Wires the engine to the built-in answer-key grader.
    pub fn new(store: Arc<Store>, config: &Config) -> Self {
        let grader = Arc::new(AnswerKeyGrader::new(store.clone()));
        let engine = Arc::new(QuizEngine::new(store.clone(), grader));
        Self::with_engine(store, engine, config)
    }

    pub fn with_engine(store: Arc<Store>, engine: Arc<QuizEngine>, config: &Config) -> Self {
        Self {
            store,
            engine,
            config: Arc::new(config.clone()),
            started_at: Instant::now(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn engine(&self) -> &QuizEngine {
        &self.engine
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
