pub mod config;
pub mod elo;
pub mod engine;
pub mod grading;
pub mod selector;
pub mod stars;
