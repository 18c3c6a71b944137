use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub cors_origin: String,
    pub quiz: QuizEnvConfig,
}

/// Settings applied to quizzes created without explicit settings.
#[derive(Debug, Clone)]
pub struct QuizEnvConfig {
    pub default_user_rating: f64,
    pub default_question_rating: f64,
    pub user_k_factor: f64,
    pub question_k_factor: f64,
    pub user_win_probability: f64,
    pub number_of_candidates: usize,
    pub min_questions_until_reappearance: usize,
    pub stars_to_pass: u32,
}

impl QuizEnvConfig {
    pub fn from_env() -> Self {
        Self {
            default_user_rating: env_or_parse("QUIZ_DEFAULT_USER_RATING", 1200.0_f64),
            default_question_rating: env_or_parse("QUIZ_DEFAULT_QUESTION_RATING", 1200.0_f64),
            user_k_factor: env_or_parse("QUIZ_USER_K", 32.0_f64),
            question_k_factor: env_or_parse("QUIZ_QUESTION_K", 8.0_f64),
            user_win_probability: env_or_parse("QUIZ_WIN_PROBABILITY", 0.75_f64),
            number_of_candidates: env_or_parse("QUIZ_NUM_CANDIDATES", 10_usize),
            min_questions_until_reappearance: env_or_parse("QUIZ_MIN_UNTIL_REAPPEARANCE", 0_usize),
            stars_to_pass: env_or_parse("QUIZ_STARS_TO_PASS", 3_u32),
        }
    }
}

impl Default for QuizEnvConfig {
    fn default() -> Self {
        Self {
            default_user_rating: 1200.0,
            default_question_rating: 1200.0,
            user_k_factor: 32.0,
            question_k_factor: 8.0,
            user_win_probability: 0.75,
            number_of_candidates: 10,
            min_questions_until_reappearance: 0,
            stars_to_pass: 3,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 3000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/capquiz.sled"),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:5173"),
            quiz: QuizEnvConfig::from_env(),
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
