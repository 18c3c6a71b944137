use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SETTINGS_VERSION: u32 = 1;

/// Rating update rule. Elo is the only rule in use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RatingSystem {
    #[serde(rename_all = "camelCase")]
    Elo {
        user_k_factor: f64,
        question_k_factor: f64,
    },
}

impl Default for RatingSystem {
    fn default() -> Self {
        Self::Elo {
            user_k_factor: 32.0,
            question_k_factor: 8.0,
        }
    }
}

/// Question selection rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Random pick among the slots nearest to the student's ideal opponent.
    #[serde(rename_all = "camelCase")]
    NearestRandom {
        user_win_probability: f64,
        number_of_candidates: usize,
        min_questions_until_reappearance: usize,
    },
}

impl Default for SelectionStrategy {
    fn default() -> Self {
        Self::NearestRandom {
            user_win_probability: 0.75,
            number_of_candidates: 10,
            min_questions_until_reappearance: 0,
        }
    }
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

fn default_star_ratings() -> Vec<f64> {
    vec![1300.0, 1450.0, 1600.0, 1800.0, 2000.0]
}

fn default_stars_to_pass() -> u32 {
    3
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSettings {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub rating_system: RatingSystem,
    #[serde(default)]
    pub selection: SelectionStrategy,
    pub default_user_rating: f64,
    pub default_question_rating: f64,
    /// Required rating per star level, ascending. Level N needs `star_ratings[N - 1]`.
    #[serde(default = "default_star_ratings")]
    pub star_ratings: Vec<f64>,
    #[serde(default = "default_stars_to_pass")]
    pub stars_to_pass: u32,
    /// After this instant star levels stop counting toward the grade.
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
}

impl Default for QuizSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            rating_system: RatingSystem::default(),
            selection: SelectionStrategy::default(),
            default_user_rating: 1200.0,
            default_question_rating: 1200.0,
            star_ratings: default_star_ratings(),
            stars_to_pass: default_stars_to_pass(),
            due: None,
        }
    }
}

impl QuizSettings {
    pub fn from_env(env_config: &crate::config::QuizEnvConfig) -> Self {
        Self {
            rating_system: RatingSystem::Elo {
                user_k_factor: env_config.user_k_factor,
                question_k_factor: env_config.question_k_factor,
            },
            selection: SelectionStrategy::NearestRandom {
                user_win_probability: env_config.user_win_probability,
                number_of_candidates: env_config.number_of_candidates,
                min_questions_until_reappearance: env_config.min_questions_until_reappearance,
            },
            default_user_rating: env_config.default_user_rating,
            default_question_rating: env_config.default_question_rating,
            stars_to_pass: env_config.stars_to_pass,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.version != SETTINGS_VERSION {
            return Err(format!(
                "unsupported settings version {} (expected {})",
                self.version, SETTINGS_VERSION
            ));
        }

        match &self.rating_system {
            RatingSystem::Elo {
                user_k_factor,
                question_k_factor,
            } => {
                if !(user_k_factor.is_finite() && *user_k_factor > 0.0) {
                    return Err("ratingSystem.userKFactor must be a positive number".to_string());
                }
                if !(question_k_factor.is_finite() && *question_k_factor > 0.0) {
                    return Err(
                        "ratingSystem.questionKFactor must be a positive number".to_string()
                    );
                }
            }
        }

        match &self.selection {
            SelectionStrategy::NearestRandom {
                user_win_probability,
                number_of_candidates,
                ..
            } => {
                if !(*user_win_probability > 0.0 && *user_win_probability < 1.0) {
                    return Err("selection.userWinProbability must be in (0,1)".to_string());
                }
                if *number_of_candidates == 0 {
                    return Err("selection.numberOfCandidates must be >= 1".to_string());
                }
            }
        }

        if !self.default_user_rating.is_finite() {
            return Err("defaultUserRating must be finite".to_string());
        }
        if !self.default_question_rating.is_finite() {
            return Err("defaultQuestionRating must be finite".to_string());
        }
        if self.star_ratings.iter().any(|r| !r.is_finite()) {
            return Err("starRatings must be finite".to_string());
        }
        if self.star_ratings.windows(2).any(|w| w[0] >= w[1]) {
            return Err("starRatings must be strictly ascending".to_string());
        }
        if self.stars_to_pass as usize > self.star_ratings.len() {
            return Err("starsToPass cannot exceed the number of star levels".to_string());
        }

        Ok(())
    }

    pub fn user_k_factor(&self) -> f64 {
        match self.rating_system {
            RatingSystem::Elo { user_k_factor, .. } => user_k_factor,
        }
    }

    pub fn question_k_factor(&self) -> f64 {
        match self.rating_system {
            RatingSystem::Elo {
                question_k_factor, ..
            } => question_k_factor,
        }
    }

    pub fn max_stars(&self) -> u32 {
        self.star_ratings.len() as u32
    }

    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        self.due.is_some_and(|due| now > due)
    }

    /// Highest star level whose required rating `rating` meets, 0 if none.
    pub fn star_level_for(&self, rating: f64) -> u32 {
        self.star_ratings
            .iter()
            .enumerate()
            .rev()
            .find(|(_, required)| rating >= **required)
            .map(|(index, _)| index as u32 + 1)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(QuizSettings::default().validate().is_ok());
    }

    #[test]
    fn rejects_degenerate_win_probability() {
        let settings = QuizSettings {
            selection: SelectionStrategy::NearestRandom {
                user_win_probability: 1.0,
                number_of_candidates: 5,
                min_questions_until_reappearance: 0,
            },
            ..QuizSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_unsorted_star_ratings() {
        let settings = QuizSettings {
            star_ratings: vec![1300.0, 1200.0],
            stars_to_pass: 1,
            ..QuizSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_pass_level_above_star_count() {
        let settings = QuizSettings {
            star_ratings: vec![1300.0],
            stars_to_pass: 2,
            ..QuizSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn star_level_walks_from_the_top() {
        let settings = QuizSettings::default();
        assert_eq!(settings.star_level_for(1000.0), 0);
        assert_eq!(settings.star_level_for(1300.0), 1);
        assert_eq!(settings.star_level_for(1799.9), 3);
        assert_eq!(settings.star_level_for(2500.0), 5);
    }

    #[test]
    fn due_time_is_exclusive() {
        let now = Utc::now();
        let settings = QuizSettings {
            due: Some(now),
            ..QuizSettings::default()
        };
        assert!(!settings.is_past_due(now));
        assert!(settings.is_past_due(now + Duration::seconds(1)));
        assert!(!QuizSettings::default().is_past_due(now));
    }

    #[test]
    fn deserializes_with_missing_optional_fields() {
        let json = serde_json::json!({
            "defaultUserRating": 1000.0,
            "defaultQuestionRating": 1100.0,
            "selection": {
                "kind": "nearest_random",
                "userWinProbability": 0.5,
                "numberOfCandidates": 1,
                "minQuestionsUntilReappearance": 2
            }
        });
        let settings: QuizSettings = serde_json::from_value(json).unwrap();
        assert_eq!(settings.version, SETTINGS_VERSION);
        assert_eq!(settings.user_k_factor(), 32.0);
        assert_eq!(settings.star_ratings.len(), 5);
        assert!(settings.validate().is_ok());
    }
}
