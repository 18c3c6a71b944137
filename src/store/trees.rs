pub const QUIZZES: &str = "quizzes";
pub const SLOTS: &str = "slots";
pub const SLOTS_BY_QUIZ: &str = "slots_by_quiz";
pub const SLOT_BINDINGS: &str = "slot_bindings";
pub const QUESTION_RATINGS: &str = "question_ratings";
pub const QUIZ_USERS: &str = "quiz_users";
pub const QUIZ_USERS_BY_ACCOUNT: &str = "quiz_users_by_account";
pub const USER_RATINGS: &str = "user_ratings";
pub const ATTEMPTS: &str = "attempts";
pub const ATTEMPTS_BY_USER: &str = "attempts_by_user";
pub const ATTEMPTS_BY_SLOT: &str = "attempts_by_slot";
pub const ACTIVE_ATTEMPTS: &str = "active_attempts";
pub const GRADING_SESSIONS: &str = "grading_sessions";
pub const ANSWER_KEYS: &str = "answer_keys";
pub const GRADES: &str = "grades";
pub const CONFIG_VERSIONS: &str = "config_versions";
