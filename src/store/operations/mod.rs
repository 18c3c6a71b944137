pub mod answer_keys;
pub mod attempts;
pub mod grades;
pub mod grading_sessions;
pub mod question_ratings;
pub mod quiz_users;
pub mod quizzes;
pub mod slots;
pub mod user_ratings;
