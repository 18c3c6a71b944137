use axum::http::{Method, StatusCode};
use axum::Router;
use serde_json::{json, Value};

use super::http::call;

pub fn student(account_id: &str) -> Vec<(&'static str, String)> {
    vec![
        ("x-account-id", account_id.to_string()),
        ("x-account-role", "student".to_string()),
    ]
}

pub fn instructor(account_id: &str) -> Vec<(&'static str, String)> {
    vec![
        ("x-account-id", account_id.to_string()),
        ("x-account-role", "instructor".to_string()),
    ]
}

/// Creates a quiz through the API and returns its id.
pub async fn create_quiz(app: &Router, settings: Option<Value>) -> u64 {
    let mut body = json!({ "name": "Linear algebra" });
    if let Some(settings) = settings {
        body["settings"] = settings;
    }
    let (status, json) = call(
        app,
        Method::POST,
        "/api/quizzes",
        Some(body),
        &instructor("prof"),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json["data"]["id"].as_u64().expect("quiz id")
}

/// Adds a slot whose question accepts `answer` as fully correct.
pub async fn add_question(
    app: &Router,
    quiz_id: u64,
    question_id: &str,
    answer: &str,
    rating: f64,
) -> u64 {
    let (status, json) = call(
        app,
        Method::PUT,
        &format!("/api/answer-keys/{question_id}"),
        Some(json!({ "answers": [{ "text": answer, "fraction": 1.0 }] })),
        &instructor("prof"),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");

    let (status, json) = call(
        app,
        Method::POST,
        &format!("/api/quizzes/{quiz_id}/slots"),
        Some(json!({ "questionId": question_id, "rating": rating })),
        &instructor("prof"),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json["data"]["id"].as_u64().expect("slot id")
}
