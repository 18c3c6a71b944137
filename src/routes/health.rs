use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
}

fn store_healthy(state: &AppState) -> bool {
    state.store().get_quiz(0).is_ok()
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let healthy = store_healthy(&state);
    Json(serde_json::json!({
        "status": if healthy { "ok" } else { "degraded" },
        "uptimeSecs": state.uptime_secs(),
        "store": {
            "healthy": healthy,
        }
    }))
}

pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if store_healthy(&state) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
