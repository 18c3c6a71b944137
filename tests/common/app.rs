use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;

use capquiz_backend::config::{Config, QuizEnvConfig};
use capquiz_backend::routes::build_router;
use capquiz_backend::state::AppState;
use capquiz_backend::store::Store;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<Store>,
    _temp_dir: TempDir,
}

pub async fn spawn_test_app() -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let sled_path = temp_dir.path().join("capquiz-test.sled");

    // built directly so parallel tests never race on set_var
    let config = Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 3000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path: sled_path.to_string_lossy().to_string(),
        cors_origin: "http://localhost:5173".to_string(),
        quiz: QuizEnvConfig {
            default_user_rating: 1000.0,
            user_win_probability: 0.5,
            number_of_candidates: 1,
            ..QuizEnvConfig::default()
        },
    };

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    store.run_migrations().expect("run migrations");

    let state = AppState::new(store.clone(), &config);
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        store,
        _temp_dir: temp_dir,
    }
}
