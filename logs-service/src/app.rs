use std::sync::Arc;

use axum::extract::State;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::log_handlers::list_logs;
use crate::metrics::Metrics;
use crate::store::AuditStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AuditStore>,
    pub metrics: Arc<Metrics>,
}

pub async fn health() -> &'static str {
    "ok"
}

async fn metrics(State(state): State<AppState>) -> (StatusCode, String) {
    (StatusCode::OK, state.metrics.render())
}

pub fn build_router(state: AppState) -> Router {
    let allowed_origins = [
        "http://localhost:4200",
        "http://localhost:3000",
    ];
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            allowed_origins.iter().filter_map(|o| o.parse::<HeaderValue>().ok()).collect::<Vec<_>>(),
        ))
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE]);

    Router::new()
        .route("/healthz", get(health))
        .route("/api/logs", get(list_logs))
        .route("/internal/metrics", get(metrics))
        .with_state(state)
        .layer(cors)
}
