mod error;
mod projections;
mod usage;

pub use error::{ApiError, ErrorCode};

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Usage
        .route("/usage/daily", get(usage::get_daily_usage))
        .route("/usage/trend", get(usage::get_usage_trend))
        .route("/export/daily.csv", get(usage::export_daily_csv))
        // Projections
        .route("/scenarios", get(projections::list_scenarios))
        .route("/projections", get(projections::get_projection))
        .route("/projections/compare", get(projections::compare_projections))
        .route("/report", get(projections::get_report));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
