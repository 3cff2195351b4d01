use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod health;
pub mod notifications;

/// Build the application router with shared state and request tracing.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", notifications::router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
