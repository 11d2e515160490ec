//! HTTP router configuration.
//!
//! This module provides functions to build the Axum router with all
//! necessary routes and middleware.

use std::time::Duration;

use axum::Router;
use axum::routing::{get, patch, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handler::{
    activate_widget, edit_settings, export, get_composition, health_check, list_widgets, preview,
    put_composition, readiness_check,
};
use crate::state::AppState;

/// Build the main application router.
///
/// Routes:
/// - `GET /health` - Health check
/// - `GET /ready` - Readiness check
/// - `GET /widgets` - Widgets available from the compile service
/// - `GET /composition` - Instance statuses
/// - `PUT /composition` - Replace the desired widget list
/// - `POST /composition/:id/activate` - Activate a widget's settings panel
/// - `PATCH /composition/:id/settings` - Apply a live settings edit
/// - `GET /composition/preview` - Render the composed page
/// - `GET /export` - Download the static export
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let composition_routes = Router::new()
        .route("/composition", get(get_composition).put(put_composition))
        .route("/composition/preview", get(preview))
        .route("/composition/:id/activate", post(activate_widget))
        .route("/composition/:id/settings", patch(edit_settings))
        .route("/export", get(export));

    let health_routes = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/widgets", get(list_widgets));

    Router::new()
        .merge(composition_routes)
        .merge(health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
