//! Request handlers for the composition API.
//!
//! Handlers are thin: each forwards one command to the composition and
//! converts the outcome into an [`ApiResponse`].

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use widget_composer_common::ComposerError;

use crate::request::{EditSettingRequest, SetWidgetsRequest};
use crate::response::ApiResponse;
use crate::state::AppState;

/// Serialize a value into a JSON response.
fn json_response<T: serde::Serialize>(status: u16, value: &T) -> ApiResponse {
    match serde_json::to_string(value) {
        Ok(body) => ApiResponse::json(status, &body),
        Err(e) => {
            error!(error = %e, "Failed to serialize response");
            ApiResponse::error(500, "Internal server error")
        }
    }
}

/// Convert a [`ComposerError`] to an HTTP response.
fn error_to_response(error: &ComposerError) -> ApiResponse {
    match error {
        ComposerError::WidgetNotFound { .. } => ApiResponse::error(404, &error.to_string()),
        ComposerError::NoSettings { .. } => ApiResponse::error(409, &error.to_string()),
        ComposerError::Settings(_) => ApiResponse::error(422, &error.to_string()),
        ComposerError::Load(e) if e.is_fetch_stage() => ApiResponse::error(502, &e.to_string()),
        ComposerError::CompositionClosed => ApiResponse::error(503, &error.to_string()),
        _ => ApiResponse::error(500, "Internal server error"),
    }
}

/// Health check handler.
///
/// Returns 200 OK if the server is running.
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness check handler.
///
/// Returns 200 OK while the composition event loop answers.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.composition().status().await {
        Ok(status) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "instances": status.instances.len(),
                "in_flight": status.in_flight,
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "unavailable", "error": e.to_string() })),
        ),
    }
}

/// List widgets available from the compile service.
pub async fn list_widgets(State(state): State<AppState>) -> impl IntoResponse {
    match state.fetcher().list().await {
        Ok(widgets) => json_response(
            200,
            &serde_json::json!({
                "count": widgets.len(),
                "widgets": widgets,
            }),
        ),
        Err(e) => {
            warn!(error = %e, "Widget listing failed");
            ApiResponse::error(502, &e.to_string())
        }
    }
    .into_axum_response()
}

/// Status of every instance in the composition.
pub async fn get_composition(State(state): State<AppState>) -> impl IntoResponse {
    match state.composition().status().await {
        Ok(status) => json_response(200, &status),
        Err(e) => error_to_response(&e),
    }
    .into_axum_response()
}

/// Replace the desired widget list.
///
/// Loading continues in the background; the response reports which
/// identifiers were added and removed.
#[instrument(skip_all)]
pub async fn put_composition(
    State(state): State<AppState>,
    Json(request): Json<SetWidgetsRequest>,
) -> impl IntoResponse {
    let request_id = Uuid::new_v4().to_string();

    match state.composition().set_widgets(request.widgets).await {
        Ok(report) => {
            info!(
                request_id = %request_id,
                added = report.added.len(),
                removed = report.removed.len(),
                "Composition updated"
            );
            json_response(200, &report).with_header("x-request-id", &request_id)
        }
        Err(e) => error_to_response(&e),
    }
    .into_axum_response()
}

/// Activate a widget's settings panel.
#[instrument(skip_all)]
pub async fn activate_widget(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.composition().activate(&id).await {
        Ok(panel) => json_response(
            200,
            &serde_json::json!({
                "html": panel.to_html(),
                "panel": panel,
            }),
        ),
        Err(e) => {
            warn!(identifier = %id, error = %e, "Activation failed");
            error_to_response(&e)
        }
    }
    .into_axum_response()
}

/// Apply one live settings edit.
#[instrument(skip_all)]
pub async fn edit_settings(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<EditSettingRequest>,
) -> impl IntoResponse {
    match state
        .composition()
        .edit_setting(&id, &request.path, request.value)
        .await
    {
        Ok(style) => json_response(200, &serde_json::json!({ "style": style })),
        Err(e) => {
            warn!(identifier = %id, path = %request.path, error = %e, "Settings edit rejected");
            error_to_response(&e)
        }
    }
    .into_axum_response()
}

/// Render the composed page.
pub async fn preview(State(state): State<AppState>) -> impl IntoResponse {
    match state.composition().preview().await {
        Ok(html) => ApiResponse::html(200, &html),
        Err(e) => error_to_response(&e),
    }
    .into_axum_response()
}

/// Download the static export of the composition.
pub async fn export(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();
    match state.composition().export().await {
        Ok(document) => {
            info!(
                instances = document.instances.len(),
                duration_ms = start.elapsed().as_millis(),
                "Export served"
            );
            ApiResponse::html(200, &document.html).attachment(document.file_name())
        }
        Err(e) => error_to_response(&e),
    }
    .into_axum_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use widget_composer_common::{LoadError, SettingsError};

    #[test]
    fn test_error_to_response_not_found() {
        let resp = error_to_response(&ComposerError::widget_not_found("x"));
        assert_eq!(resp.status, 404);
    }

    #[test]
    fn test_error_to_response_settings() {
        let err = ComposerError::Settings(SettingsError::UnknownPath { path: "a.b".into() });
        assert_eq!(error_to_response(&err).status, 422);

        let err = ComposerError::NoSettings {
            identifier: "x".into(),
        };
        assert_eq!(error_to_response(&err).status, 409);
    }

    #[test]
    fn test_error_to_response_fetch() {
        let err = ComposerError::Load(LoadError::fetch_status("x", 500));
        assert_eq!(error_to_response(&err).status, 502);

        let err = ComposerError::Load(LoadError::capability("x", "fs"));
        assert_eq!(error_to_response(&err).status, 500);
    }

    #[test]
    fn test_error_to_response_closed() {
        assert_eq!(error_to_response(&ComposerError::CompositionClosed).status, 503);
    }
}
