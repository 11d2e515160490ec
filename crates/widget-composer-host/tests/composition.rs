//! End-to-end tests: compile service over HTTP → composition → export.

use std::sync::Arc;

use axum::Router;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use serde_json::json;

use widget_composer_common::{ComposerConfig, ComposerError, FetchConfig};
use widget_composer_host::{CompositionHandle, HttpArtifactFetcher, InstanceStatus};

const CARD: &str = r#"
"use strict";
Object.defineProperty(exports, "__esModule", { value: true });
const jsx_runtime_1 = require("react/jsx-runtime");
const Card = ({ message }) => (0, jsx_runtime_1.jsxs)("section", {
    className: "card",
    children: [(0, jsx_runtime_1.jsx)("h2", { children: "Card" }), (0, jsx_runtime_1.jsx)("p", { children: message })]
});
exports.default = Card;
"#;

const CARD_SETTINGS: &str = r#"
"use strict";
Object.defineProperty(exports, "__esModule", { value: true });
const types = require("builder-settings-types");
exports.card_oa_settings = new types.SettingGroup({
    title: "Card",
    main: true,
    settings: {
        background: new types.SettingGroup({
            title: "Background",
            settings: {
                color: new types.ColorSetting({ default: "240,240,240" }),
                width: new types.WidthSetting({ default: 320, mobile: 280 }),
                borders: new types.BorderSettingSet({ radius: 4 })
            }
        })
    }
});
"#;

const SNEAKY: &str = r#"
const fs = require("fs");
exports.default = function () { return null; };
"#;

fn compile_service() -> Router {
    Router::new()
        .route("/files", get(|| async { r#"["card","sneaky"]"# }))
        .route(
            "/files/:id",
            get(|Path(id): Path<String>| async move {
                let body = match id.as_str() {
                    "card" => json!([
                        {"file": "Card.tsx", "js": CARD},
                        {"file": "Card.css", "cssContent": ".card { padding: 8px; }"},
                        {
                            "file": "settings.ts",
                            "tsContent": CARD_SETTINGS,
                            "settingsObjectName": "card_oa_settings"
                        }
                    ]),
                    "sneaky" => json!([{"file": "Sneaky.tsx", "js": SNEAKY}]),
                    _ => return (StatusCode::NOT_FOUND, "Folder not found".to_string()),
                };
                (StatusCode::OK, body.to_string())
            }),
        )
}

async fn start() -> CompositionHandle {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, compile_service()).await.unwrap();
    });

    let config = ComposerConfig {
        fetch: FetchConfig {
            base_url: format!("http://{addr}"),
            ..Default::default()
        },
        ..Default::default()
    };
    let fetcher = Arc::new(HttpArtifactFetcher::new(&config.fetch).unwrap());
    CompositionHandle::spawn(config, fetcher).await.unwrap()
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(ToString::to_string).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_compose_edit_and_export() {
    let handle = start().await;

    handle
        .set_widgets(ids(&["card", "sneaky", "absent"]))
        .await
        .unwrap();
    let status = handle.settle().await.unwrap();

    let statuses: Vec<_> = status.instances.iter().map(|i| i.status).collect();
    assert_eq!(
        statuses,
        vec![InstanceStatus::Ready, InstanceStatus::Failed, InstanceStatus::Failed]
    );
    assert!(status.instances[1].error.as_deref().unwrap().contains("Cannot require 'fs'"));
    assert!(status.instances[2].error.as_deref().unwrap().contains("404"));
    assert!(status.instances[0].has_settings);

    let panel = handle.activate("card").await.unwrap();
    assert_eq!(panel.input_count(), 5);

    let style = handle
        .edit_setting("card", "background.borders.size", json!(3))
        .await
        .unwrap();
    assert_eq!(style.get("border-width").map(String::as_str), Some("3px"));
    assert_eq!(style.get("border-radius").map(String::as_str), Some("4px"));
    assert_eq!(style.get("background-color").map(String::as_str), Some("rgb(240,240,240)"));

    let preview = handle.preview().await.unwrap();
    assert!(preview.contains("<h2>Card</h2><p>Hello from dynamic component!</p>"));
    assert!(preview.contains("border-width: 3px"));
    assert!(preview.contains("Error: Cannot require 'fs' (widget 'sneaky')"));

    let document = handle.export().await.unwrap();
    assert_eq!(document.instances, ids(&["card"]));
    assert!(document.html.contains(".card { padding: 8px; }"));
    assert!(document.html.contains("border-width: 3px"));
    assert!(!document.html.contains("sneaky"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_settings_errors_surface() {
    let handle = start().await;
    handle.set_widgets(ids(&["card", "sneaky"])).await.unwrap();
    handle.settle().await.unwrap();

    assert!(matches!(
        handle.activate("sneaky").await,
        Err(ComposerError::NoSettings { .. })
    ));
    assert!(matches!(
        handle.edit_setting("card", "background.nope", json!(1)).await,
        Err(ComposerError::Settings(_))
    ));
    assert!(matches!(
        handle.edit_setting("gone", "background.width", json!(1)).await,
        Err(ComposerError::WidgetNotFound { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reconcile_converges() {
    let handle = start().await;

    handle.set_widgets(ids(&["card", "sneaky"])).await.unwrap();
    let report = handle.set_widgets(ids(&["sneaky"])).await.unwrap();
    assert_eq!(report.removed, ids(&["card"]));
    assert!(report.added.is_empty());

    let status = handle.settle().await.unwrap();
    let known: Vec<_> = status.instances.iter().map(|i| i.identifier.as_str()).collect();
    assert_eq!(known, vec!["sneaky"]);
    assert_eq!(status.in_flight, 0);
}
