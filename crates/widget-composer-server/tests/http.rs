//! Integration tests against a running server.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use widget_composer_common::{ComposerConfig, LoadError};
use widget_composer_host::{ArtifactFetcher, WidgetManifest};
use widget_composer_server::ComposerServer;

struct Catalog;

#[async_trait]
impl ArtifactFetcher for Catalog {
    async fn fetch(&self, identifier: &str) -> Result<WidgetManifest, LoadError> {
        let module_text = match identifier {
            "badge" => r#"exports.default = function () {
                return require("react").createElement("b", { className: "badge" }, "new");
            };"#,
            "spinner" => "while (true) {}",
            _ => return Err(LoadError::fetch_status(identifier, 404)),
        };
        Ok(WidgetManifest {
            identifier: identifier.to_string(),
            module_text: module_text.to_string(),
            style_text: Some(".badge { font-weight: 700; }".into()),
            settings_module_text: None,
            settings_object_name: None,
        })
    }

    async fn list(&self) -> Result<Vec<String>, LoadError> {
        Ok(vec!["badge".into(), "spinner".into()])
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_server_compose_over_http() {
    let server = ComposerServer::start_test(&ComposerConfig::default(), Arc::new(Catalog))
        .await
        .unwrap();
    let client = reqwest::Client::new();

    let response = client
        .put(format!("{}/composition", server.url()))
        .json(&json!({ "widgets": ["badge", "spinner"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("x-request-id"));
    let report: Value = response.json().await.unwrap();
    assert_eq!(report["added"], json!(["badge", "spinner"]));

    let status = server.state().composition().settle().await.unwrap();
    assert_eq!(status.in_flight, 0);

    let body: Value = client
        .get(format!("{}/composition", server.url()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["instances"][0]["status"], "ready");
    assert_eq!(body["instances"][1]["status"], "failed");
    assert!(
        body["instances"][1]["error"]
            .as_str()
            .unwrap()
            .contains("interrupted")
    );

    let response = client
        .post(format!("{}/composition/badge/activate", server.url()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    let html = client
        .get(format!("{}/export", server.url()))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(html.contains("data-widget=\"badge\""));
    assert!(!html.contains("while (true)"));

    server.shutdown().await;
}
