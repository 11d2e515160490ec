//! In-memory fetcher for unit tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::fetcher::{ArtifactFetcher, WidgetManifest};
use widget_composer_common::LoadError;

/// A manifest whose component renders `<div class="{id}">{id}</div>`.
pub(crate) fn manifest(identifier: &str) -> WidgetManifest {
    WidgetManifest {
        identifier: identifier.to_string(),
        module_text: format!(
            r#"var React = require("react");
            exports.default = function () {{
                return React.createElement("div", {{ className: "{identifier}" }}, "{identifier}");
            }};"#
        ),
        style_text: Some(format!(".{identifier} {{ color: red; }}")),
        settings_module_text: None,
        settings_object_name: None,
    }
}

/// Serves fixed manifests, counting calls per identifier.
///
/// A gated identifier's fetch blocks until [`StubFetcher::release`] is
/// called once for it.
#[derive(Default)]
pub(crate) struct StubFetcher {
    manifests: HashMap<String, WidgetManifest>,
    gates: HashMap<String, Arc<Semaphore>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl StubFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, manifest: WidgetManifest) -> Self {
        self.manifests.insert(manifest.identifier.clone(), manifest);
        self
    }

    pub(crate) fn gated(mut self, identifier: &str) -> Self {
        self.gates
            .insert(identifier.to_string(), Arc::new(Semaphore::new(0)));
        self
    }

    pub(crate) fn release(&self, identifier: &str) {
        if let Some(gate) = self.gates.get(identifier) {
            gate.add_permits(1);
        }
    }

    pub(crate) fn calls(&self, identifier: &str) -> usize {
        self.calls.lock().get(identifier).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ArtifactFetcher for StubFetcher {
    async fn fetch(&self, identifier: &str) -> Result<WidgetManifest, LoadError> {
        *self.calls.lock().entry(identifier.to_string()).or_default() += 1;

        if let Some(gate) = self.gates.get(identifier) {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.manifests
            .get(identifier)
            .cloned()
            .ok_or_else(|| LoadError::fetch_status(identifier, 404))
    }

    async fn list(&self) -> Result<Vec<String>, LoadError> {
        let mut identifiers: Vec<String> = self.manifests.keys().cloned().collect();
        identifiers.sort();
        Ok(identifiers)
    }
}
