//! Artifact fetching from the compile service.
//!
//! This module provides the [`ArtifactFetcher`] trait and its HTTP
//! implementation. A widget's manifest is an ordered list of file
//! descriptors; [`WidgetManifest::from_descriptors`] picks the module,
//! stylesheet and settings module out of it.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

use widget_composer_common::{ComposerError, FetchConfig, LoadError};

/// Identifier used to attribute failures of the widget listing.
pub const LISTING: &str = "*";

/// The compiled artifacts of one widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WidgetManifest {
    /// Widget identifier.
    pub identifier: String,
    /// Compiled module text.
    pub module_text: String,
    /// Stylesheet text, if the widget ships one.
    pub style_text: Option<String>,
    /// Compiled settings-module text, if any.
    pub settings_module_text: Option<String>,
    /// Export name of the settings object, if the compiler reported one.
    pub settings_object_name: Option<String>,
}

/// One entry of a manifest response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    /// Source file name.
    #[serde(default)]
    pub file: Option<String>,
    /// Compiled module text.
    #[serde(default)]
    pub js: Option<String>,
    /// Stylesheet text.
    #[serde(default)]
    pub css_content: Option<String>,
    /// Compiled settings-module text.
    #[serde(default)]
    pub ts_content: Option<String>,
    /// Export name of the settings object.
    #[serde(default)]
    pub settings_object_name: Option<String>,
}

impl WidgetManifest {
    /// Build a manifest from file descriptors.
    ///
    /// The first descriptor with non-empty `js` is the module and the first
    /// with non-empty `cssContent` is the stylesheet. The descriptor named
    /// `settings_file` supplies the settings module and object name.
    ///
    /// # Errors
    ///
    /// Returns a `Manifest` error if no descriptor carries module text.
    pub fn from_descriptors(
        identifier: &str,
        descriptors: &[FileDescriptor],
        settings_file: &str,
    ) -> Result<Self, LoadError> {
        let module_text = descriptors
            .iter()
            .find_map(|d| non_empty(d.js.as_ref()))
            .ok_or_else(|| LoadError::manifest(identifier, "no compiled module in manifest"))?;

        let style_text = descriptors
            .iter()
            .find_map(|d| non_empty(d.css_content.as_ref()));

        let settings = descriptors
            .iter()
            .find(|d| d.file.as_deref() == Some(settings_file));

        Ok(Self {
            identifier: identifier.to_string(),
            module_text,
            style_text,
            settings_module_text: settings.and_then(|d| non_empty(d.ts_content.as_ref())),
            settings_object_name: settings.and_then(|d| non_empty(d.settings_object_name.as_ref())),
        })
    }

    /// Parse a manifest response body.
    ///
    /// # Errors
    ///
    /// Returns a `Manifest` error if the body is not an array of file
    /// descriptors or carries no module.
    pub fn from_json(identifier: &str, body: &str, settings_file: &str) -> Result<Self, LoadError> {
        let descriptors: Vec<FileDescriptor> = serde_json::from_str(body).map_err(|e| {
            LoadError::manifest(identifier, format!("expected an array of file descriptors: {e}"))
        })?;
        Self::from_descriptors(identifier, &descriptors, settings_file)
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty()).cloned()
}

/// Source of widget manifests.
///
/// The registry issues at most one `fetch` per identifier for as long as
/// the identifier stays in the composition.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync + 'static {
    /// Fetch the manifest of one widget.
    async fn fetch(&self, identifier: &str) -> Result<WidgetManifest, LoadError>;

    /// List the identifiers of all available widgets.
    async fn list(&self) -> Result<Vec<String>, LoadError>;
}

/// Fetches manifests over HTTP.
///
/// Manifests live at `{base_url}/files/{identifier}`, and the listing of
/// available widgets at `{base_url}/files`.
pub struct HttpArtifactFetcher {
    /// HTTP client (shared, connection pooled).
    client: Client,

    /// Base URL of the compile service.
    base_url: Url,

    /// File name of the settings-module descriptor.
    settings_file: String,
}

impl HttpArtifactFetcher {
    /// Create a new HTTP fetcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the client cannot be
    /// built.
    pub fn new(config: &FetchConfig) -> Result<Self, ComposerError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .pool_max_idle_per_host(10)
            .user_agent(concat!("widget-composer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ComposerError::invalid_config(format!("HTTP client: {e}")))?;

        Self::with_client(client, config)
    }

    /// Create with a custom HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid.
    pub fn with_client(client: Client, config: &FetchConfig) -> Result<Self, ComposerError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ComposerError::invalid_config(format!("invalid base_url '{}': {e}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ComposerError::invalid_config(format!(
                "base_url '{}' cannot carry a path",
                config.base_url
            )));
        }

        Ok(Self {
            client,
            base_url,
            settings_file: config.settings_file.clone(),
        })
    }

    /// URL of the listing, or of one widget's manifest.
    ///
    /// The identifier is percent-encoded as a single path segment.
    pub fn files_url(&self, identifier: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("files");
            if let Some(identifier) = identifier {
                segments.push(identifier);
            }
        }
        url
    }

    async fn get_text(&self, identifier: &str, url: Url) -> Result<String, LoadError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            let reason = if e.is_timeout() {
                "request timed out".to_string()
            } else if e.is_connect() {
                format!("connection failed: {e}")
            } else {
                e.to_string()
            };
            LoadError::fetch(identifier, reason)
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(identifier, status = status.as_u16(), "Unexpected fetch status");
            return Err(LoadError::fetch_status(identifier, status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| LoadError::fetch(identifier, format!("reading body: {e}")))
    }
}

#[async_trait]
impl ArtifactFetcher for HttpArtifactFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, identifier: &str) -> Result<WidgetManifest, LoadError> {
        let start = Instant::now();
        let url = self.files_url(Some(identifier));
        debug!(url = %url, "Fetching manifest");

        let body = self.get_text(identifier, url).await?;
        let manifest = WidgetManifest::from_json(identifier, &body, &self.settings_file)?;

        info!(
            module_len = manifest.module_text.len(),
            has_style = manifest.style_text.is_some(),
            has_settings = manifest.settings_module_text.is_some(),
            duration_ms = start.elapsed().as_millis(),
            "Manifest fetched"
        );
        Ok(manifest)
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<String>, LoadError> {
        let body = self.get_text(LISTING, self.files_url(None)).await?;
        serde_json::from_str(&body).map_err(|e| {
            LoadError::manifest(LISTING, format!("expected an array of identifiers: {e}"))
        })
    }
}

impl std::fmt::Debug for HttpArtifactFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpArtifactFetcher")
            .field("base_url", &self.base_url.as_str())
            .field("settings_file", &self.settings_file)
            .finish_non_exhaustive()
    }
}
