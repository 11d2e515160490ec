//! Configuration structures for the widget-composer.
//!
//! This module defines configuration options for various components:
//! - [`ComposerConfig`]: Top-level configuration containing all settings
//! - [`SandboxConfig`]: Resource limits for sandboxed module evaluation
//! - [`FetchConfig`]: Where and how widget manifests are fetched
//! - [`ExportConfig`]: Static export document settings

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level composer configuration.
///
/// It can be loaded from files (TOML, JSON) as part of a
/// [`ConfigFile`](crate::ConfigFile).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ComposerConfig {
    /// Sandbox resource limits.
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Artifact fetcher settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Static export settings.
    #[serde(default)]
    pub export: ExportConfig,
}

/// Sandbox resource limits.
///
/// Every widget module and settings module is evaluated in a fresh sandbox
/// bounded by these limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SandboxConfig {
    /// Heap limit per sandbox in megabytes.
    #[serde(default = "defaults::memory_limit_mb")]
    pub memory_limit_mb: u32,

    /// Maximum interpreter stack size in kilobytes.
    #[serde(default = "defaults::max_stack_kb")]
    pub max_stack_kb: u32,

    /// Wall-clock budget for a single module evaluation or render call.
    ///
    /// Code running longer than this is interrupted.
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            memory_limit_mb: defaults::memory_limit_mb(),
            max_stack_kb: defaults::max_stack_kb(),
            timeout_ms: defaults::timeout_ms(),
        }
    }
}

impl SandboxConfig {
    /// Get the timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Heap limit in bytes.
    pub fn memory_limit_bytes(&self) -> usize {
        (self.memory_limit_mb as usize) * 1024 * 1024
    }

    /// Stack limit in bytes.
    pub fn max_stack_bytes(&self) -> usize {
        (self.max_stack_kb as usize) * 1024
    }
}

/// Artifact fetcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    /// Base URL of the compile service (manifests live under `/files/{id}`).
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Connect timeout in seconds.
    #[serde(default = "defaults::connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// File name of the descriptor carrying the settings module.
    #[serde(default = "defaults::settings_file")]
    pub settings_file: String,

    /// Export name used when the manifest does not name the settings object.
    #[serde(default = "defaults::settings_object")]
    pub default_settings_object: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            request_timeout_secs: defaults::request_timeout_secs(),
            connect_timeout_secs: defaults::connect_timeout_secs(),
            settings_file: defaults::settings_file(),
            default_settings_object: defaults::settings_object(),
        }
    }
}

impl FetchConfig {
    /// Get the request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Get the connect timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Static export configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportConfig {
    /// Document title.
    #[serde(default = "defaults::export_title")]
    pub title: String,

    /// Public URL of the UI framework build.
    #[serde(default = "defaults::react_url")]
    pub react_url: String,

    /// Public URL of the framework's DOM renderer build.
    #[serde(default = "defaults::react_dom_url")]
    pub react_dom_url: String,

    /// Document-level stylesheets present in every composed page.
    #[serde(default)]
    pub document_styles: Vec<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            title: defaults::export_title(),
            react_url: defaults::react_url(),
            react_dom_url: defaults::react_dom_url(),
            document_styles: Vec::new(),
        }
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn memory_limit_mb() -> u32 {
        32
    }

    pub const fn max_stack_kb() -> u32 {
        512
    }

    pub const fn timeout_ms() -> u64 {
        250
    }

    pub fn base_url() -> String {
        "http://localhost:3000".to_string()
    }

    pub const fn request_timeout_secs() -> u64 {
        30
    }

    pub const fn connect_timeout_secs() -> u64 {
        10
    }

    pub fn settings_file() -> String {
        "settings.ts".to_string()
    }

    pub fn settings_object() -> String {
        "oa_settings".to_string()
    }

    pub fn export_title() -> String {
        "Exported Components".to_string()
    }

    pub fn react_url() -> String {
        "https://unpkg.com/react@18/umd/react.production.min.js".to_string()
    }

    pub fn react_dom_url() -> String {
        "https://unpkg.com/react-dom@18/umd/react-dom.production.min.js".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ComposerConfig::default();

        assert_eq!(config.sandbox.memory_limit_mb, 32);
        assert_eq!(config.sandbox.max_stack_kb, 512);
        assert_eq!(config.sandbox.timeout_ms, 250);

        assert_eq!(config.fetch.base_url, "http://localhost:3000");
        assert_eq!(config.fetch.settings_file, "settings.ts");
        assert_eq!(config.fetch.default_settings_object, "oa_settings");

        assert!(config.export.react_url.contains("react@18"));
        assert!(config.export.document_styles.is_empty());
    }

    #[test]
    fn test_config_serialization() {
        let config = ComposerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: ComposerConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(
            config.sandbox.memory_limit_mb,
            deserialized.sandbox.memory_limit_mb
        );
        assert_eq!(config.fetch.base_url, deserialized.fetch.base_url);
    }

    #[test]
    fn test_sandbox_limits() {
        let config = SandboxConfig {
            memory_limit_mb: 2,
            max_stack_kb: 64,
            timeout_ms: 500,
        };

        assert_eq!(config.memory_limit_bytes(), 2 * 1024 * 1024);
        assert_eq!(config.max_stack_bytes(), 64 * 1024);
        assert_eq!(config.timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_partial_deserialization() {
        let json = r#"{"sandbox": {"timeout_ms": 50}}"#;
        let config: ComposerConfig = serde_json::from_str(json).unwrap();

        // Explicitly set value
        assert_eq!(config.sandbox.timeout_ms, 50);
        // Default values for unspecified fields
        assert_eq!(config.sandbox.memory_limit_mb, 32);
        assert_eq!(config.fetch.request_timeout(), Duration::from_secs(30));
    }
}
