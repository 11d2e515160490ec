//! Common types, errors, and configuration for widget-composer.
//!
//! This crate provides shared functionality used across the widget-composer workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Configuration structures for the sandbox, fetcher, and exporter
//! - The TOML configuration file format

pub mod config;
pub mod config_file;
pub mod error;

pub use config::{ComposerConfig, ExportConfig, FetchConfig, SandboxConfig};
pub use config_file::{ConfigFile, ConfigFileError, ServerConfigFile};
pub use error::{ComposerError, LoadError, SettingsError};
