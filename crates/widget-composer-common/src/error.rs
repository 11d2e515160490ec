//! Error types for the widget-composer.
//!
//! This module defines a hierarchy of error types using `thiserror`:
//! - [`ComposerError`]: Top-level errors for the composer
//! - [`LoadError`]: Per-instance failures of the fetch/evaluate pipeline
//! - [`SettingsError`]: Failures of live settings edits

use std::io;

use thiserror::Error;

/// Top-level composer errors.
///
/// These errors represent failures that abort an operation of the composer
/// as a whole. Failures scoped to a single widget are [`LoadError`]s and are
/// recorded on that widget's instance instead.
#[derive(Error, Debug)]
pub enum ComposerError {
    /// A widget pipeline failed.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// A settings edit was rejected.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// The requested widget is not part of the composition.
    #[error("Widget not found: {identifier}")]
    WidgetNotFound {
        /// The identifier that was looked up.
        identifier: String,
    },

    /// The widget is loaded but has no settings tree.
    #[error("Widget '{identifier}' has no settings")]
    NoSettings {
        /// The identifier of the widget.
        identifier: String,
    },

    /// The sandbox runtime could not be created.
    #[error("Sandbox initialization failed: {reason}")]
    SandboxInit {
        /// Description of the failure.
        reason: String,
    },

    /// The composition event loop is no longer running.
    #[error("Composition event loop is not running")]
    CompositionClosed,

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },
}

/// Failures of a single widget's load pipeline.
///
/// Every variant carries the widget identifier so the registry can attribute
/// the failure. None of these abort the rest of the composition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// Transport or HTTP status failure while fetching the manifest.
    #[error("Fetch failed for '{identifier}': {reason}")]
    Fetch {
        /// The widget identifier.
        identifier: String,
        /// Description of the failure.
        reason: String,
        /// HTTP status code, when a response was received.
        status: Option<u16>,
    },

    /// The fetched manifest is malformed or has no loadable module.
    #[error("Invalid manifest for '{identifier}': {reason}")]
    Manifest {
        /// The widget identifier.
        identifier: String,
        /// Description of what was missing or malformed.
        reason: String,
    },

    /// The module asked for a dependency outside the capability whitelist.
    #[error("Cannot require '{capability}' (widget '{identifier}')")]
    Capability {
        /// The widget identifier.
        identifier: String,
        /// The module name that was requested.
        capability: String,
    },

    /// The module body threw while executing.
    #[error("Execution failed for '{identifier}': {message}")]
    Execution {
        /// The widget identifier.
        identifier: String,
        /// The thrown message.
        message: String,
    },

    /// The module produced no usable component.
    #[error("Loaded value is not a valid component (widget '{identifier}', found {found})")]
    InvalidExport {
        /// The widget identifier.
        identifier: String,
        /// What was found instead.
        found: String,
    },
}

impl LoadError {
    /// Create a new `Fetch` error without a status code.
    pub fn fetch(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            identifier: identifier.into(),
            reason: reason.into(),
            status: None,
        }
    }

    /// Create a new `Fetch` error for a non-success HTTP status.
    pub fn fetch_status(identifier: impl Into<String>, status: u16) -> Self {
        Self::Fetch {
            identifier: identifier.into(),
            reason: format!("unexpected status {status}"),
            status: Some(status),
        }
    }

    /// Create a new `Manifest` error.
    pub fn manifest(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Manifest {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    /// Create a new `Capability` error.
    pub fn capability(identifier: impl Into<String>, capability: impl Into<String>) -> Self {
        Self::Capability {
            identifier: identifier.into(),
            capability: capability.into(),
        }
    }

    /// Create a new `Execution` error.
    pub fn execution(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            identifier: identifier.into(),
            message: message.into(),
        }
    }

    /// Create a new `InvalidExport` error.
    pub fn invalid_export(identifier: impl Into<String>, found: impl Into<String>) -> Self {
        Self::InvalidExport {
            identifier: identifier.into(),
            found: found.into(),
        }
    }

    /// The identifier of the widget this error belongs to.
    pub fn identifier(&self) -> &str {
        match self {
            Self::Fetch { identifier, .. }
            | Self::Manifest { identifier, .. }
            | Self::Capability { identifier, .. }
            | Self::Execution { identifier, .. }
            | Self::InvalidExport { identifier, .. } => identifier,
        }
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch",
            Self::Manifest { .. } => "manifest",
            Self::Capability { .. } => "capability",
            Self::Execution { .. } => "execution",
            Self::InvalidExport { .. } => "invalid_export",
        }
    }

    /// Returns `true` if the failure happened before any module code ran.
    pub fn is_fetch_stage(&self) -> bool {
        matches!(self, Self::Fetch { .. } | Self::Manifest { .. })
    }
}

/// Errors from live settings edits.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// No setting exists at the given path.
    #[error("Unknown setting: {path}")]
    UnknownPath {
        /// Dotted path that was addressed.
        path: String,
    },

    /// The value does not fit the setting's kind.
    #[error("Invalid value for '{path}': {reason}")]
    InvalidValue {
        /// Dotted path that was addressed.
        path: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ComposerError {
    /// Create a new `WidgetNotFound` error.
    pub fn widget_not_found(identifier: impl Into<String>) -> Self {
        Self::WidgetNotFound {
            identifier: identifier.into(),
        }
    }

    /// Create a new `SandboxInit` error.
    pub fn sandbox_init(reason: impl Into<String>) -> Self {
        Self::SandboxInit {
            reason: reason.into(),
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error indicates the widget was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::WidgetNotFound { .. } | Self::NoSettings { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ComposerError::widget_not_found("leaderboard");
        assert_eq!(err.to_string(), "Widget not found: leaderboard");

        let err = LoadError::capability("leaderboard", "fs");
        assert_eq!(
            err.to_string(),
            "Cannot require 'fs' (widget 'leaderboard')"
        );
    }

    #[test]
    fn test_fetch_status() {
        let err = LoadError::fetch_status("bobs", 404);
        assert!(matches!(
            err,
            LoadError::Fetch {
                status: Some(404),
                ..
            }
        ));
        assert!(err.is_fetch_stage());
        assert_eq!(err.kind(), "fetch");
    }

    #[test]
    fn test_identifier_is_carried() {
        let errors = [
            LoadError::fetch("a", "x"),
            LoadError::manifest("a", "x"),
            LoadError::capability("a", "x"),
            LoadError::execution("a", "x"),
            LoadError::invalid_export("a", "x"),
        ];
        for err in &errors {
            assert_eq!(err.identifier(), "a");
        }
        assert!(!errors[2].is_fetch_stage());
    }

    #[test]
    fn test_error_from_load() {
        let err: ComposerError = LoadError::execution("a", "boom").into();
        assert!(matches!(err, ComposerError::Load(_)));
        assert_eq!(err.to_string(), "Execution failed for 'a': boom");
    }

    #[test]
    fn test_is_not_found() {
        assert!(ComposerError::widget_not_found("x").is_not_found());
        assert!(!ComposerError::CompositionClosed.is_not_found());
    }
}
