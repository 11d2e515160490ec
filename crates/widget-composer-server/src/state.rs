//! Shared application state.
//!
//! This module provides [`AppState`], which holds shared resources
//! across all HTTP request handlers.

use std::sync::Arc;

use widget_composer_common::{ComposerConfig, ComposerError};
use widget_composer_host::{ArtifactFetcher, CompositionHandle, HttpArtifactFetcher};

/// Shared state across all request handlers.
///
/// This struct is cloned for each request; the composition itself lives on
/// its own thread behind the handle.
#[derive(Clone)]
pub struct AppState {
    /// Handle to the running composition.
    composition: CompositionHandle,

    /// Fetcher used for the widget listing.
    fetcher: Arc<dyn ArtifactFetcher>,
}

impl AppState {
    /// Create application state from an existing composition.
    pub fn new(composition: CompositionHandle, fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        Self {
            composition,
            fetcher,
        }
    }

    /// Start a composition fetching over HTTP.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetcher or the composition cannot be created.
    pub async fn start(config: &ComposerConfig) -> Result<Self, ComposerError> {
        let fetcher: Arc<dyn ArtifactFetcher> = Arc::new(HttpArtifactFetcher::new(&config.fetch)?);
        Self::start_with(config, fetcher).await
    }

    /// Start a composition with a custom fetcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the composition cannot be created.
    pub async fn start_with(
        config: &ComposerConfig,
        fetcher: Arc<dyn ArtifactFetcher>,
    ) -> Result<Self, ComposerError> {
        let composition = CompositionHandle::spawn(config.clone(), Arc::clone(&fetcher)).await?;
        Ok(Self::new(composition, fetcher))
    }

    /// Get the composition handle.
    pub fn composition(&self) -> &CompositionHandle {
        &self.composition
    }

    /// Get the artifact fetcher.
    pub fn fetcher(&self) -> &dyn ArtifactFetcher {
        self.fetcher.as_ref()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("composition", &self.composition)
            .finish_non_exhaustive()
    }
}
