//! Sandbox engine configuration and creation.
//!
//! The [`SandboxEngine`] holds the resource limits applied to every sandbox.
//! It carries no guest state: each call to [`SandboxEngine::create_sandbox`]
//! builds a brand new QuickJS runtime, so module text is re-evaluated per
//! load and no heap is shared between widgets.

use rquickjs::{Context, Runtime};
use tracing::{debug, info};

use crate::sandbox::Sandbox;
use widget_composer_common::{ComposerError, SandboxConfig};

/// Smallest accepted memory limit. QuickJS needs headroom for its own
/// intrinsics before any module text runs.
const MIN_MEMORY_LIMIT_MB: u32 = 4;

/// Smallest accepted stack size.
const MIN_STACK_KB: u32 = 64;

/// Factory for isolated sandboxes.
///
/// # Example
///
/// ```ignore
/// use widget_composer_common::SandboxConfig;
/// use widget_composer_core::SandboxEngine;
///
/// let engine = SandboxEngine::new(&SandboxConfig::default())?;
/// let sandbox = engine.create_sandbox("counter")?;
/// ```
#[derive(Clone)]
pub struct SandboxEngine {
    config: SandboxConfig,
}

impl SandboxEngine {
    /// Create a new sandbox engine with the given limits.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A limit is below the minimum QuickJS can operate with
    /// - The timeout is zero
    /// - A probe runtime cannot be created
    pub fn new(config: &SandboxConfig) -> Result<Self, ComposerError> {
        if config.memory_limit_mb < MIN_MEMORY_LIMIT_MB {
            return Err(ComposerError::invalid_config(format!(
                "memory_limit_mb must be at least {MIN_MEMORY_LIMIT_MB}"
            )));
        }
        if config.max_stack_kb < MIN_STACK_KB {
            return Err(ComposerError::invalid_config(format!(
                "max_stack_kb must be at least {MIN_STACK_KB}"
            )));
        }
        if config.timeout_ms == 0 {
            return Err(ComposerError::invalid_config("timeout_ms must be non-zero"));
        }

        // Fail at startup rather than on the first widget load.
        Runtime::new().map_err(|e| {
            ComposerError::sandbox_init(format!("Failed to create QuickJS runtime: {e}"))
        })?;

        info!(
            memory_limit_mb = config.memory_limit_mb,
            max_stack_kb = config.max_stack_kb,
            timeout_ms = config.timeout_ms,
            "Sandbox engine initialized"
        );

        Ok(Self {
            config: config.clone(),
        })
    }

    /// Create a fresh sandbox for one widget.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime or context cannot be allocated.
    pub fn create_sandbox(&self, identifier: &str) -> Result<Sandbox, ComposerError> {
        let runtime = Runtime::new().map_err(|e| {
            ComposerError::sandbox_init(format!("Failed to create QuickJS runtime: {e}"))
        })?;
        runtime.set_memory_limit(self.config.memory_limit_bytes());
        runtime.set_max_stack_size(self.config.max_stack_bytes());

        let context = Context::full(&runtime).map_err(|e| {
            ComposerError::sandbox_init(format!("Failed to create QuickJS context: {e}"))
        })?;

        debug!(identifier, "Sandbox created");

        Ok(Sandbox::new(
            identifier.to_string(),
            runtime,
            context,
            self.config.timeout(),
        ))
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }
}

impl std::fmt::Debug for SandboxEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxEngine")
            .field("memory_limit_mb", &self.config.memory_limit_mb)
            .field("max_stack_kb", &self.config.max_stack_kb)
            .field("timeout_ms", &self.config.timeout_ms)
            .finish()
    }
}
