//! Sandboxed module evaluation.
//!
//! This module provides [`ModuleEvaluator`], which runs compiled module text
//! inside a fresh sandbox:
//!
//! 1. Create a sandbox with its own runtime and limits
//! 2. Install the capability set and the host bridge
//! 3. Execute the module body with injected `require`, `module`, `exports`
//! 4. Resolve the export and classify failures

use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Instant;

use rquickjs::{Ctx, Function, Object};
use tracing::{debug, info, instrument, warn};

use crate::capability::CapabilitySet;
use crate::component::{ExportKind, HOST_GLOBAL, WidgetComponent};
use crate::engine::SandboxEngine;
use crate::sandbox::{Sandbox, catch_thrown};
use crate::settings::SettingsObject;
use widget_composer_common::LoadError;

/// Evaluates widget and settings modules in isolated sandboxes.
///
/// No sandbox is reused: every call creates a new one, so two evaluations
/// never observe each other's globals.
#[derive(Debug, Clone)]
pub struct ModuleEvaluator {
    engine: SandboxEngine,
}

impl ModuleEvaluator {
    /// Create a new evaluator.
    ///
    /// # Arguments
    ///
    /// * `engine` - The sandbox engine supplying limits
    pub fn new(engine: SandboxEngine) -> Self {
        Self { engine }
    }

    /// Get the sandbox engine.
    pub fn engine(&self) -> &SandboxEngine {
        &self.engine
    }

    /// Evaluate a widget module and resolve its component.
    ///
    /// The result is `module.exports.default` when present, else
    /// `module.exports` itself.
    ///
    /// # Arguments
    ///
    /// * `identifier` - Widget identifier, used to attribute failures
    /// * `source` - Compiled module text
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The module requires a name outside the widget capabilities
    /// - The module body throws or runs past the deadline
    /// - The export is neither a function nor an object
    #[instrument(skip(self, source), fields(identifier = %identifier, bytes_len = source.len()))]
    pub fn evaluate_widget(
        &self,
        identifier: &str,
        source: &str,
    ) -> Result<WidgetComponent, LoadError> {
        let start = Instant::now();
        let sandbox = self.sandbox(identifier)?;

        let found = sandbox.with(|ctx| {
            run_widget(&ctx, &sandbox, source).map_err(|e| catch_thrown(&ctx, e))
        });
        let found = found.map_err(|thrown| sandbox.load_error(thrown))?;

        let kind = match found.as_str() {
            "function" => ExportKind::Function,
            "object" => ExportKind::Object,
            _ => {
                warn!(found = %found, "Module produced no usable component");
                return Err(LoadError::invalid_export(identifier, found));
            }
        };

        let content_hash = compute_hash(source.as_bytes());
        info!(
            content_hash = %content_hash,
            kind = ?kind,
            duration_ms = start.elapsed().as_millis(),
            "Widget module evaluated"
        );

        Ok(WidgetComponent::new(sandbox, kind, content_hash))
    }

    /// Evaluate a settings module and extract its settings object.
    ///
    /// # Arguments
    ///
    /// * `identifier` - Widget identifier, used to attribute failures
    /// * `source` - Compiled settings-module text
    /// * `object_name` - Name of the exported settings object
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The module requires a name outside the settings capabilities
    /// - The module body throws or runs past the deadline
    /// - No settings group is exported under `object_name`
    #[instrument(skip(self, source), fields(identifier = %identifier, bytes_len = source.len()))]
    pub fn evaluate_settings(
        &self,
        identifier: &str,
        source: &str,
        object_name: &str,
    ) -> Result<SettingsObject, LoadError> {
        let start = Instant::now();
        let sandbox = self.sandbox(identifier)?;

        let described = sandbox.with(|ctx| {
            run_settings(&ctx, &sandbox, source, object_name).map_err(|e| catch_thrown(&ctx, e))
        });
        let described = described.map_err(|thrown| sandbox.load_error(thrown))?;

        let Some(json) = described else {
            return Err(LoadError::invalid_export(
                identifier,
                format!("no settings object '{object_name}'"),
            ));
        };

        let settings = SettingsObject::from_descriptor_json(identifier, object_name, &json)
            .map_err(|reason| LoadError::invalid_export(identifier, reason))?;

        info!(
            object_name,
            duration_ms = start.elapsed().as_millis(),
            "Settings module evaluated"
        );
        Ok(settings)
    }

    fn sandbox(&self, identifier: &str) -> Result<Sandbox, LoadError> {
        self.engine
            .create_sandbox(identifier)
            .map_err(|e| LoadError::execution(identifier, e.to_string()))
    }
}

/// Execute a widget module and adopt its export. Returns the export's
/// `typeof`.
fn run_widget<'js>(ctx: &Ctx<'js>, sandbox: &Sandbox, source: &str) -> rquickjs::Result<String> {
    let host = CapabilitySet::widget().install(ctx, sandbox.log_function(ctx)?)?;
    let module = execute(&host, source)?;

    let adopt: Function<'js> = host.get("adopt")?;
    let found: String = adopt.call((module,))?;

    ctx.globals().set(HOST_GLOBAL, host)?;
    debug!(found = %found, "Module executed");
    Ok(found)
}

/// Execute a settings module and describe the named settings object.
fn run_settings<'js>(
    ctx: &Ctx<'js>,
    sandbox: &Sandbox,
    source: &str,
    object_name: &str,
) -> rquickjs::Result<Option<String>> {
    let host = CapabilitySet::settings().install(ctx, sandbox.log_function(ctx)?)?;
    let module = execute(&host, source)?;

    let describe: Function<'js> = host.get("describe")?;
    describe.call((module, object_name.to_string()))
}

fn execute<'js>(host: &Object<'js>, source: &str) -> rquickjs::Result<Object<'js>> {
    let execute: Function<'js> = host.get("execute")?;
    execute.call((source.to_string(),))
}

/// Compute a simple hash of module text.
fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
