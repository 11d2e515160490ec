//! Renderable widget components.

use std::time::Instant;

use rquickjs::{Ctx, Function, Object};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::render::RenderNode;
use crate::sandbox::{Sandbox, catch_thrown};
use widget_composer_common::LoadError;

/// Global under which the evaluator keeps the host bridge of a sandbox.
pub(crate) const HOST_GLOBAL: &str = "__composer_host";

/// What the module exported as its component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// A function or class component.
    Function,
    /// An element or an object with a `render` method.
    Object,
}

/// A loaded widget: the sandbox that evaluated it and its resolved export.
///
/// Rendering always happens inside the widget's own sandbox, under the same
/// limits as the module body.
pub struct WidgetComponent {
    sandbox: Sandbox,
    kind: ExportKind,
    content_hash: String,
}

impl WidgetComponent {
    pub(crate) fn new(sandbox: Sandbox, kind: ExportKind, content_hash: String) -> Self {
        Self {
            sandbox,
            kind,
            content_hash,
        }
    }

    /// Widget identifier.
    pub fn identifier(&self) -> &str {
        self.sandbox.identifier()
    }

    /// What the module exported.
    pub fn kind(&self) -> ExportKind {
        self.kind
    }

    /// Hash of the module text this component was evaluated from.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// The sandbox the component lives in.
    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Render the component with the given props.
    ///
    /// # Errors
    ///
    /// Returns an `Execution` error if the component throws, runs past the
    /// deadline, or produces a tree the host cannot represent.
    #[instrument(skip(self, props), fields(identifier = %self.identifier()))]
    pub fn render(&self, props: &Value) -> Result<RenderNode, LoadError> {
        let start = Instant::now();
        let props_json = props.to_string();

        let json = self.sandbox.with(|ctx| {
            render_json(&ctx, &props_json).map_err(|e| catch_thrown(&ctx, e))
        });
        let json = json.map_err(|thrown| self.sandbox.load_error(thrown))?;

        let node = RenderNode::from_wire(&json)
            .map_err(|reason| LoadError::execution(self.identifier(), reason))?;

        debug!(duration_ms = start.elapsed().as_millis(), "Component rendered");
        Ok(node)
    }
}

fn render_json(ctx: &Ctx<'_>, props_json: &str) -> rquickjs::Result<String> {
    let host: Object<'_> = ctx.globals().get(HOST_GLOBAL)?;
    let render: Function<'_> = host.get("render")?;
    render.call((props_json.to_string(),))
}

impl std::fmt::Debug for WidgetComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetComponent")
            .field("identifier", &self.identifier())
            .field("kind", &self.kind)
            .field("content_hash", &self.content_hash)
            .finish_non_exhaustive()
    }
}
