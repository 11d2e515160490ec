//! The composition: registry, settings snapshots and the active widget.
//!
//! [`Composition`] owns everything the composed page needs and is driven on
//! a single thread. Sandboxes are not `Send`, so [`CompositionHandle`] runs
//! a composition on a dedicated thread with its own current-thread runtime
//! and forwards commands to it over a channel.
//!
//! ```text
//!  CompositionHandle (Clone + Send)
//!        │ Command + oneshot reply
//!        ▼
//!  ┌──────────────────────── composition thread ─────────────────────────┐
//!  │  select! { command => handle,  completion => registry.settle }      │
//!  │                                                                     │
//!  │  InstanceRegistry ── DocumentStyles                                 │
//!  │  snapshots[id] ◄── StyleChange ◄── settings observer                │
//!  └─────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, instrument, warn};

use crate::bridge::{self, StyleChange, StyleMap};
use crate::export::{ExportDocument, ExportEntry, StaticExporter};
use crate::fetcher::ArtifactFetcher;
use crate::registry::{InstanceRegistry, InstanceStatus, InstanceSummary, ReconcileReport, Settled};
use crate::styles::DocumentStyles;
use widget_composer_common::{ComposerConfig, ComposerError};
use widget_composer_core::render::{escape_attr, escape_text, neutralize};
use widget_composer_core::{ControlPanel, ModuleEvaluator, SandboxEngine, SettingsTree};

/// Serializable view of the whole composition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompositionStatus {
    /// Instances in desired-list order.
    pub instances: Vec<InstanceSummary>,
    /// Identifier whose settings panel is active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<String>,
    /// Fetches still outstanding.
    pub in_flight: usize,
}

/// A composed page of widget instances.
pub struct Composition {
    registry: InstanceRegistry,
    exporter: StaticExporter,
    /// Last captured settings snapshot per identifier.
    snapshots: HashMap<String, Value>,
    active: Option<String>,
    changes_tx: mpsc::UnboundedSender<StyleChange>,
    changes_rx: mpsc::UnboundedReceiver<StyleChange>,
    preview_props: Value,
}

impl Composition {
    /// Create an empty composition.
    ///
    /// # Errors
    ///
    /// Returns an error if the sandbox limits are invalid.
    pub fn new(
        config: &ComposerConfig,
        fetcher: Arc<dyn ArtifactFetcher>,
    ) -> Result<Self, ComposerError> {
        let engine = SandboxEngine::new(&config.sandbox)?;
        let registry = InstanceRegistry::new(
            fetcher,
            ModuleEvaluator::new(engine),
            DocumentStyles::new(config.export.document_styles.clone()),
            config.fetch.default_settings_object.clone(),
        );
        let (changes_tx, changes_rx) = mpsc::unbounded_channel();

        Ok(Self {
            registry,
            exporter: StaticExporter::new(config.export.clone()),
            snapshots: HashMap::new(),
            active: None,
            changes_tx,
            changes_rx,
            preview_props: json!({ "message": "Hello from dynamic component!" }),
        })
    }

    /// Replace the props passed to every component in previews.
    pub fn set_preview_props(&mut self, props: Value) {
        self.preview_props = props;
    }

    /// Reconcile the composition against a desired widget list.
    ///
    /// Snapshots outlive removal so a re-added widget gets its prior edits
    /// back on activation.
    pub fn set_widgets(&mut self, desired: &[String]) -> ReconcileReport {
        let report = self.registry.reconcile(desired);
        if let Some(active) = &self.active {
            if report.removed.contains(active) {
                debug!(identifier = %active, "Active widget removed");
                self.active = None;
            }
        }
        report
    }

    /// Make a widget's settings panel active.
    ///
    /// A captured snapshot is replayed into the tree before it is drawn, and
    /// the tree's change observer is (re)installed to forward live edits.
    #[instrument(skip(self))]
    pub fn activate(&mut self, identifier: &str) -> Result<ControlPanel, ComposerError> {
        self.drain_changes();

        let instance = self
            .registry
            .get_mut(identifier)
            .ok_or_else(|| ComposerError::widget_not_found(identifier))?;
        let settings = instance
            .settings_mut()
            .ok_or_else(|| ComposerError::NoSettings {
                identifier: identifier.to_string(),
            })?;

        if let Some(snapshot) = self.snapshots.get(identifier) {
            settings.set_value(snapshot);
        }
        settings.set_on_change(bridge::observer(identifier, self.changes_tx.clone()));
        let panel = settings.draw();

        self.active = Some(identifier.to_string());
        info!(identifier, inputs = panel.input_count(), "Settings activated");
        Ok(panel)
    }

    /// Apply one live settings edit and return the widget's new style.
    ///
    /// Activates the widget first if another one is active.
    #[instrument(skip(self, value))]
    pub fn edit_setting(
        &mut self,
        identifier: &str,
        path: &str,
        value: &Value,
    ) -> Result<StyleMap, ComposerError> {
        if self.active.as_deref() != Some(identifier) {
            self.activate(identifier)?;
        }

        let settings = self
            .registry
            .get_mut(identifier)
            .and_then(|instance| instance.settings_mut())
            .ok_or_else(|| ComposerError::NoSettings {
                identifier: identifier.to_string(),
            })?;
        settings.update(path, value)?;

        self.drain_changes();
        Ok(self.style_for(identifier))
    }

    /// Store every forwarded snapshot. Returns how many were received.
    pub fn drain_changes(&mut self) -> usize {
        let mut received = 0;
        while let Ok(change) = self.changes_rx.try_recv() {
            self.snapshots.insert(change.identifier, change.snapshot);
            received += 1;
        }
        received
    }

    /// The captured snapshot of a widget, if any.
    pub fn snapshot(&self, identifier: &str) -> Option<&Value> {
        self.snapshots.get(identifier)
    }

    /// The bridge style of a widget.
    ///
    /// Uses the captured snapshot, else the settings tree's current values.
    pub fn style_for(&self, identifier: &str) -> StyleMap {
        if let Some(snapshot) = self.snapshots.get(identifier) {
            return bridge::transform(snapshot);
        }
        self.registry
            .get(identifier)
            .and_then(|instance| instance.settings())
            .map(|settings| bridge::transform(&settings.get_values()))
            .unwrap_or_default()
    }

    /// Render the composed page as HTML.
    ///
    /// Each instance renders independently: loading and failed instances
    /// show a placeholder and a render failure affects only its own block.
    pub fn render_preview(&self) -> String {
        let mut html = String::from("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
        for style in self.registry.styles().document() {
            let _ = writeln!(
                html,
                "<style data-document>{}</style>",
                neutralize(style, "style")
            );
        }
        for resource in self.registry.styles().tagged() {
            let _ = writeln!(
                html,
                "<style data-widget=\"{}\">{}</style>",
                escape_attr(&resource.tag),
                neutralize(&resource.text, "style")
            );
        }
        html.push_str("</head>\n<body>\n");

        for instance in self.registry.instances() {
            let identifier = instance.identifier();
            let body = match (instance.status(), instance.component()) {
                (InstanceStatus::Ready, Some(component)) => {
                    match component.render(&self.preview_props) {
                        Ok(mut node) => {
                            bridge::apply(&mut node, &self.style_for(identifier));
                            node.to_html()
                        }
                        Err(e) => {
                            warn!(identifier, error = %e, "Render failed");
                            format!(
                                "<p class=\"widget-error\">Render failed for {}.</p>",
                                escape_text(identifier)
                            )
                        }
                    }
                }
                (InstanceStatus::Failed, _) => format!(
                    "<p class=\"widget-error\">Error: {}</p>",
                    escape_text(&instance.error_message().unwrap_or_default())
                ),
                _ => "<p class=\"widget-loading\">Loading…</p>".to_string(),
            };
            let _ = writeln!(
                html,
                "<div class=\"widget-instance\" data-widget=\"{}\">{body}</div>",
                escape_attr(identifier)
            );
        }

        html.push_str("</body>\n</html>\n");
        html
    }

    /// Compile every Ready instance into a standalone document.
    pub fn export(&self) -> ExportDocument {
        let ready: Vec<_> = self
            .registry
            .ready()
            .map(|instance| (instance, self.style_for(instance.identifier())))
            .collect();
        let entries: Vec<ExportEntry<'_>> = ready
            .iter()
            .filter_map(|(instance, style)| {
                Some(ExportEntry {
                    identifier: instance.identifier(),
                    module_text: instance.module_text()?,
                    style_text: instance.style_text(),
                    style,
                })
            })
            .collect();
        self.exporter
            .compile(&entries, self.registry.styles().document())
    }

    /// Serializable status of every instance.
    pub fn status(&self) -> CompositionStatus {
        CompositionStatus {
            instances: self.registry.instances().map(|i| i.summary()).collect(),
            active: self.active.clone(),
            in_flight: self.registry.in_flight(),
        }
    }

    /// Wait for the next fetch completion and settle it.
    pub async fn next_event(&mut self) -> Option<Settled> {
        self.registry.next_completion().await
    }

    /// Settle every outstanding fetch.
    pub async fn wait_idle(&mut self) -> Vec<Settled> {
        self.registry.wait_idle().await
    }

    /// Returns `true` while any fetch is outstanding.
    pub fn has_pending(&self) -> bool {
        self.registry.in_flight() > 0
    }

    /// The instance registry.
    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    /// Identifier whose settings panel is active.
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }
}

impl std::fmt::Debug for Composition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composition")
            .field("registry", &self.registry)
            .field("active", &self.active)
            .field("snapshots", &self.snapshots.len())
            .finish_non_exhaustive()
    }
}

type Reply<T> = oneshot::Sender<T>;

enum Command {
    SetWidgets(Vec<String>, Reply<ReconcileReport>),
    Activate(String, Reply<Result<ControlPanel, ComposerError>>),
    EditSetting {
        identifier: String,
        path: String,
        value: Value,
        reply: Reply<Result<StyleMap, ComposerError>>,
    },
    Status(Reply<CompositionStatus>),
    Preview(Reply<String>),
    Export(Reply<ExportDocument>),
    /// Reply once no fetch is outstanding.
    Settle(Reply<CompositionStatus>),
}

/// Handle to a composition running on its own thread.
///
/// Cloning the handle shares the same composition. The thread stops once
/// every handle is dropped.
#[derive(Debug, Clone)]
pub struct CompositionHandle {
    commands: mpsc::Sender<Command>,
}

impl CompositionHandle {
    /// Start a composition on a dedicated thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread or its runtime cannot be started or
    /// the composition rejects the configuration.
    pub async fn spawn(
        config: ComposerConfig,
        fetcher: Arc<dyn ArtifactFetcher>,
    ) -> Result<Self, ComposerError> {
        let (commands, receiver) = mpsc::channel(64);
        let (ready_tx, ready_rx) = oneshot::channel();

        std::thread::Builder::new()
            .name("composition".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(ComposerError::Io(e)));
                        return;
                    }
                };
                runtime.block_on(async move {
                    match Composition::new(&config, fetcher) {
                        Ok(composition) => {
                            let _ = ready_tx.send(Ok(()));
                            run(composition, receiver).await;
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                        }
                    }
                });
            })?;

        ready_rx
            .await
            .map_err(|_| ComposerError::CompositionClosed)??;
        info!("Composition started");
        Ok(Self { commands })
    }

    /// Reconcile against a desired widget list.
    pub async fn set_widgets(&self, widgets: Vec<String>) -> Result<ReconcileReport, ComposerError> {
        self.request(|reply| Command::SetWidgets(widgets, reply)).await
    }

    /// Activate a widget's settings panel.
    pub async fn activate(&self, identifier: &str) -> Result<ControlPanel, ComposerError> {
        let identifier = identifier.to_string();
        self.request(|reply| Command::Activate(identifier, reply))
            .await?
    }

    /// Apply one live settings edit.
    pub async fn edit_setting(
        &self,
        identifier: &str,
        path: &str,
        value: Value,
    ) -> Result<StyleMap, ComposerError> {
        let identifier = identifier.to_string();
        let path = path.to_string();
        self.request(|reply| Command::EditSetting {
            identifier,
            path,
            value,
            reply,
        })
        .await?
    }

    /// Current status of every instance.
    pub async fn status(&self) -> Result<CompositionStatus, ComposerError> {
        self.request(Command::Status).await
    }

    /// Render the composed page as HTML.
    pub async fn preview(&self) -> Result<String, ComposerError> {
        self.request(Command::Preview).await
    }

    /// Compile the static export document.
    pub async fn export(&self) -> Result<ExportDocument, ComposerError> {
        self.request(Command::Export).await
    }

    /// Wait until no fetch is outstanding and return the status.
    pub async fn settle(&self) -> Result<CompositionStatus, ComposerError> {
        self.request(Command::Settle).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, ComposerError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| ComposerError::CompositionClosed)?;
        response.await.map_err(|_| ComposerError::CompositionClosed)
    }
}

/// The composition event loop.
async fn run(mut composition: Composition, mut commands: mpsc::Receiver<Command>) {
    let mut waiters: Vec<Reply<CompositionStatus>> = Vec::new();

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };
                handle(&mut composition, command, &mut waiters);
            }
            settled = composition.next_event(), if composition.has_pending() => {
                if let Some(settled) = settled {
                    debug!(
                        identifier = %settled.identifier,
                        status = ?settled.status,
                        "Instance settled"
                    );
                }
            }
        }

        if !waiters.is_empty() && !composition.has_pending() {
            let status = composition.status();
            for waiter in waiters.drain(..) {
                let _ = waiter.send(status.clone());
            }
        }
    }

    if composition.has_pending() {
        error!(
            in_flight = composition.registry().in_flight(),
            "Composition stopped with fetches outstanding"
        );
    }
    info!("Composition stopped");
}

fn handle(composition: &mut Composition, command: Command, waiters: &mut Vec<Reply<CompositionStatus>>) {
    match command {
        Command::SetWidgets(widgets, reply) => {
            let _ = reply.send(composition.set_widgets(&widgets));
        }
        Command::Activate(identifier, reply) => {
            let _ = reply.send(composition.activate(&identifier));
        }
        Command::EditSetting {
            identifier,
            path,
            value,
            reply,
        } => {
            let _ = reply.send(composition.edit_setting(&identifier, &path, &value));
        }
        Command::Status(reply) => {
            let _ = reply.send(composition.status());
        }
        Command::Preview(reply) => {
            let _ = reply.send(composition.render_preview());
        }
        Command::Export(reply) => {
            let _ = reply.send(composition.export());
        }
        Command::Settle(reply) => waiters.push(reply),
    }
}
