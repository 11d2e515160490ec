//! The instance registry.
//!
//! This module provides [`InstanceRegistry`], an arena of widget instances
//! keyed by identifier. Reconciling a desired list adds missing instances
//! and removes stale ones; each added instance starts one fetch, and its
//! completion is settled on the registry's own turn.
//!
//! Every entry carries a load ticket. A completion whose ticket no longer
//! matches a live entry belongs to an instance that was removed (and maybe
//! re-added) while its fetch was outstanding, and is discarded.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::fetcher::{ArtifactFetcher, WidgetManifest};
use crate::styles::DocumentStyles;
use widget_composer_common::LoadError;
use widget_composer_core::{ModuleEvaluator, SettingsObject, WidgetComponent};

/// Lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// Created, pipeline not yet started.
    Pending,
    /// Fetch outstanding.
    Loading,
    /// Component evaluated and renderable.
    Ready,
    /// The pipeline failed; the error is kept until removal.
    Failed,
}

impl InstanceStatus {
    /// Returns `true` once the pipeline has finished.
    pub fn is_settled(self) -> bool {
        matches!(self, InstanceStatus::Ready | InstanceStatus::Failed)
    }
}

/// One widget instance owned by the registry.
pub struct LoadedInstance {
    identifier: String,
    status: InstanceStatus,
    ticket: u64,
    component: Option<WidgetComponent>,
    error: Option<LoadError>,
    module_text: Option<String>,
    style_text: Option<String>,
    settings: Option<SettingsObject>,
    settings_error: Option<LoadError>,
}

impl LoadedInstance {
    fn new(identifier: &str, ticket: u64) -> Self {
        Self {
            identifier: identifier.to_string(),
            status: InstanceStatus::Pending,
            ticket,
            component: None,
            error: None,
            module_text: None,
            style_text: None,
            settings: None,
            settings_error: None,
        }
    }

    /// Widget identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Current lifecycle state.
    pub fn status(&self) -> InstanceStatus {
        self.status
    }

    /// The component, when Ready.
    pub fn component(&self) -> Option<&WidgetComponent> {
        self.component.as_ref()
    }

    /// The pipeline failure, when Failed.
    pub fn error(&self) -> Option<&LoadError> {
        self.error.as_ref()
    }

    /// Message of the pipeline failure, when Failed.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    /// Module text retained for export.
    pub fn module_text(&self) -> Option<&str> {
        self.module_text.as_deref()
    }

    /// Stylesheet text retained for export.
    pub fn style_text(&self) -> Option<&str> {
        self.style_text.as_deref()
    }

    /// The widget's settings tree, if it has one.
    pub fn settings(&self) -> Option<&SettingsObject> {
        self.settings.as_ref()
    }

    /// The widget's settings tree, mutably.
    pub fn settings_mut(&mut self) -> Option<&mut SettingsObject> {
        self.settings.as_mut()
    }

    /// Why the settings module failed to load, if it did.
    pub fn settings_error(&self) -> Option<&LoadError> {
        self.settings_error.as_ref()
    }

    /// Serializable summary of this instance.
    pub fn summary(&self) -> InstanceSummary {
        InstanceSummary {
            identifier: self.identifier.clone(),
            status: self.status,
            error: self.error_message(),
            has_settings: self.settings.is_some(),
            settings_error: self.settings_error.as_ref().map(ToString::to_string),
        }
    }
}

impl std::fmt::Debug for LoadedInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedInstance")
            .field("identifier", &self.identifier)
            .field("status", &self.status)
            .field("ticket", &self.ticket)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Serializable view of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceSummary {
    /// Widget identifier.
    pub identifier: String,
    /// Lifecycle state.
    pub status: InstanceStatus,
    /// Failure message, when Failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether a settings tree is loaded.
    pub has_settings: bool,
    /// Settings load failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings_error: Option<String>,
}

/// Identifiers touched by one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Identifiers that entered the registry and started loading.
    pub added: Vec<String>,
    /// Identifiers that were removed.
    pub removed: Vec<String>,
}

/// A completion that changed an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled {
    /// Widget identifier.
    pub identifier: String,
    /// The state the instance settled in.
    pub status: InstanceStatus,
}

/// Result of one fetch task.
struct Completion {
    identifier: String,
    ticket: u64,
    result: Result<WidgetManifest, LoadError>,
}

/// Keyed store of widget instances.
pub struct InstanceRegistry {
    fetcher: Arc<dyn ArtifactFetcher>,
    evaluator: ModuleEvaluator,
    styles: DocumentStyles,
    default_settings_object: String,
    entries: HashMap<String, LoadedInstance>,
    /// Identifiers in desired-list order.
    order: Vec<String>,
    in_flight: JoinSet<Completion>,
    next_ticket: u64,
}

impl InstanceRegistry {
    /// Create an empty registry.
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Source of widget manifests
    /// * `evaluator` - Sandboxed module evaluator
    /// * `styles` - Style-resource namespace of the composed document
    /// * `default_settings_object` - Settings export name used when a
    ///   manifest names none
    pub fn new(
        fetcher: Arc<dyn ArtifactFetcher>,
        evaluator: ModuleEvaluator,
        styles: DocumentStyles,
        default_settings_object: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            evaluator,
            styles,
            default_settings_object: default_settings_object.into(),
            entries: HashMap::new(),
            order: Vec::new(),
            in_flight: JoinSet::new(),
            next_ticket: 0,
        }
    }

    /// Reconcile the registry against a desired identifier list.
    ///
    /// Stale identifiers are removed in one batch, revoking their style
    /// resources. New identifiers each start an independent fetch. Known
    /// identifiers are left untouched whatever their state, so a Failed
    /// instance is only retried by removing and re-adding it. Duplicate
    /// identifiers in `desired` count once.
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(skip(self, desired), fields(desired = desired.len()))]
    pub fn reconcile(&mut self, desired: &[String]) -> ReconcileReport {
        let mut seen = HashSet::new();
        let desired: Vec<String> = desired
            .iter()
            .filter(|identifier| seen.insert(identifier.as_str()))
            .cloned()
            .collect();

        let mut report = ReconcileReport::default();

        let stale: Vec<String> = self
            .order
            .iter()
            .filter(|identifier| !seen.contains(identifier.as_str()))
            .cloned()
            .collect();
        for identifier in stale {
            self.entries.remove(&identifier);
            self.styles.revoke(&identifier);
            debug!(identifier = %identifier, "Instance removed");
            report.removed.push(identifier);
        }

        for identifier in &desired {
            if self.entries.contains_key(identifier) {
                continue;
            }
            self.next_ticket += 1;
            let ticket = self.next_ticket;
            self.entries
                .insert(identifier.clone(), LoadedInstance::new(identifier, ticket));
            self.start_pipeline(identifier, ticket);
            report.added.push(identifier.clone());
        }

        self.order = desired;

        if !report.added.is_empty() || !report.removed.is_empty() {
            info!(
                added = report.added.len(),
                removed = report.removed.len(),
                in_flight = self.in_flight.len(),
                "Registry reconciled"
            );
        }
        report
    }

    /// Start the fetch of a Pending instance and mark it Loading.
    fn start_pipeline(&mut self, identifier: &str, ticket: u64) {
        let fetcher = Arc::clone(&self.fetcher);
        let task_identifier = identifier.to_string();
        self.in_flight.spawn(async move {
            let fetch_identifier = task_identifier.clone();
            let fetch = tokio::spawn(async move { fetcher.fetch(&fetch_identifier).await });
            let result = match fetch.await {
                Ok(result) => result,
                Err(e) => Err(LoadError::fetch(
                    &task_identifier,
                    format!("fetch task failed: {e}"),
                )),
            };
            Completion {
                identifier: task_identifier,
                ticket,
                result,
            }
        });

        if let Some(entry) = self.entries.get_mut(identifier) {
            entry.status = InstanceStatus::Loading;
        }
        debug!(identifier, ticket, "Fetch started");
    }

    /// Wait for the next completion and settle it.
    ///
    /// Completions for removed instances are discarded without effect.
    /// Returns `None` once no fetch is outstanding.
    pub async fn next_completion(&mut self) -> Option<Settled> {
        loop {
            let completion = match self.in_flight.join_next().await? {
                Ok(completion) => completion,
                Err(e) => {
                    error!(error = %e, "Fetch task aborted");
                    continue;
                }
            };
            if let Some(settled) = self.settle(completion) {
                return Some(settled);
            }
        }
    }

    /// Settle every outstanding fetch.
    pub async fn wait_idle(&mut self) -> Vec<Settled> {
        let mut settled = Vec::new();
        while let Some(next) = self.next_completion().await {
            settled.push(next);
        }
        settled
    }

    /// Apply a completion to its instance, evaluating the module on
    /// success.
    fn settle(&mut self, completion: Completion) -> Option<Settled> {
        let Completion {
            identifier,
            ticket,
            result,
        } = completion;

        let Some(entry) = self.entries.get_mut(&identifier) else {
            debug!(identifier = %identifier, "Discarding completion for removed instance");
            return None;
        };
        if entry.ticket != ticket {
            debug!(
                identifier = %identifier,
                ticket,
                current = entry.ticket,
                "Discarding stale completion"
            );
            return None;
        }

        let start = Instant::now();
        let outcome = result.and_then(|manifest| {
            self.evaluator
                .evaluate_widget(&identifier, &manifest.module_text)
                .map(|component| (manifest, component))
        });

        match outcome {
            Ok((manifest, component)) => {
                if let Some(style) = &manifest.style_text {
                    self.styles.inject(&identifier, style);
                }

                let (settings, settings_error) = match &manifest.settings_module_text {
                    Some(text) => {
                        let name = manifest
                            .settings_object_name
                            .as_deref()
                            .unwrap_or(&self.default_settings_object);
                        match self.evaluator.evaluate_settings(&identifier, text, name) {
                            Ok(settings) => (Some(settings), None),
                            Err(e) => {
                                warn!(identifier = %identifier, error = %e, "Settings failed to load");
                                (None, Some(e))
                            }
                        }
                    }
                    None => (None, None),
                };

                entry.status = InstanceStatus::Ready;
                entry.component = Some(component);
                entry.error = None;
                entry.module_text = Some(manifest.module_text);
                entry.style_text = manifest.style_text;
                entry.settings = settings;
                entry.settings_error = settings_error;

                info!(
                    identifier = %identifier,
                    duration_ms = start.elapsed().as_millis(),
                    "Instance ready"
                );
            }
            Err(e) => {
                warn!(identifier = %identifier, kind = e.kind(), error = %e, "Instance failed");
                entry.status = InstanceStatus::Failed;
                entry.component = None;
                entry.error = Some(e);
            }
        }

        Some(Settled {
            identifier,
            status: entry.status,
        })
    }

    /// Look up an instance.
    pub fn get(&self, identifier: &str) -> Option<&LoadedInstance> {
        self.entries.get(identifier)
    }

    /// Look up an instance mutably.
    pub fn get_mut(&mut self, identifier: &str) -> Option<&mut LoadedInstance> {
        self.entries.get_mut(identifier)
    }

    /// Known identifiers in desired-list order.
    pub fn identifiers(&self) -> &[String] {
        &self.order
    }

    /// Instances in desired-list order.
    pub fn instances(&self) -> impl Iterator<Item = &LoadedInstance> {
        self.order
            .iter()
            .filter_map(|identifier| self.entries.get(identifier))
    }

    /// Ready instances in desired-list order.
    pub fn ready(&self) -> impl Iterator<Item = &LoadedInstance> {
        self.instances()
            .filter(|instance| instance.status == InstanceStatus::Ready)
    }

    /// Number of instances.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the registry holds no instances.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of fetches still outstanding, including ones whose instance
    /// was removed.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// The style-resource namespace.
    pub fn styles(&self) -> &DocumentStyles {
        &self.styles
    }
}

impl std::fmt::Debug for InstanceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("identifiers", &self.order)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubFetcher, manifest};
    use widget_composer_common::SandboxConfig;
    use widget_composer_core::SandboxEngine;

    fn registry(fetcher: &Arc<StubFetcher>) -> InstanceRegistry {
        let evaluator =
            ModuleEvaluator::new(SandboxEngine::new(&SandboxConfig::default()).unwrap());
        InstanceRegistry::new(
            Arc::clone(fetcher) as Arc<dyn ArtifactFetcher>,
            evaluator,
            DocumentStyles::default(),
            "oa_settings",
        )
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn test_reconcile_adds_and_loads() {
        let fetcher = Arc::new(StubFetcher::new().with(manifest("a")).with(manifest("b")));
        let mut registry = registry(&fetcher);

        let report = registry.reconcile(&ids(&["a", "b", "a"]));
        assert_eq!(report.added, ids(&["a", "b"]));
        assert_eq!(registry.identifiers(), ids(&["a", "b"]).as_slice());
        assert_eq!(registry.get("a").unwrap().status(), InstanceStatus::Loading);

        let settled = registry.wait_idle().await;
        assert_eq!(settled.len(), 2);
        assert!(registry.instances().all(|i| i.status() == InstanceStatus::Ready));
        assert_eq!(registry.get("a").unwrap().module_text(), Some(manifest("a").module_text.as_str()));
    }

    #[tokio::test]
    async fn test_known_identifier_is_not_refetched() {
        let fetcher = Arc::new(StubFetcher::new().with(manifest("a")));
        let mut registry = registry(&fetcher);

        registry.reconcile(&ids(&["a"]));
        registry.reconcile(&ids(&["a"]));
        registry.wait_idle().await;
        registry.reconcile(&ids(&["a"]));

        assert_eq!(fetcher.calls("a"), 1);
        assert_eq!(registry.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failed_instance_is_not_retried() {
        let fetcher = Arc::new(StubFetcher::new());
        let mut registry = registry(&fetcher);

        registry.reconcile(&ids(&["missing"]));
        registry.wait_idle().await;
        let instance = registry.get("missing").unwrap();
        assert_eq!(instance.status(), InstanceStatus::Failed);
        assert!(instance.error_message().unwrap().contains("404"));

        registry.reconcile(&ids(&["missing"]));
        assert_eq!(fetcher.calls("missing"), 1);
        assert_eq!(registry.get("missing").unwrap().status(), InstanceStatus::Failed);

        registry.reconcile(&[]);
        registry.reconcile(&ids(&["missing"]));
        registry.wait_idle().await;
        assert_eq!(fetcher.calls("missing"), 2);
    }

    #[tokio::test]
    async fn test_removal_while_loading_discards_completion() {
        let fetcher = Arc::new(StubFetcher::new().with(manifest("a")).gated("a"));
        let mut registry = registry(&fetcher);

        registry.reconcile(&ids(&["a"]));
        let report = registry.reconcile(&[]);
        assert_eq!(report.removed, ids(&["a"]));

        fetcher.release("a");
        assert!(registry.next_completion().await.is_none());
        assert!(registry.is_empty());
        assert!(!registry.styles().contains("a"));
    }

    #[tokio::test]
    async fn test_completion_waits_for_fetch() {
        let fetcher = Arc::new(StubFetcher::new().with(manifest("a")).gated("a"));
        let mut registry = registry(&fetcher);
        registry.reconcile(&ids(&["a"]));

        {
            let mut next = tokio_test::task::spawn(registry.next_completion());
            tokio_test::assert_pending!(next.poll());
        }
        assert_eq!(registry.get("a").unwrap().status(), InstanceStatus::Loading);

        fetcher.release("a");
        let settled = registry.next_completion().await.unwrap();
        assert_eq!(settled.status, InstanceStatus::Ready);
    }

    #[tokio::test]
    async fn test_stale_completion_after_readd_is_discarded() {
        let fetcher = Arc::new(StubFetcher::new().with(manifest("a")).gated("a"));
        let mut registry = registry(&fetcher);

        registry.reconcile(&ids(&["a"]));
        registry.reconcile(&[]);
        registry.reconcile(&ids(&["a"]));
        assert_eq!(registry.in_flight(), 2);

        fetcher.release("a");
        fetcher.release("a");
        let settled = registry.wait_idle().await;

        assert_eq!(fetcher.calls("a"), 2);
        assert_eq!(settled.len(), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.styles().tagged().len(), 1);
    }

    #[tokio::test]
    async fn test_desired_change_converges_under_scrambled_completions() {
        let fetcher = Arc::new(
            StubFetcher::new()
                .with(manifest("a"))
                .with(manifest("c"))
                .with(manifest("d"))
                .gated("a")
                .gated("b")
                .gated("c")
                .gated("d"),
        );
        let mut registry = registry(&fetcher);

        registry.reconcile(&ids(&["a", "b", "c"]));
        let report = registry.reconcile(&ids(&["c", "b", "d"]));
        assert_eq!(report.added, ids(&["d"]));
        assert_eq!(report.removed, ids(&["a"]));
        assert_eq!(registry.in_flight(), 4);

        fetcher.release("d");
        let first = registry.next_completion().await.unwrap();
        assert_eq!(first.identifier, "d");

        fetcher.release("a");
        fetcher.release("c");
        let second = registry.next_completion().await.unwrap();
        assert_eq!(second.identifier, "c");

        fetcher.release("b");
        let rest = registry.wait_idle().await;
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].identifier, "b");

        assert_eq!(registry.identifiers(), ids(&["c", "b", "d"]).as_slice());
        assert_eq!(registry.get("c").unwrap().status(), InstanceStatus::Ready);
        assert_eq!(registry.get("b").unwrap().status(), InstanceStatus::Failed);
        assert_eq!(registry.get("d").unwrap().status(), InstanceStatus::Ready);
        assert!(registry.get("a").is_none());

        let mut tags: Vec<&str> = registry
            .styles()
            .tagged()
            .iter()
            .map(|resource| resource.tag.as_str())
            .collect();
        tags.sort_unstable();
        assert_eq!(tags, ["c", "d"]);
        assert_eq!(registry.in_flight(), 0);
        assert!(fetcher.calls("a") == 1 && fetcher.calls("d") == 1);
    }

    #[tokio::test]
    async fn test_style_injected_and_revoked() {
        let fetcher = Arc::new(StubFetcher::new().with(manifest("a")));
        let mut registry = registry(&fetcher);

        registry.reconcile(&ids(&["a"]));
        registry.wait_idle().await;
        let first = registry.styles().get("a").unwrap().generation;

        registry.reconcile(&[]);
        assert!(!registry.styles().contains("a"));

        registry.reconcile(&ids(&["a"]));
        registry.wait_idle().await;
        assert!(registry.styles().get("a").unwrap().generation > first);
    }

    #[tokio::test]
    async fn test_capability_failure_is_local() {
        let mut bad = manifest("bad");
        bad.module_text = r#"require("fs");"#.into();
        let fetcher = Arc::new(StubFetcher::new().with(manifest("good")).with(bad));
        let mut registry = registry(&fetcher);

        registry.reconcile(&ids(&["good", "bad"]));
        registry.wait_idle().await;

        let bad = registry.get("bad").unwrap();
        assert_eq!(bad.status(), InstanceStatus::Failed);
        assert_eq!(bad.error().unwrap().kind(), "capability");
        assert!(bad.component().is_none());
        assert!(!registry.styles().contains("bad"));
        assert_eq!(registry.get("good").unwrap().status(), InstanceStatus::Ready);
    }

    #[tokio::test]
    async fn test_settings_failure_keeps_instance_ready() {
        let mut with_settings = manifest("s");
        with_settings.settings_module_text = Some(r#"throw new Error("bad settings");"#.into());
        let fetcher = Arc::new(StubFetcher::new().with(with_settings));
        let mut registry = registry(&fetcher);

        registry.reconcile(&ids(&["s"]));
        registry.wait_idle().await;

        let instance = registry.get("s").unwrap();
        assert_eq!(instance.status(), InstanceStatus::Ready);
        assert!(instance.settings().is_none());
        assert_eq!(instance.settings_error().unwrap().kind(), "execution");
        assert!(instance.summary().settings_error.is_some());
    }
}
