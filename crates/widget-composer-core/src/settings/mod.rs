//! Typed settings trees loaded from settings modules.
//!
//! A settings module declares its tree with the settings-type library; the
//! sandbox hands the declaration back as a descriptor, which becomes a
//! [`SettingsObject`] owned entirely by the host. Values held by the tree
//! are the single source of truth for a widget's current settings:
//! [`SettingsTree::get_values`] always reports raw current values, and a
//! snapshot leaf carrying `default` is read as a current value on replay.

mod node;
mod panel;

use serde_json::Value;
use tracing::debug;

use widget_composer_common::SettingsError;

pub use node::{GroupKind, LeafKind, SettingGroup, SettingLeaf, SettingNode, parse_color};
pub use panel::{Control, ControlPanel};

pub(crate) use node::Descriptor;

/// Callback receiving the full snapshot after every live edit.
pub type ChangeObserver = Box<dyn FnMut(Value) + Send>;

/// Operations a settings tree exposes to the host.
pub trait SettingsTree {
    /// Build the control surface reflecting current values.
    fn draw(&self) -> ControlPanel;

    /// Bulk-apply a previously captured snapshot.
    ///
    /// Does not notify the change observer.
    fn set_value(&mut self, snapshot: &Value);

    /// Install the single change observer, replacing any previous one.
    fn set_on_change(&mut self, observer: ChangeObserver);

    /// Snapshot of the current values.
    fn get_values(&self) -> Value;

    /// Apply one live edit addressed by a dotted path and notify the
    /// observer with the new snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the path names no leaf or the value does not fit
    /// the leaf's kind.
    fn update(&mut self, path: &str, value: &Value) -> Result<(), SettingsError>;
}

/// The settings tree of one widget.
pub struct SettingsObject {
    identifier: String,
    name: String,
    root: SettingGroup,
    observer: Option<ChangeObserver>,
}

impl SettingsObject {
    /// Create a settings object from an already-built root group.
    pub fn new(identifier: impl Into<String>, name: impl Into<String>, root: SettingGroup) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            root,
            observer: None,
        }
    }

    /// Build a settings object from descriptor JSON.
    pub(crate) fn from_descriptor_json(
        identifier: &str,
        name: &str,
        json: &str,
    ) -> Result<Self, String> {
        let descriptor: Descriptor =
            serde_json::from_str(json).map_err(|e| format!("malformed settings object: {e}"))?;
        let root = SettingGroup::from_descriptor(descriptor)
            .ok_or_else(|| "settings object is not a group".to_string())?;
        Ok(Self::new(identifier, name, root))
    }

    /// Widget identifier this tree belongs to.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Name of the exported settings object.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The root group.
    pub fn root(&self) -> &SettingGroup {
        &self.root
    }

    /// Returns `true` if a change observer is installed.
    pub fn has_observer(&self) -> bool {
        self.observer.is_some()
    }
}

impl SettingsTree for SettingsObject {
    fn draw(&self) -> ControlPanel {
        ControlPanel::draw(&self.identifier, &self.root)
    }

    fn set_value(&mut self, snapshot: &Value) {
        let Value::Object(map) = snapshot else {
            debug!(identifier = %self.identifier, "Ignoring non-object snapshot");
            return;
        };
        let applied = self.root.replay(map, "");
        debug!(identifier = %self.identifier, applied, "Snapshot replayed");
    }

    fn set_on_change(&mut self, observer: ChangeObserver) {
        self.observer = Some(observer);
    }

    fn get_values(&self) -> Value {
        self.root.values()
    }

    fn update(&mut self, path: &str, value: &Value) -> Result<(), SettingsError> {
        let leaf = self
            .root
            .leaf_mut(path)
            .ok_or_else(|| SettingsError::UnknownPath {
                path: path.to_string(),
            })?;
        leaf.value = leaf.kind.normalize(path, value)?;

        let snapshot = self.root.values();
        if let Some(observer) = self.observer.as_mut() {
            observer(snapshot);
        }
        Ok(())
    }
}

impl std::fmt::Debug for SettingsObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsObject")
            .field("identifier", &self.identifier)
            .field("name", &self.name)
            .field("has_observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}
