//! Capability-based module resolution for sandboxed code.
//!
//! This module provides the [`CapabilitySet`] struct, which defines which
//! module names a sandboxed module may `require`. The set is the entire
//! security contract of the sandbox: module text has no ambient module
//! resolution, only the capabilities granted here.

use rquickjs::{Ctx, Function, Object};

/// UI rendering library shim.
const UI_LIBRARY_JS: &str = include_str!("js/ui.js");

/// Settings-type library shim.
const SETTINGS_TYPES_JS: &str = include_str!("js/settings_types.js");

/// Host bridge evaluated into every sandbox.
const PRELUDE_JS: &str = include_str!("js/prelude.js");

/// A capability that can be granted to sandboxed code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// The UI rendering library.
    UiLibrary,
    /// Constructors of the settings-type library.
    SettingsTypes,
}

impl Capability {
    /// Module names under which this capability is resolvable.
    pub fn module_names(self) -> &'static [&'static str] {
        match self {
            Capability::UiLibrary => &["react", "react/jsx-runtime"],
            Capability::SettingsTypes => &["builder-settings-types"],
        }
    }
}

/// The set of capabilities granted to one evaluation.
///
/// By default nothing is granted; each capability must be added
/// explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    granted: Vec<Capability>,
}

impl CapabilitySet {
    /// Create a set with no capabilities.
    pub fn none() -> Self {
        Self::default()
    }

    /// Capabilities granted to widget modules.
    pub fn widget() -> Self {
        Self::none().grant(Capability::UiLibrary)
    }

    /// Capabilities granted to settings modules.
    pub fn settings() -> Self {
        Self::widget().grant(Capability::SettingsTypes)
    }

    /// Add a capability to the set.
    #[must_use]
    pub fn grant(mut self, capability: Capability) -> Self {
        if !self.granted.contains(&capability) {
            self.granted.push(capability);
        }
        self
    }

    /// Check whether a capability is granted.
    pub fn has(&self, capability: Capability) -> bool {
        self.granted.contains(&capability)
    }

    /// Check whether the given module name resolves under this set.
    pub fn is_allowed(&self, name: &str) -> bool {
        self.granted
            .iter()
            .any(|capability| capability.module_names().contains(&name))
    }

    /// All module names resolvable under this set.
    pub fn module_names(&self) -> Vec<&'static str> {
        self.granted
            .iter()
            .flat_map(|capability| capability.module_names().iter().copied())
            .collect()
    }

    /// Install the host bridge into a sandbox context.
    ///
    /// Builds the module table for the granted capabilities and evaluates
    /// the prelude with it. Returns the host object exposing `execute`,
    /// `adopt`, `describe` and `render`.
    pub(crate) fn install<'js>(
        &self,
        ctx: &Ctx<'js>,
        host_log: Function<'js>,
    ) -> rquickjs::Result<Object<'js>> {
        let modules = Object::new(ctx.clone())?;

        for capability in &self.granted {
            let library: Object<'js> = match capability {
                Capability::UiLibrary => ctx.eval(UI_LIBRARY_JS)?,
                Capability::SettingsTypes => ctx.eval(SETTINGS_TYPES_JS)?,
            };
            for name in capability.module_names() {
                modules.set(*name, library.clone())?;
            }
        }

        let prelude: Function<'js> = ctx.eval(PRELUDE_JS)?;
        prelude.call((host_log, modules))
    }
}
