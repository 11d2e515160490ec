//! Sandboxed widget evaluation for widget-composer.
//!
//! This crate provides the code-execution side of the composer:
//! - [`SandboxEngine`]: Resource limits and sandbox creation
//! - [`CapabilitySet`]: The whitelist of module names guest code may require
//! - [`ModuleEvaluator`]: Runs widget and settings modules
//! - [`WidgetComponent`]: A loaded, renderable widget
//! - [`SettingsObject`]: A widget's typed settings tree
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    SandboxEngine                        │
//! │  (Shared, holds limits only)                            │
//! │  - Memory limit, stack size, call deadline              │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                 Sandbox (per evaluation)                │
//! │  - Own QuickJS runtime and context                      │
//! │  - Capability modules + host bridge                     │
//! │  - Captured console output                              │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!              ┌─────────────┴─────────────┐
//!              ▼                           ▼
//! ┌─────────────────────────┐ ┌─────────────────────────────┐
//! │     WidgetComponent     │ │       SettingsObject        │
//! │  - render(props)        │ │  - draw / update            │
//! │  - RenderNode tree      │ │  - get_values / set_value   │
//! └─────────────────────────┘ └─────────────────────────────┘
//! ```

pub mod capability;
pub mod component;
pub mod engine;
pub mod evaluator;
pub mod render;
pub mod sandbox;
pub mod settings;

pub use capability::{Capability, CapabilitySet};
pub use component::{ExportKind, WidgetComponent};
pub use engine::SandboxEngine;
pub use evaluator::ModuleEvaluator;
pub use render::{Element, RenderNode};
pub use sandbox::{LogEntry, LogLevel, Sandbox};
pub use settings::{
    ChangeObserver, Control, ControlPanel, LeafKind, SettingGroup, SettingLeaf, SettingNode,
    SettingsObject, SettingsTree,
};
