//! Composition host for widget-composer.
//!
//! This crate turns a list of widget identifiers into a composed page:
//!
//! - [`fetcher`]: Retrieves widget manifests from the compile service
//! - [`registry`]: Keyed store of widget instances with incremental diffing
//! - [`styles`]: The document's global style-resource namespace
//! - [`bridge`]: Converts settings snapshots into inline styles
//! - [`export`]: Compiles Ready instances into a standalone document
//! - [`composition`]: Ties the above together and runs it on its own thread
//!
//! # Lifecycle
//!
//! Each identifier moves through `Pending → Loading → Ready | Failed` and
//! leaves the registry when it leaves the desired list. Failures stay local
//! to their instance:
//!
//! 1. **Fetch**: transport, status and manifest errors.
//! 2. **Evaluate**: capability, execution and export errors from the
//!    sandbox.
//! 3. **Render**: reported inline for that instance only.

pub mod bridge;
pub mod composition;
pub mod export;
pub mod fetcher;
pub mod registry;
pub mod styles;

#[cfg(test)]
mod testing;

pub use bridge::{StyleChange, StyleMap};
pub use composition::{Composition, CompositionHandle, CompositionStatus};
pub use export::{ExportDocument, ExportEntry, StaticExporter};
pub use fetcher::{ArtifactFetcher, FileDescriptor, HttpArtifactFetcher, WidgetManifest};
pub use registry::{
    InstanceRegistry, InstanceStatus, InstanceSummary, LoadedInstance, ReconcileReport, Settled,
};
pub use styles::{DocumentStyles, StyleResource};
