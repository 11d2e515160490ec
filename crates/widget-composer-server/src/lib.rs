//! HTTP server for widget-composer.
//!
//! This crate exposes a running composition over HTTP. It handles:
//!
//! - Replacing the desired widget list and reporting instance status
//! - Activating settings panels and applying live settings edits
//! - Serving the composed preview and the static export
//! - Health and readiness checks
//!
//! # Quick Start
//!
//! ```ignore
//! use widget_composer_server::{ComposerServer, ServerConfig};
//! use widget_composer_common::ComposerConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let composer_config = ComposerConfig::default();
//!     let server_config = ServerConfig::default();
//!
//!     let server = ComposerServer::new(&composer_config, server_config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod handler;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod state;

pub use server::{ComposerServer, ServerConfig, TestHandle};
pub use state::AppState;
