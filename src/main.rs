//! Widget composer CLI entry point.
//!
//! `serve` (the default) runs the composition API; `export` composes a
//! widget list once and writes the standalone document to disk.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use widget_composer_common::ConfigFile;
use widget_composer_host::{CompositionHandle, HttpArtifactFetcher, InstanceStatus};
use widget_composer_server::{ComposerServer, ServerConfig};

#[derive(Debug, Parser)]
#[command(name = "widget-composer")]
#[command(about = "Compose independently compiled UI widgets into one page")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve {
        /// Address to bind, overriding the config file.
        #[arg(long, env = "BIND_ADDR")]
        bind: Option<SocketAddr>,
    },
    /// Compose widgets once and write the static export.
    Export {
        /// Widgets to compose, overriding the config file.
        #[arg(long, value_delimiter = ',')]
        widgets: Vec<String>,

        /// Output file.
        #[arg(long, default_value = "composition.html")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,widget_composer=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => ConfigFile::default(),
    };

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => serve(config, bind).await,
        Command::Export { widgets, out } => export(config, widgets, out).await,
    }
}

async fn serve(config: ConfigFile, bind: Option<SocketAddr>) -> anyhow::Result<()> {
    let mut server_config =
        ServerConfig::from_file(&config.server).context("Invalid [server] section")?;
    if let Some(addr) = bind {
        server_config = server_config.with_bind_addr(addr);
    }

    info!(
        bind_addr = %server_config.bind_addr,
        base_url = %config.composer.fetch.base_url,
        "Configuration loaded"
    );

    let server = ComposerServer::new(&config.composer, server_config).await?;

    if !config.widgets.is_empty() {
        let report = server
            .state()
            .composition()
            .set_widgets(config.widgets.clone())
            .await?;
        info!(widgets = report.added.len(), "Preloading widgets");
    }

    info!("Server initialized. Available endpoints:");
    info!("  GET   /health                     - Health check");
    info!("  GET   /ready                      - Readiness check");
    info!("  GET   /widgets                    - Available widgets");
    info!("  GET   /composition                - Instance statuses");
    info!("  PUT   /composition                - Set desired widgets");
    info!("  POST  /composition/:id/activate   - Activate settings panel");
    info!("  PATCH /composition/:id/settings   - Live settings edit");
    info!("  GET   /composition/preview        - Composed page");
    info!("  GET   /export                     - Static export");

    server.run().await?;

    Ok(())
}

async fn export(config: ConfigFile, widgets: Vec<String>, out: PathBuf) -> anyhow::Result<()> {
    let widgets = if widgets.is_empty() {
        config.widgets
    } else {
        widgets
    };
    anyhow::ensure!(!widgets.is_empty(), "No widgets to export");

    let fetcher = Arc::new(HttpArtifactFetcher::new(&config.composer.fetch)?);
    let composition = CompositionHandle::spawn(config.composer, fetcher).await?;

    composition.set_widgets(widgets).await?;
    let status = composition.settle().await?;
    for instance in &status.instances {
        if instance.status == InstanceStatus::Failed {
            warn!(
                identifier = %instance.identifier,
                error = instance.error.as_deref().unwrap_or_default(),
                "Widget excluded from export"
            );
        }
    }

    let document = composition.export().await?;
    tokio::fs::write(&out, &document.html)
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;

    info!(
        path = %out.display(),
        instances = document.instances.len(),
        "Export written"
    );
    Ok(())
}
