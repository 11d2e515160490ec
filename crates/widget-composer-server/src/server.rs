//! Listener setup and lifecycle for the composition API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use widget_composer_common::{ComposerConfig, ComposerError, ServerConfigFile};
use widget_composer_host::ArtifactFetcher;

use crate::router::build_router;
use crate::state::AppState;

/// Resolved `[server]` settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Per-request budget enforced by the timeout layer.
    pub request_timeout: Duration,
    /// Stop on SIGINT/SIGTERM after in-flight requests finish.
    pub graceful_shutdown: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            request_timeout: Duration::from_secs(30),
            graceful_shutdown: true,
        }
    }
}

impl ServerConfig {
    /// Resolve the config-file section, parsing the bind address.
    pub fn from_file(file: &ServerConfigFile) -> Result<Self, ComposerError> {
        let bind_addr = file.bind_addr.parse().map_err(|e| {
            ComposerError::invalid_config(format!("invalid bind address '{}': {e}", file.bind_addr))
        })?;
        Ok(Self {
            bind_addr,
            request_timeout: Duration::from_secs(file.request_timeout_secs),
            graceful_shutdown: file.graceful_shutdown,
        })
    }

    #[must_use]
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }
}

/// The composition API bound to one [`AppState`].
///
/// Widgets can be composed through [`ComposerServer::state`] before
/// [`ComposerServer::run`] starts accepting requests.
pub struct ComposerServer {
    state: AppState,
    config: ServerConfig,
}

impl ComposerServer {
    /// Start the composition with an HTTP fetcher.
    pub async fn new(
        composer_config: &ComposerConfig,
        config: ServerConfig,
    ) -> Result<Self, ComposerError> {
        let state = AppState::start(composer_config).await?;
        Ok(Self { state, config })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until the listener fails or a shutdown signal arrives.
    pub async fn run(self) -> Result<(), ComposerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await.map_err(|e| {
            ComposerError::invalid_config(format!("cannot bind {}: {e}", self.config.bind_addr))
        })?;
        let app = build_router(self.state, self.config.request_timeout);
        info!(addr = %self.config.bind_addr, "Listening");

        let serve = axum::serve(listener, app);
        if self.config.graceful_shutdown {
            serve.with_graceful_shutdown(shutdown_signal()).await?;
        } else {
            serve.await?;
        }

        info!("Server stopped");
        Ok(())
    }

    /// Serve on an ephemeral loopback port with the given fetcher.
    pub async fn start_test(
        composer_config: &ComposerConfig,
        fetcher: Arc<dyn ArtifactFetcher>,
    ) -> Result<TestHandle, ComposerError> {
        let state = AppState::start_with(composer_config, fetcher).await?;
        let app = build_router(state.clone(), ServerConfig::default().request_timeout);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (stop, stopped) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = stopped.await;
                })
                .await
        });

        Ok(TestHandle {
            addr,
            state,
            stop: Some(stop),
            task,
        })
    }
}

/// A server started by [`ComposerServer::start_test`].
pub struct TestHandle {
    addr: SocketAddr,
    state: AppState,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
}

impl TestHandle {
    /// Base URL, e.g. `http://127.0.0.1:41234`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Stop accepting connections and wait for the server task.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = self.task.await {
            warn!(error = %e, "Test server task failed");
        }
    }
}

async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => info!("Interrupted, shutting down"),
        () = terminate => info!("Terminated, shutting down"),
    }
}
