//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Prepare the directory layout and start the backend
//! - Bind the listener only once the backend is ready
//! - Stop the backend on every exit path
//!
//! # Order
//! ```text
//! validate → layout → spawn backend → readiness gate → bind → serve
//!                                          │                    │
//!                                          └─ Err: never bound  └─ shutdown | backend exit | server error
//!                                                                      → drain → stop backend
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - A backend that exits while serving ends the service
//! - Download-only mode skips the backend entirely

use std::io;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::config::{validate_config, ConfigError, GatewayConfig};
use crate::download::{ContentStore, DownloadManager};
use crate::http::GatewayServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::supervisor::{Supervisor, SupervisorError};

/// How long the server gets to finish in-flight requests after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// How long bridge sessions get to wind down once the backend is gone.
const SESSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Why the service stopped abnormally.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("backend startup failed: {0}")]
    Startup(#[from] SupervisorError),

    #[error("failed to prepare content store: {0}")]
    Storage(#[source] io::Error),

    #[error("failed to build download client: {0}")]
    DownloadClient(#[from] reqwest::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] io::Error),

    #[error("backend exited unexpectedly: {0}")]
    BackendExited(String),
}

/// Run the gateway until `shutdown` fires or something fatal happens.
pub async fn run(config: GatewayConfig, shutdown: Shutdown) -> Result<(), ServiceError> {
    validate_config(&config).map_err(|errors| ServiceError::Config(ConfigError::Validation(errors)))?;
    let mut shutdown_rx = shutdown.subscribe();

    let store = ContentStore::new(&config.storage.root);
    let downloads = DownloadManager::new(store.clone(), &config.downloads)?;

    let mut supervisor = if config.backend.enabled {
        Some(Supervisor::new(config.backend.clone(), config.storage.clone()))
    } else {
        tracing::info!("Backend disabled, running in download-only mode");
        store
            .bootstrap(&config.storage.linked_folders)
            .await
            .map_err(ServiceError::Storage)?;
        None
    };

    let backend_addr = match supervisor.as_mut() {
        Some(supervisor) => {
            supervisor.prepare_layout().await?;

            let started = tokio::select! {
                result = supervisor.start() => Some(result),
                _ = shutdown_rx.recv() => None,
            };
            match started {
                Some(Ok(())) => Some(supervisor.backend_addr()?),
                Some(Err(e)) => return Err(ServiceError::Startup(e)),
                None => {
                    tracing::info!("Shutdown requested during startup");
                    supervisor.stop().await;
                    return Ok(());
                }
            }
        }
        None => None,
    };

    let listener = match TcpListener::bind(&config.listener.bind_address).await {
        Ok(listener) => listener,
        Err(source) => {
            stop_backend(&mut supervisor).await;
            return Err(ServiceError::Bind {
                addr: config.listener.bind_address.clone(),
                source,
            });
        }
    };

    let server = GatewayServer::new(&config, backend_addr, downloads);
    let sessions = server.sessions();
    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));
    let mut server_done = false;

    let outcome = tokio::select! {
        _ = shutdown_rx.recv() => {
            tracing::info!("Shutting down");
            Ok(())
        }
        status = backend_exit(&mut supervisor) => {
            tracing::error!(status = %status, "Backend process exited, shutting down");
            Err(ServiceError::BackendExited(status))
        }
        joined = &mut server_task => {
            server_done = true;
            match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(ServiceError::Serve(e)),
                Err(e) => Err(ServiceError::Serve(io::Error::other(e))),
            }
        }
    };

    shutdown.trigger();
    if !server_done {
        match tokio::time::timeout(DRAIN_TIMEOUT, &mut server_task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => tracing::warn!(error = %e, "Server error while draining"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Server task failed while draining"),
            Err(_) => {
                tracing::warn!(timeout_secs = DRAIN_TIMEOUT.as_secs(), "Drain timed out, aborting server");
                server_task.abort();
            }
        }
    }

    stop_backend(&mut supervisor).await;

    if !sessions.wait_idle(SESSION_DRAIN_TIMEOUT).await {
        tracing::warn!(active = sessions.active_count(), "Bridge sessions still open at exit");
    }

    tracing::info!("Gateway stopped");
    outcome
}

async fn backend_exit(supervisor: &mut Option<Supervisor>) -> String {
    match supervisor.as_mut() {
        Some(supervisor) => match supervisor.wait_exit().await {
            Ok(status) => status.to_string(),
            Err(e) => format!("wait failed: {}", e),
        },
        None => std::future::pending().await,
    }
}

async fn stop_backend(supervisor: &mut Option<Supervisor>) {
    if let Some(supervisor) = supervisor.as_mut() {
        supervisor.stop().await;
    }
}
