//! Backend process lifecycle.

use std::io;
use std::net::SocketAddr;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};

use crate::config::{BackendConfig, StorageConfig};
use crate::download::store::ContentStore;
use crate::observability::metrics;
use crate::supervisor::layout::{prepare_layout, LinkReport};
use crate::supervisor::readiness::{ProbeResult, ReadinessProbe};

/// Errors raised while supervising the backend.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("failed to prepare directory layout: {0}")]
    Layout(#[source] io::Error),

    #[error("failed to spawn backend '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("backend failed to become ready after {attempts} attempts")]
    StartupTimeout { attempts: u32 },

    #[error("backend exited with {status}")]
    BackendExited { status: ExitStatus },

    #[error("backend is already running")]
    AlreadyRunning,

    #[error("invalid backend address '{0}'")]
    InvalidAddress(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A live backend child process.
#[derive(Debug)]
pub struct BackendProcess {
    child: Child,
    addr: SocketAddr,
    ready: bool,
    started_at: Instant,
}

impl BackendProcess {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Owns at most one backend process.
///
/// ```text
/// prepare_layout() → start() ──ready──▶ [serving] ──▶ stop()
///                       └──timeout/exit──▶ stop() ──▶ Err
/// ```
#[derive(Debug)]
pub struct Supervisor {
    config: BackendConfig,
    storage: StorageConfig,
    process: Option<BackendProcess>,
}

impl Supervisor {
    pub fn new(config: BackendConfig, storage: StorageConfig) -> Self {
        Self {
            config,
            storage,
            process: None,
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// The live process, if any.
    pub fn process(&self) -> Option<&BackendProcess> {
        self.process.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.process.as_ref().is_some_and(BackendProcess::is_ready)
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(BackendProcess::pid)
    }

    /// Loopback address the backend listens on.
    pub fn backend_addr(&self) -> Result<SocketAddr, SupervisorError> {
        self.config.socket_addr().ok_or_else(|| {
            SupervisorError::InvalidAddress(format!("{}:{}", self.config.host, self.config.port))
        })
    }

    /// Link the backend working directory into the durable store.
    pub async fn prepare_layout(&self) -> Result<Vec<LinkReport>, SupervisorError> {
        let store = ContentStore::new(&self.storage.root);
        let reports = prepare_layout(&store, &self.config.working_dir, &self.storage.linked_folders)
            .await
            .map_err(SupervisorError::Layout)?;

        tracing::info!(
            root = %self.storage.root.display(),
            working_dir = %self.config.working_dir.display(),
            folders = reports.len(),
            "Directory layout prepared"
        );
        Ok(reports)
    }

    /// Spawn the backend and block until it answers its readiness endpoint.
    ///
    /// On failure the child is stopped before the error is returned.
    pub async fn start(&mut self) -> Result<(), SupervisorError> {
        if self.process.is_some() {
            return Err(SupervisorError::AlreadyRunning);
        }

        let addr = self.backend_addr()?;
        let args = self.config.command_args();

        let mut cmd = Command::new(&self.config.command);
        cmd.args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if self.config.working_dir.is_dir() {
            cmd.current_dir(&self.config.working_dir);
        }

        let child = cmd.spawn().map_err(|source| SupervisorError::Spawn {
            command: self.config.command.clone(),
            source,
        })?;

        tracing::info!(
            pid = child.id().unwrap_or(0),
            command = %self.config.command,
            args = ?args,
            address = %addr,
            "Backend process spawned"
        );

        self.process = Some(BackendProcess {
            child,
            addr,
            ready: false,
            started_at: Instant::now(),
        });

        match self.await_ready(addr).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(error = %e, "Backend startup failed");
                self.stop().await;
                Err(e)
            }
        }
    }

    async fn await_ready(&mut self, addr: SocketAddr) -> Result<(), SupervisorError> {
        let probe = ReadinessProbe::new(
            addr,
            &self.config.readiness_path,
            Duration::from_millis(self.config.probe_timeout_ms),
        );
        let interval = Duration::from_millis(self.config.readiness_interval_ms);
        let attempts = self.config.readiness_attempts;

        for attempt in 1..=attempts {
            if let Some(process) = self.process.as_mut() {
                if let Some(status) = process.child.try_wait()? {
                    return Err(SupervisorError::BackendExited { status });
                }
            }

            match probe.probe().await {
                ProbeResult::Ready => {
                    if let Some(process) = self.process.as_mut() {
                        process.ready = true;
                        tracing::info!(
                            attempt,
                            elapsed_ms = process.uptime().as_millis() as u64,
                            uri = %probe.uri(),
                            "Backend ready"
                        );
                    }
                    metrics::record_backend_ready(true);
                    return Ok(());
                }
                ProbeResult::NotReady(reason) => {
                    tracing::debug!(attempt, attempts, reason = %reason, "Backend not ready yet");
                    if attempt < attempts {
                        tokio::time::sleep(interval).await;
                    }
                }
            }
        }

        Err(SupervisorError::StartupTimeout { attempts })
    }

    /// Resolve when the live backend exits. Pending forever when none is live.
    ///
    /// Cancel safe.
    pub async fn wait_exit(&mut self) -> io::Result<ExitStatus> {
        match self.process.as_mut() {
            Some(process) => process.child.wait().await,
            None => std::future::pending().await,
        }
    }

    /// Terminate the backend and wait for it. Does nothing when none is live.
    pub async fn stop(&mut self) {
        let Some(mut process) = self.process.take() else {
            return;
        };
        metrics::record_backend_ready(false);

        if let Ok(Some(status)) = process.child.try_wait() {
            tracing::info!(?status, "Backend process already exited");
            return;
        }

        let grace = Duration::from_secs(self.config.shutdown_grace_secs);
        if let Some(pid) = process.child.id() {
            tracing::info!(pid, "Sending SIGTERM to backend");
            terminate(&mut process.child, pid);
        }

        match tokio::time::timeout(grace, process.child.wait()).await {
            Ok(Ok(status)) => tracing::info!(?status, "Backend process exited"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Error waiting for backend to exit"),
            Err(_) => {
                tracing::warn!(grace_secs = grace.as_secs(), "Grace period exceeded, sending SIGKILL");
                if let Err(e) = process.child.kill().await {
                    tracing::warn!(error = %e, "Failed to kill backend");
                }
            }
        }
    }
}

#[cfg(unix)]
fn terminate(_child: &mut Child, pid: u32) {
    // SAFETY: pid belongs to a child we spawned and have not yet reaped.
    unsafe {
        libc::kill(pid as i32, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child, _pid: u32) {
    let _ = child.start_kill();
}
