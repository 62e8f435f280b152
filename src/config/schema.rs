//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, body limits).
    pub listener: ListenerConfig,

    /// Supervised backend process settings.
    pub backend: BackendConfig,

    /// Durable content store layout.
    pub storage: StorageConfig,

    /// Reverse proxy and bridge settings.
    pub proxy: ProxyConfig,

    /// Download manager settings.
    pub downloads: DownloadConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,

    /// Largest inbound request body forwarded to the backend, in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            max_body_size: 64 * 1024 * 1024,
        }
    }
}

/// Supervised backend process configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Launch and front a backend. When false the gateway serves downloads only.
    pub enabled: bool,

    /// Program to execute.
    pub command: String,

    /// Arguments placed before the listen/port flags.
    pub args: Vec<String>,

    /// Feature flags appended after the listen/port flags.
    pub feature_flags: Vec<String>,

    /// Working directory of the backend; linked folders are created here.
    pub working_dir: PathBuf,

    /// Loopback host the backend listens on.
    pub host: String,

    /// Port the backend listens on.
    pub port: u16,

    /// Path probed for readiness.
    pub readiness_path: String,

    /// Delay between readiness probes in milliseconds.
    pub readiness_interval_ms: u64,

    /// Number of readiness probes before startup is declared failed.
    pub readiness_attempts: u32,

    /// Timeout for a single readiness probe in milliseconds.
    pub probe_timeout_ms: u64,

    /// Time allowed between SIGTERM and SIGKILL on shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "python".to_string(),
            args: vec!["main.py".to_string()],
            feature_flags: vec![
                "--disable-security".to_string(),
                "--preview-method".to_string(),
                "auto".to_string(),
            ],
            working_dir: PathBuf::from("/root/ComfyUI"),
            host: "127.0.0.1".to_string(),
            port: 8188,
            readiness_path: "/".to_string(),
            readiness_interval_ms: 1000,
            readiness_attempts: 60,
            probe_timeout_ms: 2000,
            shutdown_grace_secs: 10,
        }
    }
}

impl BackendConfig {
    /// Socket address of the backend, if host and port form a valid one.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        format!("{}:{}", self.host, self.port).parse().ok()
    }

    /// Full argument vector passed to the backend program.
    pub fn command_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        args.push("--listen".to_string());
        args.push(self.host.clone());
        args.push("--port".to_string());
        args.push(self.port.to_string());
        args.extend(self.feature_flags.iter().cloned());
        args
    }
}

/// Durable content store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the durable store.
    pub root: PathBuf,

    /// Top-level folders of the store linked into the backend working directory.
    pub linked_folders: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/storage"),
            linked_folders: vec![
                "models".to_string(),
                "custom_nodes".to_string(),
                "output".to_string(),
                "input".to_string(),
            ],
        }
    }
}

/// Reverse proxy and stream bridge configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Total time allowed for one forwarded request, in seconds.
    pub request_timeout_secs: u64,

    /// Time allowed to open the backend WebSocket, in seconds.
    pub connect_timeout_secs: u64,

    /// Path on which WebSocket upgrades are bridged.
    pub websocket_path: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 300,
            connect_timeout_secs: 10,
            websocket_path: "/ws".to_string(),
        }
    }
}

/// Download manager configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Longest wait for the next body chunk, in seconds.
    pub read_timeout_secs: u64,

    /// Items handled by one worker in a partitioned batch.
    pub batch_size: usize,

    /// Allow cross-origin calls to the download routes.
    pub cors_enabled: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 60,
            read_timeout_secs: 300,
            batch_size: 5,
            cors_enabled: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
