//! Supervised gateway library.
//!
//! Fronts a single local backend process: supervises it, reverse-proxies its
//! HTTP API, bridges its WebSocket stream and downloads model files into a
//! durable content store.

pub mod config;
pub mod download;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod supervisor;

pub use config::GatewayConfig;
pub use download::DownloadManager;
pub use http::GatewayServer;
pub use lifecycle::{ServiceError, Shutdown};
pub use supervisor::Supervisor;
