//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (attempts > 0, ports valid)
//! - Check addresses parse before anything binds to them
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    /// Human readable description.
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_size == 0 {
        errors.push(ValidationError::new("listener.max_body_size", "must be greater than 0"));
    }

    let backend = &config.backend;
    if backend.enabled {
        if backend.command.trim().is_empty() {
            errors.push(ValidationError::new("backend.command", "must not be empty"));
        }
        if backend.port == 0 {
            errors.push(ValidationError::new("backend.port", "must not be 0"));
        }
        if backend.socket_addr().is_none() {
            errors.push(ValidationError::new(
                "backend.host",
                format!("'{}' is not an IP address", backend.host),
            ));
        }
        if !backend.readiness_path.starts_with('/') {
            errors.push(ValidationError::new("backend.readiness_path", "must start with '/'"));
        }
        if backend.readiness_attempts == 0 {
            errors.push(ValidationError::new("backend.readiness_attempts", "must be greater than 0"));
        }
        if backend.probe_timeout_ms == 0 {
            errors.push(ValidationError::new("backend.probe_timeout_ms", "must be greater than 0"));
        }
    }

    if !config.storage.root.is_absolute() {
        errors.push(ValidationError::new(
            "storage.root",
            format!("'{}' must be an absolute path", config.storage.root.display()),
        ));
    }
    if config.storage.linked_folders.iter().any(|f| f.is_empty() || f.contains('/')) {
        errors.push(ValidationError::new(
            "storage.linked_folders",
            "entries must be single, non-empty folder names",
        ));
    }

    if config.proxy.request_timeout_secs == 0 {
        errors.push(ValidationError::new("proxy.request_timeout_secs", "must be greater than 0"));
    }
    if config.proxy.connect_timeout_secs == 0 {
        errors.push(ValidationError::new("proxy.connect_timeout_secs", "must be greater than 0"));
    }
    let ws_path = &config.proxy.websocket_path;
    if !ws_path.starts_with('/') || ws_path.len() < 2 || ws_path.starts_with("/download") {
        errors.push(ValidationError::new(
            "proxy.websocket_path",
            format!("'{}' must be an absolute path other than '/' and '/download'", ws_path),
        ));
    }

    if config.downloads.batch_size == 0 {
        errors.push(ValidationError::new("downloads.batch_size", "must be greater than 0"));
    }
    if config.downloads.connect_timeout_secs == 0 || config.downloads.read_timeout_secs == 0 {
        errors.push(ValidationError::new("downloads", "timeouts must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
