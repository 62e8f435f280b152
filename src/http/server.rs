//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router for the proxy, bridge and download surfaces
//! - Wire up middleware (tracing, body limit, request ID, CORS)
//! - Serve on a bound listener until shutdown is signalled
//!
//! # Routes
//! ```text
//! POST /download          → download handler (other methods proxied)
//! POST /download/batch    → batch handler
//! GET  <bridge path>      → stream bridge (non-upgrade requests proxied)
//! ANY  / and /{*path}     → reverse proxy
//! ```
//!
//! In download-only mode the proxy and bridge routes are not mounted.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ws::WebSocketUpgrade, FromRequestParts, State},
    http::{Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, post, MethodRouter},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::download::DownloadManager;
use crate::http::download::{batch_handler, download_handler};
use crate::http::proxy::ReverseProxy;
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::http::websocket::BridgeSession;
use crate::net::connection::SessionTracker;

/// Where bridge sessions connect to.
#[derive(Debug, Clone)]
pub struct BridgeTarget {
    pub backend: SocketAddr,
    pub path: String,
    pub connect_timeout: Duration,
}

impl BridgeTarget {
    /// Backend WebSocket URL for an inbound query string.
    pub fn upstream_url(&self, query: Option<&str>) -> String {
        match query {
            Some(query) if !query.is_empty() => {
                format!("ws://{}{}?{}", self.backend, self.path, query)
            }
            _ => format!("ws://{}{}", self.backend, self.path),
        }
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub proxy: Option<ReverseProxy>,
    pub bridge: Option<BridgeTarget>,
    pub downloads: DownloadManager,
    pub sessions: SessionTracker,
}

/// HTTP front door for the gateway.
pub struct GatewayServer {
    router: Router,
    sessions: SessionTracker,
}

impl GatewayServer {
    /// Build the server. `backend` is `None` in download-only mode.
    pub fn new(config: &GatewayConfig, backend: Option<SocketAddr>, downloads: DownloadManager) -> Self {
        let sessions = SessionTracker::new();

        let proxy = backend.map(|addr| {
            ReverseProxy::new(
                addr,
                Duration::from_secs(config.proxy.request_timeout_secs),
                config.listener.max_body_size,
            )
        });
        let bridge = backend.map(|addr| BridgeTarget {
            backend: addr,
            path: config.proxy.websocket_path.clone(),
            connect_timeout: Duration::from_secs(config.proxy.connect_timeout_secs),
        });

        let state = AppState {
            proxy,
            bridge,
            downloads,
            sessions: sessions.clone(),
        };

        let router = Self::build_router(config, state);
        Self { router, sessions }
    }

    /// Live bridge sessions.
    pub fn sessions(&self) -> SessionTracker {
        self.sessions.clone()
    }

    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let proxied = state.proxy.is_some();

        let mut single: MethodRouter<AppState> = post(download_handler);
        if proxied {
            single = single.fallback(proxy_handler);
        }
        let mut downloads = Router::new()
            .route("/download", single)
            .route("/download/batch", post(batch_handler));
        if config.downloads.cors_enabled {
            downloads = downloads.layer(cors_layer());
        }

        let mut router = downloads;
        if proxied {
            router = router
                .route(&config.proxy.websocket_path, any(bridge_handler))
                .route("/", any(proxy_handler))
                .route("/{*path}", any(proxy_handler));
        }

        router.with_state(state).layer(
            ServiceBuilder::new()
                .layer(set_request_id_layer())
                .layer(TraceLayer::new_for_http())
                .layer(propagate_request_id_layer())
                .layer(RequestBodyLimitLayer::new(config.listener.max_body_size)),
        )
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    match &state.proxy {
        Some(proxy) => proxy.forward(request).await,
        None => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}

/// Upgrade to a bridge session, or proxy the request when it is not an upgrade.
async fn bridge_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let Some(target) = state.bridge.clone() else {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    };

    let (mut parts, body) = request.into_parts();
    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(upgrade) => upgrade,
        Err(_) => return proxy_handler(State(state), Request::from_parts(parts, body)).await,
    };

    let upstream_url = target.upstream_url(parts.uri.query());
    let request_id = request_id(&parts.headers).to_string();
    let guard = state.sessions.track();
    tracing::info!(
        request_id = %request_id,
        session_id = %guard.id(),
        upstream = %upstream_url,
        "WebSocket upgrade accepted"
    );

    upgrade
        .on_failed_upgrade(move |e| {
            tracing::warn!(request_id = %request_id, error = %e, "WebSocket upgrade failed");
        })
        .on_upgrade(move |socket| async move {
            BridgeSession::new(guard, upstream_url, target.connect_timeout)
                .run(socket)
                .await;
        })
}
