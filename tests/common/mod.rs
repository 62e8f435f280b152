//! Shared utilities for integration tests.
//!
//! Every mock binds an ephemeral port and returns its address.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path as UrlPath, RawQuery, State,
    },
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use supervised_gateway::config::GatewayConfig;
use supervised_gateway::download::{ContentStore, DownloadManager};
use supervised_gateway::http::GatewayServer;
use supervised_gateway::lifecycle::Shutdown;
use supervised_gateway::net::connection::SessionTracker;

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Backend echoing the request body with method, path and query in headers.
pub async fn start_echo_backend() -> SocketAddr {
    async fn echo(method: Method, uri: Uri, body: Bytes) -> Response {
        (
            [
                ("content-type", "application/octet-stream".to_string()),
                ("x-echo-method", method.to_string()),
                ("x-echo-path", uri.path().to_string()),
                ("x-echo-query", uri.query().unwrap_or("").to_string()),
            ],
            body,
        )
            .into_response()
    }
    serve(Router::new().fallback(echo)).await
}

/// Backend answering every connection with a fixed body and no content type.
pub async fn start_bare_backend(body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await;
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

/// Backend answering every request with the given status.
pub async fn start_status_backend(status: StatusCode) -> SocketAddr {
    serve(Router::new().fallback(move || async move { (status, "not yet") })).await
}

/// WebSocket backend echoing every frame. Records the query of each upgrade.
pub async fn start_ws_echo_backend() -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
    let queries = Arc::new(Mutex::new(Vec::new()));

    async fn handler(
        State(queries): State<Arc<Mutex<Vec<String>>>>,
        RawQuery(query): RawQuery,
        upgrade: WebSocketUpgrade,
    ) -> Response {
        queries.lock().unwrap().push(query.unwrap_or_default());
        upgrade.on_upgrade(|mut socket: WebSocket| async move {
            while let Some(Ok(message)) = socket.recv().await {
                if matches!(message, Message::Close(_)) {
                    break;
                }
                if socket.send(message).await.is_err() {
                    break;
                }
            }
        })
    }

    let router = Router::new()
        .route("/ws", get(handler))
        .with_state(queries.clone());
    (serve(router).await, queries)
}

/// WebSocket backend that never sends. Reports on the channel once its peer is gone.
pub async fn start_silent_ws_backend() -> (SocketAddr, mpsc::UnboundedReceiver<()>) {
    let (tx, rx) = mpsc::unbounded_channel();

    async fn handler(State(tx): State<mpsc::UnboundedSender<()>>, upgrade: WebSocketUpgrade) -> Response {
        upgrade.on_upgrade(move |mut socket: WebSocket| async move {
            loop {
                match socket.recv().await {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                }
            }
            let _ = tx.send(());
        })
    }

    let router = Router::new().route("/ws", get(handler)).with_state(tx);
    (serve(router).await, rx)
}

/// File server: `/files/{name}` returns `content`, anything else 404. Counts hits.
pub async fn start_file_server(content: &'static [u8]) -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));

    async fn file(
        State((hits, content)): State<(Arc<AtomicUsize>, &'static [u8])>,
        UrlPath(_name): UrlPath<String>,
    ) -> Response {
        hits.fetch_add(1, Ordering::SeqCst);
        content.into_response()
    }

    async fn missing(State((hits, _)): State<(Arc<AtomicUsize>, &'static [u8])>) -> StatusCode {
        hits.fetch_add(1, Ordering::SeqCst);
        StatusCode::NOT_FOUND
    }

    let router = Router::new()
        .route("/files/{name}", get(file))
        .fallback(missing)
        .with_state((hits.clone(), content));
    (serve(router).await, hits)
}

/// Server promising a 10-byte body but sending only 5 bytes. Afterwards it
/// stalls, or closes the connection when `close_early` is set.
pub async fn start_truncating_server(close_early: bool) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await;
                let head = "HTTP/1.1 200 OK\r\nContent-Length: 10\r\nContent-Type: application/octet-stream\r\n\r\n01234";
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.flush().await;
                if close_early {
                    let _ = socket.shutdown().await;
                } else {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
            });
        }
    });
    addr
}

/// Config pointing at `backend` with storage under `root`.
pub fn gateway_config(backend: SocketAddr, root: &Path) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.backend.host = backend.ip().to_string();
    config.backend.port = backend.port();
    config.storage.root = root.to_path_buf();
    config.proxy.request_timeout_secs = 5;
    config.proxy.connect_timeout_secs = 2;
    config.downloads.connect_timeout_secs = 2;
    config.downloads.read_timeout_secs = 5;
    config
}

/// A running gateway server, without a supervised process.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub sessions: SessionTracker,
    pub shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

/// Serve `config`. `backend` is `None` for download-only mode.
pub async fn start_gateway(config: &GatewayConfig, backend: Option<SocketAddr>) -> TestGateway {
    let store = ContentStore::new(&config.storage.root);
    let downloads = DownloadManager::new(store, &config.downloads).unwrap();
    let server = GatewayServer::new(config, backend, downloads);
    let sessions = server.sessions();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestGateway {
        addr,
        sessions,
        shutdown,
    }
}

/// Client that never pools, so each test sees fresh connections.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
