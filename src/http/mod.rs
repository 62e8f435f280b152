//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, route selection)
//!     → request.rs (request ID, header preparation)
//!     → proxy.rs     (any other path: forward to the backend)
//!     → websocket.rs (bridge path: upgrade and relay frames)
//!     → download.rs  (download routes: run jobs in the content store)
//!     → response.rs (error bodies)
//!     → Send to client
//! ```

pub mod download;
pub mod proxy;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use proxy::ReverseProxy;
pub use request::X_REQUEST_ID;
pub use server::{AppState, GatewayServer};
pub use websocket::{BridgeSession, BridgeState};
