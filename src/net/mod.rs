//! Network-level bookkeeping.
//!
//! # Data Flow
//! ```text
//! WebSocket upgrade accepted
//!     → connection.rs (session id, live-session guard)
//!     → Hand off to the stream bridge
//!     → guard dropped when both relay legs are torn down
//! ```

pub mod connection;

pub use connection::{SessionGuard, SessionId, SessionTracker};
