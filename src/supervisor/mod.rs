//! Process supervision subsystem.
//!
//! # Data Flow
//! ```text
//! Supervisor::prepare_layout()
//!     → layout.rs (bootstrap store, link working-dir folders into it)
//! Supervisor::start()
//!     → process.rs (spawn child with fixed flags)
//!     → readiness.rs (probe root endpoint every interval, bounded attempts)
//!     → ready | StartupTimeout | BackendExited
//! Supervisor::stop()
//!     → SIGTERM, grace period, SIGKILL, reap
//! ```
//!
//! # Design Decisions
//! - State lives in an owned `Supervisor`, never in globals
//! - No respawn: a crashed backend is fatal for the service
//! - At most one live child per supervisor

pub mod layout;
pub mod process;
pub mod readiness;

pub use layout::{prepare_layout, LinkAction, LinkReport};
pub use process::{BackendProcess, Supervisor, SupervisorError};
pub use readiness::{ProbeResult, ReadinessProbe};
