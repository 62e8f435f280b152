//! Download manager subsystem.
//!
//! # Data Flow
//! ```text
//! DownloadRequest (url, filename, subdir)
//!     → job.rs (validate: allow-listed subdir, plain filename, http(s) url)
//!     → manager.rs (exists? skip : stream to staged file)
//!     → store.rs (sync, rename into place, sync directory)
//!     → DownloadOutcome { Downloaded | Skipped | Failed }
//! ```
//!
//! # Design Decisions
//! - Validation failures are errors; transfer failures are outcome values
//! - No retries; a failed job is reported and forgotten
//! - Two concurrent first-time downloads of one filename both transfer and
//!   the last rename wins

pub mod batch;
pub mod job;
pub mod manager;
pub mod store;

pub use batch::{BatchMode, BatchReport, BatchRequest, BatchSummary, ItemResult};
pub use job::{DownloadJob, DownloadRequest, ModelDir, ValidationError};
pub use manager::{DownloadManager, DownloadOutcome, OutcomeReport, TransferError};
pub use store::ContentStore;
