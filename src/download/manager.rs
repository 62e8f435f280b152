//! Streamed, idempotent downloads into the content store.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;

use crate::config::DownloadConfig;
use crate::download::job::{DownloadJob, DownloadRequest, ValidationError};
use crate::download::store::{ensure_dir, ContentStore};
use crate::observability::metrics;

/// Why a transfer did not complete.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("remote returned {0}")]
    Status(StatusCode),

    #[error("no data received for {0:?}")]
    Timeout(Duration),

    #[error("storage error: {0}")]
    Io(#[from] io::Error),
}

impl TransferError {
    pub fn is_timeout(&self) -> bool {
        match self {
            TransferError::Timeout(_) => true,
            TransferError::Request(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// Result of one download that passed validation.
#[derive(Debug)]
pub enum DownloadOutcome {
    /// The file was fetched and published.
    Downloaded { path: PathBuf, size: u64 },
    /// The destination already existed; nothing was fetched.
    Skipped { path: PathBuf },
    /// The transfer failed; nothing was published.
    Failed { reason: TransferError },
}

impl DownloadOutcome {
    /// Label used in responses, logs and metrics.
    pub fn status(&self) -> &'static str {
        match self {
            DownloadOutcome::Downloaded { .. } => "downloaded",
            DownloadOutcome::Skipped { .. } => "skipped",
            DownloadOutcome::Failed { .. } => "failed",
        }
    }

    pub fn report(&self) -> OutcomeReport {
        match self {
            DownloadOutcome::Downloaded { path, size } => OutcomeReport {
                status: self.status(),
                path: Some(path.display().to_string()),
                size: Some(*size),
                detail: None,
            },
            DownloadOutcome::Skipped { path } => OutcomeReport {
                status: self.status(),
                path: Some(path.display().to_string()),
                size: None,
                detail: None,
            },
            DownloadOutcome::Failed { reason } => OutcomeReport {
                status: self.status(),
                path: None,
                size: None,
                detail: Some(format!("Failed to download model: {}", reason)),
            },
        }
    }
}

/// Serializable view of an outcome.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OutcomeReport {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Downloads remote files into the content store.
///
/// Cheap to clone; clones share the HTTP connection pool.
#[derive(Debug, Clone)]
pub struct DownloadManager {
    client: reqwest::Client,
    store: ContentStore,
    read_timeout: Duration,
    batch_size: usize,
}

impl DownloadManager {
    pub fn new(store: ContentStore, config: &DownloadConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            store,
            read_timeout: Duration::from_secs(config.read_timeout_secs),
            batch_size: config.batch_size,
        })
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Validate and run a single download.
    ///
    /// Only validation problems are returned as `Err`; transfer problems are
    /// reported as [`DownloadOutcome::Failed`].
    pub async fn download(
        &self,
        url: &str,
        filename: &str,
        subdir: &str,
    ) -> Result<DownloadOutcome, ValidationError> {
        let job = DownloadJob::new(url, filename, subdir)?;
        Ok(self.run(&job).await)
    }

    /// Validate and run a wire request.
    pub async fn download_request(
        &self,
        request: &DownloadRequest,
    ) -> Result<DownloadOutcome, ValidationError> {
        let job = DownloadJob::from_request(request)?;
        Ok(self.run(&job).await)
    }

    /// Run an already validated job.
    pub async fn run(&self, job: &DownloadJob) -> DownloadOutcome {
        let outcome = self.execute(job).await;
        metrics::record_download(outcome.status());

        match &outcome {
            DownloadOutcome::Downloaded { path, size } => {
                tracing::info!(url = %job.url(), path = %path.display(), size, "Download complete");
            }
            DownloadOutcome::Skipped { path } => {
                tracing::info!(path = %path.display(), "File already exists, skipping");
            }
            DownloadOutcome::Failed { reason } => {
                tracing::error!(url = %job.url(), error = %reason, "Download failed");
            }
        }
        outcome
    }

    async fn execute(&self, job: &DownloadJob) -> DownloadOutcome {
        let dir = self.store.subdir_path(job.subdir());
        if let Err(e) = ensure_dir(&dir).await {
            return DownloadOutcome::Failed { reason: e.into() };
        }

        let destination = job.destination_in(&self.store.models_dir());
        match tokio::fs::try_exists(&destination).await {
            Ok(true) => return DownloadOutcome::Skipped { path: destination },
            Ok(false) => {}
            Err(e) => return DownloadOutcome::Failed { reason: e.into() },
        }

        match self.transfer(job, &destination).await {
            Ok((path, size)) => DownloadOutcome::Downloaded { path, size },
            Err(reason) => DownloadOutcome::Failed { reason },
        }
    }

    async fn transfer(
        &self,
        job: &DownloadJob,
        destination: &std::path::Path,
    ) -> Result<(PathBuf, u64), TransferError> {
        tracing::debug!(url = %job.url(), destination = %destination.display(), "Starting download");

        let mut response = tokio::time::timeout(
            self.read_timeout,
            self.client.get(job.url().clone()).send(),
        )
        .await
        .map_err(|_| TransferError::Timeout(self.read_timeout))??;

        if !response.status().is_success() {
            return Err(TransferError::Status(response.status()));
        }

        let mut staged = self.store.stage(destination).await?;
        let streamed: Result<(), TransferError> = async {
            loop {
                let chunk = tokio::time::timeout(self.read_timeout, response.chunk())
                    .await
                    .map_err(|_| TransferError::Timeout(self.read_timeout))??;
                match chunk {
                    Some(bytes) => staged.write(&bytes).await?,
                    None => return Ok(()),
                }
            }
        }
        .await;

        if let Err(e) = streamed {
            staged.discard().await;
            return Err(e);
        }

        Ok(staged.publish().await?)
    }
}
