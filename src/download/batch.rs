//! Batch downloads.
//!
//! Both variants apply the single-file contract to every item and return
//! results in input order. A rejected or failed item never stops its siblings.

use serde::{Deserialize, Serialize};

use crate::download::job::{DownloadRequest, ValidationError};
use crate::download::manager::{DownloadManager, DownloadOutcome, OutcomeReport};

/// How a batch is scheduled.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    /// One item after another.
    #[default]
    Sequential,
    /// Items split into partitions, one concurrent worker per partition.
    Partitioned,
}

/// Result for one batch item.
pub type ItemResult = Result<DownloadOutcome, ValidationError>;

/// A batch as received over the wire.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct BatchRequest {
    #[serde(default)]
    pub items: Vec<DownloadRequest>,
    #[serde(default)]
    pub mode: BatchMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
}

/// Per-item reports in input order plus the totals.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BatchReport {
    pub results: Vec<OutcomeReport>,
    pub summary: BatchSummary,
}

impl BatchReport {
    pub fn from_results(results: &[ItemResult]) -> Self {
        Self {
            results: results.iter().map(item_report).collect(),
            summary: BatchSummary::from_results(results),
        }
    }
}

/// Counts per outcome across a batch.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct BatchSummary {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub rejected: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[ItemResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            match result {
                Ok(DownloadOutcome::Downloaded { .. }) => summary.downloaded += 1,
                Ok(DownloadOutcome::Skipped { .. }) => summary.skipped += 1,
                Ok(DownloadOutcome::Failed { .. }) => summary.failed += 1,
                Err(_) => summary.rejected += 1,
            }
        }
        summary
    }
}

/// Serializable view of an item result.
pub fn item_report(result: &ItemResult) -> OutcomeReport {
    match result {
        Ok(outcome) => outcome.report(),
        Err(e) => OutcomeReport {
            status: "rejected",
            path: None,
            size: None,
            detail: Some(e.to_string()),
        },
    }
}

/// Split items into consecutive partitions of at most `size` items.
pub fn partition<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    items.chunks(size.max(1)).map(<[T]>::to_vec).collect()
}

impl DownloadManager {
    /// Download every item, one after another.
    pub async fn download_sequential(&self, items: &[DownloadRequest]) -> Vec<ItemResult> {
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            results.push(self.download_request(item).await);
        }
        results
    }

    /// Download items with one worker per partition of `batch_size` items.
    ///
    /// Each worker processes its partition sequentially; results are
    /// reassembled in input order.
    pub async fn download_partitioned(
        &self,
        items: &[DownloadRequest],
        batch_size: usize,
    ) -> Vec<ItemResult> {
        let partitions = partition(items, batch_size);
        tracing::info!(items = items.len(), workers = partitions.len(), "Starting partitioned batch");

        let workers: Vec<_> = partitions
            .into_iter()
            .map(|part| {
                let manager = self.clone();
                let len = part.len();
                (len, tokio::spawn(async move { manager.download_sequential(&part).await }))
            })
            .collect();

        let mut results = Vec::with_capacity(items.len());
        for (len, worker) in workers {
            match worker.await {
                Ok(part_results) => results.extend(part_results),
                Err(e) => {
                    tracing::error!(error = %e, "Download worker aborted");
                    results.extend((0..len).map(|_| {
                        Ok(DownloadOutcome::Failed {
                            reason: std::io::Error::new(
                                std::io::ErrorKind::Other,
                                format!("download worker aborted: {}", e),
                            )
                            .into(),
                        })
                    }));
                }
            }
        }
        results
    }

    /// Run a batch in the requested mode.
    pub async fn download_batch(
        &self,
        items: &[DownloadRequest],
        mode: BatchMode,
        batch_size: Option<usize>,
    ) -> Vec<ItemResult> {
        match mode {
            BatchMode::Sequential => self.download_sequential(items).await,
            BatchMode::Partitioned => {
                self.download_partitioned(items, batch_size.unwrap_or(self.batch_size()))
                    .await
            }
        }
    }
}
