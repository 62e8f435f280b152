//! Download endpoints.
//!
//! `POST /download` runs one job and maps its outcome onto a status code;
//! `POST /download/batch` always answers 200 with one report per item.

use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    Json,
};

use crate::download::{BatchReport, BatchRequest, DownloadOutcome, DownloadRequest};
use crate::http::response::ApiError;
use crate::http::server::AppState;

/// Handle `POST /download`.
pub async fn download_handler(
    State(state): State<AppState>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return ApiError::bad_request(rejection.body_text()).into_response(),
    };

    tracing::info!(url = %request.url, filename = %request.filename, subdir = ?request.subdir, "Download requested");

    match state.downloads.download_request(&request).await {
        Ok(DownloadOutcome::Failed { reason }) => ApiError::from(&reason).into_response(),
        Ok(outcome) => Json(outcome.report()).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Download rejected");
            ApiError::from(e).into_response()
        }
    }
}

/// Handle `POST /download/batch`.
pub async fn batch_handler(
    State(state): State<AppState>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Response {
    let Json(batch) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return ApiError::bad_request(rejection.body_text()).into_response(),
    };
    if batch.batch_size == Some(0) {
        return ApiError::bad_request("batch_size must be at least 1").into_response();
    }

    tracing::info!(items = batch.items.len(), mode = ?batch.mode, "Batch download requested");

    let results = state
        .downloads
        .download_batch(&batch.items, batch.mode, batch.batch_size)
        .await;
    let report = BatchReport::from_results(&results);

    tracing::info!(
        downloaded = report.summary.downloaded,
        skipped = report.summary.skipped,
        failed = report.summary.failed,
        rejected = report.summary.rejected,
        "Batch download finished"
    );
    Json(report).into_response()
}
