//! HTTP request handlers.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::state::AppState;

/// Prometheus text exposition format 0.0.4.
pub(crate) const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

// ============================================================
// Health
// ============================================================

pub(crate) async fn handle_health() -> &'static str {
    "ok"
}

// ============================================================
// Metrics
// ============================================================

/// Runs one collection cycle and serves the exposition.
///
/// The cycle does blocking file I/O and may wait on the state lock, so it
/// runs on the blocking pool. A failed cycle is a 500, never stale text.
pub(crate) async fn handle_metrics(state: AppState) -> Response {
    let collector = state.0.clone();
    match tokio::task::spawn_blocking(move || collector.scrape()).await {
        Ok(Ok(text)) => ([(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)], text).into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "collection cycle failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => {
            error!(error = %e, "collection task aborted");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
