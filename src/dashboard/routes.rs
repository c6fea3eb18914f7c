//! Status API route handlers.
//!
//! All endpoints return JSON. Handlers are thin wrappers over `App`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

use crate::app::App;
use crate::archive::snapshot::SnapshotRequest;
use crate::types::ScanAck;

pub type AppState = Arc<App>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ValuationParams {
    pub symbols: Option<Vec<String>>,
    pub force_refresh: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SnapshotParams {
    pub date: Option<NaiveDate>,
    pub symbols: Option<Vec<String>>,
    pub force: bool,
    pub dry_run: bool,
}

impl From<SnapshotParams> for SnapshotRequest {
    fn from(p: SnapshotParams) -> Self {
        SnapshotRequest {
            date: p.date,
            symbols: p.symbols,
            force: p.force,
            dry_run: p.dry_run,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody { error: message.into() })).into_response()
}

fn internal_error(context: &str, e: anyhow::Error) -> Response {
    error!(error = %e, "{context}");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{context}: {e}"))
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// POST /api/scan
pub async fn trigger_scan(State(app): State<AppState>) -> Response {
    let ack = app.trigger_scan();
    let status = match ack {
        ScanAck::Accepted { .. } => StatusCode::ACCEPTED,
        ScanAck::AlreadyRunning => StatusCode::CONFLICT,
    };
    (status, Json(ack)).into_response()
}

/// GET /api/scan
pub async fn get_scan(State(app): State<AppState>) -> Response {
    Json(app.scan_view()).into_response()
}

/// POST /api/valuations
pub async fn compute_valuations(
    State(app): State<AppState>,
    Json(params): Json<ValuationParams>,
) -> Response {
    match app
        .compute_valuations(params.symbols.as_deref(), params.force_refresh)
        .await
    {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => internal_error("Valuation run failed", e),
    }
}

/// POST /api/snapshots
pub async fn create_snapshots(
    State(app): State<AppState>,
    Json(params): Json<SnapshotParams>,
) -> Response {
    match app.create_quarterly_snapshot(&params.into()).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => internal_error("Snapshot batch failed", e),
    }
}

/// GET /api/securities/:symbol/comparison
pub async fn get_comparison(
    State(app): State<AppState>,
    Path(symbol): Path<String>,
) -> Response {
    match app.compare(&symbol).await {
        Ok(Some(comparison)) => Json(comparison).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            format!("{} is not on the watch list", symbol.to_uppercase()),
        ),
        Err(e) => internal_error("Comparison failed", e),
    }
}
