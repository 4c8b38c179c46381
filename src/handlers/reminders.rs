use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::error::AppResult;
use crate::services::scheduler::{self, ScanSummary};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ScanQuery {
    pub window_minutes: Option<i64>,
}

/// External cron entry point. The in-process worker runs the same scan;
/// the shared idempotency store keeps the two from double-sending.
pub async fn run_scan(
    State(state): State<AppState>,
    Query(query): Query<ScanQuery>,
) -> AppResult<Json<ScanSummary>> {
    let window = query
        .window_minutes
        .unwrap_or(state.config.reminder_window_minutes)
        .clamp(1, 120);

    let summary =
        scheduler::run_reminder_scan(&state.db, &state.dedup, &state.notifier, window).await?;
    Ok(Json(summary))
}
