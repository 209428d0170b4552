//! Manager report and admin dashboard counters

use axum::{Json, extract::State};

use super::dto::{self, MetricsView, ReportRow};
use super::{ApiError, AppState, Caller};

/// Bookings and paid revenue per space
pub async fn manager_report(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<ReportRow>>, ApiError> {
    caller.elevated()?;
    Ok(Json(dto::views(state.engine.report().await)))
}

pub async fn admin_metrics(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<MetricsView>, ApiError> {
    caller.elevated()?;
    Ok(Json(state.engine.counts().await.into()))
}
