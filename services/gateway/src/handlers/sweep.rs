use crate::error::AppError;
use crate::models::SweepQuery;
use crate::state::{run_blocking, AppState};
use axum::{
    extract::{Query, State},
    Json,
};
use match_engine::SweepSummary;

/// Manual trigger for the expiry sweep.
pub async fn run_sweep(
    State(state): State<AppState>,
    Query(query): Query<SweepQuery>,
) -> Result<Json<SweepSummary>, AppError> {
    let sweep = state.sweep.clone();
    let summary = run_blocking(move || sweep.run(query.clean)).await?;
    Ok(Json(summary))
}
