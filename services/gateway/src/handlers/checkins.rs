//! Membership facts published by the check-in subsystem

use crate::error::AppError;
use crate::models::{CheckInResponse, VenueBody};
use crate::state::{run_blocking, AppState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use types::ids::UserId;

pub async fn check_in(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(payload): Json<VenueBody>,
) -> Result<Json<CheckInResponse>, AppError> {
    let user_id = UserId::new(user_id);
    let venue = payload.into_venue();
    tracing::info!(user = %user_id, venue_id = %venue.id, "check-in published");
    state.check_ins.check_in(user_id.clone(), venue);

    // held reconnects may now be co-located
    let coordinator = state.reconnect.clone();
    let reconnected = run_blocking(move || coordinator.resolve_pending_for(&user_id)).await?;

    Ok(Json(CheckInResponse { reconnected }))
}

pub async fn check_out(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> StatusCode {
    let user_id = UserId::new(user_id);
    if state.check_ins.check_out(&user_id).is_some() {
        tracing::info!(user = %user_id, "check-out published");
    }
    StatusCode::NO_CONTENT
}
