use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::handlers::parse_match_id;
use crate::models::CancelReconnectResponse;
use crate::state::{run_blocking, AppState};
use axum::{
    extract::{Path, State},
    Json,
};
use match_engine::ReconnectOutcome;
use types::errors::Action;

pub async fn request_reconnect(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(match_id): Path<String>,
) -> Result<Json<ReconnectOutcome>, AppError> {
    let match_id = parse_match_id(&match_id)?;
    let limiter = state.rate_limiter.clone();
    let coordinator = state.reconnect.clone();

    let outcome = run_blocking(move || {
        limiter.check(&user.user_id, Action::Reconnect)?;
        coordinator.request_reconnect(&match_id, &user.user_id)
    })
    .await?;

    Ok(Json(outcome))
}

pub async fn retry_reconnect(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(match_id): Path<String>,
) -> Result<Json<ReconnectOutcome>, AppError> {
    let match_id = parse_match_id(&match_id)?;
    let limiter = state.rate_limiter.clone();
    let coordinator = state.reconnect.clone();

    let outcome = run_blocking(move || {
        limiter.check(&user.user_id, Action::Reconnect)?;
        coordinator.retry_reconnect(&match_id, &user.user_id)
    })
    .await?;

    Ok(Json(outcome))
}

pub async fn cancel_reconnect(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(match_id): Path<String>,
) -> Result<Json<CancelReconnectResponse>, AppError> {
    let match_id = parse_match_id(&match_id)?;
    let coordinator = state.reconnect.clone();

    let cancelled = run_blocking(move || {
        coordinator.cancel_reconnect_request(&match_id, &user.user_id)
    })
    .await?;

    Ok(Json(CancelReconnectResponse { cancelled }))
}
