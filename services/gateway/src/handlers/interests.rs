use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::models::CreateInterestRequest;
use crate::state::{run_blocking, AppState};
use axum::{extract::State, Json};
use match_engine::InterestOutcome;
use types::errors::Action;

pub async fn create_interest(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateInterestRequest>,
) -> Result<Json<InterestOutcome>, AppError> {
    let limiter = state.rate_limiter.clone();
    let ledger = state.ledger.clone();

    let outcome = run_blocking(move || {
        limiter.check(&user.user_id, Action::Like)?;
        ledger.record_interest(&user.user_id, &payload.to_user_id, &payload.venue.into_venue())
    })
    .await?;

    Ok(Json(outcome))
}
