use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::handlers::parse_match_id;
use crate::models::{ListMatchesQuery, SendMessageRequest, ShareContactRequest};
use crate::state::{run_blocking, AppState};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::collections::BTreeMap;
use types::errors::{Action, EngineError};
use types::matches::{Match, Message, ParticipantField, SharedContact};

pub async fn list_matches(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListMatchesQuery>,
) -> Result<Json<Vec<Match>>, AppError> {
    let store = state.store.clone();

    let matches = run_blocking(move || {
        let fields = match query.role {
            Some(field) => vec![field],
            None => ParticipantField::both().to_vec(),
        };
        // one equality query per ownership field, unioned by id
        let mut union = BTreeMap::new();
        for field in fields {
            for record in store.matches_by(field, &user.user_id)? {
                union.insert(record.id, record);
            }
        }
        let mut matches: Vec<Match> = union.into_values().collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matches)
    })
    .await?;

    Ok(Json(matches))
}

pub async fn get_match(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(match_id): Path<String>,
) -> Result<Json<Match>, AppError> {
    let match_id = parse_match_id(&match_id)?;
    let store = state.store.clone();

    let record = run_blocking(move || {
        let record = store.get_match(&match_id)?;
        if !record.is_participant(&user.user_id) {
            return Err(EngineError::NotParticipant {
                match_id,
                user_id: user.user_id,
            });
        }
        Ok(record)
    })
    .await?;

    Ok(Json(record))
}

pub async fn send_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(match_id): Path<String>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    let match_id = parse_match_id(&match_id)?;
    let limiter = state.rate_limiter.clone();
    let store = state.store.clone();

    let message = run_blocking(move || {
        limiter.check(&user.user_id, Action::Message)?;
        store.send_message(&match_id, &user.user_id, &payload.text)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn share_contact(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(match_id): Path<String>,
    Json(payload): Json<ShareContactRequest>,
) -> Result<Json<SharedContact>, AppError> {
    let match_id = parse_match_id(&match_id)?;
    let store = state.store.clone();

    let contact = run_blocking(move || {
        store.share_contact(&match_id, &user.user_id, &payload.payload)
    })
    .await?;

    Ok(Json(contact))
}
