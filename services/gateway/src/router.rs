use crate::handlers::{checkins, healthz, interests, matches, reconnect, sweep};
use crate::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/interests", post(interests::create_interest))
        .route("/matches", get(matches::list_matches))
        .route("/matches/{id}", get(matches::get_match))
        .route("/matches/{id}/messages", post(matches::send_message))
        .route("/matches/{id}/contact", post(matches::share_contact))
        .route(
            "/matches/{id}/reconnect",
            post(reconnect::request_reconnect).delete(reconnect::cancel_reconnect),
        )
        .route("/matches/{id}/reconnect/retry", post(reconnect::retry_reconnect));

    let internal_routes = Router::new()
        .route(
            "/checkins/{user_id}",
            put(checkins::check_in).delete(checkins::check_out),
        )
        .route("/sweep", post(sweep::run_sweep));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", api_routes)
        .nest("/internal", internal_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
