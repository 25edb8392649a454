use crate::auth::AuthKeys;
use crate::config::Config;
use crate::error::AppError;
use match_engine::repository::{
    InMemoryCheckIns, InMemoryCounterStore, InMemoryInterestRepository, InMemoryMatchRepository,
};
use match_engine::{
    ExpirySweep, FixedWindowLimiter, InterestLedger, Limit, MatchStore, RateLimitGate,
    ReconnectCoordinator,
};
use std::sync::Arc;
use types::clock::Clock;
use types::errors::{Action, EngineError};

pub type Store = MatchStore<InMemoryMatchRepository>;
pub type Ledger = InterestLedger<InMemoryInterestRepository, InMemoryMatchRepository>;
pub type Sweep = ExpirySweep<InMemoryMatchRepository>;
pub type Coordinator = ReconnectCoordinator<InMemoryMatchRepository, Arc<InMemoryCheckIns>>;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub ledger: Arc<Ledger>,
    pub sweep: Arc<Sweep>,
    pub reconnect: Arc<Coordinator>,
    pub check_ins: Arc<InMemoryCheckIns>,
    pub rate_limiter: Arc<dyn RateLimitGate>,
    pub auth: Arc<AuthKeys>,
}

impl AppState {
    pub fn new(config: &Config, clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(MatchStore::new(
            InMemoryMatchRepository::new(),
            clock.clone(),
            config.policy.clone(),
        ));
        let check_ins = Arc::new(InMemoryCheckIns::new());
        let like_window_ms = i64::try_from(config.like_window.as_millis()).unwrap_or(i64::MAX);
        let rate_limiter = FixedWindowLimiter::new(InMemoryCounterStore::new(), clock)
            .with_limit(Action::Like, Limit::new(config.like_limit, like_window_ms));

        Self {
            ledger: Arc::new(InterestLedger::new(
                InMemoryInterestRepository::new(),
                store.clone(),
            )),
            sweep: Arc::new(ExpirySweep::new(store.clone())),
            reconnect: Arc::new(ReconnectCoordinator::new(store.clone(), check_ins.clone())),
            store,
            check_ins,
            rate_limiter: Arc::new(rate_limiter),
            auth: Arc::new(AuthKeys::from_secret(config.auth_secret.as_bytes())),
        }
    }
}

/// Run a blocking engine call off the async runtime.
pub async fn run_blocking<T, F>(op: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, EngineError> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| AppError::InternalError(e.into()))?;
    Ok(result?)
}
