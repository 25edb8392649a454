//! Per-user action throttling ahead of the engine
//!
//! Fixed windows over a shared `CounterStore`, keyed `"{user}:{action}"`.
//! Rejected attempts still count against the window.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;
use types::clock::Clock;
use types::errors::{Action, EngineError};
use types::ids::UserId;

use crate::repository::CounterStore;

/// Gate consulted before like, message and reconnect calls
pub trait RateLimitGate: Send + Sync {
    fn check(&self, user: &UserId, action: Action) -> Result<(), EngineError>;
}

/// Allowance of `max` calls per `window_ms`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub max: u32,
    pub window_ms: i64,
}

impl Limit {
    pub fn new(max: u32, window_ms: i64) -> Self {
        Self { max, window_ms }
    }
}

pub struct FixedWindowLimiter<S> {
    counters: S,
    clock: Arc<dyn Clock>,
    limits: BTreeMap<Action, Limit>,
}

impl<S: CounterStore> FixedWindowLimiter<S> {
    /// A limiter with no limits configured lets everything through.
    pub fn new(counters: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            counters,
            clock,
            limits: BTreeMap::new(),
        }
    }

    pub fn with_limit(mut self, action: Action, limit: Limit) -> Self {
        self.limits.insert(action, limit);
        self
    }

    pub fn limit(&self, action: Action) -> Option<Limit> {
        self.limits.get(&action).copied()
    }
}

impl<S: CounterStore> RateLimitGate for FixedWindowLimiter<S> {
    fn check(&self, user: &UserId, action: Action) -> Result<(), EngineError> {
        let Some(limit) = self.limits.get(&action) else {
            return Ok(());
        };

        let key = format!("{}:{}", user, action);
        let count = self
            .counters
            .increment(&key, self.clock.now_ms(), limit.window_ms)?;

        if count > limit.max {
            warn!(user = %user, action = %action, count, max = limit.max, "rate limit exceeded");
            return Err(EngineError::RateLimited {
                user_id: user.clone(),
                action,
            });
        }
        Ok(())
    }
}

impl<T: RateLimitGate + ?Sized> RateLimitGate for Arc<T> {
    fn check(&self, user: &UserId, action: Action) -> Result<(), EngineError> {
        (**self).check(user, action)
    }
}
