//! Match Lifecycle Engine
//!
//! Turns mutual venue-scoped interest into time-boxed matches and governs
//! them until they lapse:
//! - `ledger`: one-directional interest facts, mutual pair detection
//! - `store`: idempotent match creation, quota-checked messaging, expiry flag
//! - `sweep`: scheduled reconciliation of stale matches and message cleanup
//! - `reconnect`: mutual, co-location-gated restart of an expired pair
//!
//! **Key Invariants:**
//! - At most one live match per unordered pair
//! - A participant never exceeds the per-match message quota
//! - Expiry is derived from `created_at`; the stored flag only lags it

pub mod ledger;
pub mod rate_limit;
pub mod reconnect;
pub mod repository;
pub mod retry;
pub mod store;
pub mod sweep;

pub use ledger::{InterestLedger, InterestOutcome};
pub use rate_limit::{FixedWindowLimiter, Limit, RateLimitGate};
pub use reconnect::{ReconnectCoordinator, ReconnectOutcome};
pub use retry::RetryPolicy;
pub use store::{CreateOutcome, MatchStore};
pub use sweep::{ExpirySweep, SweepSummary};
