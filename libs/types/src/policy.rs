//! Engine tunables
//!
//! A single window constant drives the store, the sweep, the reconnect
//! coordinator and the client view filter.

use serde::{Deserialize, Serialize};

pub const HOUR_MS: i64 = 60 * 60 * 1000;

/// Default active window of a match (3 hours)
pub const DEFAULT_WINDOW_MS: i64 = 3 * HOUR_MS;

/// Default per-participant message cap
pub const DEFAULT_MESSAGE_QUOTA: u32 = 3;

/// Pending reconnect requests older than this are discarded (24 hours)
pub const DEFAULT_RECONNECT_REQUEST_TTL_MS: i64 = 24 * HOUR_MS;

/// Maximum message length in characters
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Lifecycle policy shared by every engine component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPolicy {
    /// How long after `created_at` a match accepts messages
    pub window_ms: i64,
    /// Messages each participant may send within one match
    pub message_quota: u32,
    /// Lifetime of a pending reconnect request
    pub reconnect_request_ttl_ms: i64,
    /// Whether reconnects need both participants at the same venue
    pub require_co_location: bool,
    /// How long after expiry message history is kept before a cleaning sweep
    /// may purge it
    pub retention_ms: i64,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_WINDOW_MS,
            message_quota: DEFAULT_MESSAGE_QUOTA,
            reconnect_request_ttl_ms: DEFAULT_RECONNECT_REQUEST_TTL_MS,
            require_co_location: true,
            retention_ms: 0,
        }
    }
}

impl MatchPolicy {
    /// Latest `created_at` that counts as stale at `now`.
    pub fn expiry_cutoff(&self, now_ms: i64) -> i64 {
        now_ms - self.window_ms
    }

    /// Latest `created_at` whose messages may be purged at `now`.
    pub fn retention_cutoff(&self, now_ms: i64) -> i64 {
        now_ms - self.window_ms - self.retention_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = MatchPolicy::default();
        assert_eq!(policy.window_ms, 10_800_000);
        assert_eq!(policy.message_quota, 3);
        assert!(policy.require_co_location);
    }

    #[test]
    fn test_cutoffs() {
        let policy = MatchPolicy {
            retention_ms: HOUR_MS,
            ..MatchPolicy::default()
        };
        let now = 100 * HOUR_MS;
        assert_eq!(policy.expiry_cutoff(now), 97 * HOUR_MS);
        assert_eq!(policy.retention_cutoff(now), 96 * HOUR_MS);
    }
}
