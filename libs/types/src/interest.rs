//! Interest facts
//!
//! A one-directional "from is interested in to at venue" signal. Keyed by
//! `(from, to, venue)`, written once, never updated.

use serde::{Deserialize, Serialize};

use crate::ids::{UserId, VenueId};

/// Ledger key for an interest fact
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InterestKey {
    pub from: UserId,
    pub to: UserId,
    pub venue_id: VenueId,
}

impl InterestKey {
    pub fn new(from: UserId, to: UserId, venue_id: VenueId) -> Self {
        Self { from, to, venue_id }
    }

    /// The key the other user would write to reciprocate.
    pub fn mirror(&self) -> Self {
        Self {
            from: self.to.clone(),
            to: self.from.clone(),
            venue_id: self.venue_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interest {
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub venue_id: VenueId,
    pub created_at: i64,
}

impl Interest {
    pub fn new(from: UserId, to: UserId, venue_id: VenueId, created_at: i64) -> Self {
        Self {
            from_user_id: from,
            to_user_id: to,
            venue_id,
            created_at,
        }
    }

    pub fn key(&self) -> InterestKey {
        InterestKey::new(
            self.from_user_id.clone(),
            self.to_user_id.clone(),
            self.venue_id.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_key() {
        let key = InterestKey::new("alice".into(), "bob".into(), "v1".into());
        let mirror = key.mirror();
        assert_eq!(mirror.from, UserId::new("bob"));
        assert_eq!(mirror.to, UserId::new("alice"));
        assert_eq!(mirror.venue_id, key.venue_id);
        assert_eq!(mirror.mirror(), key);
    }
}
