//! Match lifecycle types
//!
//! A match is a time-boxed conversation between two users. It is created
//! active, becomes expired once its window lapses (terminal for messaging),
//! and may later be superseded by a brand-new match through a reconnect.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::EngineError;
use crate::ids::{MatchId, MessageId, PairKey, UserId, VenueId, VenueRef};
use crate::policy::{MatchPolicy, MAX_MESSAGE_CHARS};

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub text: String,
    pub sent_at: i64,
}

/// Contact details one participant chose to reveal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedContact {
    pub shared_by: UserId,
    pub payload: String,
    pub shared_at: i64,
}

/// Which ownership field an equality query filters on
///
/// "Matches involving me" is the union of two queries, one per field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantField {
    A,
    B,
}

impl ParticipantField {
    pub fn both() -> [ParticipantField; 2] {
        [ParticipantField::A, ParticipantField::B]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantField::A => "participantA",
            ParticipantField::B => "participantB",
        }
    }
}

/// Where a pair stands in the reconnect handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconnectPhase {
    NoRequest,
    OneRequested,
    BothRequested,
    Reconnected,
}

/// Reconnect bookkeeping embedded in the (expired) reference match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectState {
    /// Requesters and when they asked
    pub requested_by: BTreeMap<UserId, i64>,
    /// Set exactly once, when the successor match is minted
    pub reconnected_at: Option<i64>,
    /// Id of the match minted by the reconnect
    pub successor: Option<MatchId>,
}

impl ReconnectState {
    /// Drop requests older than `ttl_ms`. Returns how many were discarded.
    pub fn prune(&mut self, now_ms: i64, ttl_ms: i64) -> usize {
        let before = self.requested_by.len();
        self.requested_by
            .retain(|_, requested_at| now_ms - *requested_at <= ttl_ms);
        before - self.requested_by.len()
    }

    pub fn phase(&self) -> ReconnectPhase {
        if self.reconnected_at.is_some() {
            return ReconnectPhase::Reconnected;
        }
        match self.requested_by.len() {
            0 => ReconnectPhase::NoRequest,
            1 => ReconnectPhase::OneRequested,
            _ => ReconnectPhase::BothRequested,
        }
    }
}

/// The central match record, stored as `matches/{id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: MatchId,
    pub participant_a: UserId,
    pub participant_b: UserId,
    pub venue_id: VenueId,
    pub venue_name: String,
    /// Anchors the expiry window; set by the store clock, immutable
    pub created_at: i64,
    pub expired: bool,
    pub expired_at: Option<i64>,
    pub messages: Vec<Message>,
    /// Authoritative quota counters
    pub message_count_by_participant: BTreeMap<UserId, u32>,
    pub contact_shared: bool,
    pub contact: Option<SharedContact>,
    pub reconnect: ReconnectState,
    /// Set when a cleaning sweep purged the message history
    pub messages_purged_at: Option<i64>,
}

impl Match {
    /// Create a fresh active match with zeroed counters.
    pub fn new(u1: UserId, u2: UserId, venue: VenueRef, created_at: i64) -> Self {
        let mut counters = BTreeMap::new();
        counters.insert(u1.clone(), 0);
        counters.insert(u2.clone(), 0);
        Self {
            id: MatchId::new(),
            participant_a: u1,
            participant_b: u2,
            venue_id: venue.id,
            venue_name: venue.name,
            created_at,
            expired: false,
            expired_at: None,
            messages: Vec::new(),
            message_count_by_participant: counters,
            contact_shared: false,
            contact: None,
            reconnect: ReconnectState::default(),
            messages_purged_at: None,
        }
    }

    pub fn pair_key(&self) -> PairKey {
        PairKey::new(&self.participant_a, &self.participant_b)
    }

    pub fn venue(&self) -> VenueRef {
        VenueRef {
            id: self.venue_id.clone(),
            name: self.venue_name.clone(),
        }
    }

    /// The user stored in the given ownership field.
    pub fn participant(&self, field: ParticipantField) -> &UserId {
        match field {
            ParticipantField::A => &self.participant_a,
            ParticipantField::B => &self.participant_b,
        }
    }

    pub fn is_participant(&self, user: &UserId) -> bool {
        &self.participant_a == user || &self.participant_b == user
    }

    /// The other side of the match, if `user` is a participant.
    pub fn counterpart(&self, user: &UserId) -> Option<&UserId> {
        if &self.participant_a == user {
            Some(&self.participant_b)
        } else if &self.participant_b == user {
            Some(&self.participant_a)
        } else {
            None
        }
    }

    /// Whether the window has lapsed at `now`, independent of the flag.
    pub fn window_elapsed(&self, now_ms: i64, window_ms: i64) -> bool {
        now_ms - self.created_at > window_ms
    }

    /// Flag or clock, whichever says expired first.
    pub fn is_expired_at(&self, now_ms: i64, window_ms: i64) -> bool {
        self.expired || self.window_elapsed(now_ms, window_ms)
    }

    /// Flip the expired flag if the window has lapsed.
    ///
    /// Returns true only when this call performed the transition.
    pub fn mark_expired(&mut self, now_ms: i64, window_ms: i64) -> bool {
        if self.expired || !self.window_elapsed(now_ms, window_ms) {
            return false;
        }
        self.expired = true;
        self.expired_at = Some(now_ms);
        true
    }

    pub fn messages_sent_by(&self, user: &UserId) -> u32 {
        self.message_count_by_participant
            .get(user)
            .copied()
            .unwrap_or(0)
    }

    pub fn remaining_quota(&self, user: &UserId, quota: u32) -> u32 {
        quota.saturating_sub(self.messages_sent_by(user))
    }

    /// Quota-checked append.
    ///
    /// Checks, in order: expiry (recomputed from `created_at`), participation,
    /// text, quota. Nothing is mutated unless every check passes, apart from
    /// lazily flipping a stale `expired` flag. The stored text is trimmed.
    pub fn try_append(
        &mut self,
        sender: &UserId,
        text: &str,
        now_ms: i64,
        policy: &MatchPolicy,
    ) -> Result<Message, EngineError> {
        if self.is_expired_at(now_ms, policy.window_ms) {
            self.mark_expired(now_ms, policy.window_ms);
            return Err(EngineError::Expired { match_id: self.id });
        }
        if !self.is_participant(sender) {
            return Err(EngineError::NotParticipant {
                match_id: self.id,
                user_id: sender.clone(),
            });
        }
        let text = normalize_text(text)?;
        let sent = self.messages_sent_by(sender);
        if sent >= policy.message_quota {
            return Err(EngineError::QuotaExceeded {
                match_id: self.id,
                user_id: sender.clone(),
                limit: policy.message_quota,
            });
        }

        let message = Message {
            id: MessageId::new(),
            sender_id: sender.clone(),
            text,
            sent_at: now_ms,
        };
        self.message_count_by_participant
            .insert(sender.clone(), sent + 1);
        self.messages.push(message.clone());
        Ok(message)
    }

    /// Store (or overwrite) the shared contact payload.
    pub fn share_contact(
        &mut self,
        requester: &UserId,
        payload: String,
        now_ms: i64,
        window_ms: i64,
    ) -> Result<SharedContact, EngineError> {
        if self.is_expired_at(now_ms, window_ms) {
            self.mark_expired(now_ms, window_ms);
            return Err(EngineError::Expired { match_id: self.id });
        }
        if !self.is_participant(requester) {
            return Err(EngineError::NotParticipant {
                match_id: self.id,
                user_id: requester.clone(),
            });
        }
        let contact = SharedContact {
            shared_by: requester.clone(),
            payload,
            shared_at: now_ms,
        };
        self.contact_shared = true;
        self.contact = Some(contact.clone());
        Ok(contact)
    }

    /// Drop the message history. Counters are kept so the quota can never be
    /// replenished by a purge. Returns the number of messages removed.
    pub fn purge_messages(&mut self, now_ms: i64) -> usize {
        if self.messages_purged_at.is_some() {
            return 0;
        }
        let removed = self.messages.len();
        self.messages.clear();
        self.messages_purged_at = Some(now_ms);
        removed
    }

    /// Record the successor minted by a reconnect. Only the first call wins.
    pub fn record_reconnect(&mut self, successor: MatchId, now_ms: i64) -> bool {
        if self.reconnect.reconnected_at.is_some() {
            return false;
        }
        self.reconnect.reconnected_at = Some(now_ms);
        self.reconnect.successor = Some(successor);
        true
    }
}

fn normalize_text(text: &str) -> Result<String, EngineError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidMessage {
            reason: "message is empty".to_string(),
        });
    }
    if trimmed.chars().count() > MAX_MESSAGE_CHARS {
        return Err(EngineError::InvalidMessage {
            reason: format!("message exceeds {} characters", MAX_MESSAGE_CHARS),
        });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_708_123_456_789;

    fn alice() -> UserId {
        UserId::new("alice")
    }

    fn bob() -> UserId {
        UserId::new("bob")
    }

    fn new_match() -> Match {
        Match::new(alice(), bob(), VenueRef::new("v1", "The Anchor"), T0)
    }

    #[test]
    fn test_match_creation() {
        let m = new_match();
        assert!(!m.expired);
        assert!(m.messages.is_empty());
        assert_eq!(m.messages_sent_by(&alice()), 0);
        assert_eq!(m.messages_sent_by(&bob()), 0);
        assert_eq!(m.reconnect.phase(), ReconnectPhase::NoRequest);
        assert_eq!(m.counterpart(&alice()), Some(&bob()));
        assert_eq!(m.counterpart(&UserId::new("carol")), None);
    }

    #[test]
    fn test_window_boundary() {
        let mut m = new_match();
        let policy = MatchPolicy::default();
        let window = policy.window_ms;

        assert!(!m.is_expired_at(T0 + window, window));
        assert!(m.try_append(&alice(), "hi".into(), T0 + window - 1, &policy).is_ok());

        let err = m
            .try_append(&alice(), "late".into(), T0 + window + 1, &policy)
            .unwrap_err();
        assert_eq!(err, EngineError::Expired { match_id: m.id });
        assert!(m.expired, "a late send lazily flags the match");
        assert_eq!(m.messages.len(), 1);
    }

    #[test]
    fn test_quota_is_exact() {
        let mut m = new_match();
        let policy = MatchPolicy::default();
        for i in 0..3 {
            m.try_append(&alice(), &format!("msg {}", i), T0 + i, &policy)
                .unwrap();
        }
        let err = m.try_append(&alice(), "one more".into(), T0 + 10, &policy);
        assert!(matches!(err, Err(EngineError::QuotaExceeded { limit: 3, .. })));
        assert_eq!(m.messages_sent_by(&alice()), 3);
        assert_eq!(m.messages.len(), 3);

        // the other side still has their own budget
        assert!(m.try_append(&bob(), "hey".into(), T0 + 11, &policy).is_ok());
    }

    #[test]
    fn test_non_participant_cannot_send() {
        let mut m = new_match();
        let err = m
            .try_append(&UserId::new("mallory"), "hi".into(), T0, &MatchPolicy::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::NotParticipant { .. }));
        assert!(m.messages.is_empty());
    }

    #[test]
    fn test_expiry_checked_before_participation() {
        let mut m = new_match();
        let policy = MatchPolicy::default();
        let err = m
            .try_append(&UserId::new("mallory"), "hi".into(), T0 + policy.window_ms + 1, &policy)
            .unwrap_err();
        assert!(matches!(err, EngineError::Expired { .. }));
    }

    #[test]
    fn test_text_checked_after_expiry_and_participation() {
        let mut m = new_match();
        let policy = MatchPolicy::default();

        let late = m.try_append(&alice(), "  ", T0 + policy.window_ms + 1, &policy);
        assert!(matches!(late, Err(EngineError::Expired { .. })));

        let mut m = new_match();
        let stranger = m.try_append(&UserId::new("mallory"), "", T0, &policy);
        assert!(matches!(stranger, Err(EngineError::NotParticipant { .. })));

        let blank = m.try_append(&alice(), " \n ", T0, &policy);
        assert!(matches!(blank, Err(EngineError::InvalidMessage { .. })));
        assert_eq!(m.messages_sent_by(&alice()), 0);

        let sent = m.try_append(&alice(), "  hi  ", T0, &policy).unwrap();
        assert_eq!(sent.text, "hi");
    }

    #[test]
    fn test_mark_expired_is_idempotent() {
        let mut m = new_match();
        let window = MatchPolicy::default().window_ms;
        assert!(!m.mark_expired(T0 + window, window));
        assert!(m.mark_expired(T0 + window + 1, window));
        assert!(!m.mark_expired(T0 + window + 2, window));
        assert_eq!(m.expired_at, Some(T0 + window + 1));
    }

    #[test]
    fn test_share_contact_overwrites() {
        let mut m = new_match();
        let window = MatchPolicy::default().window_ms;
        m.share_contact(&alice(), "@alice".into(), T0, window).unwrap();
        m.share_contact(&alice(), "@alice_new".into(), T0 + 1, window).unwrap();
        assert!(m.contact_shared);
        assert_eq!(m.contact.as_ref().unwrap().payload, "@alice_new");
    }

    #[test]
    fn test_purge_keeps_counters() {
        let mut m = new_match();
        let policy = MatchPolicy::default();
        m.try_append(&alice(), "hi".into(), T0, &policy).unwrap();
        m.try_append(&bob(), "hello".into(), T0, &policy).unwrap();

        assert_eq!(m.purge_messages(T0 + 1), 2);
        assert_eq!(m.purge_messages(T0 + 2), 0);
        assert!(m.messages.is_empty());
        assert_eq!(m.messages_sent_by(&alice()), 1);
    }

    #[test]
    fn test_reconnect_phase_and_prune() {
        let mut state = ReconnectState::default();
        state.requested_by.insert(alice(), T0);
        assert_eq!(state.phase(), ReconnectPhase::OneRequested);
        state.requested_by.insert(bob(), T0 + 10);
        assert_eq!(state.phase(), ReconnectPhase::BothRequested);

        assert_eq!(state.prune(T0 + 15, 10), 1);
        assert_eq!(state.phase(), ReconnectPhase::OneRequested);
        assert!(state.requested_by.contains_key(&bob()));
    }

    #[test]
    fn test_record_reconnect_only_once() {
        let mut m = new_match();
        let first = MatchId::new();
        assert!(m.record_reconnect(first, T0));
        assert!(!m.record_reconnect(MatchId::new(), T0 + 1));
        assert_eq!(m.reconnect.successor, Some(first));
        assert_eq!(m.reconnect.reconnected_at, Some(T0));
        assert_eq!(m.reconnect.phase(), ReconnectPhase::Reconnected);
    }

    #[test]
    fn test_match_serialization() {
        let m = new_match();
        let json = serde_json::to_string(&m).unwrap();
        let deserialized: Match = serde_json::from_str(&json).unwrap();
        assert_eq!(m, deserialized);
    }

    #[test]
    fn test_stored_layout_is_camel_case() {
        let mut m = new_match();
        let policy = MatchPolicy::default();
        m.try_append(&alice(), "hi", T0, &policy).unwrap();
        m.reconnect.requested_by.insert(bob(), T0);

        let doc = serde_json::to_value(&m).unwrap();
        assert_eq!(doc["participantA"], "alice");
        assert_eq!(doc["createdAt"], T0);
        assert_eq!(doc["messageCountByParticipant"]["alice"], 1);
        assert_eq!(doc["messages"][0]["senderId"], "alice");
        assert_eq!(doc["reconnect"]["requestedBy"]["bob"], T0);
        assert!(doc.get("created_at").is_none());
    }
}
