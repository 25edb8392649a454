use serde::{Deserialize, Serialize};
use types::ids::{MatchId, UserId, VenueId, VenueRef};
use types::matches::ParticipantField;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueBody {
    pub venue_id: VenueId,
    pub venue_name: String,
}

impl VenueBody {
    pub fn into_venue(self) -> VenueRef {
        VenueRef {
            id: self.venue_id,
            name: self.venue_name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInterestRequest {
    pub to_user_id: UserId,
    #[serde(flatten)]
    pub venue: VenueBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListMatchesQuery {
    /// Restrict to one ownership field; both when absent
    pub role: Option<ParticipantField>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShareContactRequest {
    pub payload: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelReconnectResponse {
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckInResponse {
    /// Matches minted by reconnects this check-in completed
    pub reconnected: Vec<MatchId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SweepQuery {
    #[serde(default)]
    pub clean: bool,
}
