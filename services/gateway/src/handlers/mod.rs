pub mod checkins;
pub mod interests;
pub mod matches;
pub mod reconnect;
pub mod sweep;

use crate::error::AppError;
use types::ids::MatchId;

pub(crate) fn parse_match_id(raw: &str) -> Result<MatchId, AppError> {
    MatchId::parse(raw).ok_or_else(|| AppError::BadRequest(format!("Malformed match id: {}", raw)))
}

pub async fn healthz() -> &'static str {
    "ok"
}
