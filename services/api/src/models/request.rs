//! Trip request model and lifecycle
//!
//! A trip request is a participant's ask to join a trip. The transition
//! guards live here; the repository enforces them inside a transaction
//! together with the seat accounting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::trip::TripSummary;

/// Trip request lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    /// Only a pending request can be accepted or rejected by the creator
    pub fn can_be_decided(&self) -> bool {
        matches!(self, RequestStatus::Pending)
    }

    /// The requester can withdraw while pending or after acceptance
    pub fn can_be_cancelled(&self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::Accepted)
    }

    /// A live request blocks the same user from requesting the trip again
    pub fn is_live(&self) -> bool {
        !matches!(self, RequestStatus::Cancelled)
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "accepted" => Ok(RequestStatus::Accepted),
            "rejected" => Ok(RequestStatus::Rejected),
            "cancelled" => Ok(RequestStatus::Cancelled),
            other => Err(anyhow::anyhow!("Unknown request status: {}", other)),
        }
    }
}

/// Trip request entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripRequest {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub user_id: Uuid,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request as shown in the creator inbox and the sent-requests list
#[derive(Debug, Clone, Serialize)]
pub struct TripRequestWithContext {
    #[serde(flatten)]
    pub request: TripRequest,
    pub spot_name: String,
    pub requester_name: String,
    pub departure_time: DateTime<Utc>,
}

/// An accepted request together with the trip it joins
#[derive(Debug, Clone, Serialize)]
pub struct Participation {
    pub trip: TripSummary,
    pub request: TripRequest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_pending_can_be_decided() {
        assert!(RequestStatus::Pending.can_be_decided());
        assert!(!RequestStatus::Accepted.can_be_decided());
        assert!(!RequestStatus::Rejected.can_be_decided());
        assert!(!RequestStatus::Cancelled.can_be_decided());
    }

    #[test]
    fn test_pending_and_accepted_can_be_cancelled() {
        assert!(RequestStatus::Pending.can_be_cancelled());
        assert!(RequestStatus::Accepted.can_be_cancelled());
        assert!(!RequestStatus::Rejected.can_be_cancelled());
        assert!(!RequestStatus::Cancelled.can_be_cancelled());
    }

    #[test]
    fn test_cancelled_requests_are_not_live() {
        assert!(RequestStatus::Pending.is_live());
        assert!(RequestStatus::Accepted.is_live());
        assert!(RequestStatus::Rejected.is_live());
        assert!(!RequestStatus::Cancelled.is_live());
    }
}
