use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a campaign. Transitions only move forward:
/// `draft -> sending -> {sent, failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Sending,
    Sent,
    Failed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    /// Whether the dispatch pipeline may move a campaign from `self` to `next`.
    pub fn can_transition_to(&self, next: CampaignStatus) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Sending) | (Self::Sending, Self::Sent) | (Self::Sending, Self::Failed)
        )
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown campaign status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for CampaignStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "sending" => Ok(Self::Sending),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A bulk-send job owned by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub template_id: i64,
    pub status: CampaignStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// An addressable contact. The pipeline never mutates subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: i64,
    pub user_id: i64,
    pub email: String,
    pub name: String,
    /// Raw JSON object of extra merge fields, decoded lazily per send.
    pub metadata: Option<String>,
    pub active: bool,
    pub blacklisted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendLogStatus {
    Failed,
}

impl SendLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Failed => "failed",
        }
    }
}

/// Persisted record of one recipient's failed preparation or publish attempt.
/// `id` is the correlation id the recipient was assigned in that run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendLog {
    pub id: String,
    pub user_id: i64,
    pub subscriber_id: i64,
    pub campaign_id: i64,
    pub status: SendLogStatus,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_machine_only_moves_forward() {
        use CampaignStatus::*;
        assert!(Draft.can_transition_to(Sending));
        assert!(Sending.can_transition_to(Sent));
        assert!(Sending.can_transition_to(Failed));

        assert!(!Draft.can_transition_to(Sent));
        assert!(!Sent.can_transition_to(Draft));
        assert!(!Failed.can_transition_to(Sending));
        assert!(!Sending.can_transition_to(Sending));
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            CampaignStatus::Draft,
            CampaignStatus::Sending,
            CampaignStatus::Sent,
            CampaignStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<CampaignStatus>(), Ok(status));
        }
        assert!("archived".parse::<CampaignStatus>().is_err());
    }
}
