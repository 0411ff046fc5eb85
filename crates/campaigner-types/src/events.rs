use serde::{Deserialize, Serialize};

/// Topic the CRUD layer publishes to when a user starts a campaign.
pub const CAMPAIGNER_TOPIC: &str = "campaigner";

/// Message asking the pipeline to dispatch one campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub campaign_id: i64,
    pub user_id: i64,
    pub segment_ids: Vec<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum MalformedTrigger {
    #[error("empty message body")]
    Empty,
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("campaign_id and user_id must be positive")]
    InvalidId,
    #[error("trigger names no segments")]
    NoSegments,
}

impl TriggerEvent {
    /// Decode and validate a raw transport body.
    pub fn from_slice(body: &[u8]) -> Result<Self, MalformedTrigger> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(MalformedTrigger::Empty);
        }

        let event: TriggerEvent = serde_json::from_slice(body)?;
        event.validate()?;
        Ok(event)
    }

    /// Structural checks shared by every entry point.
    pub fn validate(&self) -> Result<(), MalformedTrigger> {
        if self.campaign_id <= 0 || self.user_id <= 0 {
            return Err(MalformedTrigger::InvalidId);
        }
        if self.segment_ids.is_empty() {
            return Err(MalformedTrigger::NoSegments);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_trigger() {
        let event =
            TriggerEvent::from_slice(br#"{"campaign_id":7,"user_id":3,"segment_ids":[1,2]}"#).unwrap();
        assert_eq!(
            event,
            TriggerEvent {
                campaign_id: 7,
                user_id: 3,
                segment_ids: vec![1, 2],
            }
        );
    }

    #[test]
    fn rejects_empty_body() {
        assert!(matches!(TriggerEvent::from_slice(b""), Err(MalformedTrigger::Empty)));
        assert!(matches!(TriggerEvent::from_slice(b"  \n"), Err(MalformedTrigger::Empty)));
    }

    #[test]
    fn rejects_invalid_json_and_missing_fields() {
        assert!(matches!(TriggerEvent::from_slice(b"{not json"), Err(MalformedTrigger::Json(_))));
        assert!(matches!(
            TriggerEvent::from_slice(br#"{"campaign_id":7,"user_id":3}"#),
            Err(MalformedTrigger::Json(_))
        ));
    }

    #[test]
    fn rejects_structurally_invalid_values() {
        assert!(matches!(
            TriggerEvent::from_slice(br#"{"campaign_id":0,"user_id":3,"segment_ids":[1]}"#),
            Err(MalformedTrigger::InvalidId)
        ));
        assert!(matches!(
            TriggerEvent::from_slice(br#"{"campaign_id":7,"user_id":3,"segment_ids":[]}"#),
            Err(MalformedTrigger::NoSegments)
        ));
    }

    #[test]
    fn validate_checks_constructed_events() {
        let event = TriggerEvent {
            campaign_id: 7,
            user_id: -1,
            segment_ids: vec![1],
        };
        assert!(matches!(event.validate(), Err(MalformedTrigger::InvalidId)));
        assert!(
            TriggerEvent {
                user_id: 3,
                ..event
            }
            .validate()
            .is_ok()
        );
    }
}
