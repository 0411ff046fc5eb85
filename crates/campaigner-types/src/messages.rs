use serde::{Deserialize, Serialize};

/// One rendered email handed to the delivery queue.
///
/// `correlation_id` sorts in dispatch order within a campaign run, so the
/// delivery stage can reconstruct ordering without a central sequencer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub correlation_id: String,
    pub campaign_id: i64,
    pub user_id: i64,
    pub subscriber_id: i64,
    pub to_email: String,
    pub to_name: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}
