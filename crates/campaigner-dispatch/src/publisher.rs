use campaigner_types::messages::SendRequest;
use campaigner_types::models::{Campaign, SendLog, SendLogStatus};
use tracing::{debug, error};

use crate::error::PublishError;
use crate::ports::{CampaignStore, MessageQueue};

/// Hands prepared messages to the delivery queue and records failed
/// recipients in the send log.
pub struct OutboundPublisher<'a> {
    queue: &'a dyn MessageQueue,
    store: &'a dyn CampaignStore,
}

impl<'a> OutboundPublisher<'a> {
    pub fn new(queue: &'a dyn MessageQueue, store: &'a dyn CampaignStore) -> Self {
        Self { queue, store }
    }

    pub fn publish(&self, request: &SendRequest) -> Result<(), PublishError> {
        self.queue.publish(request)?;
        debug!(
            correlation_id = %request.correlation_id,
            campaign_id = request.campaign_id,
            subscriber_id = request.subscriber_id,
            "Published send request"
        );
        Ok(())
    }

    /// Write a `failed` send-log row. A storage error here is logged only:
    /// the caller's decision about the run does not depend on it.
    pub fn record_failure(
        &self,
        correlation_id: &str,
        campaign: &Campaign,
        subscriber_id: i64,
        description: String,
    ) {
        let log = SendLog {
            id: correlation_id.to_string(),
            user_id: campaign.user_id,
            subscriber_id,
            campaign_id: campaign.id,
            status: SendLogStatus::Failed,
            description,
        };

        if let Err(e) = self.store.create_send_log(&log) {
            error!(
                id = %correlation_id,
                user_id = campaign.user_id,
                campaign_id = campaign.id,
                subscriber_id,
                error = %e,
                "Unable to insert send log for subscriber"
            );
        }
    }
}
