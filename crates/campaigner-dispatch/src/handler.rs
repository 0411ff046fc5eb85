use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use campaigner_types::events::TriggerEvent;
use campaigner_types::models::{Campaign, CampaignStatus};

use crate::correlation::CorrelationSequence;
use crate::error::{RecipientError, WalkError};
use crate::policy::RecipientFailurePolicy;
use crate::ports::{CampaignStore, MessageQueue, TemplateSource};
use crate::preparer;
use crate::publisher::OutboundPublisher;
use crate::template::RenderedTemplate;
use crate::walker::{BatchWalker, DEFAULT_PAGE_SIZE};

/// Prefix of a rejected trigger body that is written to the log.
const LOGGED_BODY_BYTES: usize = 256;

/// Everything a dispatch run talks to, built once at startup.
#[derive(Clone)]
pub struct DispatchContext {
    pub store: Arc<dyn CampaignStore>,
    pub templates: Arc<dyn TemplateSource>,
    pub queue: Arc<dyn MessageQueue>,
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub page_size: u32,
    pub on_recipient_error: RecipientFailurePolicy,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            on_recipient_error: RecipientFailurePolicy::Abort,
        }
    }
}

/// Counters for one dispatch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub pages: usize,
    pub published: usize,
    pub failed: usize,
}

/// How a trigger was handled. Every outcome acknowledges the message;
/// only [`Outcome::is_retryable`] ones may be redelivered by a retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Malformed,
    CampaignNotFound,
    /// Campaign was already past draft when loaded.
    AlreadyProcessed(CampaignStatus),
    /// Another run claimed the campaign between load and claim.
    ClaimLost,
    LoadFailed,
    ClaimFailed,
    /// Template could not be rendered; campaign moved to `failed`.
    TemplateFailed,
    /// Walk stopped early; campaign left in `sending`.
    Aborted(RunSummary),
    /// Every page walked but the final `sent` update did not persist.
    FinalizeFailed(RunSummary),
    Completed(RunSummary),
}

impl Outcome {
    /// Failures that happened before any message was published.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LoadFailed | Self::ClaimFailed)
    }
}

pub struct TriggerHandler {
    ctx: DispatchContext,
    settings: DispatchSettings,
}

impl TriggerHandler {
    pub fn new(ctx: DispatchContext, settings: DispatchSettings) -> Self {
        Self { ctx, settings }
    }

    /// Entry point for a raw transport body.
    pub fn handle(&self, body: &[u8]) -> Outcome {
        match TriggerEvent::from_slice(body) {
            Ok(event) => self.handle_event(&event),
            Err(e) => {
                error!(
                    body = %String::from_utf8_lossy(logged_prefix(body)),
                    body_len = body.len(),
                    error = %e,
                    "Malformed trigger message"
                );
                Outcome::Malformed
            }
        }
    }

    pub fn handle_event(&self, event: &TriggerEvent) -> Outcome {
        if let Err(e) = event.validate() {
            error!(
                campaign_id = event.campaign_id,
                user_id = event.user_id,
                error = %e,
                "Malformed trigger event"
            );
            return Outcome::Malformed;
        }

        let store = self.ctx.store.as_ref();

        let mut campaign = match store.get_campaign(event.campaign_id, event.user_id) {
            Ok(Some(campaign)) => campaign,
            Ok(None) => {
                warn!(campaign_id = event.campaign_id, user_id = event.user_id, "Unable to find campaign");
                return Outcome::CampaignNotFound;
            }
            Err(e) => {
                error!(
                    campaign_id = event.campaign_id,
                    user_id = event.user_id,
                    error = %e,
                    "Unable to load campaign"
                );
                return Outcome::LoadFailed;
            }
        };

        if campaign.status != CampaignStatus::Draft {
            warn!(
                campaign_id = campaign.id,
                user_id = campaign.user_id,
                status = %campaign.status,
                "Potentially duplicate message: campaign is not a draft"
            );
            return Outcome::AlreadyProcessed(campaign.status);
        }

        let started_at = Utc::now();
        match store.begin_sending(campaign.id, campaign.user_id, started_at) {
            Ok(true) => {
                campaign.status = CampaignStatus::Sending;
                campaign.started_at = Some(started_at);
            }
            Ok(false) => {
                warn!(campaign_id = campaign.id, user_id = campaign.user_id, "Campaign claimed by another run");
                return Outcome::ClaimLost;
            }
            Err(e) => {
                error!(campaign_id = campaign.id, user_id = campaign.user_id, error = %e, "Unable to mark campaign as sending");
                return Outcome::ClaimFailed;
            }
        }

        let template = match self.ctx.templates.render_campaign_template(campaign.id, campaign.user_id) {
            Ok(template) => template,
            Err(e) => {
                error!(
                    campaign_id = campaign.id,
                    user_id = campaign.user_id,
                    template_id = campaign.template_id,
                    error = %e,
                    "Unable to prepare campaign template data"
                );
                self.transition(&mut campaign, CampaignStatus::Failed);
                return Outcome::TemplateFailed;
            }
        };

        info!(
            campaign_id = campaign.id,
            user_id = campaign.user_id,
            segments = ?event.segment_ids,
            "Dispatching campaign"
        );

        let mut summary = RunSummary::default();
        if let Err(e) = self.walk(&campaign, &template, &event.segment_ids, &mut summary) {
            error!(
                campaign_id = campaign.id,
                user_id = campaign.user_id,
                published = summary.published,
                error = %e,
                "Dispatch aborted; campaign left in sending"
            );
            return Outcome::Aborted(summary);
        }

        campaign.completed_at = Some(Utc::now());
        if !self.transition(&mut campaign, CampaignStatus::Sent) {
            return Outcome::FinalizeFailed(summary);
        }

        info!(
            campaign_id = campaign.id,
            user_id = campaign.user_id,
            pages = summary.pages,
            published = summary.published,
            failed = summary.failed,
            "Campaign sent"
        );
        Outcome::Completed(summary)
    }

    /// Walk every page, preparing and publishing each subscriber in order.
    fn walk(
        &self,
        campaign: &Campaign,
        template: &RenderedTemplate,
        segment_ids: &[i64],
        summary: &mut RunSummary,
    ) -> Result<(), WalkError> {
        let store = self.ctx.store.as_ref();
        let publisher = OutboundPublisher::new(self.ctx.queue.as_ref(), store);
        let mut walker = BatchWalker::new(store, campaign.user_id, segment_ids, self.settings.page_size);
        let mut sequence = CorrelationSequence::start();

        let result = loop {
            let page = match walker.next_page() {
                Ok(Some(page)) => page,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };

            let mut page_result = Ok(());
            for subscriber in &page {
                let correlation_id = sequence.current();
                let sent = preparer::prepare(template, campaign, subscriber, correlation_id)
                    .map_err(RecipientError::from)
                    .and_then(|request| publisher.publish(&request).map_err(RecipientError::from));

                match sent {
                    Ok(()) => summary.published += 1,
                    Err(e) => {
                        summary.failed += 1;
                        publisher.record_failure(
                            &correlation_id.to_string(),
                            campaign,
                            subscriber.id,
                            format!("{} (subscriber {})", e, subscriber.id),
                        );
                        if self.settings.on_recipient_error == RecipientFailurePolicy::Abort {
                            page_result = Err(WalkError::Recipient {
                                subscriber_id: subscriber.id,
                                source: e,
                            });
                            break;
                        }
                        warn!(
                            campaign_id = campaign.id,
                            subscriber_id = subscriber.id,
                            error = %e,
                            "Skipping failed subscriber"
                        );
                    }
                }

                if let Err(e) = sequence.advance() {
                    page_result = Err(e.into());
                    break;
                }
            }

            if page_result.is_err() {
                break page_result;
            }
        };

        summary.pages = walker.pages_fetched();
        result
    }

    /// Move the campaign to `next` and persist. A persistence failure is
    /// logged and reported as `false`.
    fn transition(&self, campaign: &mut Campaign, next: CampaignStatus) -> bool {
        debug_assert!(campaign.status.can_transition_to(next));
        campaign.status = next;

        match self.ctx.store.update_campaign(campaign) {
            Ok(()) => true,
            Err(e) => {
                error!(
                    campaign_id = campaign.id,
                    user_id = campaign.user_id,
                    status = %campaign.status,
                    error = %e,
                    "Unable to update campaign"
                );
                false
            }
        }
    }
}

fn logged_prefix(body: &[u8]) -> &[u8] {
    &body[..body.len().min(LOGGED_BODY_BYTES)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logged_body_is_capped() {
        let huge = vec![b'x'; 10 * LOGGED_BODY_BYTES];
        assert_eq!(logged_prefix(&huge).len(), LOGGED_BODY_BYTES);
        assert_eq!(logged_prefix(b"{bad"), b"{bad");
        assert!(logged_prefix(b"").is_empty());
    }
}
