//! SQLite-backed implementations of the pipeline ports.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};

use campaigner_db::models::{QueuedMessageRow, RecipientFilter, SendLogRow};
use campaigner_db::{Database, format_timestamp};
use campaigner_types::messages::SendRequest;
use campaigner_types::models::{Campaign, SendLog, Subscriber};

use crate::error::{PublishError, TemplateError};
use crate::handler::DispatchContext;
use crate::ports::{CampaignStore, MessageQueue, PageRequest, TemplateSource};
use crate::template::{MergeFields, RenderedTemplate};

impl DispatchContext {
    /// Store, templates and outbound queue all backed by one database.
    pub fn sqlite(db: Arc<Database>) -> Self {
        Self {
            store: db.clone(),
            templates: db.clone(),
            queue: db,
        }
    }
}

impl CampaignStore for Database {
    fn get_campaign(&self, campaign_id: i64, user_id: i64) -> Result<Option<Campaign>> {
        Database::get_campaign(self, campaign_id, user_id)?
            .map(|row| row.into_campaign())
            .transpose()
    }

    fn update_campaign(&self, campaign: &Campaign) -> Result<()> {
        let started_at = campaign.started_at.map(format_timestamp);
        let completed_at = campaign.completed_at.map(format_timestamp);
        Database::update_campaign(
            self,
            campaign.id,
            campaign.user_id,
            campaign.status.as_str(),
            started_at.as_deref(),
            completed_at.as_deref(),
        )
    }

    fn begin_sending(&self, campaign_id: i64, user_id: i64, started_at: DateTime<Utc>) -> Result<bool> {
        Database::begin_sending(self, campaign_id, user_id, &format_timestamp(started_at))
    }

    fn get_recipients_page(&self, request: &PageRequest<'_>) -> Result<Vec<Subscriber>> {
        let after_created_at = format_timestamp(request.after.created_at);
        let filter = RecipientFilter {
            user_id: request.user_id,
            segment_ids: request.segment_ids,
            exclude_blacklisted: request.exclude_blacklisted,
            active_only: request.active_only,
            after_created_at: &after_created_at,
            after_id: request.after.id,
            limit: request.limit,
        };
        Database::get_recipients_page(self, &filter)?
            .into_iter()
            .map(|row| row.into_subscriber())
            .collect()
    }

    fn create_send_log(&self, log: &SendLog) -> Result<()> {
        Database::create_send_log(
            self,
            &SendLogRow {
                id: log.id.clone(),
                user_id: log.user_id,
                subscriber_id: log.subscriber_id,
                campaign_id: log.campaign_id,
                status: log.status.as_str().to_string(),
                description: log.description.clone(),
                created_at: format_timestamp(Utc::now()),
            },
        )
    }
}

impl TemplateSource for Database {
    fn render_campaign_template(
        &self,
        campaign_id: i64,
        user_id: i64,
    ) -> std::result::Result<RenderedTemplate, TemplateError> {
        let row = self
            .get_campaign_template(campaign_id, user_id)?
            .ok_or(TemplateError::NotFound { campaign_id, user_id })?;

        let campaign_fields: MergeFields = [
            ("campaign_id".to_string(), row.campaign_id.to_string()),
            ("campaign_name".to_string(), row.campaign_name),
        ]
        .into_iter()
        .collect();

        RenderedTemplate::compile(&row.subject_part, &row.html_part, &row.text_part, &campaign_fields)
    }
}

/// Outbox table drained by the delivery stage.
impl MessageQueue for Database {
    fn publish(&self, request: &SendRequest) -> std::result::Result<(), PublishError> {
        let payload = serde_json::to_string(request)?;
        self.enqueue_message(&QueuedMessageRow {
            correlation_id: request.correlation_id.clone(),
            campaign_id: request.campaign_id,
            user_id: request.user_id,
            subscriber_id: request.subscriber_id,
            payload,
            enqueued_at: format_timestamp(Utc::now()),
        })?;
        Ok(())
    }
}
