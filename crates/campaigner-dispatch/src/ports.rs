//! Collaborator contracts consumed by the pipeline.
//!
//! Every call is synchronous and may block; none is retried internally.

use anyhow::Result;
use chrono::{DateTime, Utc};

use campaigner_types::messages::SendRequest;
use campaigner_types::models::{Campaign, SendLog, Subscriber};

use crate::error::{PublishError, TemplateError};
use crate::template::RenderedTemplate;

/// Keyset position: the `(created_at, id)` of the last subscriber seen.
/// The default value (Unix epoch, id 0) sorts before every real row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Cursor {
    pub created_at: DateTime<Utc>,
    pub id: i64,
}

impl Cursor {
    pub fn after(subscriber: &Subscriber) -> Self {
        Self {
            created_at: subscriber.created_at,
            id: subscriber.id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageRequest<'a> {
    pub user_id: i64,
    pub segment_ids: &'a [i64],
    pub exclude_blacklisted: bool,
    pub active_only: bool,
    /// Only rows strictly after this position are returned.
    pub after: Cursor,
    pub limit: u32,
}

pub trait CampaignStore: Send + Sync {
    /// `Ok(None)` when no campaign matches `(campaign_id, user_id)`.
    fn get_campaign(&self, campaign_id: i64, user_id: i64) -> Result<Option<Campaign>>;

    fn update_campaign(&self, campaign: &Campaign) -> Result<()>;

    /// Conditional `draft -> sending` transition. `Ok(false)` means another
    /// run already claimed the campaign (or it left draft some other way).
    fn begin_sending(&self, campaign_id: i64, user_id: i64, started_at: DateTime<Utc>) -> Result<bool>;

    /// Distinct subscribers of any of the requested segments, ordered by
    /// `(created_at, id)`, at most `limit` rows.
    fn get_recipients_page(&self, request: &PageRequest<'_>) -> Result<Vec<Subscriber>>;

    fn create_send_log(&self, log: &SendLog) -> Result<()>;
}

pub trait TemplateSource: Send + Sync {
    /// Load and compile the campaign's template with its campaign-level fields.
    fn render_campaign_template(
        &self,
        campaign_id: i64,
        user_id: i64,
    ) -> std::result::Result<RenderedTemplate, TemplateError>;
}

pub trait MessageQueue: Send + Sync {
    fn publish(&self, request: &SendRequest) -> std::result::Result<(), PublishError>;
}
