//! Database row types. These map directly to SQLite rows.
//! Conversion into campaigner-types models happens here so callers never
//! see raw timestamp strings or status text.

use anyhow::Result;
use chrono::{DateTime, Utc};
use campaigner_types::models::{Campaign, Subscriber};

use crate::parse_timestamp;

pub struct CampaignRow {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub template_id: i64,
    pub status: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
}

impl CampaignRow {
    pub fn into_campaign(self) -> Result<Campaign> {
        Ok(Campaign {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            template_id: self.template_id,
            status: self.status.parse()?,
            started_at: self.started_at.as_deref().map(parse_timestamp).transpose()?,
            completed_at: self.completed_at.as_deref().map(parse_timestamp).transpose()?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

pub struct SubscriberRow {
    pub id: i64,
    pub user_id: i64,
    pub email: String,
    pub name: String,
    pub metadata: Option<String>,
    pub active: bool,
    pub blacklisted: bool,
    pub created_at: String,
}

impl SubscriberRow {
    pub fn into_subscriber(self) -> Result<Subscriber> {
        Ok(Subscriber {
            id: self.id,
            user_id: self.user_id,
            email: self.email,
            name: self.name,
            metadata: self.metadata,
            active: self.active,
            blacklisted: self.blacklisted,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

/// A campaign joined with the template it sends.
pub struct CampaignTemplateRow {
    pub campaign_id: i64,
    pub campaign_name: String,
    pub subject_part: String,
    pub html_part: String,
    pub text_part: String,
}

pub struct SendLogRow {
    pub id: String,
    pub user_id: i64,
    pub subscriber_id: i64,
    pub campaign_id: i64,
    pub status: String,
    pub description: String,
    pub created_at: String,
}

pub struct QueuedMessageRow {
    pub correlation_id: String,
    pub campaign_id: i64,
    pub user_id: i64,
    pub subscriber_id: i64,
    pub payload: String,
    pub enqueued_at: String,
}

/// Input for inserting a subscriber; `created_at` is explicit so seeded
/// data can control keyset ordering. It is stored in the fixed-width
/// timestamp format like every other timestamp column.
pub struct NewSubscriber<'a> {
    pub user_id: i64,
    pub email: &'a str,
    pub name: &'a str,
    pub metadata: Option<&'a str>,
    pub active: bool,
    pub blacklisted: bool,
    pub created_at: DateTime<Utc>,
}

/// Keyset page request: rows strictly after `(after_created_at, after_id)`.
pub struct RecipientFilter<'a> {
    pub user_id: i64,
    pub segment_ids: &'a [i64],
    pub exclude_blacklisted: bool,
    pub active_only: bool,
    pub after_created_at: &'a str,
    pub after_id: i64,
    pub limit: u32,
}
