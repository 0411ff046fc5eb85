//! Dispatch error types.

use thiserror::Error;

/// Campaign-level template failure. Fails the whole campaign.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("no template found for campaign {campaign_id} (user {user_id})")]
    NotFound { campaign_id: i64, user_id: i64 },

    #[error("invalid {part} template: {source}")]
    Syntax {
        part: &'static str,
        #[source]
        source: handlebars::TemplateError,
    },

    #[error("template storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// A single subscriber's message could not be built.
#[derive(Error, Debug)]
pub enum PrepareError {
    #[error("merge field `{0}` has no value")]
    MissingField(String),

    #[error("invalid subscriber metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("render failed: {0}")]
    Render(#[source] handlebars::RenderError),
}

/// The outbound queue did not accept a message.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("queue rejected message: {0}")]
    Rejected(String),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("queue unavailable: {0}")]
    Transport(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum RecipientError {
    #[error("failed to prepare subscriber email data: {0}")]
    Prepare(#[from] PrepareError),

    #[error("failed to publish subscriber email data: {0}")]
    Publish(#[from] PublishError),
}

#[derive(Error, Debug)]
#[error("correlation id space exhausted after {0}")]
pub struct SequenceError(pub String);

/// Anything that stops a walk before the last page.
#[derive(Error, Debug)]
pub enum WalkError {
    #[error("failed to fetch recipients page: {0}")]
    Fetch(#[source] anyhow::Error),

    #[error("subscriber {subscriber_id}: {source}")]
    Recipient {
        subscriber_id: i64,
        #[source]
        source: RecipientError,
    },

    #[error(transparent)]
    Sequence(#[from] SequenceError),
}
