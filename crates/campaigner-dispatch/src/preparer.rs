use serde_json::{Map, Value};
use ulid::Ulid;

use campaigner_types::messages::SendRequest;
use campaigner_types::models::{Campaign, Subscriber};

use crate::error::PrepareError;
use crate::template::{MergeFields, RenderedTemplate};

/// Build the send request for one subscriber.
pub fn prepare(
    template: &RenderedTemplate,
    campaign: &Campaign,
    subscriber: &Subscriber,
    correlation_id: Ulid,
) -> Result<SendRequest, PrepareError> {
    let fields = merge_fields(subscriber)?;
    let parts = template.personalize(&fields)?;

    Ok(SendRequest {
        correlation_id: correlation_id.to_string(),
        campaign_id: campaign.id,
        user_id: campaign.user_id,
        subscriber_id: subscriber.id,
        to_email: subscriber.email.clone(),
        to_name: subscriber.name.clone(),
        subject: parts.subject,
        html_body: parts.html,
        text_body: parts.text,
    })
}

/// Metadata keys first, then the built-in fields, which win on conflict.
/// `null` metadata values count as missing.
fn merge_fields(subscriber: &Subscriber) -> Result<MergeFields, PrepareError> {
    let mut fields = MergeFields::new();

    if let Some(raw) = subscriber.metadata.as_deref().filter(|m| !m.trim().is_empty()) {
        let metadata: Map<String, Value> = serde_json::from_str(raw)?;
        for (key, value) in metadata {
            let value = match value {
                Value::Null => continue,
                Value::String(s) => s,
                other => other.to_string(),
            };
            fields.insert(key, value);
        }
    }

    fields.insert("name".into(), subscriber.name.clone());
    fields.insert("email".into(), subscriber.email.clone());
    fields.insert("subscriber_id".into(), subscriber.id.to_string());
    Ok(fields)
}
