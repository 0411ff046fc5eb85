//! Merge-field templates on Handlebars.
//!
//! Placeholders are written `{{ field }}`. The three parts of a campaign
//! template are compiled once per run. Campaign-level fields travel with the
//! compiled template and are merged into every recipient's render data,
//! where they take precedence over recipient fields of the same name.

use std::collections::HashMap;
use std::fmt;

use handlebars::{Handlebars, RenderError, RenderErrorReason};
use serde_json::{Map, Value};

use crate::error::{PrepareError, TemplateError};

/// Field name -> value, used for both campaign and recipient fields.
pub type MergeFields = HashMap<String, String>;

const SUBJECT: &str = "subject";
const HTML: &str = "html";
const TEXT: &str = "text";

/// One recipient's rendered subject and bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedParts {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// A campaign's template, compiled once per run.
pub struct RenderedTemplate {
    /// Subject and text parts, rendered without escaping.
    plain: Handlebars<'static>,
    /// HTML part, rendered with Handlebars' HTML escaping.
    html: Handlebars<'static>,
    campaign_fields: Map<String, Value>,
}

impl RenderedTemplate {
    pub fn compile(
        subject: &str,
        html: &str,
        text: &str,
        campaign_fields: &MergeFields,
    ) -> Result<Self, TemplateError> {
        let mut plain = Handlebars::new();
        plain.set_strict_mode(true);
        plain.register_escape_fn(handlebars::no_escape);
        register(&mut plain, SUBJECT, subject)?;
        register(&mut plain, TEXT, text)?;

        let mut html_registry = Handlebars::new();
        html_registry.set_strict_mode(true);
        register(&mut html_registry, HTML, html)?;

        let campaign_fields = campaign_fields
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();

        Ok(Self {
            plain,
            html: html_registry,
            campaign_fields,
        })
    }

    /// Render all three parts for one recipient.
    pub fn personalize(&self, recipient: &MergeFields) -> Result<RenderedParts, PrepareError> {
        let mut data: Map<String, Value> = recipient
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        data.extend(self.campaign_fields.clone());
        let data = Value::Object(data);

        Ok(RenderedParts {
            subject: self.plain.render(SUBJECT, &data).map_err(prepare_error)?,
            html: self.html.render(HTML, &data).map_err(prepare_error)?,
            text: self.plain.render(TEXT, &data).map_err(prepare_error)?,
        })
    }
}

impl fmt::Debug for RenderedTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderedTemplate")
            .field("campaign_fields", &self.campaign_fields)
            .finish_non_exhaustive()
    }
}

fn register(registry: &mut Handlebars<'static>, part: &'static str, source: &str) -> Result<(), TemplateError> {
    registry
        .register_template_string(part, source)
        .map_err(|source| TemplateError::Syntax { part, source })
}

fn prepare_error(err: RenderError) -> PrepareError {
    if let RenderErrorReason::MissingVariable(Some(path)) = err.reason() {
        return PrepareError::MissingField(path.clone());
    }
    PrepareError::Render(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> MergeFields {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn renders_recipient_fields_in_every_part() {
        let template =
            RenderedTemplate::compile("Hi {{ name }}", "<p>{{email}}</p>", "Mail {{email}}!", &MergeFields::new())
                .unwrap();
        let parts = template
            .personalize(&fields(&[("name", "Ana"), ("email", "ana@x.io")]))
            .unwrap();
        assert_eq!(
            parts,
            RenderedParts {
                subject: "Hi Ana".into(),
                html: "<p>ana@x.io</p>".into(),
                text: "Mail ana@x.io!".into(),
            }
        );
    }

    #[test]
    fn missing_field_is_a_prepare_error() {
        let template = RenderedTemplate::compile("Hi {{first_name}}", "", "", &MergeFields::new()).unwrap();
        match template.personalize(&MergeFields::new()) {
            Err(PrepareError::MissingField(name)) => assert_eq!(name, "first_name"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn syntax_errors_name_the_part() {
        assert!(matches!(
            RenderedTemplate::compile("Hi {{name", "", "", &MergeFields::new()),
            Err(TemplateError::Syntax { part: "subject", .. })
        ));
        assert!(matches!(
            RenderedTemplate::compile("", "{{#if x}}open", "", &MergeFields::new()),
            Err(TemplateError::Syntax { part: "html", .. })
        ));
    }

    #[test]
    fn campaign_fields_are_shared_and_only_html_is_escaped() {
        let template = RenderedTemplate::compile(
            "{{campaign_name}} for {{name}}",
            "<h1>{{campaign_name}}</h1>{{name}}",
            "{{campaign_name}}",
            &fields(&[("campaign_name", "Fish & Chips")]),
        )
        .unwrap();

        let parts = template
            .personalize(&fields(&[("name", "<b>Bo</b>"), ("campaign_name", "spoofed")]))
            .unwrap();
        assert_eq!(parts.subject, "Fish & Chips for <b>Bo</b>");
        assert_eq!(parts.html, "<h1>Fish &amp; Chips</h1>&lt;b&gt;Bo&lt;/b&gt;");
        assert_eq!(parts.text, "Fish & Chips");
    }
}
