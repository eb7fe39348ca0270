//! # Notification Dispatcher
//!
//! Delivers the orientation details for one purchased workshop to the customer.
//!
//! Two backends implement [`NotificationDispatcher`]:
//! - [`EmailDispatcher`] sends a transactional email, either through a
//!   provider-side template (when a template id is configured) or as a
//!   self-contained HTML document rendered here
//! - [`AudienceDispatcher`] upserts the customer into a marketing audience and
//!   tags the contact so an automation sends the orientation
//!
//! Neither backend retries; the caller wraps [`NotificationDispatcher::send`]
//! in a [`crate::RetryPolicy`]. Upstream failures propagate unchanged so the
//! retry classifier can inspect them.
//!
//! Rich-text guideline content comes from a content API that editors control,
//! so it is treated as untrusted when rendered into HTML.

use crate::{ResolvedGuidelines, UpstreamError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Tag applied to audience contacts when none is configured
pub const DEFAULT_AUDIENCE_TAG: &str = "workshop-orientation";

// ============================================================================
// Dispatch contract
// ============================================================================

/// Customer details passed alongside the workshop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerData {
    pub email: String,
    pub name: Option<String>,
    pub order_id: String,
}

impl CustomerData {
    pub fn new(email: impl Into<String>, order_id: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
            order_id: order_id.into(),
        }
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    /// First name for greetings, if a name is known
    pub fn first_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .and_then(|name| name.split_whitespace().next())
    }
}

/// Outcome of a successful dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DispatchResult {
    /// A transactional email was accepted by the provider
    #[serde(rename_all = "camelCase")]
    EmailSent { message_id: Option<String> },

    /// The contact was upserted and tagged in the audience
    #[serde(rename_all = "camelCase")]
    ContactTagged { contact_id: Option<String>, tag: String },
}

impl DispatchResult {
    pub fn email_sent(&self) -> bool {
        matches!(self, Self::EmailSent { .. })
    }

    pub fn contact_tagged(&self) -> bool {
        matches!(self, Self::ContactTagged { .. })
    }
}

/// Interface for delivering workshop orientation to a customer.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver the orientation for `workshop` to `email`
    async fn send(
        &self,
        email: &str,
        workshop: &ResolvedGuidelines,
        customer: &CustomerData,
    ) -> Result<DispatchResult, UpstreamError>;

    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;
}

// ============================================================================
// Email backend
// ============================================================================

/// Provider-side template reference with its named variables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub id: String,
    pub variables: Map<String, Value>,
}

/// A transactional email ready to hand to the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<EmailTemplate>,
}

/// Provider acknowledgement of an accepted email
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmailReceipt {
    #[serde(default)]
    pub id: Option<String>,
}

/// Interface for a transactional email provider.
#[async_trait]
pub trait EmailApi: Send + Sync {
    async fn send_email(&self, email: &OutboundEmail) -> Result<EmailReceipt, UpstreamError>;
}

/// Sender settings for the email backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailSettings {
    pub from_address: String,
    pub template_id: Option<String>,
}

/// Sends orientation details as a transactional email.
pub struct EmailDispatcher {
    api: Arc<dyn EmailApi>,
    settings: EmailSettings,
}

impl EmailDispatcher {
    pub fn new(api: Arc<dyn EmailApi>, settings: EmailSettings) -> Self {
        Self { api, settings }
    }

    /// Build the provider request without sending it
    pub fn compose(
        &self,
        email: &str,
        workshop: &ResolvedGuidelines,
        customer: &CustomerData,
    ) -> OutboundEmail {
        let subject = subject_line(workshop);

        let (html, template) = match self.settings.template_id.as_deref() {
            Some(template_id) if !template_id.is_empty() => (
                None,
                Some(EmailTemplate {
                    id: template_id.to_string(),
                    variables: template_variables(workshop, customer),
                }),
            ),
            _ => (Some(render_html(workshop, customer)), None),
        };

        OutboundEmail {
            from: self.settings.from_address.clone(),
            to: vec![email.to_string()],
            subject,
            html,
            template,
        }
    }
}

#[async_trait]
impl NotificationDispatcher for EmailDispatcher {
    #[instrument(skip(self, workshop, customer), fields(order_id = %customer.order_id))]
    async fn send(
        &self,
        email: &str,
        workshop: &ResolvedGuidelines,
        customer: &CustomerData,
    ) -> Result<DispatchResult, UpstreamError> {
        let outbound = self.compose(email, workshop, customer);
        debug!(
            templated = outbound.template.is_some(),
            workshop = %workshop.name,
            "Sending orientation email"
        );

        let receipt = self.api.send_email(&outbound).await?;

        info!(message_id = ?receipt.id, workshop = %workshop.name, "Orientation email accepted");
        Ok(DispatchResult::EmailSent {
            message_id: receipt.id,
        })
    }

    fn backend_name(&self) -> &'static str {
        "email"
    }
}

/// Subject line for the orientation email
pub fn subject_line(workshop: &ResolvedGuidelines) -> String {
    format!("Your workshop orientation: {}", workshop.name)
}

/// Named variables for the provider-side template
pub fn template_variables(
    workshop: &ResolvedGuidelines,
    customer: &CustomerData,
) -> Map<String, Value> {
    let mut variables = Map::new();
    let mut put = |key: &str, value: &str| {
        variables.insert(key.to_string(), Value::String(value.to_string()));
    };

    put("workshop_name", &workshop.name);
    put("workshop_date", &workshop.date);
    put("workshop_location", &workshop.location);
    put("guidelines_html", &sanitize_rich_text(&workshop.guidelines_html));
    put("order_id", &customer.order_id);

    let optional = [
        ("duration", workshop.duration.as_deref()),
        ("what_to_bring", workshop.what_to_bring.as_deref()),
        ("parking", workshop.parking.as_deref()),
        ("reschedule_policy", workshop.reschedule_policy.as_deref()),
        ("faq", workshop.faq.as_deref()),
        ("customer_name", customer.name.as_deref()),
        ("customer_first_name", customer.first_name()),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            put(key, value);
        }
    }

    variables
}

// ============================================================================
// HTML rendering
// ============================================================================

/// Render the self-contained orientation email document.
///
/// Plain-text fields are escaped; the guidelines and FAQ are rich text and go
/// through [`sanitize_rich_text`].
pub fn render_html(workshop: &ResolvedGuidelines, customer: &CustomerData) -> String {
    let greeting = match customer.first_name() {
        Some(first) => format!("Hi {},", escape_html(first)),
        None => "Hi there,".to_string(),
    };

    let mut details = String::new();
    let rows = [
        ("Date", Some(workshop.date.as_str())),
        ("Location", Some(workshop.location.as_str())),
        ("Duration", workshop.duration.as_deref()),
        ("What to bring", workshop.what_to_bring.as_deref()),
        ("Parking", workshop.parking.as_deref()),
        ("Rescheduling", workshop.reschedule_policy.as_deref()),
    ];
    for (label, value) in rows {
        if let Some(value) = value {
            details.push_str(&format!(
                "      <tr><th align=\"left\">{}</th><td>{}</td></tr>\n",
                label,
                escape_html(value)
            ));
        }
    }

    let faq = workshop
        .faq
        .as_deref()
        .map(|faq| {
            format!(
                "    <h2>Frequently asked questions</h2>\n    <div class=\"faq\">{}</div>\n",
                sanitize_rich_text(faq)
            )
        })
        .unwrap_or_default();

    format!(
        "<!DOCTYPE html>\n\
<html lang=\"en\">\n\
  <head>\n\
    <meta charset=\"utf-8\">\n\
    <title>{title}</title>\n\
  </head>\n\
  <body>\n\
    <p>{greeting}</p>\n\
    <p>Thanks for booking <strong>{name}</strong>. Here is everything you need before the day.</p>\n\
    <table>\n\
{details}\
    </table>\n\
    <div class=\"guidelines\">{guidelines}</div>\n\
{faq}\
    <p>Order reference: {order_id}</p>\n\
  </body>\n\
</html>\n",
        title = escape_html(&subject_line(workshop)),
        greeting = greeting,
        name = escape_html(&workshop.name),
        details = details,
        guidelines = sanitize_rich_text(&workshop.guidelines_html),
        faq = faq,
        order_id = escape_html(&customer.order_id),
    )
}

/// Escape text for inclusion in HTML element content or attribute values
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Formatting elements editors may use in guideline and FAQ content
const RICH_TEXT_TAGS: &[&str] = &[
    "a", "b", "blockquote", "br", "code", "div", "em", "h1", "h2", "h3", "h4", "h5", "h6",
    "hr", "i", "li", "ol", "p", "pre", "span", "strong", "table", "tbody", "td", "th",
    "thead", "tr", "u", "ul",
];

/// Link schemes allowed to survive in rich text
const RICH_TEXT_URL_SCHEMES: &[&str] = &["http", "https", "mailto", "tel"];

/// Clean editor-supplied rich text down to plain formatting.
///
/// The input is parsed as an HTML fragment and rebuilt from an allow-list:
/// elements outside [`RICH_TEXT_TAGS`] are dropped (`script` and `style`
/// together with their content), event handler and other non-listed
/// attributes are removed, and links keep their `href` only for
/// [`RICH_TEXT_URL_SCHEMES`]. Text is re-serialized, so entity-encoded
/// payloads are decoded before they are checked.
pub fn sanitize_rich_text(input: &str) -> String {
    let mut cleaner = ammonia::Builder::default();
    cleaner
        .tags(RICH_TEXT_TAGS.iter().copied().collect())
        .url_schemes(RICH_TEXT_URL_SCHEMES.iter().copied().collect())
        .link_rel(None);
    cleaner.clean(input).to_string()
}

// ============================================================================
// Audience backend
// ============================================================================

/// Contact record upserted into the marketing audience
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudienceMember {
    pub email_address: String,
    pub status_if_new: String,
    pub merge_fields: Map<String, Value>,
}

/// Interface for a marketing-automation audience.
#[async_trait]
pub trait AudienceApi: Send + Sync {
    /// Create or update a contact; returns the provider's contact id
    async fn upsert_member(&self, member: &AudienceMember) -> Result<Option<String>, UpstreamError>;

    /// Attach an active tag to an existing contact
    async fn add_tag(&self, email: &str, tag: &str) -> Result<(), UpstreamError>;
}

/// Hands orientation off to a marketing automation by tagging the contact.
pub struct AudienceDispatcher {
    api: Arc<dyn AudienceApi>,
    tag: String,
}

impl AudienceDispatcher {
    pub fn new(api: Arc<dyn AudienceApi>, tag: Option<String>) -> Self {
        Self {
            api,
            tag: tag
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_AUDIENCE_TAG.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Build the contact record for a customer and workshop
    pub fn member(
        email: &str,
        workshop: &ResolvedGuidelines,
        customer: &CustomerData,
    ) -> AudienceMember {
        let mut merge_fields = Map::new();
        if let Some(first) = customer.first_name() {
            merge_fields.insert("FNAME".to_string(), Value::String(first.to_string()));
        }
        merge_fields.insert("WORKSHOP".to_string(), Value::String(workshop.name.clone()));
        merge_fields.insert("WDATE".to_string(), Value::String(workshop.date.clone()));
        merge_fields.insert("WLOCATION".to_string(), Value::String(workshop.location.clone()));
        merge_fields.insert("ORDERID".to_string(), Value::String(customer.order_id.clone()));

        AudienceMember {
            email_address: email.to_string(),
            status_if_new: "subscribed".to_string(),
            merge_fields,
        }
    }
}

#[async_trait]
impl NotificationDispatcher for AudienceDispatcher {
    #[instrument(
        skip(self, workshop, customer),
        fields(order_id = %customer.order_id, tag = %self.tag)
    )]
    async fn send(
        &self,
        email: &str,
        workshop: &ResolvedGuidelines,
        customer: &CustomerData,
    ) -> Result<DispatchResult, UpstreamError> {
        let member = Self::member(email, workshop, customer);
        let contact_id = self.api.upsert_member(&member).await?;
        self.api.add_tag(email, &self.tag).await?;

        info!(workshop = %workshop.name, "Audience contact tagged");
        Ok(DispatchResult::ContactTagged {
            contact_id,
            tag: self.tag.clone(),
        })
    }

    fn backend_name(&self) -> &'static str {
        "audience"
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
