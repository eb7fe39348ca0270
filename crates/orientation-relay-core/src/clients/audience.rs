//! Marketing audience API client.
//!
//! Members are addressed by email address in the path; the provider accepts
//! it in place of the hashed subscriber id.

use super::{ClientConfig, Credentials, HttpApi};
use crate::dispatch::{AudienceApi, AudienceMember};
use crate::UpstreamError;
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const SERVICE: &str = "audience";

#[derive(Debug, Deserialize)]
struct MemberResponse {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Serialize)]
struct TagUpdate<'a> {
    tags: [TagEntry<'a>; 1],
}

#[derive(Debug, Serialize)]
struct TagEntry<'a> {
    name: &'a str,
    status: &'static str,
}

/// [`AudienceApi`] for one audience list.
#[derive(Debug, Clone)]
pub struct AudienceClient {
    api: HttpApi,
    audience_id: String,
}

impl AudienceClient {
    pub fn new(
        config: &ClientConfig,
        api_key: impl Into<String>,
        audience_id: impl Into<String>,
    ) -> Result<Self, UpstreamError> {
        Ok(Self {
            api: HttpApi::new(SERVICE, config, Credentials::BasicKey(api_key.into()))?,
            audience_id: audience_id.into(),
        })
    }

    pub fn audience_id(&self) -> &str {
        &self.audience_id
    }
}

#[async_trait]
impl AudienceApi for AudienceClient {
    #[instrument(skip(self, member), fields(audience_id = %self.audience_id))]
    async fn upsert_member(
        &self,
        member: &AudienceMember,
    ) -> Result<Option<String>, UpstreamError> {
        let email = member.email_address.to_lowercase();
        let url = self
            .api
            .endpoint(&["lists", &self.audience_id, "members", &email])?;

        let response: MemberResponse = self
            .api
            .execute_json(self.api.request(Method::PUT, url).json(member))
            .await?;
        debug!(contact_id = ?response.id, "Audience member upserted");
        Ok(response.id)
    }

    #[instrument(skip(self), fields(audience_id = %self.audience_id))]
    async fn add_tag(&self, email: &str, tag: &str) -> Result<(), UpstreamError> {
        let email = email.to_lowercase();
        let url = self
            .api
            .endpoint(&["lists", &self.audience_id, "members", &email, "tags"])?;
        let body = TagUpdate {
            tags: [TagEntry {
                name: tag,
                status: "active",
            }],
        };

        self.api
            .execute(self.api.request(Method::POST, url).json(&body))
            .await
    }
}

/// Derive the API endpoint from a key of the form `<key>-<datacenter>`.
///
/// ```
/// use orientation_relay_core::clients::audience_base_url_from_key;
///
/// assert_eq!(
///     audience_base_url_from_key("abc123-us21").as_deref(),
///     Some("https://us21.api.mailchimp.com/3.0")
/// );
/// assert_eq!(audience_base_url_from_key("no-datacenter-"), None);
/// ```
pub fn audience_base_url_from_key(api_key: &str) -> Option<String> {
    let (_, datacenter) = api_key.rsplit_once('-')?;
    if datacenter.is_empty() || !datacenter.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(format!("https://{}.api.mailchimp.com/3.0", datacenter))
}

#[cfg(test)]
#[path = "audience_tests.rs"]
mod tests;
