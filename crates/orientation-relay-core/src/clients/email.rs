//! Transactional email API client.

use super::{ClientConfig, Credentials, HttpApi};
use crate::dispatch::{EmailApi, EmailReceipt, OutboundEmail};
use crate::UpstreamError;
use async_trait::async_trait;
use reqwest::Method;
use tracing::instrument;

/// Production email API endpoint
pub const DEFAULT_EMAIL_API_URL: &str = "https://api.resend.com";

const SERVICE: &str = "email";

/// [`EmailApi`] that posts to `{base}/emails` with a bearer key.
#[derive(Debug, Clone)]
pub struct EmailClient {
    api: HttpApi,
}

impl EmailClient {
    pub fn new(config: &ClientConfig, api_key: impl Into<String>) -> Result<Self, UpstreamError> {
        Ok(Self {
            api: HttpApi::new(SERVICE, config, Credentials::Bearer(api_key.into()))?,
        })
    }
}

#[async_trait]
impl EmailApi for EmailClient {
    #[instrument(skip(self, email), fields(subject = %email.subject))]
    async fn send_email(&self, email: &OutboundEmail) -> Result<EmailReceipt, UpstreamError> {
        let url = self.api.endpoint(&["emails"])?;
        let request = self.api.request(Method::POST, url).json(email);

        self.api.execute_json(request).await
    }
}

#[cfg(test)]
#[path = "email_tests.rs"]
mod tests;
