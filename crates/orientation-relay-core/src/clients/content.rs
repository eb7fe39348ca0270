//! Storefront content API client (product and collection item reads).

use super::{ClientConfig, Credentials, HttpApi};
use crate::guidelines::{CollectionItem, ContentApi, ProductRecord};
use crate::UpstreamError;
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, instrument};

/// Production content API endpoint
pub const DEFAULT_CONTENT_API_URL: &str = "https://api.webflow.com/v2";

const SERVICE: &str = "content";

/// Product reads wrap the record together with its SKUs
#[derive(Debug, Deserialize)]
struct ProductEnvelope {
    product: ProductRecord,
}

/// [`ContentApi`] over HTTP with a bearer token.
#[derive(Debug, Clone)]
pub struct ContentClient {
    api: HttpApi,
}

impl ContentClient {
    /// # Errors
    ///
    /// Returns [`UpstreamError::Configuration`] for an invalid base URL.
    pub fn new(config: &ClientConfig, token: impl Into<String>) -> Result<Self, UpstreamError> {
        Ok(Self {
            api: HttpApi::new(SERVICE, config, Credentials::Bearer(token.into()))?,
        })
    }
}

#[async_trait]
impl ContentApi for ContentClient {
    #[instrument(skip(self))]
    async fn get_product(
        &self,
        site_id: &str,
        product_id: &str,
    ) -> Result<ProductRecord, UpstreamError> {
        let url = self
            .api
            .endpoint(&["sites", site_id, "products", product_id])?;
        debug!(url = %url, "Fetching product");

        let envelope: ProductEnvelope = self
            .api
            .execute_json(self.api.request(Method::GET, url))
            .await?;
        Ok(envelope.product)
    }

    #[instrument(skip(self))]
    async fn get_collection_item(
        &self,
        collection_id: &str,
        item_id: &str,
    ) -> Result<CollectionItem, UpstreamError> {
        let url = self
            .api
            .endpoint(&["collections", collection_id, "items", item_id])?;
        debug!(url = %url, "Fetching collection item");

        self.api
            .execute_json(self.api.request(Method::GET, url))
            .await
    }
}

#[cfg(test)]
#[path = "content_tests.rs"]
mod tests;
