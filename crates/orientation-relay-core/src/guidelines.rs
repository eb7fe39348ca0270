//! # Guideline Resolver
//!
//! Turns a purchased product into the orientation details the customer
//! receives: workshop name, date, location, rich-text guidelines, and a few
//! optional practical notes.
//!
//! Two upstream records can supply the data:
//! - a content-collection item, when the line item (or the product's
//!   `workshop-guidelines` reference field) names one AND a collection is
//!   configured; this branch takes precedence
//! - the product record itself otherwise, preferring its long-form
//!   `email-content` field over the generic `long-description`
//!
//! Missing individual fields fall back to placeholders; only a missing record
//! yields no guidelines at all.

use crate::UpstreamError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Placeholder for name, date, and location
pub const PLACEHOLDER: &str = "TBD";

/// Placeholder for the guidelines body
pub const GUIDELINES_PLACEHOLDER: &str = "<p>Workshop guidelines are coming soon.</p>";

/// Webflow's product type id for service products
pub const SERVICE_PRODUCT_TYPE_ID: &str = "c599e43b1a1c34d5a323aedf75d3adf6";

/// Product field holding the categorical product type id
pub const PRODUCT_TYPE_FIELD: &str = "product-type";

/// Product field holding the list of category ids
pub const CATEGORY_FIELD: &str = "category";

/// Product reference field pointing at a guidelines collection item
pub const GUIDELINES_REFERENCE_FIELD: &str = "workshop-guidelines";

const NAME_FIELDS: &[&str] = &["name"];
const DATE_FIELDS: &[&str] = &["workshop-date", "date"];
const LOCATION_FIELDS: &[&str] = &["location"];
const PRODUCT_BODY_FIELDS: &[&str] = &["email-content", "long-description"];
const CMS_BODY_FIELDS: &[&str] = &["guidelines", "email-content", "long-description"];
const DURATION_FIELDS: &[&str] = &["duration"];
const WHAT_TO_BRING_FIELDS: &[&str] = &["what-to-bring"];
const PARKING_FIELDS: &[&str] = &["parking"];
const RESCHEDULE_FIELDS: &[&str] = &["reschedule-policy"];
const FAQ_FIELDS: &[&str] = &["faq"];

// ============================================================================
// Upstream records
// ============================================================================

/// Product record from the storefront's content API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub id: String,
    #[serde(default)]
    pub field_data: Map<String, Value>,
}

/// Item from a content collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionItem {
    pub id: String,
    #[serde(default)]
    pub field_data: Map<String, Value>,
}

/// Read contract for the storefront's content API.
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// Fetch a product by id within a site
    async fn get_product(
        &self,
        site_id: &str,
        product_id: &str,
    ) -> Result<ProductRecord, UpstreamError>;

    /// Fetch an item from a content collection
    async fn get_collection_item(
        &self,
        collection_id: &str,
        item_id: &str,
    ) -> Result<CollectionItem, UpstreamError>;
}

// ============================================================================
// Resolved guidelines
// ============================================================================

/// Which upstream record supplied the guidelines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuidelineSource {
    Cms,
    Product,
}

/// Orientation details for one workshop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedGuidelines {
    pub name: String,
    pub date: String,
    pub location: String,
    pub guidelines_html: String,
    pub duration: Option<String>,
    pub what_to_bring: Option<String>,
    pub parking: Option<String>,
    pub reschedule_policy: Option<String>,
    pub faq: Option<String>,
    pub source: GuidelineSource,
}

impl ResolvedGuidelines {
    fn from_fields(
        fields: &Map<String, Value>,
        body_fields: &[&str],
        fallback_name: Option<&str>,
        source: GuidelineSource,
    ) -> Self {
        Self {
            name: text(fields, NAME_FIELDS)
                .or_else(|| fallback_name.map(str::to_string))
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
            date: text(fields, DATE_FIELDS).unwrap_or_else(|| PLACEHOLDER.to_string()),
            location: text(fields, LOCATION_FIELDS).unwrap_or_else(|| PLACEHOLDER.to_string()),
            guidelines_html: text(fields, body_fields)
                .unwrap_or_else(|| GUIDELINES_PLACEHOLDER.to_string()),
            duration: text(fields, DURATION_FIELDS),
            what_to_bring: text(fields, WHAT_TO_BRING_FIELDS),
            parking: text(fields, PARKING_FIELDS),
            reschedule_policy: text(fields, RESCHEDULE_FIELDS),
            faq: text(fields, FAQ_FIELDS),
            source,
        }
    }
}

/// What to resolve guidelines for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuidelineRequest {
    pub product_id: String,
    pub cms_item_id: Option<String>,
    /// Display name used when the upstream record has none
    pub fallback_name: Option<String>,
}

impl GuidelineRequest {
    pub fn new(product_id: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            cms_item_id: None,
            fallback_name: None,
        }
    }

    pub fn with_cms_item_id(mut self, cms_item_id: impl Into<String>) -> Self {
        self.cms_item_id = Some(cms_item_id.into());
        self
    }

    pub fn with_fallback_name(mut self, name: impl Into<String>) -> Self {
        self.fallback_name = Some(name.into());
        self
    }
}

// ============================================================================
// Workshop classification
// ============================================================================

/// Decides whether a product is a bookable workshop.
///
/// Either signal is sufficient: the product type id matches, or the product's
/// category list contains the workshop category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkshopClassifier {
    pub type_id: Option<String>,
    pub category_id: Option<String>,
}

impl Default for WorkshopClassifier {
    fn default() -> Self {
        Self {
            type_id: Some(SERVICE_PRODUCT_TYPE_ID.to_string()),
            category_id: None,
        }
    }
}

impl WorkshopClassifier {
    pub fn new(type_id: Option<String>, category_id: Option<String>) -> Self {
        Self {
            type_id,
            category_id,
        }
    }

    /// Classify a fetched product
    pub fn is_workshop_product(&self, product: &ProductRecord) -> bool {
        let type_matches = self.type_id.as_deref().is_some_and(|type_id| {
            product
                .field_data
                .get(PRODUCT_TYPE_FIELD)
                .and_then(Value::as_str)
                .is_some_and(|value| value == type_id)
        });

        let category_matches = self.category_id.as_deref().is_some_and(|category_id| {
            match product.field_data.get(CATEGORY_FIELD) {
                Some(Value::Array(categories)) => categories
                    .iter()
                    .any(|c| c.as_str().is_some_and(|c| c == category_id)),
                Some(Value::String(single)) => single == category_id,
                _ => false,
            }
        });

        type_matches || category_matches
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolves workshop guidelines through the content API.
#[derive(Clone)]
pub struct GuidelineResolver {
    content: Arc<dyn ContentApi>,
    site_id: String,
    collection_id: Option<String>,
}

impl GuidelineResolver {
    /// Create a resolver for a site, optionally backed by a guidelines collection
    pub fn new(
        content: Arc<dyn ContentApi>,
        site_id: impl Into<String>,
        collection_id: Option<String>,
    ) -> Self {
        Self {
            content,
            site_id: site_id.into(),
            collection_id: collection_id.filter(|id| !id.is_empty()),
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    /// Fetch the product record for a line item
    pub async fn fetch_product(&self, product_id: &str) -> Result<ProductRecord, UpstreamError> {
        self.content.get_product(&self.site_id, product_id).await
    }

    /// Resolve guidelines, fetching whatever records are needed.
    ///
    /// Returns `Ok(None)` when the record that should supply the guidelines
    /// does not exist upstream.
    #[instrument(skip(self), fields(site_id = %self.site_id))]
    pub async fn resolve(
        &self,
        request: &GuidelineRequest,
    ) -> Result<Option<ResolvedGuidelines>, UpstreamError> {
        if let (Some(collection_id), Some(item_id)) =
            (self.collection_id.as_deref(), request.cms_item_id.as_deref())
        {
            return self.resolve_from_collection(collection_id, item_id, request).await;
        }

        let product = match self.fetch_product(&request.product_id).await {
            Ok(product) => product,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        self.resolve_for_product(&product, request).await
    }

    /// Resolve guidelines for an already fetched product.
    ///
    /// Only performs an upstream call when the collection branch applies.
    pub async fn resolve_for_product(
        &self,
        product: &ProductRecord,
        request: &GuidelineRequest,
    ) -> Result<Option<ResolvedGuidelines>, UpstreamError> {
        let cms_item_id = request
            .cms_item_id
            .clone()
            .or_else(|| text(&product.field_data, &[GUIDELINES_REFERENCE_FIELD]));

        if let (Some(collection_id), Some(item_id)) =
            (self.collection_id.as_deref(), cms_item_id.as_deref())
        {
            return self.resolve_from_collection(collection_id, item_id, request).await;
        }

        if product.field_data.is_empty() {
            return Ok(None);
        }

        debug!(product_id = %product.id, "Resolved guidelines from product record");
        Ok(Some(ResolvedGuidelines::from_fields(
            &product.field_data,
            PRODUCT_BODY_FIELDS,
            request.fallback_name.as_deref(),
            GuidelineSource::Product,
        )))
    }

    async fn resolve_from_collection(
        &self,
        collection_id: &str,
        item_id: &str,
        request: &GuidelineRequest,
    ) -> Result<Option<ResolvedGuidelines>, UpstreamError> {
        let item = match self.content.get_collection_item(collection_id, item_id).await {
            Ok(item) => item,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        if item.field_data.is_empty() {
            return Ok(None);
        }

        debug!(item_id = %item.id, "Resolved guidelines from collection item");
        Ok(Some(ResolvedGuidelines::from_fields(
            &item.field_data,
            CMS_BODY_FIELDS,
            request.fallback_name.as_deref(),
            GuidelineSource::Cms,
        )))
    }
}

impl std::fmt::Debug for GuidelineResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuidelineResolver")
            .field("site_id", &self.site_id)
            .field("collection_id", &self.collection_id)
            .finish()
    }
}

/// First non-empty textual value among `keys`
fn text(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| fields.get(*key))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

#[cfg(test)]
#[path = "guidelines_tests.rs"]
mod tests;
