//! Order payload normalization.
//!
//! The storefront has delivered order events in more than one envelope shape
//! over time: a flat order object, or the same object nested one level under
//! `payload`. Field names also vary between shapes (`customer.email` versus
//! `customerInfo.email`, `lineItems` versus `purchasedItems`).
//!
//! Each field is read through an ordered accessor table; the first path that
//! yields a usable value wins. The tables are public so their precedence is
//! part of the tested contract.

use crate::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A path of object keys from the order root to a field
pub type FieldPath = &'static [&'static str];

/// Envelope key that wraps the order in the nested shape
pub const ENVELOPE_KEY: &str = "payload";

/// Customer email locations, highest precedence first
pub const CUSTOMER_EMAIL_PATHS: &[FieldPath] =
    &[&["customer", "email"], &["customerInfo", "email"]];

/// Customer display name locations, highest precedence first
pub const CUSTOMER_NAME_PATHS: &[FieldPath] =
    &[&["customer", "name"], &["customerInfo", "fullName"]];

/// Line item list locations, highest precedence first
pub const LINE_ITEM_PATHS: &[FieldPath] = &[&["lineItems"], &["purchasedItems"]];

/// Order identifier locations, highest precedence first
pub const ORDER_ID_PATHS: &[FieldPath] = &[&["orderId"], &["id"]];

/// Placeholder used in log lines when the order id is absent
pub const UNKNOWN_ORDER_ID: &str = "unknown";

/// One purchased product within an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: Option<String>,

    /// Display name used when the product record has none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Value>,

    /// Explicit content-collection record describing this workshop
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cms_item_id: Option<String>,
}

impl LineItem {
    /// Create a line item for a product id
    pub fn new(product_id: impl Into<String>) -> Self {
        Self {
            product_id: Some(product_id.into()),
            name: None,
            quantity: None,
            price: None,
            cms_item_id: None,
        }
    }

    /// Set the fallback display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the explicit collection record id
    pub fn with_cms_item_id(mut self, cms_item_id: impl Into<String>) -> Self {
        self.cms_item_id = Some(cms_item_id.into());
        self
    }

    /// Read a line item from one element of the order's item list.
    ///
    /// Identifiers may arrive as strings or numbers; both are accepted.
    pub fn from_value(value: &Value) -> Self {
        Self {
            product_id: first_string(value, &[&["productId"], &["product_id"]]),
            name: first_string(value, &[&["name"], &["productName"]]),
            quantity: first_value(value, &[&["quantity"], &["count"]]),
            price: first_value(value, &[&["price"], &["rowTotal"]]),
            cms_item_id: first_string(value, &[&["cmsItemId"], &["cms_item_id"]]),
        }
    }
}

/// Canonical view of an inbound order event.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedOrder {
    /// Absent in some historical shapes; the pipeline rejects such orders
    pub order_id: Option<String>,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub line_items: Vec<LineItem>,
    /// The unwrapped order object
    pub order_data: Value,
}

impl NormalizedOrder {
    /// Order id for log lines, `"unknown"` when absent
    pub fn order_id_for_logging(&self) -> &str {
        self.order_id.as_deref().unwrap_or(UNKNOWN_ORDER_ID)
    }
}

/// Normalize a parsed webhook body into a [`NormalizedOrder`].
///
/// # Errors
///
/// - [`ValidationError::NotAnObject`] when the body is not a JSON object
/// - [`ValidationError::InvalidCustomerEmail`] when no email path yields a
///   string containing `@`
/// - [`ValidationError::NoLineItems`] when no item path yields a non-empty list
pub fn normalize(parsed: &Value) -> Result<NormalizedOrder, ValidationError> {
    let order = unwrap_envelope(parsed)?;

    let customer_email = CUSTOMER_EMAIL_PATHS
        .iter()
        .filter_map(|path| lookup(order, path).and_then(Value::as_str))
        .map(str::trim)
        .find(|email| email.contains('@'))
        .ok_or(ValidationError::InvalidCustomerEmail)?
        .to_string();

    let line_items = LINE_ITEM_PATHS
        .iter()
        .filter_map(|path| lookup(order, path).and_then(Value::as_array))
        .find(|items| !items.is_empty())
        .ok_or(ValidationError::NoLineItems)?
        .iter()
        .map(LineItem::from_value)
        .collect();

    Ok(NormalizedOrder {
        order_id: first_string(order, ORDER_ID_PATHS),
        customer_email,
        customer_name: first_string(order, CUSTOMER_NAME_PATHS),
        line_items,
        order_data: order.clone(),
    })
}

/// Select the order object, preferring the nested `payload` envelope.
fn unwrap_envelope(parsed: &Value) -> Result<&Value, ValidationError> {
    let root = parsed.as_object().ok_or(ValidationError::NotAnObject)?;

    match root.get(ENVELOPE_KEY) {
        Some(nested) if nested.is_object() => Ok(nested),
        _ => Ok(parsed),
    }
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(value, |current, key| current.as_object()?.get(*key))
}

fn first_value(value: &Value, paths: &[FieldPath]) -> Option<Value> {
    paths
        .iter()
        .filter_map(|path| lookup(value, path))
        .find(|v| !v.is_null())
        .cloned()
}

fn first_string(value: &Value, paths: &[FieldPath]) -> Option<String> {
    paths
        .iter()
        .filter_map(|path| lookup(value, path))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;
