//! Tests for the fan-out processor.

use super::*;
use crate::guidelines::{
    CollectionItem, ContentApi, ProductRecord, ResolvedGuidelines, SERVICE_PRODUCT_TYPE_ID,
};
use crate::idempotency::MemoryIdempotencyCache;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Test doubles
// ============================================================================

#[derive(Default)]
struct MockContent {
    products: HashMap<String, ProductRecord>,
    /// Number of leading product reads that fail with 503
    transient_failures: Mutex<u32>,
    product_reads: Mutex<u32>,
}

impl MockContent {
    fn with_product(mut self, id: &str, fields: Value) -> Self {
        self.products.insert(
            id.to_string(),
            ProductRecord {
                id: id.to_string(),
                field_data: fields.as_object().cloned().unwrap_or_default(),
            },
        );
        self
    }

    fn with_workshop(self, id: &str, name: &str) -> Self {
        self.with_product(
            id,
            json!({
                "name": name,
                "product-type": SERVICE_PRODUCT_TYPE_ID,
                "workshop-date": "2025-03-01"
            }),
        )
    }
}

#[async_trait]
impl ContentApi for MockContent {
    async fn get_product(
        &self,
        _site_id: &str,
        product_id: &str,
    ) -> Result<ProductRecord, UpstreamError> {
        *self.product_reads.lock().unwrap() += 1;
        {
            let mut remaining = self.transient_failures.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(status_error("content", 503));
            }
        }
        self.products
            .get(product_id)
            .cloned()
            .ok_or_else(|| status_error("content", 404))
    }

    async fn get_collection_item(
        &self,
        _collection_id: &str,
        _item_id: &str,
    ) -> Result<CollectionItem, UpstreamError> {
        Err(status_error("content", 404))
    }
}

#[derive(Default)]
struct RecordingDispatcher {
    sent: Mutex<Vec<(String, String)>>,
    /// Product names whose dispatch fails with the given status
    failures: HashMap<String, u16>,
    audience: bool,
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn send(
        &self,
        email: &str,
        workshop: &ResolvedGuidelines,
        _customer: &CustomerData,
    ) -> Result<DispatchResult, UpstreamError> {
        self.sent
            .lock()
            .unwrap()
            .push((email.to_string(), workshop.name.clone()));

        if let Some(status) = self.failures.get(&workshop.name) {
            return Err(status_error("email", *status));
        }

        if self.audience {
            Ok(DispatchResult::ContactTagged {
                contact_id: None,
                tag: "workshop-orientation".to_string(),
            })
        } else {
            Ok(DispatchResult::EmailSent { message_id: None })
        }
    }

    fn backend_name(&self) -> &'static str {
        "recording"
    }
}

impl RecordingDispatcher {
    fn sent_names(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, name)| name.clone())
            .collect()
    }
}

fn status_error(service: &str, status: u16) -> UpstreamError {
    UpstreamError::Status {
        service: service.to_string(),
        status,
        message: "test".to_string(),
    }
}

struct Harness {
    processor: FanOutProcessor,
    content: Arc<MockContent>,
    dispatcher: Arc<RecordingDispatcher>,
    cache: Arc<MemoryIdempotencyCache>,
}

fn harness_with_collection(
    content: MockContent,
    dispatcher: RecordingDispatcher,
    collection_id: Option<&str>,
) -> Harness {
    let content = Arc::new(content);
    let dispatcher = Arc::new(dispatcher);
    let cache = Arc::new(MemoryIdempotencyCache::new());

    let resolver = GuidelineResolver::new(
        content.clone(),
        "site-1",
        collection_id.map(String::from),
    );
    let processor = FanOutProcessor::new(resolver, dispatcher.clone(), cache.clone())
        .with_retry_policy(
            RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5))
                .without_jitter(),
        );

    Harness {
        processor,
        content,
        dispatcher,
        cache,
    }
}

fn harness(content: MockContent, dispatcher: RecordingDispatcher) -> Harness {
    harness_with_collection(content, dispatcher, None)
}

fn customer() -> CustomerData {
    CustomerData::new("a@b.com", "o1")
}

// ============================================================================
// Item outcomes
// ============================================================================

mod outcomes {
    use super::*;

    #[tokio::test]
    async fn test_workshop_item_is_dispatched_and_recorded() {
        let h = harness(
            MockContent::default().with_workshop("p1", "Pottery 101"),
            RecordingDispatcher::default(),
        );

        let results = h.processor.process(&customer(), &[LineItem::new("p1")]).await;

        assert_eq!(
            results,
            vec![ProcessingResult {
                product_id: "p1".to_string(),
                outcome: ItemOutcome::Success {
                    email_sent: true,
                    workshop_name: "Pottery 101".to_string(),
                    contact_tagged: None,
                },
            }]
        );
        assert_eq!(h.dispatcher.sent_names(), vec!["Pottery 101"]);
        assert!(h
            .cache
            .has(&IdempotencyKey::derive("o1", "a@b.com", "p1"))
            .await);
    }

    #[tokio::test]
    async fn test_non_workshop_item_is_skipped_without_dispatch() {
        let h = harness(
            MockContent::default()
                .with_product("p1", json!({ "name": "Mug", "product-type": "physical" })),
            RecordingDispatcher::default(),
        );

        let results = h.processor.process(&customer(), &[LineItem::new("p1")]).await;

        assert_eq!(results, vec![ProcessingResult::skipped("p1", NOT_A_WORKSHOP)]);
        assert!(h.dispatcher.sent_names().is_empty());
        assert!(h.cache.is_empty());
    }

    #[tokio::test]
    async fn test_missing_guidelines_record_is_an_error() {
        let h = harness_with_collection(
            MockContent::default().with_product(
                "p1",
                json!({ "product-type": SERVICE_PRODUCT_TYPE_ID, "workshop-guidelines": "gone" }),
            ),
            RecordingDispatcher::default(),
            Some("col-1"),
        );

        let results = h.processor.process(&customer(), &[LineItem::new("p1")]).await;

        assert_eq!(results, vec![ProcessingResult::error("p1", NO_GUIDELINES)]);
        assert!(h.dispatcher.sent_names().is_empty());
    }

    #[tokio::test]
    async fn test_item_without_product_id_is_an_error() {
        let h = harness(MockContent::default(), RecordingDispatcher::default());
        let item = LineItem {
            product_id: None,
            name: Some("Mystery".to_string()),
            quantity: None,
            price: None,
            cms_item_id: None,
        };

        let results = h.processor.process(&customer(), &[item]).await;

        assert_eq!(results, vec![ProcessingResult::error("", MISSING_PRODUCT_ID)]);
        assert_eq!(*h.content.product_reads.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_audience_backend_reports_contact_tagged() {
        let h = harness(
            MockContent::default().with_workshop("p1", "Pottery 101"),
            RecordingDispatcher {
                audience: true,
                ..Default::default()
            },
        );

        let results = h.processor.process(&customer(), &[LineItem::new("p1")]).await;

        assert_eq!(
            results[0].outcome,
            ItemOutcome::Success {
                email_sent: false,
                workshop_name: "Pottery 101".to_string(),
                contact_tagged: Some(true),
            }
        );
    }
}

// ============================================================================
// Idempotency and isolation
// ============================================================================

mod batch {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_submission_dispatches_once() {
        let h = harness(
            MockContent::default().with_workshop("p1", "Pottery 101"),
            RecordingDispatcher::default(),
        );
        let items = [LineItem::new("p1")];

        let first = h.processor.process(&customer(), &items).await;
        let second = h.processor.process(&customer(), &items).await;

        assert_eq!(first[0].status(), "success");
        assert_eq!(second, vec![ProcessingResult::skipped("p1", ALREADY_PROCESSED)]);
        assert_eq!(h.dispatcher.sent_names().len(), 1);
    }

    #[tokio::test]
    async fn test_same_product_for_different_order_is_not_a_duplicate() {
        let h = harness(
            MockContent::default().with_workshop("p1", "Pottery 101"),
            RecordingDispatcher::default(),
        );
        let items = [LineItem::new("p1")];

        h.processor.process(&customer(), &items).await;
        let other = h
            .processor
            .process(&CustomerData::new("a@b.com", "o2"), &items)
            .await;

        assert_eq!(other[0].status(), "success");
        assert_eq!(h.dispatcher.sent_names().len(), 2);
    }

    /// One failing item does not affect the items around it.
    #[tokio::test]
    async fn test_failure_is_isolated_to_its_item() {
        let mut failures = HashMap::new();
        failures.insert("Broken".to_string(), 400);
        let h = harness(
            MockContent::default()
                .with_workshop("p1", "First")
                .with_workshop("p2", "Broken")
                .with_workshop("p3", "Third"),
            RecordingDispatcher {
                failures,
                ..Default::default()
            },
        );

        let results = h
            .processor
            .process(
                &customer(),
                &[LineItem::new("p1"), LineItem::new("p2"), LineItem::new("p3")],
            )
            .await;

        let statuses: Vec<_> = results.iter().map(ProcessingResult::status).collect();
        assert_eq!(statuses, vec!["success", "error", "success"]);
        assert_eq!(results[1].product_id, "p2");
        // 400 is not retryable, so the broken item is attempted once
        assert_eq!(h.dispatcher.sent_names(), vec!["First", "Broken", "Third"]);
        assert!(!h
            .cache
            .has(&IdempotencyKey::derive("o1", "a@b.com", "p2"))
            .await);
    }

    #[tokio::test]
    async fn test_failed_item_is_retried_on_redelivery() {
        let mut failures = HashMap::new();
        failures.insert("Pottery 101".to_string(), 422);
        let h = harness(
            MockContent::default().with_workshop("p1", "Pottery 101"),
            RecordingDispatcher {
                failures,
                ..Default::default()
            },
        );
        let items = [LineItem::new("p1")];

        let first = h.processor.process(&customer(), &items).await;
        let second = h.processor.process(&customer(), &items).await;

        assert_eq!(first[0].status(), "error");
        assert_eq!(second[0].status(), "error");
        assert_eq!(h.dispatcher.sent_names().len(), 2);
    }

    #[tokio::test]
    async fn test_transient_product_fetch_is_retried() {
        let content = MockContent::default().with_workshop("p1", "Pottery 101");
        *content.transient_failures.lock().unwrap() = 2;
        let h = harness(content, RecordingDispatcher::default());

        let results = h.processor.process(&customer(), &[LineItem::new("p1")]).await;

        assert_eq!(results[0].status(), "success");
        assert_eq!(*h.content.product_reads.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_missing_product_reports_upstream_message() {
        let h = harness(MockContent::default(), RecordingDispatcher::default());

        let results = h.processor.process(&customer(), &[LineItem::new("ghost")]).await;

        match &results[0].outcome {
            ItemOutcome::Error { error } => assert!(error.contains("404"), "got: {}", error),
            other => panic!("expected error outcome, got {:?}", other),
        }
    }
}

// ============================================================================
// Wire format
// ============================================================================

mod wire_format {
    use super::*;

    #[test]
    fn test_success_serializes_flat() {
        let result = ProcessingResult::success(
            "p1",
            "Pottery 101",
            &DispatchResult::EmailSent { message_id: None },
        );

        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "productId": "p1",
                "status": "success",
                "emailSent": true,
                "workshopName": "Pottery 101"
            })
        );
    }

    #[test]
    fn test_skipped_and_error_serialize_flat() {
        assert_eq!(
            serde_json::to_value(ProcessingResult::skipped("p1", NOT_A_WORKSHOP)).unwrap(),
            json!({ "productId": "p1", "status": "skipped", "reason": "Not a workshop product" })
        );
        assert_eq!(
            serde_json::to_value(ProcessingResult::error("p2", "boom")).unwrap(),
            json!({ "productId": "p2", "status": "error", "error": "boom" })
        );
    }

    #[test]
    fn test_result_deserializes_from_wire_shape() {
        let parsed: ProcessingResult = serde_json::from_value(json!({
            "productId": "p1",
            "status": "skipped",
            "reason": "Already processed"
        }))
        .unwrap();

        assert_eq!(parsed, ProcessingResult::skipped("p1", ALREADY_PROCESSED));
    }
}
