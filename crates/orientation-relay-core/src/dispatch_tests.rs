//! Tests for notification dispatch and HTML rendering.

use super::*;
use crate::guidelines::GuidelineSource;
use std::sync::Mutex;

fn workshop() -> ResolvedGuidelines {
    ResolvedGuidelines {
        name: "Pottery 101".to_string(),
        date: "2025-03-01".to_string(),
        location: "Studio A".to_string(),
        guidelines_html: "<p>Wear clothes that can get <em>muddy</em>.</p>".to_string(),
        duration: Some("3 hours".to_string()),
        what_to_bring: None,
        parking: None,
        reschedule_policy: None,
        faq: None,
        source: GuidelineSource::Product,
    }
}

fn customer() -> CustomerData {
    CustomerData::new("a@b.com", "o1").with_name(Some("Casey Doe".to_string()))
}

#[derive(Default)]
struct MockEmailApi {
    sent: Mutex<Vec<OutboundEmail>>,
    fail_with: Option<UpstreamError>,
}

#[async_trait]
impl EmailApi for MockEmailApi {
    async fn send_email(&self, email: &OutboundEmail) -> Result<EmailReceipt, UpstreamError> {
        self.sent.lock().unwrap().push(email.clone());
        match &self.fail_with {
            Some(err) => Err(err.clone()),
            None => Ok(EmailReceipt {
                id: Some("msg-1".to_string()),
            }),
        }
    }
}

#[derive(Default)]
struct MockAudienceApi {
    calls: Mutex<Vec<String>>,
    members: Mutex<Vec<AudienceMember>>,
    fail_upsert: bool,
}

#[async_trait]
impl AudienceApi for MockAudienceApi {
    async fn upsert_member(
        &self,
        member: &AudienceMember,
    ) -> Result<Option<String>, UpstreamError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("upsert:{}", member.email_address));
        self.members.lock().unwrap().push(member.clone());
        if self.fail_upsert {
            return Err(UpstreamError::Status {
                service: "audience".to_string(),
                status: 400,
                message: "Invalid Resource".to_string(),
            });
        }
        Ok(Some("contact-9".to_string()))
    }

    async fn add_tag(&self, email: &str, tag: &str) -> Result<(), UpstreamError> {
        self.calls.lock().unwrap().push(format!("tag:{}:{}", email, tag));
        Ok(())
    }
}

fn settings(template_id: Option<&str>) -> EmailSettings {
    EmailSettings {
        from_address: "Studio <hello@studio.test>".to_string(),
        template_id: template_id.map(String::from),
    }
}

// ============================================================================
// Email backend
// ============================================================================

mod email {
    use super::*;

    #[tokio::test]
    async fn test_html_send_without_template() {
        let api = Arc::new(MockEmailApi::default());
        let dispatcher = EmailDispatcher::new(api.clone(), settings(None));

        let result = dispatcher.send("a@b.com", &workshop(), &customer()).await.unwrap();

        assert!(result.email_sent());
        assert_eq!(
            result,
            DispatchResult::EmailSent {
                message_id: Some("msg-1".to_string())
            }
        );

        let sent = api.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["a@b.com".to_string()]);
        assert_eq!(sent[0].from, "Studio <hello@studio.test>");
        assert_eq!(sent[0].subject, "Your workshop orientation: Pottery 101");
        assert!(sent[0].template.is_none());
        let html = sent[0].html.as_deref().unwrap();
        assert!(html.contains("<em>muddy</em>"));
        assert!(html.contains("Hi Casey,"));
    }

    #[tokio::test]
    async fn test_template_send_uses_named_variables() {
        let api = Arc::new(MockEmailApi::default());
        let dispatcher = EmailDispatcher::new(api.clone(), settings(Some("tmpl-7")));

        dispatcher.send("a@b.com", &workshop(), &customer()).await.unwrap();

        let sent = api.sent.lock().unwrap();
        assert!(sent[0].html.is_none());
        let template = sent[0].template.as_ref().unwrap();
        assert_eq!(template.id, "tmpl-7");
        assert_eq!(template.variables["workshop_name"], "Pottery 101");
        assert_eq!(template.variables["workshop_date"], "2025-03-01");
        assert_eq!(template.variables["workshop_location"], "Studio A");
        assert_eq!(template.variables["duration"], "3 hours");
        assert_eq!(template.variables["customer_first_name"], "Casey");
        assert_eq!(template.variables["order_id"], "o1");
        assert!(!template.variables.contains_key("parking"));
    }

    #[test]
    fn test_empty_template_id_falls_back_to_html() {
        let dispatcher =
            EmailDispatcher::new(Arc::new(MockEmailApi::default()), settings(Some("")));

        let outbound = dispatcher.compose("a@b.com", &workshop(), &customer());

        assert!(outbound.html.is_some());
        assert!(outbound.template.is_none());
    }

    #[tokio::test]
    async fn test_upstream_error_propagates_unchanged() {
        let api = Arc::new(MockEmailApi {
            fail_with: Some(UpstreamError::Status {
                service: "email".to_string(),
                status: 503,
                message: "busy".to_string(),
            }),
            ..Default::default()
        });
        let dispatcher = EmailDispatcher::new(api, settings(None));

        let err = dispatcher
            .send("a@b.com", &workshop(), &customer())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(503));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_outbound_email_wire_shape() {
        let dispatcher =
            EmailDispatcher::new(Arc::new(MockEmailApi::default()), settings(Some("t1")));
        let outbound = dispatcher.compose("a@b.com", &workshop(), &customer());

        let json = serde_json::to_value(&outbound).unwrap();

        assert_eq!(json["to"], serde_json::json!(["a@b.com"]));
        assert_eq!(json["template"]["id"], "t1");
        assert!(json.get("html").is_none());
    }
}

// ============================================================================
// HTML rendering
// ============================================================================

mod rendering {
    use super::*;

    #[test]
    fn test_plain_text_fields_are_escaped() {
        let mut w = workshop();
        w.name = "Glaze & <Fire>".to_string();
        w.location = "\"Barn\" 'B'".to_string();
        let c = CustomerData::new("a@b.com", "o<1>").with_name(Some("<b>Eve</b>".to_string()));

        let html = render_html(&w, &c);

        assert!(html.contains("Glaze &amp; &lt;Fire&gt;"));
        assert!(html.contains("&quot;Barn&quot; &#39;B&#39;"));
        assert!(html.contains("Hi &lt;b&gt;Eve&lt;/b&gt;,"));
        assert!(html.contains("o&lt;1&gt;"));
        assert!(!html.contains("<Fire>"));
    }

    #[test]
    fn test_optional_rows_only_when_present() {
        let html = render_html(&workshop(), &customer());

        assert!(html.contains("<th align=\"left\">Duration</th><td>3 hours</td>"));
        assert!(!html.contains("Parking"));
        assert!(!html.contains("Frequently asked questions"));
    }

    #[test]
    fn test_greeting_without_name() {
        let html = render_html(&workshop(), &CustomerData::new("a@b.com", "o1"));
        assert!(html.contains("Hi there,"));
    }

    #[test]
    fn test_document_is_self_contained() {
        let html = render_html(&workshop(), &customer());

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.trim_end().ends_with("</html>"));
        assert!(!html.contains("<link"));
    }
}

// ============================================================================
// Sanitizing
// ============================================================================

mod sanitizing {
    use super::*;

    #[test]
    fn test_blocked_elements_are_removed() {
        let input = "<p>Hi</p><script>alert(1)</script><STYLE>p{}</STYLE>\
                     <iframe src=\"https://x.test\"></iframe>\
                     <object data=\"x\"></object><embed src=\"y\">";

        let output = sanitize_rich_text(input);

        assert_eq!(output, "<p>Hi</p>");
    }

    #[test]
    fn test_multiline_script_is_removed() {
        let input = "<p>a</p><script type=\"text/javascript\">\nlet x = 1;\n</script ><p>b</p>";
        assert_eq!(sanitize_rich_text(input), "<p>a</p><p>b</p>");
    }

    #[test]
    fn test_event_handlers_are_removed() {
        let input = r#"<p onclick='x()' onmouseover="y()">t</p>"#;

        assert_eq!(sanitize_rich_text(input), "<p>t</p>");
    }

    #[test]
    fn test_slash_separated_handlers_are_removed() {
        let input = r#"<img src="x"/onerror="alert(1)"><svg/onload=alert(2)><p>ok</p>"#;

        let output = sanitize_rich_text(input);

        assert!(!output.contains("onerror"), "got: {}", output);
        assert!(!output.contains("onload"), "got: {}", output);
        assert!(!output.contains("<img"));
        assert!(!output.contains("<svg"));
        assert!(output.contains("<p>ok</p>"));
    }

    #[test]
    fn test_javascript_urls_are_dropped() {
        let input = r#"<a href="javascript:alert(1)">x</a><a HREF='  javascript:void(0)'>y</a>"#;

        assert_eq!(sanitize_rich_text(input), "<a>x</a><a>y</a>");
    }

    #[test]
    fn test_entity_encoded_javascript_url_is_dropped() {
        let input = r#"<a href="&#106;avascript:alert(1)">x</a>"#;

        let output = sanitize_rich_text(input);

        assert!(!output.to_lowercase().contains("avascript"), "got: {}", output);
        assert_eq!(output, "<a>x</a>");
    }

    #[test]
    fn test_plain_text_resembling_attributes_is_kept() {
        let input = "<p>Check in online = 9am</p>";

        assert_eq!(sanitize_rich_text(input), input);
    }

    #[test]
    fn test_formatting_survives() {
        let input = "<h2>Before you arrive</h2><ul><li><strong>Apron</strong></li></ul>\
                     <a href=\"https://studio.test/map\">Map</a>";
        assert_eq!(sanitize_rich_text(input), input);
    }

    #[test]
    fn test_escape_html_handles_all_special_characters() {
        assert_eq!(escape_html("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
        assert_eq!(escape_html("plain"), "plain");
    }
}

// ============================================================================
// Audience backend
// ============================================================================

mod audience {
    use super::*;

    #[tokio::test]
    async fn test_upserts_then_tags() {
        let api = Arc::new(MockAudienceApi::default());
        let dispatcher = AudienceDispatcher::new(api.clone(), None);

        let result = dispatcher.send("a@b.com", &workshop(), &customer()).await.unwrap();

        assert!(result.contact_tagged());
        assert!(!result.email_sent());
        assert_eq!(
            *api.calls.lock().unwrap(),
            vec![
                "upsert:a@b.com".to_string(),
                "tag:a@b.com:workshop-orientation".to_string()
            ]
        );

        let members = api.members.lock().unwrap();
        assert_eq!(members[0].status_if_new, "subscribed");
        assert_eq!(members[0].merge_fields["FNAME"], "Casey");
        assert_eq!(members[0].merge_fields["WORKSHOP"], "Pottery 101");
    }

    #[tokio::test]
    async fn test_upsert_failure_skips_tagging() {
        let api = Arc::new(MockAudienceApi {
            fail_upsert: true,
            ..Default::default()
        });
        let dispatcher = AudienceDispatcher::new(api.clone(), Some("vip".to_string()));

        let err = dispatcher
            .send("a@b.com", &workshop(), &customer())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(400));
        assert_eq!(*api.calls.lock().unwrap(), vec!["upsert:a@b.com".to_string()]);
    }

    #[test]
    fn test_blank_tag_uses_default() {
        let dispatcher =
            AudienceDispatcher::new(Arc::new(MockAudienceApi::default()), Some("  ".to_string()));
        assert_eq!(dispatcher.tag(), DEFAULT_AUDIENCE_TAG);
        assert_eq!(dispatcher.backend_name(), "audience");
    }
}
