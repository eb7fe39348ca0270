//! Tests for the audience API client.

use super::*;
use serde_json::{json, Map};
use wiremock::matchers::{body_json, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn member() -> AudienceMember {
    let mut merge_fields = Map::new();
    merge_fields.insert("FNAME".to_string(), json!("Casey"));
    AudienceMember {
        email_address: "A@B.com".to_string(),
        status_if_new: "subscribed".to_string(),
        merge_fields,
    }
}

async fn client(server: &MockServer) -> AudienceClient {
    AudienceClient::new(&ClientConfig::new(server.uri()), "key-us21", "aud-1").unwrap()
}

#[tokio::test]
async fn test_upsert_member_puts_by_lowercased_email() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/lists/aud-1/members/a@b.com"))
        .and(header_exists("Authorization"))
        .and(body_json(json!({
            "email_address": "A@B.com",
            "status_if_new": "subscribed",
            "merge_fields": { "FNAME": "Casey" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "contact-1",
            "email_address": "a@b.com",
            "status": "subscribed"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = client(&server).await.upsert_member(&member()).await.unwrap();

    assert_eq!(id.as_deref(), Some("contact-1"));
}

#[tokio::test]
async fn test_add_tag_posts_active_tag() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/lists/aud-1/members/a@b.com/tags"))
        .and(body_json(json!({
            "tags": [{ "name": "workshop-orientation", "status": "active" }]
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .await
        .add_tag("a@b.com", "workshop-orientation")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_server_error_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = client(&server).await.upsert_member(&member()).await.unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert!(err.is_retryable());
}

#[test]
fn test_base_url_from_key() {
    assert_eq!(
        audience_base_url_from_key("0123abcd-us6").as_deref(),
        Some("https://us6.api.mailchimp.com/3.0")
    );
    assert_eq!(audience_base_url_from_key("nodatacenter"), None);
    assert_eq!(audience_base_url_from_key("key-us 6"), None);
}
