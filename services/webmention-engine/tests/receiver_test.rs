// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! End-to-end receiver tests against a mock source server.

use http::{Method, StatusCode};
use serde_json::json;
use std::sync::Arc;
use url::Url;
use webmention_engine::{
    config::ReceiverConfig,
    extension::{ExtensionRegistry, MentionKind, COMMENT_DEFINITION},
    receiver::{InboundRequest, ReceiveError, ReceiveOutcome, Receiver},
    store::{InMemoryStore, MentionQuery, MentionStore},
    verifier::VerifyError,
};
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TARGET: &str = "https://a.example/p";

fn form(pairs: &[(&str, &str)]) -> String {
    let mut s = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        s.append_pair(k, v);
    }
    s.finish()
}

fn request(body: &str) -> InboundRequest<'_> {
    InboundRequest {
        method: Method::POST,
        content_type: Some("application/x-www-form-urlencoded"),
        body: body.as_bytes(),
    }
}

fn relaxed() -> ReceiverConfig {
    ReceiverConfig {
        require_attribute: None,
        ..Default::default()
    }
}

async fn serve(server: &MockServer, route: &str, response: ResponseTemplate) -> String {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
    format!("{}{}", server.uri(), route)
}

#[tokio::test]
async fn test_html_source_is_accepted_and_stored() {
    let server = MockServer::start().await;
    let source = serve(
        &server,
        "/post",
        ResponseTemplate::new(200).set_body_raw(
            format!(r#"<html><body><p>Nice: <a href="{TARGET}">link</a></p></body></html>"#),
            "text/html; charset=utf-8",
        ),
    )
    .await;

    let store = Arc::new(InMemoryStore::new());
    let receiver = Receiver::new(relaxed(), store.clone()).unwrap();

    let body = form(&[("source", source.as_str()), ("target", TARGET)]);
    let outcome = receiver.receive(request(&body)).await.unwrap();
    assert!(matches!(outcome, ReceiveOutcome::Accepted(ref m) if m.target.as_str() == TARGET));

    let rows = store.list(&MentionQuery::default()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].source, source);
    assert_eq!(rows[0].kind, MentionKind::Basic.ordinal());
}

#[tokio::test]
async fn test_source_fetch_sends_user_agent_and_accept() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/post"))
        .and(header("user-agent", "test-agent (Webmention)"))
        .and(header_exists("accept"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(TARGET, "text/plain"))
        .expect(1)
        .mount(&server)
        .await;

    let receiver = Receiver::new(
        ReceiverConfig {
            user_agent: "test-agent (Webmention)".to_string(),
            ..Default::default()
        },
        Arc::new(InMemoryStore::new()),
    )
    .unwrap();

    let source = format!("{}/post", server.uri());
    let body = form(&[("source", source.as_str()), ("target", TARGET)]);
    assert!(receiver.receive(request(&body)).await.is_ok());

    let received = server.received_requests().await.unwrap();
    let accept = received[0]
        .headers
        .get("accept")
        .and_then(|v| v.to_str().ok());
    assert_eq!(accept, Some("text/html, application/json, text/plain"));
}

#[tokio::test]
async fn test_required_attribute_is_enforced() {
    let server = MockServer::start().await;
    let plain = serve(
        &server,
        "/plain-link",
        ResponseTemplate::new(200)
            .set_body_raw(format!(r#"<a href="{TARGET}">x</a>"#), "text/html"),
    )
    .await;
    let marked = serve(
        &server,
        "/marked-link",
        ResponseTemplate::new(200)
            .set_body_raw(format!(r#"<a webmention href="{TARGET}">x</a>"#), "text/html"),
    )
    .await;

    let receiver = Receiver::new(ReceiverConfig::default(), Arc::new(InMemoryStore::new())).unwrap();

    let body = form(&[("source", plain.as_str()), ("target", TARGET)]);
    let err = receiver.receive(request(&body)).await.unwrap_err();
    assert!(matches!(err, ReceiveError::TargetNotFound { ref content_type } if content_type == "text/html"));

    let body = form(&[("source", marked.as_str()), ("target", TARGET)]);
    assert!(receiver.receive(request(&body)).await.is_ok());
}

#[tokio::test]
async fn test_plain_text_source() {
    let server = MockServer::start().await;
    let linking = serve(
        &server,
        "/linking.txt",
        ResponseTemplate::new(200).set_body_raw(format!("see {TARGET} for more"), "text/plain"),
    )
    .await;
    let unrelated = serve(
        &server,
        "/unrelated.txt",
        ResponseTemplate::new(200).set_body_raw("nothing to see", "text/plain"),
    )
    .await;

    let receiver = Receiver::new(relaxed(), Arc::new(InMemoryStore::new())).unwrap();

    let body = form(&[("source", linking.as_str()), ("target", TARGET)]);
    assert!(receiver.receive(request(&body)).await.is_ok());

    let body = form(&[("source", unrelated.as_str()), ("target", TARGET)]);
    let err = receiver.receive(request(&body)).await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    assert!(err.to_string().contains("text/plain"));
}

#[tokio::test]
async fn test_json_source_and_malformed_json() {
    let server = MockServer::start().await;
    let good = serve(
        &server,
        "/good.json",
        ResponseTemplate::new(200).set_body_json(json!({"inReplyTo": [{"url": TARGET}]})),
    )
    .await;
    let bad = serve(
        &server,
        "/bad.json",
        ResponseTemplate::new(200).set_body_raw("{broken", "application/json"),
    )
    .await;

    let receiver = Receiver::new(relaxed(), Arc::new(InMemoryStore::new())).unwrap();

    let body = form(&[("source", good.as_str()), ("target", TARGET)]);
    assert!(receiver.receive(request(&body)).await.is_ok());

    let body = form(&[("source", bad.as_str()), ("target", TARGET)]);
    let err = receiver.receive(request(&body)).await.unwrap_err();
    assert!(matches!(err, ReceiveError::Verify(VerifyError::MalformedJson(_))));
}

#[tokio::test]
async fn test_unsupported_and_custom_content_types() {
    let server = MockServer::start().await;
    let source = serve(
        &server,
        "/doc",
        ResponseTemplate::new(200).set_body_raw(TARGET, "application/x-custom"),
    )
    .await;
    let body = form(&[("source", source.as_str()), ("target", TARGET)]);

    let receiver = Receiver::new(relaxed(), Arc::new(InMemoryStore::new())).unwrap();
    let err = receiver.receive(request(&body)).await.unwrap_err();
    assert!(matches!(
        err,
        ReceiveError::Verify(VerifyError::UnsupportedContentType(ref ct)) if ct == "application/x-custom"
    ));

    let check = |content_type: &str, body: &[u8], target: &Url| {
        content_type == "application/x-custom" && body == target.as_str().as_bytes()
    };
    let receiver = Receiver::new(relaxed(), Arc::new(InMemoryStore::new()))
        .unwrap()
        .with_custom_check(Arc::new(check));
    assert!(receiver.receive(request(&body)).await.is_ok());
}

#[tokio::test]
async fn test_gone_source_deletes_existing_mention() {
    let server = MockServer::start().await;
    let source = format!("{}/post", server.uri());

    let store = Arc::new(InMemoryStore::new());
    let receiver = Receiver::new(relaxed(), store.clone()).unwrap();
    let body = form(&[("source", source.as_str()), ("target", TARGET)]);

    {
        let _guard = Mock::given(method("GET"))
            .and(path("/post"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(TARGET, "text/plain"))
            .mount_as_scoped(&server)
            .await;
        receiver.receive(request(&body)).await.unwrap();
    }
    assert_eq!(store.list(&MentionQuery::default()).await.unwrap().len(), 1);

    Mock::given(method("GET"))
        .and(path("/post"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let outcome = receiver.receive(request(&body)).await.unwrap();
    assert!(matches!(outcome, ReceiveOutcome::Deleted { .. }));
    assert!(store.list(&MentionQuery::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_removed_link_deletes_existing_mention() {
    let server = MockServer::start().await;
    let source = format!("{}/post", server.uri());

    let store = Arc::new(InMemoryStore::new());
    let receiver = Receiver::new(relaxed(), store.clone()).unwrap();
    let body = form(&[("source", source.as_str()), ("target", TARGET)]);

    {
        let _guard = Mock::given(method("GET"))
            .and(path("/post"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(TARGET, "text/plain"))
            .mount_as_scoped(&server)
            .await;
        receiver.receive(request(&body)).await.unwrap();
    }

    Mock::given(method("GET"))
        .and(path("/post"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("edited, no link", "text/plain"))
        .mount(&server)
        .await;

    let err = receiver.receive(request(&body)).await.unwrap_err();
    assert!(matches!(err, ReceiveError::TargetNotFound { .. }));
    assert!(store.list(&MentionQuery::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_source_error_statuses() {
    let server = MockServer::start().await;
    let missing = serve(
        &server,
        "/missing",
        ResponseTemplate::new(404).set_body_string("no such post"),
    )
    .await;
    let empty = serve(&server, "/empty", ResponseTemplate::new(200)).await;

    let receiver = Receiver::new(relaxed(), Arc::new(InMemoryStore::new())).unwrap();

    let body = form(&[("source", missing.as_str()), ("target", TARGET)]);
    let err = receiver.receive(request(&body)).await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    let message = err.to_string();
    assert!(message.contains("404"), "{message}");
    assert!(message.contains("no such post"), "{message}");

    let body = form(&[("source", empty.as_str()), ("target", TARGET)]);
    let err = receiver.receive(request(&body)).await.unwrap_err();
    assert!(matches!(err, ReceiveError::MissingSourceBody));
}

#[tokio::test]
async fn test_unreachable_source_is_server_error() {
    // Nothing listens on port 9 on the loopback interface.
    let receiver = Receiver::new(
        ReceiverConfig {
            fetch_timeout_ms: 2_000,
            ..relaxed()
        },
        Arc::new(InMemoryStore::new()),
    )
    .unwrap();

    let body = form(&[("source", "http://127.0.0.1:9/post"), ("target", TARGET)]);
    let err = receiver.receive(request(&body)).await.unwrap_err();
    assert!(matches!(err, ReceiveError::SourceFetch(_)));
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_oversized_source_rejected() {
    let server = MockServer::start().await;
    let source = serve(
        &server,
        "/huge",
        ResponseTemplate::new(200).set_body_raw("x".repeat(4096), "text/plain"),
    )
    .await;

    let receiver = Receiver::new(
        ReceiverConfig {
            max_body_bytes: 1024,
            ..relaxed()
        },
        Arc::new(InMemoryStore::new()),
    )
    .unwrap();

    let body = form(&[("source", source.as_str()), ("target", TARGET)]);
    let err = receiver.receive(request(&body)).await.unwrap_err();
    assert!(matches!(err, ReceiveError::SourceTooLarge(1024)));
}

#[tokio::test]
async fn test_extension_payload_is_stored_and_reparsed() {
    let server = MockServer::start().await;
    let source = serve(
        &server,
        "/reply",
        ResponseTemplate::new(200).set_body_raw(format!(r#"<a href="{TARGET}">re</a>"#), "text/html"),
    )
    .await;

    let store = Arc::new(InMemoryStore::new());
    let receiver = Receiver::new(relaxed(), store.clone()).unwrap();

    let payload = json!({"content": "Agreed!", "author": {"name": "Ada"}});
    let raw_payload = payload.to_string();
    let body = form(&[
        ("source", source.as_str()),
        ("target", TARGET),
        ("definition", COMMENT_DEFINITION),
        ("payload", raw_payload.as_str()),
    ]);
    receiver.receive(request(&body)).await.unwrap();

    let rows = store
        .list(&MentionQuery {
            target: Some(TARGET.to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(rows[0].kind, MentionKind::Comment.ordinal());

    let normalized = ExtensionRegistry::new().reparse(&rows[0]).unwrap();
    assert_eq!(normalized.definition.as_deref(), Some(COMMENT_DEFINITION));
    assert_eq!(normalized.payload, Some(payload));
}
