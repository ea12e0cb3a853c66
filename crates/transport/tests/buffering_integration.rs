//! Request materialization and response buffering, end to end.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use http::header::CONTENT_LENGTH;
use url::Url;
use wiremock::matchers::{body_bytes, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vela_transport::testing::MockTransport;
use vela_transport::{
    AccessTokenCredential, BodyStream, HttpPipeline, PrimitiveTransport, Request, RequestOptions,
    ResponseBody, TransportError, TransportSettings,
};

fn settings_with_buffer(max: usize) -> TransportSettings {
    TransportSettings::builder()
        .max_content_buffer_size(max)
        .send_timeout(Duration::ZERO)
        .build()
        .unwrap()
}

fn live_pipeline(max_buffer: usize) -> HttpPipeline {
    HttpPipeline::new(
        Arc::new(AccessTokenCredential::new("token")),
        settings_with_buffer(max_buffer),
    )
    .unwrap()
}

fn chunked_stream(parts: &[&'static [u8]]) -> BodyStream {
    futures::stream::iter(
        parts.iter().map(|part| Ok(Bytes::from_static(part))).collect::<Vec<_>>(),
    )
    .boxed()
}

/// An unknown-length body is rewritten into a replayable one with an exact
/// content length before the send.
#[tokio::test]
async fn unknown_length_body_gets_exact_length() {
    let transport = Arc::new(MockTransport::new([]));
    let pipeline = HttpPipeline::with_transport(
        Arc::new(AccessTokenCredential::new("token")),
        Arc::new(settings_with_buffer(1024)),
        transport.clone() as Arc<dyn PrimitiveTransport>,
    );

    let request = Request::post(Url::parse("https://service.test/upload").unwrap())
        .body_stream(None, chunked_stream(&[b"hello ", b"world"]));
    pipeline.send(request).await.unwrap();

    let recorded = transport.requests();
    assert_eq!(recorded[0].headers.get(CONTENT_LENGTH).unwrap(), "11");
}

/// An oversized unknown-length body fails before any bytes hit the wire.
#[tokio::test]
async fn oversized_request_fails_before_send() {
    let transport = Arc::new(MockTransport::new([]));
    let pipeline = HttpPipeline::with_transport(
        Arc::new(AccessTokenCredential::new("token")),
        Arc::new(settings_with_buffer(8)),
        transport.clone() as Arc<dyn PrimitiveTransport>,
    );

    let request = Request::post(Url::parse("https://service.test/upload").unwrap())
        .body_stream(None, chunked_stream(&[b"0123456789", b"0123456789"]));
    let error = pipeline.send(request).await.unwrap_err();

    assert!(matches!(error, TransportError::ContentTooLarge { limit: 8, .. }));
    assert_eq!(transport.send_count(), 0);
}

/// The materialized body reaches the server byte for byte.
#[tokio::test]
async fn materialized_body_reaches_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .and(body_bytes(b"hello world".to_vec()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = live_pipeline(1024 * 1024);
    let url = Url::parse(&format!("{}/upload", server.uri())).unwrap();
    let request = Request::post(url).body_stream(None, chunked_stream(&[b"hello ", b"world"]));

    let response = pipeline.send(request).await.unwrap();
    assert!(response.is_success());
}

/// Response bodies are buffered fully by default.
#[tokio::test]
async fn response_body_buffered_by_default() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload-bytes".to_vec()))
        .mount(&server)
        .await;

    let pipeline = live_pipeline(1024 * 1024);
    let url = Url::parse(&format!("{}/data", server.uri())).unwrap();

    let response = pipeline.send(Request::get(url)).await.unwrap();
    assert_eq!(response.body_bytes().unwrap().as_ref(), b"payload-bytes");
}

/// Headers-only completion returns a streaming body the caller can drain.
#[tokio::test]
async fn headers_only_leaves_body_streaming() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"streamed-later".to_vec()))
        .mount(&server)
        .await;

    let pipeline = live_pipeline(1024 * 1024);
    let url = Url::parse(&format!("{}/data", server.uri())).unwrap();

    let response = pipeline
        .send_with_options(Request::get(url), RequestOptions::new().headers_only())
        .await
        .unwrap();
    assert!(response.body_bytes().is_none());

    let mut collected = Vec::new();
    match response.into_body() {
        ResponseBody::Stream(mut stream) => {
            while let Some(chunk) = stream.next().await {
                collected.extend_from_slice(&chunk.unwrap());
            }
        }
        other => panic!("expected streaming body, got {other:?}"),
    }
    assert_eq!(collected, b"streamed-later");
}

/// A zero buffer ceiling forces headers-only reads instead of failing.
#[tokio::test]
async fn zero_ceiling_forces_headers_only() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"unread".to_vec()))
        .mount(&server)
        .await;

    let pipeline = live_pipeline(0);
    let url = Url::parse(&format!("{}/data", server.uri())).unwrap();

    let response = pipeline.send(Request::get(url)).await.unwrap();
    assert!(response.is_success());
    assert!(matches!(response.body, ResponseBody::Stream(_)));
}

/// A response body over the ceiling fails with ContentTooLarge.
#[tokio::test]
async fn oversized_response_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 64]))
        .mount(&server)
        .await;

    let pipeline = live_pipeline(16);
    let url = Url::parse(&format!("{}/big", server.uri())).unwrap();

    let error = pipeline.send(Request::get(url)).await.unwrap_err();
    assert!(matches!(error, TransportError::ContentTooLarge { limit: 16, .. }));
}

/// 204 responses skip the body read entirely.
#[tokio::test]
async fn no_content_passes_through() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/item"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let pipeline = live_pipeline(1024);
    let url = Url::parse(&format!("{}/item", server.uri())).unwrap();

    let response = pipeline
        .send(Request::new(http::Method::DELETE, url))
        .await
        .unwrap();
    assert_eq!(response.status, http::StatusCode::NO_CONTENT);
}
