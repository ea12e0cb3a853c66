//! Authentication handshake behavior over a scripted transport.

use std::sync::Arc;
use std::time::Duration;

use http::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use http::StatusCode;
use url::Url;

use vela_transport::testing::{
    MockTransport, ScriptedCredential, ScriptedOutcome, ScriptedProvider,
};
use vela_transport::{
    headers, Credential, CredentialScheme, CredentialTarget, HttpPipeline, IssuedToken, Request,
    TokenProvider, TransportCredential, TransportError, TransportSettings,
};

fn settings() -> TransportSettings {
    TransportSettings::builder()
        .send_timeout(Duration::ZERO)
        .user_agent_product("vela-tests/1.0")
        .build()
        .unwrap()
}

fn pipeline_with(
    credential: impl Credential + 'static,
    transport: Arc<MockTransport>,
) -> HttpPipeline {
    HttpPipeline::with_transport(Arc::new(credential), Arc::new(settings()), transport)
}

fn request() -> Request {
    Request::get(Url::parse("https://service.test/api/items").unwrap())
}

fn challenge(status: StatusCode, extra: &[(http::HeaderName, &str)]) -> ScriptedOutcome {
    let mut header_map = HeaderMap::new();
    for (name, value) in extra {
        header_map.insert(name.clone(), HeaderValue::from_str(value).unwrap());
    }
    ScriptedOutcome::Response {
        status,
        headers: header_map,
        body: bytes::Bytes::new(),
    }
}

/// One challenge costs exactly one extra send, and the fresh token rides
/// on the resend.
#[tokio::test]
async fn single_challenge_then_success() {
    let provider = Arc::new(ScriptedProvider::new([IssuedToken::bearer("fresh")]));
    let transport = Arc::new(MockTransport::new([
        ScriptedOutcome::Status(StatusCode::UNAUTHORIZED),
        ScriptedOutcome::Status(StatusCode::OK),
    ]));
    let pipeline = pipeline_with(
        ScriptedCredential::new(Arc::clone(&provider)),
        Arc::clone(&transport),
    );

    let response = pipeline.send(request()).await.unwrap();

    assert!(response.is_success());
    assert_eq!(transport.send_count(), 2);
    assert_eq!(provider.acquisition_count(), 1);

    let requests = transport.requests();
    assert!(requests[0].headers.get(AUTHORIZATION).is_none());
    assert_eq!(requests[1].headers.get(AUTHORIZATION).unwrap(), "Bearer fresh");
    // After a fresh token the server is asked for identity info.
    assert!(requests[1].headers.get(&headers::USER_DATA).is_some());
}

/// A provider with a cached token attaches it on the very first send.
#[tokio::test]
async fn cached_token_attached_pre_send() {
    let provider = Arc::new(ScriptedProvider::new([IssuedToken::bearer("cached")]));
    provider.acquire_token(None, None).await.unwrap();

    let transport = Arc::new(MockTransport::new([ScriptedOutcome::Status(StatusCode::OK)]));
    let pipeline = pipeline_with(
        ScriptedCredential::new(Arc::clone(&provider)),
        Arc::clone(&transport),
    );

    pipeline.send(request()).await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests[0].headers.get(AUTHORIZATION).unwrap(), "Bearer cached");
}

/// A server that never accepts the token fails Unauthorized after the
/// default budget: four sends, three reacquisitions.
#[tokio::test]
async fn persistent_challenge_exhausts_budget() {
    let provider = Arc::new(ScriptedProvider::new([IssuedToken::bearer("rejected")]));
    let transport = Arc::new(MockTransport::new(
        std::iter::repeat_with(|| ScriptedOutcome::Status(StatusCode::UNAUTHORIZED)).take(6),
    ));
    let pipeline = pipeline_with(
        ScriptedCredential::new(Arc::clone(&provider)),
        Arc::clone(&transport),
    );

    let error = pipeline.send(request()).await.unwrap_err();

    match error {
        TransportError::Unauthorized { scheme, .. } => {
            assert_eq!(scheme, CredentialScheme::Bearer);
        }
        other => panic!("expected unauthorized, got {other:?}"),
    }
    assert_eq!(transport.send_count(), 4);
    assert_eq!(provider.acquisition_count(), 3);
}

/// The unauthorized error prefers the server's decoded error detail.
#[tokio::test]
async fn unauthorized_carries_decoded_service_error() {
    let provider = Arc::new(ScriptedProvider::new([IssuedToken::bearer("rejected")]));
    let transport = Arc::new(MockTransport::new(
        std::iter::repeat_with(|| {
            challenge(
                StatusCode::UNAUTHORIZED,
                &[(headers::SERVICE_ERROR, "token%20audience%20mismatch")],
            )
        })
        .take(6),
    ));
    let pipeline = pipeline_with(ScriptedCredential::new(provider), Arc::clone(&transport));

    let error = pipeline.send(request()).await.unwrap_err();

    match error {
        TransportError::Unauthorized { message, .. } => {
            assert_eq!(message.as_deref(), Some("token audience mismatch"));
        }
        other => panic!("expected unauthorized, got {other:?}"),
    }
}

/// A challenge flagged with the auth-failure header stops reacquisition
/// after at most one reattempt, budget notwithstanding.
#[tokio::test]
async fn auth_failure_header_short_circuits() {
    let provider = Arc::new(ScriptedProvider::new([IssuedToken::bearer("rejected")]));
    let transport = Arc::new(MockTransport::new([
        ScriptedOutcome::Status(StatusCode::UNAUTHORIZED),
        challenge(StatusCode::UNAUTHORIZED, &[(headers::AUTH_FAILURE, "true")]),
        ScriptedOutcome::Status(StatusCode::OK),
    ]));
    let pipeline = pipeline_with(
        ScriptedCredential::new(Arc::clone(&provider)),
        Arc::clone(&transport),
    );

    let error = pipeline.send(request()).await.unwrap_err();

    assert!(matches!(error, TransportError::Unauthorized { .. }));
    assert_eq!(transport.send_count(), 2);
    assert_eq!(provider.acquisition_count(), 1);
}

/// No resolvable provider means no reattempt at all.
#[tokio::test]
async fn unresolvable_credential_fails_immediately() {
    let transport = Arc::new(MockTransport::new([ScriptedOutcome::Status(
        StatusCode::UNAUTHORIZED,
    )]));
    let pipeline = pipeline_with(ScriptedCredential::unresolvable(), Arc::clone(&transport));

    let error = pipeline.send(request()).await.unwrap_err();

    match error {
        TransportError::Unauthorized { scheme, .. } => {
            assert_eq!(scheme, CredentialScheme::Other);
        }
        other => panic!("expected unauthorized, got {other:?}"),
    }
    assert_eq!(transport.send_count(), 1);
}

/// An interactive provider without prompt permission fails without
/// acquiring.
#[tokio::test]
async fn interactive_provider_requires_prompt_permission() {
    let provider =
        Arc::new(ScriptedProvider::new([IssuedToken::bearer("interactive")]).interactive());
    let transport = Arc::new(MockTransport::new([ScriptedOutcome::Status(
        StatusCode::UNAUTHORIZED,
    )]));
    let pipeline = pipeline_with(
        ScriptedCredential::new(Arc::clone(&provider)),
        Arc::clone(&transport),
    );

    let error = pipeline.send(request()).await.unwrap_err();

    assert!(matches!(error, TransportError::Unauthorized { .. }));
    assert_eq!(provider.acquisition_count(), 0);
    assert_eq!(transport.send_count(), 1);
}

/// With prompting allowed, the same interactive provider proceeds.
#[tokio::test]
async fn interactive_provider_with_prompt_allowed() {
    let provider =
        Arc::new(ScriptedProvider::new([IssuedToken::bearer("interactive")]).interactive());
    let transport = Arc::new(MockTransport::new([
        ScriptedOutcome::Status(StatusCode::UNAUTHORIZED),
        ScriptedOutcome::Status(StatusCode::OK),
    ]));
    let pipeline = pipeline_with(
        ScriptedCredential::new(Arc::clone(&provider)).allow_prompt(true),
        Arc::clone(&transport),
    );

    let response = pipeline.send(request()).await.unwrap();

    assert!(response.is_success());
    assert_eq!(provider.acquisition_count(), 1);
}

/// A transport-level credential goes to the origin after a 401 and is only
/// elevated to the proxy after a 407.
#[tokio::test]
async fn transport_credential_targets() {
    let credential = TransportCredential::new("svc", "secret");

    // 401 path: applied to the origin.
    let provider = Arc::new(ScriptedProvider::new([IssuedToken::TransportCredential(
        credential.clone(),
    )]));
    let transport = Arc::new(MockTransport::new([
        ScriptedOutcome::Status(StatusCode::UNAUTHORIZED),
        ScriptedOutcome::Status(StatusCode::OK),
    ]));
    let pipeline = pipeline_with(ScriptedCredential::new(provider), Arc::clone(&transport));
    pipeline.send(request()).await.unwrap();
    assert_eq!(
        transport.applied_credentials(),
        vec![(credential.clone(), CredentialTarget::Origin)]
    );

    // 407 path: elevated to the proxy.
    let provider = Arc::new(ScriptedProvider::new([IssuedToken::TransportCredential(
        credential.clone(),
    )]));
    let transport = Arc::new(MockTransport::new([
        ScriptedOutcome::Status(StatusCode::PROXY_AUTHENTICATION_REQUIRED),
        ScriptedOutcome::Status(StatusCode::OK),
    ]));
    let pipeline = pipeline_with(ScriptedCredential::new(provider), Arc::clone(&transport));
    pipeline.send(request()).await.unwrap();
    assert_eq!(
        transport.applied_credentials(),
        vec![(credential, CredentialTarget::Proxy)]
    );
}

/// A 403 is not a challenge: no invalidation, no reacquisition.
#[tokio::test]
async fn forbidden_is_not_a_challenge() {
    let provider = Arc::new(ScriptedProvider::new([IssuedToken::bearer("valid")]));
    let transport = Arc::new(MockTransport::new([ScriptedOutcome::Status(
        StatusCode::FORBIDDEN,
    )]));
    let pipeline = pipeline_with(
        ScriptedCredential::new(Arc::clone(&provider)),
        Arc::clone(&transport),
    );

    let response = pipeline.send(request()).await.unwrap();

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(transport.send_count(), 1);
    assert_eq!(provider.acquisition_count(), 0);
}

/// Ambient headers (session id, user agent) ride on every send.
#[tokio::test]
async fn ambient_headers_stamped() {
    let transport = Arc::new(MockTransport::new([ScriptedOutcome::Status(StatusCode::OK)]));
    let pipeline = pipeline_with(
        ScriptedCredential::new(Arc::new(ScriptedProvider::new([IssuedToken::bearer("t")]))),
        Arc::clone(&transport),
    );

    pipeline.send(request()).await.unwrap();

    let requests = transport.requests();
    assert!(requests[0].headers.get(&headers::SESSION_ID).is_some());
    assert_eq!(
        requests[0].headers.get(http::header::USER_AGENT).unwrap(),
        "vela-tests/1.0"
    );
}
