//! In-crate test support: a scripted primitive transport, a scripted token
//! provider and a recording trace sink.
//!
//! Used by the crate's own tests and available to downstream crates that
//! want to exercise pipeline behavior without a live server.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::HeaderMap;
use http::{Method, StatusCode};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::auth::{
    Credential, CredentialScheme, IssuedToken, TokenProvider, TokenSlot, TransportCredential,
};
use crate::error::TransportError;
use crate::fault::TransportFault;
use crate::message::{Response, ResponseBody, SendRequest};
use crate::trace::{AttemptTrace, TraceSink};
use crate::transport::{CredentialTarget, PrimitiveTransport};

/// One scripted outcome for a [`MockTransport`] send.
#[derive(Debug)]
pub enum ScriptedOutcome {
    /// Respond with a bare status.
    Status(StatusCode),
    /// Respond with a status, headers and a buffered body.
    Response {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
    /// Fail with a transport fault.
    Fault(TransportFault),
    /// Never settle. Exercises cancellation enforcement.
    Hang,
}

/// What the transport saw for one send, for assertions.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

/// A primitive transport that replays a script of outcomes.
///
/// An exhausted script answers 200 with no body.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<ScriptedOutcome>>,
    sends: AtomicU32,
    requests: Mutex<Vec<RecordedRequest>>,
    credentials: Mutex<Vec<(TransportCredential, CredentialTarget)>>,
}

impl MockTransport {
    pub fn new(script: impl IntoIterator<Item = ScriptedOutcome>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn enqueue(&self, outcome: ScriptedOutcome) {
        self.script.lock().push_back(outcome);
    }

    /// Total sends observed.
    pub fn send_count(&self) -> u32 {
        self.sends.load(Ordering::SeqCst)
    }

    /// Requests observed, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Connection-level credentials applied, in order.
    pub fn applied_credentials(&self) -> Vec<(TransportCredential, CredentialTarget)> {
        self.credentials.lock().clone()
    }
}

#[async_trait]
impl PrimitiveTransport for MockTransport {
    async fn send(
        &self,
        request: SendRequest,
        _cancel: CancellationToken,
    ) -> Result<Response, TransportFault> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(RecordedRequest {
            method: request.method,
            url: request.url,
            headers: request.headers,
        });

        let outcome = self.script.lock().pop_front();
        match outcome {
            None => Ok(Response::new(StatusCode::OK)),
            Some(ScriptedOutcome::Status(status)) => Ok(Response::new(status)),
            Some(ScriptedOutcome::Response { status, headers, body }) => Ok(Response {
                status,
                headers,
                body: ResponseBody::Buffered(body),
            }),
            Some(ScriptedOutcome::Fault(fault)) => Err(fault),
            Some(ScriptedOutcome::Hang) => futures::future::pending().await,
        }
    }

    fn apply_credential(&self, credential: &TransportCredential, target: CredentialTarget) {
        self.credentials.lock().push((credential.clone(), target));
    }
}

/// A token provider that cycles through a fixed token list.
///
/// Each acquisition pops the front token and pushes it back, so a
/// single-token script yields the same (possibly always-rejected) token
/// forever while the acquisition count keeps climbing.
pub struct ScriptedProvider {
    tokens: Mutex<VecDeque<IssuedToken>>,
    slot: TokenSlot,
    acquisitions: AtomicU32,
    scheme: CredentialScheme,
    interactive: bool,
}

impl ScriptedProvider {
    pub fn new(tokens: impl IntoIterator<Item = IssuedToken>) -> Self {
        Self {
            tokens: Mutex::new(tokens.into_iter().collect()),
            slot: TokenSlot::new(),
            acquisitions: AtomicU32::new(0),
            scheme: CredentialScheme::Bearer,
            interactive: false,
        }
    }

    #[must_use]
    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    /// Total token acquisitions observed.
    pub fn acquisition_count(&self) -> u32 {
        self.acquisitions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for ScriptedProvider {
    fn scheme(&self) -> CredentialScheme {
        self.scheme
    }

    fn requires_interaction(&self) -> bool {
        self.interactive
    }

    fn current_token(&self) -> Option<IssuedToken> {
        self.slot.current()
    }

    async fn acquire_token(
        &self,
        _failed: Option<&IssuedToken>,
        _challenge: Option<Response>,
    ) -> Result<IssuedToken, TransportError> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        let mut tokens = self.tokens.lock();
        let token = tokens.pop_front().ok_or_else(|| {
            TransportError::TokenAcquisition("scripted provider ran out of tokens".into())
        })?;
        tokens.push_back(token.clone());
        drop(tokens);
        self.slot.store(token.clone());
        Ok(token)
    }

    fn invalidate_token(&self, token: &IssuedToken) {
        self.slot.invalidate(token);
    }

    fn validate_token(&self, token: &IssuedToken, _response: &Response) {
        self.slot.store_if_current(token);
    }
}

/// A credential wrapping a pre-built provider (or none at all).
pub struct ScriptedCredential {
    provider: Option<Arc<ScriptedProvider>>,
    prompt_allowed: bool,
}

impl ScriptedCredential {
    pub fn new(provider: Arc<ScriptedProvider>) -> Self {
        Self { provider: Some(provider), prompt_allowed: false }
    }

    /// A credential that can never produce a provider.
    pub fn unresolvable() -> Self {
        Self { provider: None, prompt_allowed: false }
    }

    #[must_use]
    pub fn allow_prompt(mut self, allowed: bool) -> Self {
        self.prompt_allowed = allowed;
        self
    }
}

impl Credential for ScriptedCredential {
    fn scheme(&self) -> CredentialScheme {
        self.provider
            .as_ref()
            .map_or(CredentialScheme::Other, |provider| provider.scheme())
    }

    fn prompt_allowed(&self) -> bool {
        self.prompt_allowed
    }

    fn create_token_provider(
        &self,
        _endpoint: &Url,
        _challenge: Option<&Response>,
    ) -> Option<Arc<dyn TokenProvider>> {
        self.provider
            .as_ref()
            .map(|provider| Arc::clone(provider) as Arc<dyn TokenProvider>)
    }
}

/// A trace sink that records every event for later assertions.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<AttemptTrace>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AttemptTrace> {
        self.events.lock().clone()
    }
}

impl TraceSink for RecordingSink {
    fn record(&self, event: &AttemptTrace) {
        self.events.lock().push(event.clone());
    }
}
