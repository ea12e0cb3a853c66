//! Token authentication handshake.
//!
//! Wraps the primitive transport with the challenge/reacquire loop: attach
//! the current token, send, and on an authentication challenge invalidate
//! the token, re-resolve the provider and acquire a fresh one, within a
//! bounded reacquisition budget.

use std::sync::Arc;
use std::time::Instant;

use http::header::HeaderValue;
use http::StatusCode;
use percent_encoding::percent_decode_str;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::auth::credential::Credential;
use crate::auth::provider::ProviderRegistry;
use crate::auth::token::IssuedToken;
use crate::buffer::{self, BufferFailure};
use crate::cancellation::enforce_cancellation;
use crate::error::{AttemptFailure, TransportError};
use crate::message::{headers, Request, Response};
use crate::options::RequestOptions;
use crate::settings::TransportSettings;
use crate::trace::PhaseTimings;
use crate::transport::{CredentialTarget, PrimitiveTransport};

/// Token reacquisitions allowed per logical call.
pub const MAX_AUTH_RETRIES: u32 = 3;

pub(crate) struct AuthHandshake {
    credential: Arc<dyn Credential>,
    registry: ProviderRegistry,
    settings: Arc<TransportSettings>,
    inner: Arc<dyn PrimitiveTransport>,
}

impl AuthHandshake {
    pub(crate) fn new(
        credential: Arc<dyn Credential>,
        settings: Arc<TransportSettings>,
        inner: Arc<dyn PrimitiveTransport>,
    ) -> Self {
        Self { credential, registry: ProviderRegistry::new(), settings, inner }
    }

    /// One authenticated attempt: at most `1 + MAX_AUTH_RETRIES` sends.
    pub(crate) async fn send(
        &self,
        request: &mut Request,
        options: &RequestOptions,
        cancel: &CancellationToken,
        timings: &mut PhaseTimings,
    ) -> Result<Response, AttemptFailure> {
        let mut provider = self.registry.get_or_create(self.credential.as_ref(), &request.url);
        let mut token = provider.as_ref().and_then(|p| p.current_token());
        let mut proxy_demanded = false;
        let mut remaining = MAX_AUTH_RETRIES;

        let started = Instant::now();
        match buffer::buffer_request_content(request, self.settings.max_content_buffer_size).await
        {
            Ok(()) => {}
            Err(BufferFailure::TooLarge { limit }) => {
                return Err(AttemptFailure::Terminal(TransportError::ContentTooLarge {
                    limit,
                    actual: None,
                }));
            }
            Err(BufferFailure::Read(fault)) => {
                return Err(AttemptFailure::Terminal(TransportError::Fatal(fault)));
            }
        }
        timings.buffering_ms += started.elapsed().as_millis() as u64;

        let challenged = loop {
            self.settings.apply_headers(&mut request.headers);
            if let Some(active) = &token {
                self.attach_token(request, active, proxy_demanded)?;
            }

            let response = self.send_once(request, cancel, timings).await?;
            let response = self.read_response(response, options, cancel, timings).await?;

            if !self.credential.is_authentication_challenge(&response) {
                if let (Some(p), Some(active)) = (&provider, &token) {
                    p.validate_token(active, &response);
                }
                return Ok(response);
            }

            proxy_demanded = response.status == StatusCode::PROXY_AUTHENTICATION_REQUIRED;
            if let (Some(p), Some(active)) = (&provider, &token) {
                p.invalidate_token(active);
            }

            provider =
                self.registry
                    .resolve_for_challenge(self.credential.as_ref(), &request.url, &response);
            let Some(active_provider) = provider.clone() else {
                break response;
            };
            if active_provider.requires_interaction() && !self.credential.prompt_allowed() {
                break response;
            }

            // The server can flag a challenge as not worth further token
            // reacquisition; honor it after at most one reattempt.
            let auth_failure_flagged = response.header_str(&headers::AUTH_FAILURE).is_some();
            if remaining == 0 || (remaining < MAX_AUTH_RETRIES && auth_failure_flagged) {
                break response;
            }

            debug!(
                status = %response.status,
                remaining,
                scheme = %active_provider.scheme(),
                "authentication challenge, reacquiring token"
            );
            let acquiring = Instant::now();
            let fresh = active_provider
                .acquire_token(token.as_ref(), Some(response))
                .await?;
            timings.token_ms += acquiring.elapsed().as_millis() as u64;

            // Ask the server to include identity info with the next reply
            // so a bad token maps to a who-am-I answer, not a guess.
            request.headers.insert(headers::USER_DATA, HeaderValue::from_static("true"));
            token = Some(fresh);
            remaining -= 1;
        };

        let scheme = provider
            .as_ref()
            .map(|p| p.scheme())
            .unwrap_or_else(|| self.credential.scheme());
        let message = challenged
            .header_str(&headers::SERVICE_ERROR)
            .map(|raw| percent_decode_str(raw).decode_utf8_lossy().into_owned());
        drop(challenged);

        Err(AttemptFailure::Terminal(TransportError::Unauthorized { scheme, message }))
    }

    fn attach_token(
        &self,
        request: &mut Request,
        token: &IssuedToken,
        proxy_demanded: bool,
    ) -> Result<(), AttemptFailure> {
        match token {
            IssuedToken::Header { name, value } => {
                let value = HeaderValue::from_str(value).map_err(|_| {
                    AttemptFailure::Terminal(TransportError::TokenAcquisition(
                        "token material is not a valid header value".into(),
                    ))
                })?;
                request.headers.insert(name.clone(), value);
            }
            IssuedToken::TransportCredential(credential) => {
                let target = if proxy_demanded {
                    CredentialTarget::Proxy
                } else {
                    CredentialTarget::Origin
                };
                self.inner.apply_credential(credential, target);
            }
        }
        Ok(())
    }

    async fn send_once(
        &self,
        request: &mut Request,
        cancel: &CancellationToken,
        timings: &mut PhaseTimings,
    ) -> Result<Response, AttemptFailure> {
        let snapshot = request.take_send_snapshot();
        let inner = Arc::clone(&self.inner);
        let send_cancel = cancel.clone();
        let started = Instant::now();

        let outcome = enforce_cancellation(
            async move { inner.send(snapshot, send_cancel).await },
            cancel,
            self.settings.grace_window,
            "http send",
            None,
        )
        .await;
        timings.send_ms += started.elapsed().as_millis() as u64;

        match outcome {
            Err(error) => Err(AttemptFailure::Terminal(error)),
            Ok(Err(_)) if cancel.is_cancelled() => {
                Err(AttemptFailure::Terminal(TransportError::Cancelled))
            }
            Ok(Err(fault)) => Err(AttemptFailure::Fault(fault)),
            Ok(Ok(response)) => Ok(response),
        }
    }

    async fn read_response(
        &self,
        response: Response,
        options: &RequestOptions,
        cancel: &CancellationToken,
        timings: &mut PhaseTimings,
    ) -> Result<Response, AttemptFailure> {
        let max = self.settings.max_content_buffer_size;
        let completion = options.completion;
        let started = Instant::now();

        let outcome = enforce_cancellation(
            buffer::buffer_response_content(response, max, completion),
            cancel,
            self.settings.grace_window,
            "response read",
            None,
        )
        .await;
        timings.buffering_ms += started.elapsed().as_millis() as u64;

        match outcome {
            Err(error) => Err(AttemptFailure::Terminal(error)),
            Ok(Err(BufferFailure::TooLarge { limit })) => Err(AttemptFailure::Terminal(
                TransportError::ContentTooLarge { limit, actual: None },
            )),
            Ok(Err(BufferFailure::Read(_))) if cancel.is_cancelled() => {
                Err(AttemptFailure::Terminal(TransportError::Cancelled))
            }
            Ok(Err(BufferFailure::Read(fault))) => Err(AttemptFailure::Fault(fault)),
            Ok(Ok(response)) => Ok(response),
        }
    }
}

impl std::fmt::Debug for AuthHandshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthHandshake")
            .field("scheme", &self.credential.scheme())
            .field("registry", &self.registry)
            .finish()
    }
}
