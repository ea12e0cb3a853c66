//! Pipeline entry point: retry over handshake over the primitive transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::auth::{AuthHandshake, Credential};
use crate::client::ReqwestTransport;
use crate::error::{TransportError, TransportResult};
use crate::message::{Request, Response};
use crate::options::RequestOptions;
use crate::retry::RetryTransport;
use crate::settings::TransportSettings;
use crate::trace::TracingSink;
use crate::transport::PrimitiveTransport;

/// The assembled transport stack.
///
/// Layering, outermost first: overall timeout and caller cancellation, then
/// bounded retry, then the token handshake, then the primitive send.
pub struct HttpPipeline {
    retry: RetryTransport,
    settings: Arc<TransportSettings>,
}

impl HttpPipeline {
    /// Build a pipeline over a fresh `reqwest`-backed transport.
    pub fn new(
        credential: Arc<dyn Credential>,
        settings: TransportSettings,
    ) -> TransportResult<Self> {
        let settings = Arc::new(settings);
        let transport = Arc::new(ReqwestTransport::new(&settings)?);
        Ok(Self::with_transport(credential, settings, transport))
    }

    /// Build a pipeline over a caller-supplied primitive transport.
    pub fn with_transport(
        credential: Arc<dyn Credential>,
        settings: Arc<TransportSettings>,
        transport: Arc<dyn PrimitiveTransport>,
    ) -> Self {
        let handshake = AuthHandshake::new(credential, Arc::clone(&settings), transport);
        let retry = RetryTransport::new(handshake, Arc::clone(&settings), Arc::new(TracingSink));
        Self { retry, settings }
    }

    /// Send with default options and no external cancellation.
    pub async fn send(&self, request: Request) -> TransportResult<Response> {
        self.send_with_options(request, RequestOptions::default()).await
    }

    /// Send with per-request options.
    pub async fn send_with_options(
        &self,
        request: Request,
        options: RequestOptions,
    ) -> TransportResult<Response> {
        self.send_cancellable(request, options, &CancellationToken::new()).await
    }

    /// Send under an external cancellation signal.
    ///
    /// The settings' send timeout bounds the entire call, retries and token
    /// acquisition included, independently of the caller's token. A timeout
    /// surfaces as [`TransportError::Timeout`]; caller cancellation keeps
    /// its own shape.
    pub async fn send_cancellable(
        &self,
        mut request: Request,
        options: RequestOptions,
        cancel: &CancellationToken,
    ) -> TransportResult<Response> {
        let linked = cancel.child_token();
        let timeout = self.settings.send_timeout;
        let deadline_hit = Arc::new(AtomicBool::new(false));

        let watchdog = (timeout > Duration::ZERO).then(|| {
            let trigger = linked.clone();
            let flag = Arc::clone(&deadline_hit);
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                flag.store(true, Ordering::SeqCst);
                trigger.cancel();
            })
        });

        let result = self.retry.send(&mut request, &options, &linked).await;

        if let Some(handle) = watchdog {
            handle.abort();
        }

        // A cancellation that the caller never asked for was the deadline.
        match result {
            Err(error)
                if error.is_cancellation()
                    && deadline_hit.load(Ordering::SeqCst)
                    && !cancel.is_cancelled() =>
            {
                Err(TransportError::Timeout { duration: timeout })
            }
            other => other,
        }
    }

    /// The settings this pipeline was built with.
    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }
}

impl std::fmt::Debug for HttpPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPipeline")
            .field("session_id", &self.settings.session_id)
            .field("send_timeout", &self.settings.send_timeout)
            .finish()
    }
}
