//! Resilient HTTP transport for the Vela REST clients.
//!
//! The pipeline layers, outermost first:
//!
//! 1. **Timeout & cancellation**: the settings' send timeout bounds each
//!    whole call; an external [`CancellationToken`] can stop it early, and a
//!    grace-window enforcer guarantees cancellation is honored even when the
//!    underlying I/O is not listening.
//! 2. **Retry**: transient faults, classified from structured cause lists
//!    and response statuses, are retried with exponential backoff. Low
//!    priority work gets an enlarged budget.
//! 3. **Token handshake**: credentials produce token providers per
//!    endpoint; authentication challenges invalidate and reacquire tokens
//!    within a bounded budget.
//! 4. **Primitive transport**: one request in, one response or structured
//!    fault out; backed by `reqwest` or anything implementing
//!    [`PrimitiveTransport`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use vela_transport::{
//!     AccessTokenCredential, HttpPipeline, Request, TransportSettings,
//! };
//!
//! # async fn run() -> Result<(), vela_transport::TransportError> {
//! let settings = TransportSettings::builder()
//!     .user_agent_product("vela/1.0")
//!     .build()?;
//! let pipeline = HttpPipeline::new(Arc::new(AccessTokenCredential::new("token")), settings)?;
//!
//! let url = url::Url::parse("https://service.example/api/items").map_err(|error| {
//!     vela_transport::TransportError::InvalidConfiguration { message: error.to_string() }
//! })?;
//! let response = pipeline.send(Request::get(url)).await?;
//! assert!(response.is_success());
//! # Ok(())
//! # }
//! ```
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod auth;
pub mod backoff;
pub mod cancellation;
pub mod classify;
pub mod client;
pub mod error;
pub mod fault;
pub mod message;
pub mod options;
pub mod pipeline;
pub mod settings;
pub mod testing;
pub mod trace;
pub mod transport;

mod buffer;
mod retry;

pub use auth::{
    AccessTokenCredential, BasicCredential, Credential, CredentialScheme, IssuedToken,
    ProviderRegistry, TokenProvider, TransportCredential, MAX_AUTH_RETRIES,
};
pub use backoff::exponential_backoff;
pub use cancellation::{enforce_cancellation, DEFAULT_GRACE_WINDOW};
pub use classify::{classify_fault, classify_status, fault_detail, Classification, FaultDetail};
pub use client::ReqwestTransport;
pub use error::{TransportError, TransportResult};
pub use fault::{ConnectionFault, FaultCause, SocketFault, TransportFault};
pub use message::{headers, Body, BodyStream, Request, Response, ResponseBody, SendBody, SendRequest};
pub use options::{CompletionMode, RequestOptions, RetryOptions};
pub use pipeline::HttpPipeline;
pub use settings::{TransportSettings, DEFAULT_MAX_CONTENT_BUFFER_SIZE, DEFAULT_SEND_TIMEOUT};
pub use trace::{AttemptOutcome, AttemptTrace, PhaseTimings, TraceSink, TracingSink};
pub use transport::{CredentialTarget, PrimitiveTransport};
