//! Seam between the resilience layers and a concrete HTTP client.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::auth::TransportCredential;
use crate::fault::TransportFault;
use crate::message::{Response, SendRequest};

/// Where a transport-level credential applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialTarget {
    /// The origin server.
    Origin,
    /// The forward proxy. Only elevated to after a 407 was observed.
    Proxy,
}

/// The innermost send primitive: one request in, one response or fault out.
///
/// Implementations perform no retries, no authentication and no buffering;
/// the layers above own all of that. Failures come back as a structured
/// [`TransportFault`] so the classifier never has to inspect client-specific
/// error types.
#[async_trait]
pub trait PrimitiveTransport: Send + Sync {
    /// Send one request. The token is advisory; transports that can abort
    /// an in-flight send on it should, the enforcer handles those that
    /// cannot.
    async fn send(
        &self,
        request: SendRequest,
        cancel: CancellationToken,
    ) -> Result<Response, TransportFault>;

    /// Install a connection-level credential for subsequent sends.
    fn apply_credential(&self, credential: &TransportCredential, target: CredentialTarget) {
        let _ = (credential, target);
    }
}
