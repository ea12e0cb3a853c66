//! Token providers and the per-endpoint provider registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use url::Url;

use crate::auth::credential::{Credential, CredentialScheme};
use crate::auth::token::IssuedToken;
use crate::error::TransportError;
use crate::message::Response;

/// Produces and tracks token material for one endpoint.
///
/// Providers are stateful: they cache the current token and are consulted
/// by the handshake to invalidate it on challenges and validate it after
/// successful responses.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    fn scheme(&self) -> CredentialScheme;

    /// Whether acquiring a token requires user interaction.
    fn requires_interaction(&self) -> bool {
        false
    }

    /// The cached token, if one is currently held.
    fn current_token(&self) -> Option<IssuedToken>;

    /// Acquire a fresh token. The token that just failed and the challenge
    /// response that demanded reacquisition are passed through when known.
    /// The challenge is taken by value: acquisition futures must stay
    /// spawnable even when the challenge carries a streaming body.
    async fn acquire_token(
        &self,
        failed: Option<&IssuedToken>,
        challenge: Option<Response>,
    ) -> Result<IssuedToken, TransportError>;

    /// Drop the cached token if it is still the one that failed.
    fn invalidate_token(&self, token: &IssuedToken);

    /// Post-success hook: mark the token good for reuse.
    fn validate_token(&self, token: &IssuedToken, response: &Response) {
        let _ = (token, response);
    }

    /// Whether this provider can answer the given challenge. A provider
    /// that cannot is replaced through the credential.
    fn handles_challenge(&self, challenge: &Response) -> bool {
        let _ = challenge;
        true
    }
}

/// Per-endpoint cache of token providers.
///
/// One registry per transport instance; the mutex guards only the lazy
/// create-or-lookup, never a network operation.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Mutex<HashMap<String, Arc<dyn TokenProvider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The provider for an endpoint, created through the credential on
    /// first use.
    pub fn get_or_create(
        &self,
        credential: &dyn Credential,
        endpoint: &Url,
    ) -> Option<Arc<dyn TokenProvider>> {
        let key = endpoint_key(endpoint);
        let mut providers = self.providers.lock();
        if let Some(existing) = providers.get(&key) {
            return Some(Arc::clone(existing));
        }
        let created = credential.create_token_provider(endpoint, None)?;
        providers.insert(key, Arc::clone(&created));
        Some(created)
    }

    /// Re-resolve the provider for a concrete challenge. The cached
    /// provider is kept if it can answer the challenge, otherwise the
    /// credential gets a chance to supply a better one.
    pub fn resolve_for_challenge(
        &self,
        credential: &dyn Credential,
        endpoint: &Url,
        challenge: &Response,
    ) -> Option<Arc<dyn TokenProvider>> {
        let key = endpoint_key(endpoint);
        let mut providers = self.providers.lock();
        if let Some(existing) = providers.get(&key) {
            if existing.handles_challenge(challenge) {
                return Some(Arc::clone(existing));
            }
        }
        let created = credential.create_token_provider(endpoint, Some(challenge))?;
        providers.insert(key, Arc::clone(&created));
        Some(created)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("endpoints", &self.providers.lock().len())
            .finish()
    }
}

fn endpoint_key(endpoint: &Url) -> String {
    match endpoint.port() {
        Some(port) => format!(
            "{}://{}:{port}",
            endpoint.scheme(),
            endpoint.host_str().unwrap_or_default()
        ),
        None => format!("{}://{}", endpoint.scheme(), endpoint.host_str().unwrap_or_default()),
    }
}
