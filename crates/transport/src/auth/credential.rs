//! Credentials and the concrete token providers they create.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use serde::Serialize;
use url::Url;

use crate::auth::provider::TokenProvider;
use crate::auth::token::{IssuedToken, TokenSlot, TransportCredential};
use crate::error::TransportError;
use crate::message::Response;

/// Authentication scheme families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CredentialScheme {
    Basic,
    Bearer,
    Federated,
    Other,
}

impl fmt::Display for CredentialScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Basic => "basic",
            Self::Bearer => "bearer",
            Self::Federated => "federated",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// A source of token providers for target endpoints.
///
/// Opaque beyond "produce a provider for this URL and optional prior
/// challenge"; the handshake never inspects credential internals.
pub trait Credential: Send + Sync {
    fn scheme(&self) -> CredentialScheme;

    /// Whether interactive acquisition is permitted. Providers that require
    /// interaction fail the handshake when this is false.
    fn prompt_allowed(&self) -> bool {
        false
    }

    /// Whether a response constitutes an authentication challenge.
    fn is_authentication_challenge(&self, response: &Response) -> bool {
        matches!(
            response.status,
            StatusCode::UNAUTHORIZED | StatusCode::PROXY_AUTHENTICATION_REQUIRED
        )
    }

    /// Produce a token provider for `endpoint`, optionally specialized to a
    /// concrete challenge. `None` means this credential cannot authenticate
    /// against the endpoint.
    fn create_token_provider(
        &self,
        endpoint: &Url,
        challenge: Option<&Response>,
    ) -> Option<Arc<dyn TokenProvider>>;
}

/// A static bearer token (personal access token, OIDC token).
#[derive(Clone)]
pub struct AccessTokenCredential {
    token: String,
}

impl AccessTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl fmt::Debug for AccessTokenCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenCredential").field("token", &"***").finish()
    }
}

impl Credential for AccessTokenCredential {
    fn scheme(&self) -> CredentialScheme {
        CredentialScheme::Bearer
    }

    fn create_token_provider(
        &self,
        _endpoint: &Url,
        _challenge: Option<&Response>,
    ) -> Option<Arc<dyn TokenProvider>> {
        Some(Arc::new(BearerTokenProvider {
            token: self.token.clone(),
            slot: TokenSlot::new(),
        }))
    }
}

struct BearerTokenProvider {
    token: String,
    slot: TokenSlot,
}

#[async_trait]
impl TokenProvider for BearerTokenProvider {
    fn scheme(&self) -> CredentialScheme {
        CredentialScheme::Bearer
    }

    fn current_token(&self) -> Option<IssuedToken> {
        self.slot.current()
    }

    async fn acquire_token(
        &self,
        _failed: Option<&IssuedToken>,
        _challenge: Option<Response>,
    ) -> Result<IssuedToken, TransportError> {
        let token = IssuedToken::bearer(&self.token);
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

/// A username/password pair applied at the transport level.
#[derive(Clone)]
pub struct BasicCredential {
    username: String,
    password: String,
}

impl BasicCredential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }
}

impl fmt::Debug for BasicCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredential")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl Credential for BasicCredential {
    fn scheme(&self) -> CredentialScheme {
        CredentialScheme::Basic
    }

    fn create_token_provider(
        &self,
        _endpoint: &Url,
        _challenge: Option<&Response>,
    ) -> Option<Arc<dyn TokenProvider>> {
        Some(Arc::new(BasicTokenProvider {
            credential: TransportCredential::new(&self.username, &self.password),
            slot: TokenSlot::new(),
        }))
    }
}

struct BasicTokenProvider {
    credential: TransportCredential,
    slot: TokenSlot,
}

#[async_trait]
impl TokenProvider for BasicTokenProvider {
    fn scheme(&self) -> CredentialScheme {
        CredentialScheme::Basic
    }

    fn current_token(&self) -> Option<IssuedToken> {
        self.slot.current()
    }

    async fn acquire_token(
        &self,
        _failed: Option<&IssuedToken>,
        _challenge: Option<Response>,
    ) -> Result<IssuedToken, TransportError> {
        let token = IssuedToken::TransportCredential(self.credential.clone());
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

#[cfg(test)]
mod tests {
    use super::*;

    /// Bearer providers issue header-material tokens and track them.
    #[tokio::test]
    async fn test_bearer_provider_round_trip() {
        let credential = AccessTokenCredential::new("pat-123");
        let endpoint = Url::parse("https://service.test/").unwrap();
        let provider = credential.create_token_provider(&endpoint, None).unwrap();

        assert_eq!(provider.current_token(), None);

        let token = provider.acquire_token(None, None).await.unwrap();
        match &token {
            IssuedToken::Header { value, .. } => assert_eq!(value, "Bearer pat-123"),
            other => panic!("expected header material, got {other:?}"),
        }
        assert_eq!(provider.current_token(), Some(token.clone()));

        provider.invalidate_token(&token);
        assert_eq!(provider.current_token(), None);
    }

    /// Basic providers issue transport-level credentials.
    #[tokio::test]
    async fn test_basic_provider_issues_transport_credential() {
        let credential = BasicCredential::new("svc", "hunter2");
        let endpoint = Url::parse("https://service.test/").unwrap();
        let provider = credential.create_token_provider(&endpoint, None).unwrap();

        let token = provider.acquire_token(None, None).await.unwrap();
        match token {
            IssuedToken::TransportCredential(transport) => {
                assert_eq!(transport.username, "svc");
            }
            other => panic!("expected transport credential, got {other:?}"),
        }
    }

    /// The default challenge predicate accepts 401 and 407, nothing else.
    #[test]
    fn test_default_challenge_predicate() {
        let credential = AccessTokenCredential::new("t");
        assert!(credential.is_authentication_challenge(&Response::new(StatusCode::UNAUTHORIZED)));
        assert!(credential
            .is_authentication_challenge(&Response::new(StatusCode::PROXY_AUTHENTICATION_REQUIRED)));
        assert!(!credential.is_authentication_challenge(&Response::new(StatusCode::FORBIDDEN)));
        assert!(!credential.is_authentication_challenge(&Response::new(StatusCode::OK)));
    }

    /// Secrets stay out of debug output.
    #[test]
    fn test_debug_redaction() {
        assert!(!format!("{:?}", AccessTokenCredential::new("secret-pat")).contains("secret-pat"));
        assert!(!format!("{:?}", BasicCredential::new("svc", "pw")).contains("pw\""));
    }
}
