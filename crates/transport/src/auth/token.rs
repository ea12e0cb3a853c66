//! Issued token material.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use http::header::{HeaderName, AUTHORIZATION};
use parking_lot::RwLock;

/// A username/secret pair applied at the transport level rather than as a
/// request header (proxy credentials, negotiated schemes).
#[derive(Clone, PartialEq, Eq)]
pub struct TransportCredential {
    pub username: String,
    pub secret: String,
}

impl TransportCredential {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self { username: username.into(), secret: secret.into() }
    }

    /// The credential as a basic `Authorization` header value.
    pub fn basic_header_value(&self) -> String {
        let encoded = BASE64.encode(format!("{}:{}", self.username, self.secret));
        format!("Basic {encoded}")
    }
}

impl fmt::Debug for TransportCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportCredential")
            .field("username", &self.username)
            .field("secret", &"***")
            .finish()
    }
}

/// Token material produced by a provider, tagged by how it is applied.
#[derive(Clone, PartialEq, Eq)]
pub enum IssuedToken {
    /// Applied as a request header before each send.
    Header { name: HeaderName, value: String },
    /// Handed to the primitive transport for connection-level application.
    TransportCredential(TransportCredential),
}

impl IssuedToken {
    /// A bearer token carried in the `Authorization` header.
    pub fn bearer(token: impl AsRef<str>) -> Self {
        Self::Header {
            name: AUTHORIZATION,
            value: format!("Bearer {}", token.as_ref()),
        }
    }

    /// Arbitrary header material.
    pub fn header(name: HeaderName, value: impl Into<String>) -> Self {
        Self::Header { name, value: value.into() }
    }
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header { name, .. } => {
                f.debug_struct("IssuedToken::Header").field("name", name).field("value", &"***").finish()
            }
            Self::TransportCredential(credential) => {
                f.debug_tuple("IssuedToken::TransportCredential").field(credential).finish()
            }
        }
    }
}

/// A provider's current-token slot with compare-and-swap semantics.
///
/// Validation after a successful response must not clobber a newer token
/// acquired concurrently, so stores are conditional on the slot still
/// holding the token the caller worked with.
#[derive(Debug, Default)]
pub struct TokenSlot {
    current: RwLock<Option<IssuedToken>>,
}

impl TokenSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<IssuedToken> {
        self.current.read().clone()
    }

    /// Unconditionally install a freshly acquired token.
    pub fn store(&self, token: IssuedToken) {
        *self.current.write() = Some(token);
    }

    /// Install `token` only if the slot is empty or still holds it.
    pub fn store_if_current(&self, token: &IssuedToken) {
        let mut guard = self.current.write();
        match guard.as_ref() {
            Some(held) if held != token => {}
            _ => *guard = Some(token.clone()),
        }
    }

    /// Clear the slot only if it still holds `token`.
    pub fn invalidate(&self, token: &IssuedToken) {
        let mut guard = self.current.write();
        if guard.as_ref() == Some(token) {
            *guard = None;
        }
    }
}
