//! Token authentication: credentials, providers and the handshake layer.

mod credential;
mod handshake;
mod provider;
mod token;

pub use credential::{AccessTokenCredential, BasicCredential, Credential, CredentialScheme};
pub use provider::{ProviderRegistry, TokenProvider};
pub use token::{IssuedToken, TokenSlot, TransportCredential};

pub(crate) use handshake::AuthHandshake;
pub use handshake::MAX_AUTH_RETRIES;
