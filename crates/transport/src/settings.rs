//! Transport-wide settings.

use std::time::Duration;

use http::header::{HeaderMap, HeaderValue, USER_AGENT};
use uuid::Uuid;

use crate::cancellation::DEFAULT_GRACE_WINDOW;
use crate::error::TransportError;
use crate::message::headers;
use crate::options::RetryOptions;

/// Default ceiling for buffered request/response content.
pub const DEFAULT_MAX_CONTENT_BUFFER_SIZE: usize = 512 * 1024 * 1024;

/// Hard cap for the content buffer ceiling.
pub const MAX_CONTENT_BUFFER_SIZE: usize = 1024 * 1024 * 1024;

/// Default bound on one whole send call, retries included.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(100);

/// Immutable configuration shared by every request through a pipeline.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// Ceiling for buffered bodies. 0 forces headers-only response reads.
    pub max_content_buffer_size: usize,
    /// Bound on the entire call. `Duration::ZERO` disables the bound.
    pub send_timeout: Duration,
    /// Retry behavior when a request carries no override.
    pub default_retry: RetryOptions,
    /// User-Agent product tokens, joined with spaces when stamped.
    pub user_agent: Vec<String>,
    /// Session correlation id stamped on every request.
    pub session_id: Uuid,
    /// Optional operation name appended to the session header.
    pub operation_name: Option<String>,
    /// Accept TLS certificates that fail verification. Test rigs only.
    pub accept_invalid_certs: bool,
    /// Extra trusted root certificates, DER-encoded.
    pub root_certificates_der: Vec<Vec<u8>>,
    /// Client identity (certificate + key) as a PEM bundle.
    pub client_identity_pem: Option<Vec<u8>>,
    /// Grace window granted after a cancellation signal fires.
    pub grace_window: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            max_content_buffer_size: DEFAULT_MAX_CONTENT_BUFFER_SIZE,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            default_retry: RetryOptions::default(),
            user_agent: Vec::new(),
            session_id: Uuid::new_v4(),
            operation_name: None,
            accept_invalid_certs: false,
            root_certificates_der: Vec::new(),
            client_identity_pem: None,
            grace_window: DEFAULT_GRACE_WINDOW,
        }
    }
}

impl TransportSettings {
    pub fn builder() -> TransportSettingsBuilder {
        TransportSettingsBuilder::default()
    }

    fn validate(&self) -> Result<(), TransportError> {
        if self.max_content_buffer_size > MAX_CONTENT_BUFFER_SIZE {
            return Err(TransportError::InvalidConfiguration {
                message: format!(
                    "max_content_buffer_size ({}) exceeds the hard cap of {} bytes",
                    self.max_content_buffer_size, MAX_CONTENT_BUFFER_SIZE
                ),
            });
        }
        Ok(())
    }

    /// Stamp ambient headers onto a request, without overwriting values the
    /// caller set explicitly.
    pub(crate) fn apply_headers(&self, headers_map: &mut HeaderMap) {
        if !headers_map.contains_key(&headers::SESSION_ID) {
            let value = match &self.operation_name {
                Some(operation) => format!("{}, {operation}", self.session_id),
                None => self.session_id.to_string(),
            };
            if let Ok(value) = HeaderValue::from_str(&value) {
                headers_map.insert(headers::SESSION_ID, value);
            }
        }

        if !self.user_agent.is_empty() && !headers_map.contains_key(USER_AGENT) {
            if let Ok(value) = HeaderValue::from_str(&self.user_agent.join(" ")) {
                headers_map.insert(USER_AGENT, value);
            }
        }
    }
}

/// Builder for [`TransportSettings`] with validation.
#[derive(Debug, Clone, Default)]
pub struct TransportSettingsBuilder {
    settings: Option<TransportSettings>,
}

impl TransportSettingsBuilder {
    fn settings(&mut self) -> &mut TransportSettings {
        self.settings.get_or_insert_with(TransportSettings::default)
    }

    pub fn max_content_buffer_size(mut self, size: usize) -> Self {
        self.settings().max_content_buffer_size = size;
        self
    }

    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.settings().send_timeout = timeout;
        self
    }

    pub fn default_retry(mut self, retry: RetryOptions) -> Self {
        self.settings().default_retry = retry;
        self
    }

    pub fn user_agent_product(mut self, product: impl Into<String>) -> Self {
        self.settings().user_agent.push(product.into());
        self
    }

    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.settings().operation_name = Some(name.into());
        self
    }

    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.settings().accept_invalid_certs = accept;
        self
    }

    pub fn root_certificate_der(mut self, der: Vec<u8>) -> Self {
        self.settings().root_certificates_der.push(der);
        self
    }

    pub fn client_identity_pem(mut self, pem: Vec<u8>) -> Self {
        self.settings().client_identity_pem = Some(pem);
        self
    }

    pub fn grace_window(mut self, window: Duration) -> Self {
        self.settings().grace_window = window;
        self
    }

    pub fn build(mut self) -> Result<TransportSettings, TransportError> {
        let settings = self.settings().clone();
        settings.validate()?;
        Ok(settings)
    }
}
