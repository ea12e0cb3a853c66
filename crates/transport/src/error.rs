//! Public failure taxonomy for the transport.

use std::time::Duration;

use thiserror::Error;

use crate::auth::CredentialScheme;
use crate::fault::TransportFault;

/// Convenience alias for transport results.
pub type TransportResult<T> = Result<T, TransportError>;

/// Terminal failures surfaced to callers of the pipeline.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server kept challenging after the token reacquisition budget was
    /// spent, no provider could be resolved, or interaction was required but
    /// not allowed.
    #[error("authorization failed ({scheme}): {}", message.as_deref().unwrap_or("the server rejected the supplied credentials"))]
    Unauthorized {
        /// Scheme of the credential that failed.
        scheme: CredentialScheme,
        /// Server-supplied diagnostic, when one was present.
        message: Option<String>,
    },

    /// A retryable fault survived every attempt. The underlying fault is
    /// carried verbatim.
    #[error("transient failure persisted after {attempts} attempt(s): {fault}")]
    Transient {
        #[source]
        fault: TransportFault,
        attempts: u32,
    },

    /// The cancellation signal fired and the operation ignored it past the
    /// grace window.
    #[error("{}", message.as_deref().unwrap_or("operation did not honor the cancellation signal"))]
    EnforcedCancellation {
        /// Call-site label identifying which operation was abandoned.
        site: &'static str,
        message: Option<String>,
    },

    /// The caller's cancellation signal fired and the operation honored it.
    #[error("the request was cancelled")]
    Cancelled,

    /// The settings' send timeout elapsed before the call completed.
    #[error("the request timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// A request or response body exceeded the configured buffer ceiling.
    #[error("content size exceeds the maximum buffer of {limit} bytes")]
    ContentTooLarge {
        /// Configured ceiling in bytes.
        limit: usize,
        /// Observed size, when known at the point of failure.
        actual: Option<usize>,
    },

    /// A non-retryable transport fault.
    #[error("transport failure: {0}")]
    Fatal(#[source] TransportFault),

    /// A token provider failed to produce a token.
    #[error("token acquisition failed: {0}")]
    TokenAcquisition(String),

    /// A builder rejected its inputs.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl TransportError {
    /// Whether re-running the whole logical call could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }

    /// Whether the failure was driven by a cancellation signal.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::EnforcedCancellation { .. })
    }
}

/// Internal outcome of one handshake-level attempt.
///
/// Splits failures the retry loop may classify from those that must
/// short-circuit the loop untouched.
#[derive(Debug)]
pub(crate) enum AttemptFailure {
    /// A transport fault eligible for classification.
    Fault(TransportFault),
    /// A terminal error propagated verbatim.
    Terminal(TransportError),
}

impl From<TransportError> for AttemptFailure {
    fn from(error: TransportError) -> Self {
        Self::Terminal(error)
    }
}
