//! Retry and per-request options.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;

use crate::error::TransportError;
use crate::trace::TraceSink;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default minimum backoff between attempts.
pub const DEFAULT_MIN_BACKOFF: Duration = Duration::from_secs(10);

/// Default maximum backoff between attempts.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(600);

/// Default exponential growth coefficient.
pub const DEFAULT_BACKOFF_COEFFICIENT: f64 = 2.0;

/// Attempt multiplier applied to low-priority requests.
pub const LOW_PRIORITY_ATTEMPT_MULTIPLIER: u32 = 10;

/// Minimum-backoff multiplier applied to low-priority requests.
pub const LOW_PRIORITY_BACKOFF_MULTIPLIER: u32 = 2;

/// Retry behavior for a transport or a single request.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOptions {
    /// Retries after the first attempt. Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    /// Backoff floor; the first wait is exactly this long.
    pub min_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
    /// Exponential growth coefficient.
    pub backoff_coefficient: f64,
    /// Response status codes treated as retryable.
    pub retryable_status_codes: HashSet<StatusCode>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        let mut retryable_status_codes = HashSet::new();
        retryable_status_codes.insert(StatusCode::REQUEST_TIMEOUT);
        retryable_status_codes.insert(StatusCode::TOO_MANY_REQUESTS);
        retryable_status_codes.insert(StatusCode::BAD_GATEWAY);
        retryable_status_codes.insert(StatusCode::SERVICE_UNAVAILABLE);
        retryable_status_codes.insert(StatusCode::GATEWAY_TIMEOUT);

        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            min_backoff: DEFAULT_MIN_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            backoff_coefficient: DEFAULT_BACKOFF_COEFFICIENT,
            retryable_status_codes,
        }
    }
}

impl RetryOptions {
    pub fn builder() -> RetryOptionsBuilder {
        RetryOptionsBuilder::default()
    }

    /// Total attempts including the first send.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn is_retryable_status(&self, status: StatusCode) -> bool {
        self.retryable_status_codes.contains(&status)
    }
}

/// Builder for [`RetryOptions`] with validation.
#[derive(Debug, Clone, Default)]
pub struct RetryOptionsBuilder {
    max_retries: Option<u32>,
    min_backoff: Option<Duration>,
    max_backoff: Option<Duration>,
    backoff_coefficient: Option<f64>,
    retryable_status_codes: Option<HashSet<StatusCode>>,
}

impl RetryOptionsBuilder {
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn min_backoff(mut self, backoff: Duration) -> Self {
        self.min_backoff = Some(backoff);
        self
    }

    pub fn max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = Some(backoff);
        self
    }

    pub fn backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = Some(coefficient);
        self
    }

    pub fn retryable_status_codes(mut self, codes: impl IntoIterator<Item = StatusCode>) -> Self {
        self.retryable_status_codes = Some(codes.into_iter().collect());
        self
    }

    /// Build the options, validating cross-field constraints.
    pub fn build(self) -> Result<RetryOptions, TransportError> {
        let defaults = RetryOptions::default();
        let options = RetryOptions {
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            min_backoff: self.min_backoff.unwrap_or(defaults.min_backoff),
            max_backoff: self.max_backoff.unwrap_or(defaults.max_backoff),
            backoff_coefficient: self
                .backoff_coefficient
                .unwrap_or(defaults.backoff_coefficient),
            retryable_status_codes: self
                .retryable_status_codes
                .unwrap_or(defaults.retryable_status_codes),
        };
        options.validate()?;
        Ok(options)
    }
}

impl RetryOptions {
    fn validate(&self) -> Result<(), TransportError> {
        if self.max_backoff < self.min_backoff {
            return Err(TransportError::InvalidConfiguration {
                message: format!(
                    "max_backoff ({:?}) must be >= min_backoff ({:?})",
                    self.max_backoff, self.min_backoff
                ),
            });
        }
        if !self.backoff_coefficient.is_finite() || self.backoff_coefficient < 1.0 {
            return Err(TransportError::InvalidConfiguration {
                message: format!(
                    "backoff_coefficient must be a finite value >= 1.0, got {}",
                    self.backoff_coefficient
                ),
            });
        }
        Ok(())
    }
}

/// How much of the response must be read before a send call completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// Read the full response body into a bounded buffer (default).
    #[default]
    ResponseBodyRead,
    /// Return as soon as headers are available; body stays streaming.
    HeadersOnly,
}

/// Per-request options layered over the transport defaults.
#[derive(Clone, Default)]
pub struct RequestOptions {
    /// Retry override for this request; `None` uses the transport default.
    pub retry: Option<RetryOptions>,
    /// Low-priority work: budget x10 attempts, x2 minimum backoff.
    pub low_priority: bool,
    /// Response completion mode.
    pub completion: CompletionMode,
    /// Per-request trace sink override.
    pub trace: Option<Arc<dyn TraceSink>>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn low_priority(mut self) -> Self {
        self.low_priority = true;
        self
    }

    pub fn headers_only(mut self) -> Self {
        self.completion = CompletionMode::HeadersOnly;
        self
    }

    pub fn with_trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace = Some(sink);
        self
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("retry", &self.retry)
            .field("low_priority", &self.low_priority)
            .field("completion", &self.completion)
            .field("trace", &self.trace.as_ref().map(|_| "<sink>"))
            .finish()
    }
}
