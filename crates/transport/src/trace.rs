//! Structured per-attempt trace events.
//!
//! Every retry decision and terminal outcome is reported as an
//! [`AttemptTrace`] to a [`TraceSink`], so operational tooling can consume
//! attempt data without parsing log lines. The default sink forwards to
//! `tracing`.

use serde::Serialize;

use crate::classify::FaultDetail;

/// Where an attempt's wall-clock time went, in milliseconds.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PhaseTimings {
    /// Time spent materializing request/response bodies.
    pub buffering_ms: u64,
    /// Time spent in the primitive transport send.
    pub send_ms: u64,
    /// Time spent acquiring tokens.
    pub token_ms: u64,
}

/// How an attempt concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttemptOutcome {
    /// The attempt succeeded (only traced when earlier attempts failed).
    Succeeded,
    /// The attempt failed retryably and another attempt will follow.
    Retrying,
    /// The attempt failed retryably but the budget is spent.
    Exhausted,
    /// The attempt failed with a non-retryable classification.
    Fatal,
}

/// One attempt-level trace event.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptTrace {
    /// 1-based attempt number.
    pub attempt: u32,
    /// Attempt ceiling in effect for this call.
    pub max_attempts: u32,
    pub outcome: AttemptOutcome,
    /// Backoff before the next attempt, when one will follow.
    pub backoff_ms: Option<u64>,
    /// Classification detail for the failure, when there was one.
    pub detail: FaultDetail,
    /// Server-side request reference header, when the response carried one.
    pub server_ref: Option<String>,
    pub timings: PhaseTimings,
}

/// Consumer of attempt-level trace events. Implementations must not panic.
pub trait TraceSink: Send + Sync {
    fn record(&self, event: &AttemptTrace);
}

/// Default sink: emits attempt events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn record(&self, event: &AttemptTrace) {
        match event.outcome {
            AttemptOutcome::Succeeded => tracing::debug!(
                attempt = event.attempt,
                max_attempts = event.max_attempts,
                send_ms = event.timings.send_ms,
                "request succeeded after retries"
            ),
            AttemptOutcome::Retrying => tracing::warn!(
                attempt = event.attempt,
                max_attempts = event.max_attempts,
                backoff_ms = event.backoff_ms,
                status = event.detail.status,
                socket = ?event.detail.socket,
                platform = event.detail.platform,
                curl = event.detail.curl,
                server_ref = event.server_ref.as_deref(),
                "transient failure, will retry"
            ),
            AttemptOutcome::Exhausted => tracing::warn!(
                attempt = event.attempt,
                max_attempts = event.max_attempts,
                status = event.detail.status,
                server_ref = event.server_ref.as_deref(),
                "retry budget exhausted"
            ),
            AttemptOutcome::Fatal => tracing::debug!(
                attempt = event.attempt,
                status = event.detail.status,
                server_ref = event.server_ref.as_deref(),
                "non-retryable failure"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Attempt events serialize with their classification detail inline.
    #[test]
    fn test_attempt_trace_serializes() {
        let event = AttemptTrace {
            attempt: 2,
            max_attempts: 4,
            outcome: AttemptOutcome::Retrying,
            backoff_ms: Some(20),
            detail: FaultDetail { status: Some(503), ..FaultDetail::default() },
            server_ref: Some("ref-123".into()),
            timings: PhaseTimings { buffering_ms: 1, send_ms: 30, token_ms: 0 },
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["attempt"], 2);
        assert_eq!(json["outcome"], "Retrying");
        assert_eq!(json["detail"]["status"], 503);
        assert_eq!(json["server_ref"], "ref-123");
        assert_eq!(json["timings"]["send_ms"], 30);
    }
}
