//! Bounded retry over the authenticated transport.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::auth::AuthHandshake;
use crate::backoff::exponential_backoff;
use crate::classify::{classify_fault, classify_status, fault_detail, Classification, FaultDetail};
use crate::error::{AttemptFailure, TransportError, TransportResult};
use crate::message::{headers, Request, Response};
use crate::options::{
    RequestOptions, RetryOptions, LOW_PRIORITY_ATTEMPT_MULTIPLIER, LOW_PRIORITY_BACKOFF_MULTIPLIER,
};
use crate::settings::TransportSettings;
use crate::trace::{AttemptOutcome, AttemptTrace, PhaseTimings, TraceSink};

pub(crate) struct RetryTransport {
    handshake: AuthHandshake,
    settings: Arc<TransportSettings>,
    sink: Arc<dyn TraceSink>,
}

impl RetryTransport {
    pub(crate) fn new(
        handshake: AuthHandshake,
        settings: Arc<TransportSettings>,
        sink: Arc<dyn TraceSink>,
    ) -> Self {
        Self { handshake, settings, sink }
    }

    /// Drive one logical call to completion, retrying transient failures
    /// with exponential backoff.
    pub(crate) async fn send(
        &self,
        request: &mut Request,
        options: &RequestOptions,
        cancel: &CancellationToken,
    ) -> TransportResult<Response> {
        let base = options
            .retry
            .clone()
            .unwrap_or_else(|| self.settings.default_retry.clone());
        let (max_attempts, min_backoff) = effective_budget(&base, options.low_priority);
        let sink: Arc<dyn TraceSink> =
            options.trace.clone().unwrap_or_else(|| Arc::clone(&self.sink));

        let mut attempt: u32 = 1;
        loop {
            let mut timings = PhaseTimings::default();
            let outcome = self.handshake.send(request, options, cancel, &mut timings).await;

            match outcome {
                Ok(response) if response.is_success() => {
                    if attempt > 1 {
                        sink.record(&AttemptTrace {
                            attempt,
                            max_attempts,
                            outcome: AttemptOutcome::Succeeded,
                            backoff_ms: None,
                            detail: FaultDetail::default(),
                            server_ref: server_ref(&response),
                            timings,
                        });
                    }
                    return Ok(response);
                }
                Ok(response) => {
                    let detail = FaultDetail { status: Some(response.status.as_u16()), ..FaultDetail::default() };
                    match classify_status(response.status, &base) {
                        Classification::Retryable(detail)
                            if attempt < max_attempts && request.body.is_replayable() =>
                        {
                            let delay = exponential_backoff(
                                attempt,
                                min_backoff,
                                base.max_backoff,
                                base.backoff_coefficient,
                            );
                            sink.record(&AttemptTrace {
                                attempt,
                                max_attempts,
                                outcome: AttemptOutcome::Retrying,
                                backoff_ms: Some(delay.as_millis() as u64),
                                detail,
                                server_ref: server_ref(&response),
                                timings,
                            });
                            drop(response);
                            wait_backoff(delay, cancel).await?;
                            attempt += 1;
                        }
                        Classification::Retryable(detail) => {
                            // Budget spent (or body not replayable); the last
                            // response goes back for status-level handling.
                            sink.record(&AttemptTrace {
                                attempt,
                                max_attempts,
                                outcome: AttemptOutcome::Exhausted,
                                backoff_ms: None,
                                detail,
                                server_ref: server_ref(&response),
                                timings,
                            });
                            return Ok(response);
                        }
                        Classification::Fatal => {
                            sink.record(&AttemptTrace {
                                attempt,
                                max_attempts,
                                outcome: AttemptOutcome::Fatal,
                                backoff_ms: None,
                                detail,
                                server_ref: server_ref(&response),
                                timings,
                            });
                            return Ok(response);
                        }
                    }
                }
                Err(AttemptFailure::Fault(fault)) => match classify_fault(&fault, &base) {
                    Classification::Retryable(detail)
                        if attempt < max_attempts && request.body.is_replayable() =>
                    {
                        let delay = exponential_backoff(
                            attempt,
                            min_backoff,
                            base.max_backoff,
                            base.backoff_coefficient,
                        );
                        sink.record(&AttemptTrace {
                            attempt,
                            max_attempts,
                            outcome: AttemptOutcome::Retrying,
                            backoff_ms: Some(delay.as_millis() as u64),
                            detail,
                            server_ref: None,
                            timings,
                        });
                        debug!(attempt, delay_ms = delay.as_millis() as u64, fault = %fault, "retrying after transient fault");
                        wait_backoff(delay, cancel).await?;
                        attempt += 1;
                    }
                    Classification::Retryable(detail) => {
                        sink.record(&AttemptTrace {
                            attempt,
                            max_attempts,
                            outcome: AttemptOutcome::Exhausted,
                            backoff_ms: None,
                            detail,
                            server_ref: None,
                            timings,
                        });
                        return Err(TransportError::Transient { fault, attempts: attempt });
                    }
                    Classification::Fatal => {
                        sink.record(&AttemptTrace {
                            attempt,
                            max_attempts,
                            outcome: AttemptOutcome::Fatal,
                            backoff_ms: None,
                            detail: fault_detail(&fault),
                            server_ref: None,
                            timings,
                        });
                        return Err(TransportError::Fatal(fault));
                    }
                },
                Err(AttemptFailure::Terminal(error)) => return Err(error),
            }
        }
    }
}

/// Attempt ceiling and backoff floor after the low-priority adjustment.
fn effective_budget(base: &RetryOptions, low_priority: bool) -> (u32, Duration) {
    if low_priority {
        (
            base.max_attempts().saturating_mul(LOW_PRIORITY_ATTEMPT_MULTIPLIER),
            base.min_backoff * LOW_PRIORITY_BACKOFF_MULTIPLIER,
        )
    } else {
        (base.max_attempts(), base.min_backoff)
    }
}

fn server_ref(response: &Response) -> Option<String> {
    response.header_str(&headers::REQUEST_REF).map(str::to_owned)
}

async fn wait_backoff(delay: Duration, cancel: &CancellationToken) -> TransportResult<()> {
    tokio::select! {
        () = tokio::time::sleep(delay) => Ok(()),
        () = cancel.cancelled() => Err(TransportError::Cancelled),
    }
}
