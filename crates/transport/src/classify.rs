//! Transient fault classification.
//!
//! Decides whether a failed attempt is worth retrying. Classification is a
//! pure function over the failure and the active [`RetryOptions`]; anything
//! it does not recognize is Fatal.

use http::StatusCode;
use serde::Serialize;

use crate::fault::{FaultCause, SocketFault, TransportFault};
use crate::options::RetryOptions;

/// Platform transport stack code band (inclusive start, exclusive end).
const PLATFORM_CODE_BAND: (u32, u32) = (12_000, 12_200);

/// Retryable subset of the platform code band: timeouts, name resolution,
/// connect and keep-alive failures, connection errors and resets.
const RETRYABLE_PLATFORM_CODES: [u32; 5] = [12_002, 12_004, 12_007, 12_029, 12_030];

/// Curl-style transport code band (inclusive).
const CURL_CODE_BAND: (u32, u32) = (1, 92);

/// Retryable subset of curl-style codes: resolution, connect, partial
/// transfers, timeouts, send/recv failures and stream errors.
const RETRYABLE_CURL_CODES: [u32; 14] = [5, 6, 7, 16, 18, 23, 25, 26, 28, 45, 52, 55, 56, 92];

/// Frame signature of the benign TLS teardown race: a write against a
/// security context that expired while the connection was being torn down.
const TLS_TEARDOWN_FRAME_SIGNATURE: &str = "ssl_stream::start_write";

/// Machine-readable detail about what made a failure retryable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FaultDetail {
    /// HTTP status code, when the failure was (or carried) a response status.
    pub status: Option<u16>,
    /// Socket-layer fault that matched.
    pub socket: Option<SocketFault>,
    /// Platform transport stack code that matched.
    pub platform: Option<u32>,
    /// Curl-style transport code that matched.
    pub curl: Option<u32>,
}

impl FaultDetail {
    fn from_status(status: StatusCode) -> Self {
        Self { status: Some(status.as_u16()), ..Self::default() }
    }
}

/// Outcome of classifying a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Worth retrying; carries the detail that matched, for tracing.
    Retryable(FaultDetail),
    /// Not worth retrying.
    Fatal,
}

impl Classification {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

/// Classify a response status code against the configured retryable set.
pub fn classify_status(status: StatusCode, options: &RetryOptions) -> Classification {
    if options.is_retryable_status(status) {
        Classification::Retryable(FaultDetail::from_status(status))
    } else {
        Classification::Fatal
    }
}

/// Classify a transport fault by walking its cause list in order.
///
/// Status causes are consulted first (a failure that carried a response
/// status in the retryable set is retryable regardless of what else went
/// wrong); then each cause is matched against the scheme-specific
/// heuristics. The first retryable match wins and its code lands in the
/// returned [`FaultDetail`].
pub fn classify_fault(fault: &TransportFault, options: &RetryOptions) -> Classification {
    for cause in fault.causes() {
        if let FaultCause::Status(code) = cause {
            if let Ok(status) = StatusCode::from_u16(*code) {
                if options.is_retryable_status(status) {
                    return Classification::Retryable(FaultDetail::from_status(status));
                }
            }
        }
    }

    for cause in fault.causes() {
        match cause {
            FaultCause::Connection(_) => {
                return Classification::Retryable(FaultDetail::default());
            }
            FaultCause::Socket(kind) => {
                return Classification::Retryable(FaultDetail {
                    socket: Some(*kind),
                    ..FaultDetail::default()
                });
            }
            FaultCause::Platform(code) if is_retryable_platform_code(*code) => {
                return Classification::Retryable(FaultDetail {
                    platform: Some(*code),
                    ..FaultDetail::default()
                });
            }
            FaultCause::Curl(code) if is_retryable_curl_code(*code) => {
                return Classification::Retryable(FaultDetail {
                    curl: Some(*code),
                    ..FaultDetail::default()
                });
            }
            FaultCause::TlsFrame(frame) if frame.contains(TLS_TEARDOWN_FRAME_SIGNATURE) => {
                return Classification::Retryable(FaultDetail::default());
            }
            _ => {}
        }
    }

    Classification::Fatal
}

/// Harvest trace detail from a fault's cause list without judging
/// retryability. The first cause of each kind wins.
pub fn fault_detail(fault: &TransportFault) -> FaultDetail {
    let mut detail = FaultDetail::default();
    for cause in fault.causes() {
        match cause {
            FaultCause::Status(code) if detail.status.is_none() => detail.status = Some(*code),
            FaultCause::Socket(kind) if detail.socket.is_none() => detail.socket = Some(*kind),
            FaultCause::Platform(code) if detail.platform.is_none() => {
                detail.platform = Some(*code);
            }
            FaultCause::Curl(code) if detail.curl.is_none() => detail.curl = Some(*code),
            _ => {}
        }
    }
    detail
}

fn is_retryable_platform_code(code: u32) -> bool {
    code >= PLATFORM_CODE_BAND.0
        && code < PLATFORM_CODE_BAND.1
        && RETRYABLE_PLATFORM_CODES.contains(&code)
}

fn is_retryable_curl_code(code: u32) -> bool {
    code >= CURL_CODE_BAND.0 && code <= CURL_CODE_BAND.1 && RETRYABLE_CURL_CODES.contains(&code)
}
