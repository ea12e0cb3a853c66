//! Structured transport fault model.
//!
//! The primitive transport reports failures as a [`TransportFault`]: a
//! human-readable message plus an ordered list of machine-readable
//! [`FaultCause`] values. The cause list replaces nested-exception walking;
//! adapters flatten their error chains (bounded by a maximum depth) into it
//! once, and the classifier only ever inspects the flattened list.

use std::fmt;

use serde::Serialize;

/// Connection-layer fault categories reported by an HTTP transport stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionFault {
    /// The connection could not be established.
    ConnectFailure,
    /// The connection was closed or reset by the peer.
    ConnectionClosed,
    /// A pooled keep-alive connection failed on reuse.
    KeepAliveFailure,
    /// Host name resolution failed.
    NameResolutionFailure,
    /// A receive operation failed mid-response.
    ReceiveFailure,
    /// A send operation failed mid-request.
    SendFailure,
    /// The transport-level operation timed out.
    Timeout,
}

/// Socket-layer fault categories (errno-style).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SocketFault {
    Interrupted,
    NetworkDown,
    NetworkUnreachable,
    NetworkReset,
    ConnectionAborted,
    ConnectionReset,
    TimedOut,
    HostDown,
    HostUnreachable,
    TryAgain,
}

/// A single machine-readable cause attached to a [`TransportFault`].
///
/// Causes are ordered outermost-first, mirroring the error chain the
/// transport adapter flattened them from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FaultCause {
    /// A connection-layer fault.
    Connection(ConnectionFault),
    /// A socket-layer fault.
    Socket(SocketFault),
    /// A platform transport stack error code (vendor numeric band).
    Platform(u32),
    /// A curl-style transport error code.
    Curl(u32),
    /// An HTTP status code observed while producing the failure.
    Status(u16),
    /// A TLS-layer failure, carrying the offending frame recorded by the
    /// transport for signature matching.
    TlsFrame(String),
    /// Anything the adapter could not map to a structured category.
    Other(String),
}

impl fmt::Display for FaultCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(kind) => write!(f, "connection/{kind:?}"),
            Self::Socket(kind) => write!(f, "socket/{kind:?}"),
            Self::Platform(code) => write!(f, "platform/{code}"),
            Self::Curl(code) => write!(f, "curl/{code}"),
            Self::Status(code) => write!(f, "status/{code}"),
            Self::TlsFrame(frame) => write!(f, "tls/{frame}"),
            Self::Other(message) => write!(f, "other/{message}"),
        }
    }
}

/// A failure raised by the primitive transport for one send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFault {
    message: String,
    causes: Vec<FaultCause>,
}

impl TransportFault {
    /// Create a fault with no structured causes.
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), causes: Vec::new() }
    }

    /// Create a fault with a single structured cause.
    pub fn with_cause(message: impl Into<String>, cause: FaultCause) -> Self {
        Self { message: message.into(), causes: vec![cause] }
    }

    /// Append a cause, preserving outermost-first ordering.
    #[must_use]
    pub fn and_cause(mut self, cause: FaultCause) -> Self {
        self.causes.push(cause);
        self
    }

    pub fn push_cause(&mut self, cause: FaultCause) {
        self.causes.push(cause);
    }

    /// The human-readable failure message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The ordered cause list, outermost first.
    pub fn causes(&self) -> &[FaultCause] {
        &self.causes
    }

    /// Build a fault from an I/O error, mapping its kind to a structured
    /// cause where one exists.
    pub fn from_io(message: impl Into<String>, error: &std::io::Error) -> Self {
        let mut fault = Self::new(message);
        match socket_fault_from_io_kind(error.kind()) {
            Some(kind) => fault.push_cause(FaultCause::Socket(kind)),
            None => match connection_fault_from_io_kind(error.kind()) {
                Some(kind) => fault.push_cause(FaultCause::Connection(kind)),
                None => fault.push_cause(FaultCause::Other(error.to_string())),
            },
        }
        fault
    }
}

/// Map an I/O error kind to a socket-layer fault category.
pub(crate) fn socket_fault_from_io_kind(kind: std::io::ErrorKind) -> Option<SocketFault> {
    use std::io::ErrorKind;
    match kind {
        ErrorKind::Interrupted => Some(SocketFault::Interrupted),
        ErrorKind::ConnectionAborted => Some(SocketFault::ConnectionAborted),
        ErrorKind::ConnectionReset => Some(SocketFault::ConnectionReset),
        ErrorKind::TimedOut => Some(SocketFault::TimedOut),
        ErrorKind::WouldBlock => Some(SocketFault::TryAgain),
        _ => None,
    }
}

/// Map an I/O error kind to a connection-layer fault category.
pub(crate) fn connection_fault_from_io_kind(kind: std::io::ErrorKind) -> Option<ConnectionFault> {
    use std::io::ErrorKind;
    match kind {
        ErrorKind::ConnectionRefused | ErrorKind::AddrNotAvailable => {
            Some(ConnectionFault::ConnectFailure)
        }
        ErrorKind::BrokenPipe => Some(ConnectionFault::SendFailure),
        ErrorKind::UnexpectedEof | ErrorKind::NotConnected => {
            Some(ConnectionFault::ConnectionClosed)
        }
        _ => None,
    }
}

impl fmt::Display for TransportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if !self.causes.is_empty() {
            write!(f, " [")?;
            for (index, cause) in self.causes.iter().enumerate() {
                if index > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{cause}")?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

impl std::error::Error for TransportFault {}
