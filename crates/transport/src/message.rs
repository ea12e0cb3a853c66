//! Request and response model.
//!
//! The transport works over its own small message types rather than any one
//! HTTP client's. Bodies are a tagged enum so buffering and retry can reason
//! about replayability without sniffing headers.

use std::fmt;

use bytes::Bytes;
use futures::stream::BoxStream;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{Method, StatusCode};
use url::Url;

/// Diagnostic and protocol headers exchanged with the service.
pub mod headers {
    use http::HeaderName;

    /// Session correlation id stamped on every request.
    pub const SESSION_ID: HeaderName = HeaderName::from_static("x-session-id");
    /// Server marker that an authentication failure is not worth reattempting.
    pub const AUTH_FAILURE: HeaderName = HeaderName::from_static("x-auth-failure");
    /// Server-supplied error detail attached to auth challenges.
    pub const SERVICE_ERROR: HeaderName = HeaderName::from_static("x-service-error");
    /// Server-side reference for a specific request, echoed into traces.
    pub const REQUEST_REF: HeaderName = HeaderName::from_static("x-request-ref");
    /// Asks the server to return identity info after a fresh token.
    pub const USER_DATA: HeaderName = HeaderName::from_static("x-user-data");
}

/// Streamed body chunks.
pub type BodyStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

/// Request body.
pub enum Body {
    /// No body.
    Empty,
    /// Fully materialized body; replayable across attempts.
    Bytes(Bytes),
    /// Streaming body with an optionally declared length. Consumed by the
    /// first send and not replayable afterwards.
    Stream {
        len: Option<u64>,
        stream: BodyStream,
    },
    /// A stream that was already handed to the transport.
    Consumed,
}

impl Body {
    /// Length known without reading the body, if any.
    pub fn declared_len(&self) -> Option<u64> {
        match self {
            Self::Empty => Some(0),
            Self::Bytes(bytes) => Some(bytes.len() as u64),
            Self::Stream { len, .. } => *len,
            Self::Consumed => None,
        }
    }

    /// Whether the body can be sent again on a later attempt.
    pub fn is_replayable(&self) -> bool {
        matches!(self, Self::Empty | Self::Bytes(_))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Stream { len, .. } => f.debug_struct("Stream").field("len", len).finish(),
            Self::Consumed => f.write_str("Consumed"),
        }
    }
}

/// An outgoing request.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Body,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url, headers: HeaderMap::new(), body: Body::Empty }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn body_bytes(mut self, bytes: impl Into<Bytes>) -> Self {
        self.body = Body::Bytes(bytes.into());
        self
    }

    #[must_use]
    pub fn body_stream(mut self, len: Option<u64>, stream: BodyStream) -> Self {
        self.body = Body::Stream { len, stream };
        self
    }

    /// Whether the caller explicitly opted into chunked transfer encoding.
    pub fn is_explicitly_chunked(&self) -> bool {
        self.headers
            .get(TRANSFER_ENCODING)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.to_ascii_lowercase().contains("chunked"))
    }

    /// Stamp the exact content length for a materialized or declared body.
    pub(crate) fn set_content_length(&mut self, len: u64) {
        self.headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    }

    /// Snapshot this request for one send attempt.
    ///
    /// Replayable bodies are cheaply cloned; a streaming body is moved out
    /// and the request is left marked as consumed.
    pub(crate) fn take_send_snapshot(&mut self) -> SendRequest {
        let body = match std::mem::replace(&mut self.body, Body::Consumed) {
            Body::Empty => {
                self.body = Body::Empty;
                SendBody::Empty
            }
            Body::Bytes(bytes) => {
                self.body = Body::Bytes(bytes.clone());
                SendBody::Bytes(bytes)
            }
            Body::Stream { len, stream } => SendBody::Stream { len, stream },
            Body::Consumed => SendBody::Empty,
        };
        SendRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body,
        }
    }
}

/// Owned per-attempt snapshot handed to the primitive transport.
pub struct SendRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: SendBody,
}

/// Body form handed to the primitive transport.
pub enum SendBody {
    Empty,
    Bytes(Bytes),
    Stream {
        len: Option<u64>,
        stream: BodyStream,
    },
}

impl fmt::Debug for SendRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendRequest")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .finish()
    }
}

/// Response body state.
pub enum ResponseBody {
    Empty,
    /// Fully read into memory.
    Buffered(Bytes),
    /// Still streaming from the transport.
    Stream(BodyStream),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// A received response.
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self { status, headers: HeaderMap::new(), body: ResponseBody::Empty }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// A header value as UTF-8, when present and decodable.
    pub fn header_str(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// The buffered body, when the response completed with one.
    pub fn body_bytes(&self) -> Option<&Bytes> {
        match &self.body {
            ResponseBody::Buffered(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Consume the response, yielding its body for streaming reads.
    pub fn into_body(self) -> ResponseBody {
        self.body
    }
}
