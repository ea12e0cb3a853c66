//! Request and response content buffering.
//!
//! Requests with no declared length are materialized before the first send
//! so the wire carries an exact content length and oversized payloads fail
//! before any bytes leave the process. Responses are read fully into a
//! bounded buffer unless the caller opted out.

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use http::StatusCode;

use crate::fault::TransportFault;
use crate::message::{Body, Request, Response, ResponseBody};
use crate::options::CompletionMode;

/// Failure raised while materializing content.
#[derive(Debug)]
pub(crate) enum BufferFailure {
    /// The content grew past the configured ceiling.
    TooLarge { limit: usize },
    /// The underlying stream failed mid-read.
    Read(TransportFault),
}

/// Materialize a request body that has no declared length.
///
/// Explicitly chunked requests are left streaming. Bodies with a known
/// length get an exact `Content-Length` header. Unknown-length streams are
/// read fully (bounded by `max`) and replaced with a replayable byte body;
/// exceeding the bound fails before any network send.
pub(crate) async fn buffer_request_content(
    request: &mut Request,
    max: usize,
) -> Result<(), BufferFailure> {
    if request.is_explicitly_chunked() {
        return Ok(());
    }

    match std::mem::replace(&mut request.body, Body::Consumed) {
        body @ (Body::Empty | Body::Consumed) => {
            request.body = body;
            Ok(())
        }
        Body::Bytes(bytes) => {
            request.set_content_length(bytes.len() as u64);
            request.body = Body::Bytes(bytes);
            Ok(())
        }
        Body::Stream { len: Some(len), stream } => {
            request.set_content_length(len);
            request.body = Body::Stream { len: Some(len), stream };
            Ok(())
        }
        Body::Stream { len: None, stream } => {
            let bytes = read_bounded(stream, max).await?;
            request.set_content_length(bytes.len() as u64);
            request.body = Body::Bytes(bytes);
            Ok(())
        }
    }
}

/// Read a response body into a bounded buffer according to the completion
/// mode. Headers-only mode, a zero buffer ceiling and 204 responses skip
/// the read and leave the body as received.
pub(crate) async fn buffer_response_content(
    mut response: Response,
    max: usize,
    completion: CompletionMode,
) -> Result<Response, BufferFailure> {
    if completion == CompletionMode::HeadersOnly
        || max == 0
        || response.status == StatusCode::NO_CONTENT
    {
        return Ok(response);
    }

    response.body = match response.body {
        body @ (ResponseBody::Empty | ResponseBody::Buffered(_)) => body,
        ResponseBody::Stream(stream) => {
            let bytes = read_bounded(stream, max).await?;
            if bytes.is_empty() {
                ResponseBody::Empty
            } else {
                ResponseBody::Buffered(bytes)
            }
        }
    };
    Ok(response)
}

async fn read_bounded(
    mut stream: crate::message::BodyStream,
    max: usize,
) -> Result<Bytes, BufferFailure> {
    let mut buffer = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|error| BufferFailure::Read(TransportFault::from_io("content read failed", &error)))?;
        if buffer.len() + chunk.len() > max {
            return Err(BufferFailure::TooLarge { limit: max });
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer.freeze())
}
