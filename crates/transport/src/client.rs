//! Primitive transport over a `reqwest` client.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use http::header::{HeaderValue, AUTHORIZATION, PROXY_AUTHORIZATION};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::auth::TransportCredential;
use crate::error::{TransportError, TransportResult};
use crate::fault::{
    connection_fault_from_io_kind, socket_fault_from_io_kind, ConnectionFault, FaultCause,
    TransportFault,
};
use crate::message::{Response, ResponseBody, SendBody, SendRequest};
use crate::settings::TransportSettings;
use crate::transport::{CredentialTarget, PrimitiveTransport};

/// Bound on source-chain flattening; survives self-referential chains.
const MAX_CAUSE_DEPTH: usize = 8;

/// [`PrimitiveTransport`] backed by a shared `reqwest::Client`.
///
/// Performs no retries and no timeouts of its own; the pipeline owns both.
/// Redirects are disabled so authentication headers never leak across
/// origins.
#[derive(Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    origin_credential: RwLock<Option<TransportCredential>>,
    proxy_credential: RwLock<Option<TransportCredential>>,
}

impl ReqwestTransport {
    pub fn new(settings: &TransportSettings) -> TransportResult<Self> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::none());

        if settings.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }
        for der in &settings.root_certificates_der {
            let certificate = reqwest::Certificate::from_der(der).map_err(|error| {
                TransportError::InvalidConfiguration {
                    message: format!("invalid root certificate: {error}"),
                }
            })?;
            builder = builder.add_root_certificate(certificate);
        }
        if let Some(pem) = &settings.client_identity_pem {
            let identity = reqwest::Identity::from_pem(pem).map_err(|error| {
                TransportError::InvalidConfiguration {
                    message: format!("invalid client identity: {error}"),
                }
            })?;
            builder = builder.identity(identity);
        }

        let client = builder.build().map_err(|error| TransportError::InvalidConfiguration {
            message: format!("failed to construct HTTP client: {error}"),
        })?;

        Ok(Self {
            client,
            origin_credential: RwLock::new(None),
            proxy_credential: RwLock::new(None),
        })
    }

    fn apply_stored_credentials(&self, headers: &mut http::HeaderMap) {
        if !headers.contains_key(AUTHORIZATION) {
            if let Some(credential) = self.origin_credential.read().as_ref() {
                if let Ok(value) = HeaderValue::from_str(&credential.basic_header_value()) {
                    headers.insert(AUTHORIZATION, value);
                }
            }
        }
        if !headers.contains_key(PROXY_AUTHORIZATION) {
            if let Some(credential) = self.proxy_credential.read().as_ref() {
                if let Ok(value) = HeaderValue::from_str(&credential.basic_header_value()) {
                    headers.insert(PROXY_AUTHORIZATION, value);
                }
            }
        }
    }
}

#[async_trait]
impl PrimitiveTransport for ReqwestTransport {
    async fn send(
        &self,
        request: SendRequest,
        cancel: CancellationToken,
    ) -> Result<Response, TransportFault> {
        let SendRequest { method, url, mut headers, body } = request;
        self.apply_stored_credentials(&mut headers);

        let mut builder = self.client.request(method, url.as_str()).headers(headers);
        builder = match body {
            SendBody::Empty => builder,
            SendBody::Bytes(bytes) => builder.body(bytes),
            SendBody::Stream { len: _, stream } => builder.body(reqwest::Body::wrap_stream(stream)),
        };

        let outcome = tokio::select! {
            outcome = builder.send() => outcome,
            () = cancel.cancelled() => {
                return Err(TransportFault::with_cause(
                    "send aborted by cancellation",
                    FaultCause::Other("cancelled".into()),
                ));
            }
        };

        match outcome {
            Ok(response) => {
                let status = response.status();
                let response_headers = response.headers().clone();
                let stream = response
                    .bytes_stream()
                    .map_err(|error| std::io::Error::new(std::io::ErrorKind::Other, error))
                    .boxed();
                Ok(Response {
                    status,
                    headers: response_headers,
                    body: ResponseBody::Stream(stream),
                })
            }
            Err(error) => Err(fault_from_reqwest(&error)),
        }
    }

    fn apply_credential(&self, credential: &TransportCredential, target: CredentialTarget) {
        match target {
            CredentialTarget::Origin => {
                *self.origin_credential.write() = Some(credential.clone());
            }
            CredentialTarget::Proxy => {
                *self.proxy_credential.write() = Some(credential.clone());
            }
        }
    }
}

/// Flatten a client error and its source chain into a structured fault.
fn fault_from_reqwest(error: &reqwest::Error) -> TransportFault {
    let mut fault = TransportFault::new(error.to_string());

    if error.is_timeout() {
        fault.push_cause(FaultCause::Connection(ConnectionFault::Timeout));
    }
    if error.is_connect() {
        fault.push_cause(FaultCause::Connection(ConnectionFault::ConnectFailure));
    }
    if let Some(status) = error.status() {
        fault.push_cause(FaultCause::Status(status.as_u16()));
    }

    let mut source = std::error::Error::source(error);
    let mut depth = 0;
    while let Some(cause) = source {
        if depth >= MAX_CAUSE_DEPTH {
            break;
        }
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if let Some(kind) = socket_fault_from_io_kind(io.kind()) {
                fault.push_cause(FaultCause::Socket(kind));
            } else if let Some(kind) = connection_fault_from_io_kind(io.kind()) {
                fault.push_cause(FaultCause::Connection(kind));
            }
        } else {
            let text = cause.to_string();
            if text.contains("tls") || text.contains("ssl") {
                fault.push_cause(FaultCause::TlsFrame(text));
            }
        }
        source = cause.source();
        depth += 1;
    }

    fault
}
