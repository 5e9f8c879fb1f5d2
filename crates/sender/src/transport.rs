//! Transport seam between the sender and the network.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};

use chunkferry_protocol::ChunkMeta;
use chunkferry_protocol::constants::fields;

use crate::error::TransportError;

/// One chunk upload as handed to a transport.
#[derive(Debug, Clone, Copy)]
pub struct ChunkRequest<'a> {
    pub url: &'a str,
    /// Caller headers attached to every request.
    pub headers: &'a [(String, String)],
    pub meta: &'a ChunkMeta,
    pub payload: &'a [u8],
}

/// Boxed future resolving to the HTTP status code of a chunk request.
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<u16, TransportError>> + Send + 'a>>;

/// Sends multipart chunk requests.
///
/// Implemented over `reqwest` by [`HttpTransport`]; tests use in-memory
/// mocks. A non-2xx status is not an error at this level.
pub trait ChunkTransport: Send + Sync {
    fn send_chunk<'a>(&'a self, request: ChunkRequest<'a>) -> TransportFuture<'a>;
}

/// `reqwest` multipart transport.
pub struct HttpTransport {
    http: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Creates a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, timeout })
    }

    fn build_form(meta: &ChunkMeta, payload: &[u8]) -> Result<Form, TransportError> {
        let mut form = Form::new();
        for (name, value) in meta.form_fields() {
            form = form.text(name, value);
        }
        let part = Part::bytes(payload.to_vec())
            .file_name(meta.chunk_file_name())
            .mime_str("application/octet-stream")?;
        Ok(form.part(fields::FILE, part))
    }
}

impl ChunkTransport for HttpTransport {
    fn send_chunk<'a>(&'a self, request: ChunkRequest<'a>) -> TransportFuture<'a> {
        Box::pin(async move {
            let form = Self::build_form(request.meta, request.payload)?;
            let mut builder = self.http.post(request.url).multipart(form);
            for (name, value) in request.headers {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_| TransportError::InvalidHeader(name.clone()))?;
                let value = HeaderValue::from_str(value)
                    .map_err(|_| TransportError::InvalidHeader(name.to_string()))?;
                builder = builder.header(name, value);
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(self.timeout)
                } else {
                    TransportError::Http(e)
                }
            })?;
            Ok(response.status().as_u16())
        })
    }
}
