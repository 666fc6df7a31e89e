use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::effects::bridge::ExecutionBridge;
use crate::effects::transport::{ByteStream, WireResponse};
use crate::error::{ApiError, Error, Result};

async fn collect(mut body: ByteStream) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = body.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

/// A successful response whose body has not been read yet.
///
/// The body can be consumed once, through one of the reading methods.
/// Dropping the response releases the connection.
pub struct Response {
    status: u16,
    reason: String,
    headers: HeaderMap,
    body: ByteStream,
    request_headers: HeaderMap,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl Response {
    /// Wrap a wire response, turning any non-2xx status into [`Error::Api`].
    pub(crate) async fn from_wire(wire: WireResponse, request_headers: HeaderMap) -> Result<Self> {
        let WireResponse { status, reason, headers, body } = wire;
        if !(200..300).contains(&status) {
            let body = collect(body).await.unwrap_or_default();
            let body = String::from_utf8_lossy(&body).into_owned();
            warn!(status, %reason, "API returned an error response");
            return Err(Error::Api(Box::new(ApiError::new(status, reason, body))));
        }
        Ok(Self { status, reason, headers, body, request_headers })
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }

    /// The signed headers that were transmitted with the request.
    pub fn request_headers(&self) -> &HeaderMap {
        &self.request_headers
    }

    pub async fn read_all(self) -> Result<Bytes> {
        collect(self.body).await
    }

    pub async fn text(self) -> Result<String> {
        let bytes = self.read_all().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::transport("response body is not valid UTF-8", e))
    }

    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        let bytes = self.read_all().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// The raw body, for streaming consumers.
    pub fn bytes_stream(self) -> ByteStream {
        self.body
    }
}

/// [`Response`] for sync sessions; body reads block on the session worker.
#[derive(Debug)]
pub struct BlockingResponse {
    inner: Response,
    bridge: Arc<ExecutionBridge>,
}

impl BlockingResponse {
    pub(crate) fn new(inner: Response, bridge: Arc<ExecutionBridge>) -> Self {
        Self { inner, bridge }
    }

    pub fn status(&self) -> u16 {
        self.inner.status()
    }

    pub fn reason(&self) -> &str {
        self.inner.reason()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.header(name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.inner.content_type()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.inner.content_length()
    }

    pub fn request_headers(&self) -> &HeaderMap {
        self.inner.request_headers()
    }

    pub fn read_all(self) -> Result<Bytes> {
        self.bridge.execute(self.inner.read_all())
    }

    pub fn text(self) -> Result<String> {
        self.bridge.execute(self.inner.text())
    }

    pub fn json<T: DeserializeOwned + Send + 'static>(self) -> Result<T> {
        self.bridge.execute(self.inner.json())
    }

    pub fn into_inner(self) -> Response {
        self.inner
    }
}
