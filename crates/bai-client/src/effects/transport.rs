use std::pin::Pin;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_util::io::ReaderStream;
use tracing::{debug, trace};
use url::Url;

use crate::data::{ApiConfig, AttachedFile, Method};
use crate::effects::websocket::WebSocket;
use crate::error::{Error, Result};

/// A boxed stream type for response bodies and event channels.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Multipart attachments are sent under this form field name.
pub const ATTACHMENT_FIELD: &str = "src";

/// Body as handed to the transport.
#[derive(Debug, Default)]
pub enum WireBody {
    #[default]
    Empty,
    Bytes(Bytes),
    /// Streamed as `multipart/form-data`; the transport picks the boundary.
    Multipart(Vec<AttachedFile>),
}

/// A fully signed request, ready for the wire.
#[derive(Debug)]
pub struct WireRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: WireBody,
}

/// Status line and headers, with the body left unread.
pub struct WireResponse {
    pub status: u16,
    pub reason: String,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl std::fmt::Debug for WireResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireResponse")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// The connection manager owned by a session.
///
/// A transport never retries on its own. `close` releases pooled
/// connections; sending through a closed transport is a client error.
///
/// # Implementations
///
/// - [`ReqwestTransport`]: production implementation using `reqwest`
/// - [`MockTransport`](crate::MockTransport): scripted responses for tests
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: WireRequest) -> Result<WireResponse>;

    async fn connect_websocket(&self, request: WireRequest) -> Result<WebSocket>;

    async fn close(&self);
}

/// One pooled `reqwest::Client` for the lifetime of a session.
pub struct ReqwestTransport {
    client: Mutex<Option<reqwest::Client>>,
}

impl ReqwestTransport {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(config.agent())
            .connect_timeout(config.connect_timeout())
            .danger_accept_invalid_certs(config.skips_sslcert_validation());
        if let Some(timeout) = config.socket_read_timeout() {
            builder = builder.read_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::transport("failed to initialize the HTTP client", e))?;
        Ok(Self { client: Mutex::new(Some(client)) })
    }

    fn client(&self) -> Result<reqwest::Client> {
        self.client
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| Error::client("the transport is already closed"))
    }
}

fn multipart_form(files: Vec<AttachedFile>) -> Result<reqwest::multipart::Form> {
    let mut form = reqwest::multipart::Form::new();
    for file in files {
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file.reader));
        let part = reqwest::multipart::Part::stream(body)
            .file_name(file.filename)
            .mime_str(&file.content_type)
            .map_err(|e| Error::client(format!("invalid attachment content type: {e}")))?;
        form = form.part(ATTACHMENT_FIELD, part);
    }
    Ok(form)
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: WireRequest) -> Result<WireResponse> {
        let client = self.client()?;
        let WireRequest { method, url, mut headers, body } = request;
        debug!(%method, %url, "dispatching request");

        let mut builder = client.request(method.into(), url);
        builder = match body {
            WireBody::Empty => builder.headers(headers),
            WireBody::Bytes(bytes) => builder.headers(headers).body(bytes),
            WireBody::Multipart(files) => {
                headers.remove(CONTENT_TYPE);
                headers.remove(CONTENT_LENGTH);
                builder.headers(headers).multipart(multipart_form(files)?)
            }
        };

        let response = builder.send().await.map_err(|e| Error::transport(e.to_string(), e))?;
        let status = response.status();
        trace!(status = status.as_u16(), "received response headers");

        Ok(WireResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            headers: response.headers().clone(),
            body: response
                .bytes_stream()
                .map(|chunk| {
                    chunk.map_err(|e| Error::transport("failed to read the response body", e))
                })
                .boxed(),
        })
    }

    async fn connect_websocket(&self, request: WireRequest) -> Result<WebSocket> {
        // only used to reject calls after close
        self.client()?;

        let mut url = request.url;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| Error::client(format!("cannot upgrade {url} to a websocket")))?;
        debug!(%url, "opening websocket");

        let mut upgrade = url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::client(format!("invalid websocket request: {e}")))?;
        upgrade.headers_mut().extend(request.headers);

        let (stream, _) = tokio_tungstenite::connect_async(upgrade)
            .await
            .map_err(|e| Error::transport(e.to_string(), e))?;
        Ok(WebSocket::from_stream(stream))
    }

    async fn close(&self) {
        let client = self.client.lock().unwrap_or_else(|e| e.into_inner()).take();
        if client.is_some() {
            debug!("released pooled HTTP connections");
        }
    }
}
