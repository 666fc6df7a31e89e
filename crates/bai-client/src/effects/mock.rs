//! Scripted in-memory transport.
//!
//! Sessions built on [`MockTransport`] behave exactly like networked ones up
//! to the wire: requests are fully signed, attachments are streamed, and the
//! scripted handler decides the reply.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::data::Method;
use crate::effects::transport::{Transport, WireBody, WireRequest, WireResponse};
use crate::effects::websocket::WebSocket;
use crate::error::{Error, Result};

/// A request as the mock received it, with attachments fully read.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// `(filename, content)` of each attachment, in order.
    pub files: Vec<(String, Bytes)>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }
}

/// A scripted reply.
#[derive(Debug, Clone)]
pub struct MockReply {
    status: u16,
    headers: HeaderMap,
    chunks: Vec<Bytes>,
}

impl MockReply {
    pub fn new(status: u16) -> Self {
        Self { status, headers: HeaderMap::new(), chunks: Vec::new() }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn no_content() -> Self {
        Self::new(204)
    }

    pub fn json<T: Serialize + ?Sized>(status: u16, value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        Self::new(status).header("Content-Type", "application/json").body(body)
    }

    pub fn text(status: u16, text: impl Into<String>) -> Self {
        Self::new(status).header("Content-Type", "text/plain").body(text.into())
    }

    /// Invalid header names or values are ignored.
    #[must_use]
    pub fn header(mut self, name: &str, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) =
            (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value.as_ref()))
        {
            self.headers.append(name, value);
        }
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.chunks = vec![body.into()];
        self
    }

    /// Deliver the body in the given slices.
    #[must_use]
    pub fn chunks(mut self, chunks: Vec<Bytes>) -> Self {
        self.chunks = chunks;
        self
    }
}

type Handler = dyn Fn(&RecordedRequest) -> Result<MockReply> + Send + Sync;

/// Transport whose replies come from a closure.
///
/// # Examples
///
/// ```
/// use bai_client::{MockReply, MockTransport};
///
/// let transport = MockTransport::new(|req| match req.path() {
///     "/v4" => Ok(MockReply::json(200, &serde_json::json!({"version": "v4.20190315"}))),
///     _ => Ok(MockReply::new(404)),
/// });
/// assert_eq!(transport.request_count(), 0);
/// ```
pub struct MockTransport {
    handler: Box<Handler>,
    log: Mutex<Vec<RecordedRequest>>,
    closes: AtomicUsize,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("requests", &self.request_count())
            .field("closes", &self.close_count())
            .finish_non_exhaustive()
    }
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> Result<MockReply> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            log: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        }
    }

    /// Every request answers `200 OK` with an empty body.
    pub fn ok() -> Self {
        Self::new(|_| Ok(MockReply::ok()))
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn request_count(&self) -> usize {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// How many times the owning session released this transport.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    async fn record(&self, request: WireRequest) -> Result<RecordedRequest> {
        let (body, files) = match request.body {
            WireBody::Empty => (Bytes::new(), Vec::new()),
            WireBody::Bytes(bytes) => (bytes, Vec::new()),
            WireBody::Multipart(attachments) => {
                let mut files = Vec::with_capacity(attachments.len());
                for mut file in attachments {
                    let mut content = Vec::new();
                    file.reader.read_to_end(&mut content).await?;
                    files.push((file.filename, Bytes::from(content)));
                }
                (Bytes::new(), files)
            }
        };
        let recorded = RecordedRequest {
            method: request.method,
            url: request.url,
            headers: request.headers,
            body,
            files,
        };
        self.log.lock().unwrap_or_else(|e| e.into_inner()).push(recorded.clone());
        Ok(recorded)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: WireRequest) -> Result<WireResponse> {
        let recorded = self.record(request).await?;
        let reply = (self.handler)(&recorded)?;
        let reason = reqwest::StatusCode::from_u16(reply.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or_default()
            .to_string();
        Ok(WireResponse {
            status: reply.status,
            reason,
            headers: reply.headers,
            body: stream::iter(reply.chunks.into_iter().map(Ok)).boxed(),
        })
    }

    /// Opens an in-memory socket that echoes every message back.
    async fn connect_websocket(&self, request: WireRequest) -> Result<WebSocket> {
        let recorded = self.record(request).await?;
        let reply = (self.handler)(&recorded)?;
        if reply.status != 101 && !(200..300).contains(&reply.status) {
            return Err(Error::protocol(format!(
                "websocket upgrade refused with status {}",
                reply.status
            )));
        }

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Message>();
        let sink = futures_util::sink::unfold(tx, |tx, message: Message| async move {
            tx.send(message).map_err(|_| Error::protocol("server disconnected"))?;
            Ok::<_, Error>(tx)
        });
        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|m| (Ok(m), rx))
        });
        Ok(WebSocket::from_parts(sink, stream))
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
