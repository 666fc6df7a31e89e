use chrono::{DateTime, SubsecRound, Utc};
use reqwest::header::{
    ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, DATE, HeaderMap, HeaderName, HeaderValue,
    USER_AGENT,
};
use serde::Serialize;
use tracing::debug;

use bai_sign::{SignRequest, format_date, sign};

use crate::core::{build_url, normalize_path, rel_url};
use crate::data::content::{MULTIPART_FORM_DATA, OCTET_STREAM};
use crate::data::{AttachedFile, Content, Method};
use crate::effects::events::EventStream;
use crate::effects::response::Response;
use crate::effects::session::{Flavor, SessionContext};
use crate::effects::transport::{WireBody, WireRequest};
use crate::effects::websocket::WebSocket;
use crate::error::{Error, Result};

/// Lowercase form of [`bai_sign::VERSION_HEADER`].
pub const VERSION_HEADER: HeaderName = HeaderName::from_static("x-backendai-version");

pub(crate) fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| Error::client(format!("invalid header value: {value:?}")))
}

/// One API call under construction.
///
/// The body is exactly one of empty, bytes, text, JSON or attachments, and
/// the content type always follows the representation chosen last. The
/// date and signature are only fixed by [`fetch`](Request::fetch).
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use bai_client::{ApiConfig, AsyncSession, Method, MockTransport};
///
/// let session = AsyncSession::with_transport(ApiConfig::default(), Arc::new(MockTransport::ok()));
/// let mut request = session.request(Method::Post, "/folders");
/// request.set_json(&serde_json::json!({"name": "data"})).unwrap();
/// assert_eq!(request.content_type(), "application/json");
/// ```
#[derive(Debug)]
pub struct Request {
    context: SessionContext,
    method: Method,
    path: String,
    params: Vec<(String, String)>,
    headers: HeaderMap,
    content: Content,
    content_type: String,
}

impl Request {
    pub fn new(context: &SessionContext, method: Method, path: &str) -> Self {
        let content = Content::Empty;
        let content_type = content.default_content_type().to_string();
        Self {
            context: context.clone(),
            method,
            path: normalize_path(path).to_string(),
            params: Vec::new(),
            headers: HeaderMap::new(),
            content,
            content_type,
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Relative path without its leading slash.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    #[must_use]
    pub fn with_params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: ToString,
    {
        self.params.extend(params.into_iter().map(|(k, v)| (k.into(), v.to_string())));
        self
    }

    /// Override or add a header. `Date`, `Content-Type`, the version header
    /// and `Authorization` are rewritten by `fetch`.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::client(format!("invalid header name: {name:?}")))?;
        self.headers.insert(name, header_value(value)?);
        Ok(())
    }

    /// Replace the body.
    ///
    /// `None`/empty values send an empty `text/plain` body, strings are sent
    /// as UTF-8 `text/plain`, bytes as `application/octet-stream`. An
    /// explicit `content_type` overrides the derived one.
    pub fn set_content(
        &mut self,
        value: impl Into<Content>,
        content_type: Option<&str>,
    ) -> Result<()> {
        if self.content.has_files() {
            return Err(Error::client("cannot set content when files are attached"));
        }
        let content = value.into();
        if content.has_files() {
            return Err(Error::client("attachments must be set with attach_files"));
        }
        let content_type = content_type.unwrap_or(content.default_content_type()).to_string();
        self.headers.insert(CONTENT_LENGTH, HeaderValue::from(content.as_bytes().len()));
        self.content = content;
        self.content_type = content_type;
        Ok(())
    }

    /// Serialize `value` as the JSON body.
    pub fn set_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let body = serde_json::to_vec(value)
            .map_err(|e| Error::client(format!("cannot serialize request body: {e}")))?;
        self.set_content(Content::Json(body.into()), None)
    }

    /// Switch to a `multipart/form-data` upload of `files`.
    ///
    /// Fails when direct content is already set. The length header is
    /// dropped because the transport chooses the multipart boundary.
    pub fn attach_files(&mut self, files: Vec<AttachedFile>) -> Result<()> {
        if !self.content.is_empty() {
            return Err(Error::client("cannot attach files when content is already set"));
        }
        self.headers.remove(CONTENT_LENGTH);
        self.content = Content::Files(files);
        self.content_type = MULTIPART_FORM_DATA.to_string();
        Ok(())
    }

    /// Sign and send the request.
    ///
    /// Non-2xx responses become [`Error::Api`]. Dropping the returned
    /// response, or the future, releases the underlying connection.
    pub async fn fetch(self) -> Result<Response> {
        self.send(true).await
    }

    /// Send without an `Authorization` header, for calls made before the
    /// client holds credentials.
    pub async fn fetch_anonymous(self) -> Result<Response> {
        self.send(false).await
    }

    /// Open a websocket on this request's path. Async sessions only, `GET` only.
    pub async fn connect_websocket(mut self) -> Result<WebSocket> {
        self.ensure_channel("websockets")?;
        self.content_type = OCTET_STREAM.to_string();
        let context = self.context.clone();
        let (wire, _) = self.into_wire(true)?;
        context.transport().connect_websocket(wire).await
    }

    /// Open a server-sent event stream. Async sessions only, `GET` only.
    pub async fn connect_events(mut self) -> Result<EventStream> {
        self.ensure_channel("event streams")?;
        self.headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        let response = self.fetch().await?;
        Ok(EventStream::new(response.bytes_stream()))
    }

    fn ensure_channel(&self, kind: &str) -> Result<()> {
        if self.context.flavor() == Flavor::Sync {
            return Err(Error::client(format!("{kind} are not available in synchronous sessions")));
        }
        if self.method != Method::Get {
            return Err(Error::client(format!("{kind} require GET, not {}", self.method)));
        }
        Ok(())
    }

    async fn send(self, signed: bool) -> Result<Response> {
        let context = self.context.clone();
        let (wire, sent_headers) = self.into_wire(signed)?;
        let response = context.transport().send(wire).await?;
        Response::from_wire(response, sent_headers).await
    }

    /// Fix the date, finalize headers and sign. Must run last before the
    /// request goes out since the date is itself signed.
    fn into_wire(mut self, signed: bool) -> Result<(WireRequest, HeaderMap)> {
        self.context.ensure_open()?;
        let config = self.context.config();
        if signed && !config.has_credentials() {
            return Err(Error::client(
                "signed requests require both an access key and a secret key",
            ));
        }

        if !self.headers.contains_key(USER_AGENT) {
            self.headers.insert(USER_AGENT, header_value(config.agent())?);
        }
        self.headers.insert(VERSION_HEADER, header_value(config.api_version())?);

        let url = build_url(config, &self.path, &self.params);
        let date: DateTime<Utc> = Utc::now().trunc_subsecs(6);
        self.headers.insert(DATE, header_value(&format_date(&date))?);
        self.headers.insert(CONTENT_TYPE, header_value(&self.content_type)?);

        if signed {
            let signature = sign(&SignRequest {
                method: self.method.as_str(),
                version: config.api_version(),
                endpoint: config.endpoint(),
                date,
                rel_url: &rel_url(&url),
                content_type: &self.content_type,
                body: self.content.as_bytes(),
                access_key: config.access_key(),
                secret_key: config.secret_key(),
                hash_type: config.hash(),
            });
            self.headers.insert(AUTHORIZATION, header_value(&signature.authorization)?);
        }
        debug!(method = %self.method, %url, signed, "prepared request");

        let body = match self.content {
            Content::Empty => WireBody::Empty,
            Content::Bytes(bytes) | Content::Json(bytes) => WireBody::Bytes(bytes),
            Content::Text(text) => WireBody::Bytes(text.into()),
            Content::Files(files) => WireBody::Multipart(files),
        };
        let sent_headers = self.headers.clone();
        Ok((WireRequest { method: self.method, url, headers: self.headers, body }, sent_headers))
    }
}
