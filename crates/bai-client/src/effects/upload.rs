//! Resumable chunked upload over the tus protocol.
//!
//! The client never guesses the remote offset. It adopts the value the
//! server reports after each chunk, and after any failure it asks the
//! server again before sending more bytes.

use std::io::SeekFrom;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::header::{
    AUTHORIZATION, CONTENT_TYPE, DATE, HeaderMap, HeaderName, HeaderValue, USER_AGENT,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tracing::{debug, warn};
use url::Url;

use crate::core::next_retry_delay;
use crate::data::options::ProgressCallback;
use crate::data::{
    ChunkedTransferState, Method, TransferPhase, TransferProgress, UploadOptions, UploadPhase,
};
use crate::effects::request::{VERSION_HEADER, header_value};
use crate::effects::session::SessionContext;
use crate::effects::transport::{WireBody, WireRequest, WireResponse};
use crate::error::{Error, Result};

pub const UPLOAD_OFFSET: HeaderName = HeaderName::from_static("upload-offset");
pub const UPLOAD_CHECKSUM: HeaderName = HeaderName::from_static("upload-checksum");
pub const TUS_RESUMABLE: HeaderName = HeaderName::from_static("tus-resumable");
pub const TUS_VERSION: &str = "1.0.0";
pub const OFFSET_OCTET_STREAM: &str = "application/offset+octet-stream";

/// Keep only the headers that authenticate chunk and offset requests.
pub fn carry_over_headers(signed: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for name in [AUTHORIZATION, DATE, VERSION_HEADER, USER_AGENT] {
        if let Some(value) = signed.get(&name) {
            headers.insert(name, value.clone());
        }
    }
    headers
}

fn parse_offset(response: &WireResponse) -> Option<u64> {
    response
        .headers
        .get(UPLOAD_OFFSET)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

async fn failure_message(response: WireResponse) -> String {
    let mut body = response.body;
    let mut text = Vec::new();
    while let Some(Ok(chunk)) = body.next().await {
        text.extend_from_slice(&chunk);
    }
    let text = String::from_utf8_lossy(&text).trim().to_string();
    if text.is_empty() {
        format!("{} {}", response.status, response.reason)
    } else {
        text
    }
}

/// Uploads `reader` to an existing tus upload URL in bounded chunks.
///
/// # Examples
///
/// ```no_run
/// # async fn run(ctx: bai_client::SessionContext, url: url::Url) -> bai_client::Result<()> {
/// use bai_client::{ChunkedUploader, UploadOptions};
///
/// let file = tokio::fs::File::open("model.bin").await?;
/// let size = file.metadata().await?.len();
/// let options = UploadOptions::default();
/// let mut uploader = ChunkedUploader::new(ctx, url, Default::default(), file, size, &options);
/// let offset = uploader.upload().await?;
/// assert_eq!(offset, size);
/// # Ok(())
/// # }
/// ```
pub struct ChunkedUploader<R> {
    context: SessionContext,
    url: Url,
    headers: HeaderMap,
    reader: R,
    state: ChunkedTransferState,
    on_progress: Option<ProgressCallback>,
}

impl<R> std::fmt::Debug for ChunkedUploader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedUploader")
            .field("url", &self.url.as_str())
            .field("state", &self.state)
            .finish()
    }
}

impl<R> ChunkedUploader<R>
where
    R: AsyncRead + AsyncSeek + Unpin + Send,
{
    /// `headers` are sent with every chunk and offset query, typically the
    /// output of [`carry_over_headers`] for the upload-creation call.
    pub fn new(
        context: SessionContext,
        url: Url,
        headers: HeaderMap,
        reader: R,
        size: u64,
        options: &UploadOptions,
    ) -> Self {
        let stop_at = options.stop_at.map_or(size, |stop| stop.min(size));
        let mut state = ChunkedTransferState::new(stop_at, options);
        state.upload_url = Some(url.clone());
        Self { context, url, headers, reader, state, on_progress: options.on_progress.clone() }
    }

    pub fn state(&self) -> &ChunkedTransferState {
        &self.state
    }

    /// Upload from the current offset until the stop offset is reached.
    ///
    /// Returns the final server-acknowledged offset. Once retries are
    /// exhausted the last error is returned unchanged.
    pub async fn upload(&mut self) -> Result<u64> {
        self.state.phase = UploadPhase::Uploading;
        self.report(TransferPhase::Connecting, 0);

        while !self.state.is_finished() {
            match self.upload_chunk().await {
                Ok(acknowledged) => {
                    let delta = acknowledged - self.state.offset;
                    self.state.offset = acknowledged;
                    debug!(offset = acknowledged, stop_at = self.state.stop_at, "chunk accepted");
                    self.report(TransferPhase::Transferring, delta);
                }
                Err(error) => self.recover(error).await?,
            }
        }

        self.state.phase = UploadPhase::Done;
        self.report(TransferPhase::Completed, 0);
        Ok(self.state.offset)
    }

    /// Ask the server where an interrupted upload stopped, then continue it.
    pub async fn resume(&mut self) -> Result<u64> {
        match self.query_offset().await {
            Ok(offset) => self.state.offset = offset,
            Err(error) => {
                self.state.phase = UploadPhase::Failed;
                return Err(error);
            }
        }
        self.upload().await
    }

    /// Current offset as recorded by the server.
    pub async fn query_offset(&self) -> Result<u64> {
        self.context.ensure_open()?;
        let mut headers = self.headers.clone();
        headers.insert(TUS_RESUMABLE, HeaderValue::from_static(TUS_VERSION));
        let response = self
            .context
            .transport()
            .send(WireRequest {
                method: Method::Head,
                url: self.url.clone(),
                headers,
                body: WireBody::Empty,
            })
            .await?;

        if !(200..300).contains(&response.status) {
            let status = response.status;
            return Err(Error::TransferFailure {
                offset: self.state.offset,
                status: Some(status),
                message: failure_message(response).await,
            });
        }
        parse_offset(&response).ok_or_else(|| Error::TransferFailure {
            offset: self.state.offset,
            status: Some(response.status),
            message: "offset query response has no Upload-Offset".into(),
        })
    }

    /// Sleep, count a retry and resynchronize the offset; give up once the
    /// retry bound is spent or the error cannot be retried.
    async fn recover(&mut self, mut error: Error) -> Result<()> {
        loop {
            if !error.is_retryable() || !self.state.can_retry() {
                self.state.phase = UploadPhase::Failed;
                warn!(
                    offset = self.state.offset,
                    retried = self.state.retried,
                    %error,
                    "upload failed"
                );
                return Err(error);
            }

            self.state.phase = UploadPhase::Retrying;
            let delay =
                next_retry_delay(self.state.backoff, self.state.retried, self.state.retry_delay);
            tokio::time::sleep(delay).await;
            self.state.retried += 1;
            self.report(TransferPhase::Retrying, 0);

            match self.query_offset().await {
                Ok(offset) => {
                    debug!(offset, retried = self.state.retried, "upload offset resynchronized");
                    self.state.offset = offset;
                    self.state.phase = UploadPhase::Uploading;
                    return Ok(());
                }
                Err(e) => error = e,
            }
        }
    }

    async fn read_chunk(&mut self) -> Result<Bytes> {
        let len = self.state.next_chunk_len() as usize;
        self.reader.seek(SeekFrom::Start(self.state.offset)).await?;
        let mut chunk = vec![0u8; len];
        self.reader.read_exact(&mut chunk).await?;
        Ok(Bytes::from(chunk))
    }

    /// Send one chunk at the current offset; returns the offset the server reports.
    async fn upload_chunk(&mut self) -> Result<u64> {
        self.context.ensure_open()?;
        let offset = self.state.offset;
        let chunk = self.read_chunk().await?;
        let sent = chunk.len() as u64;

        let mut headers = self.headers.clone();
        headers.insert(TUS_RESUMABLE, HeaderValue::from_static(TUS_VERSION));
        headers.insert(UPLOAD_OFFSET, HeaderValue::from(offset));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(OFFSET_OCTET_STREAM));
        if let Some(hash) = self.state.checksum {
            let digest = STANDARD.encode(hash.digest(&chunk));
            headers.insert(
                UPLOAD_CHECKSUM,
                header_value(&format!("{} {}", hash.as_str(), digest))?,
            );
        }

        let response = self
            .context
            .transport()
            .send(WireRequest {
                method: Method::Patch,
                url: self.url.clone(),
                headers,
                body: WireBody::Bytes(chunk),
            })
            .await?;

        let status = response.status;
        if !(200..300).contains(&status) {
            return Err(Error::TransferFailure {
                offset,
                status: Some(status),
                message: failure_message(response).await,
            });
        }
        match parse_offset(&response) {
            Some(next) if next > offset && next <= offset + sent => Ok(next),
            Some(next) => Err(Error::TransferFailure {
                offset,
                status: Some(status),
                message: format!(
                    "server reported offset {next} after a {sent}-byte chunk at {offset}"
                ),
            }),
            None => Err(Error::TransferFailure {
                offset,
                status: Some(status),
                message: "chunk response has no Upload-Offset".into(),
            }),
        }
    }

    fn report(&self, phase: TransferPhase, delta: u64) {
        if let Some(callback) = &self.on_progress {
            callback(&TransferProgress {
                phase,
                bytes_transferred: self.state.offset,
                delta,
                total_bytes: Some(self.state.stop_at),
                retry_count: self.state.retried,
                part: None,
            });
        }
    }
}
