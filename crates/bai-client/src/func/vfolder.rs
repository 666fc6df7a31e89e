use std::path::{Path, PathBuf};

use reqwest::header::LOCATION;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::data::{ApiConfig, AttachedFile, DownloadOptions, Method, UploadOptions};
use crate::effects::upload::carry_over_headers;
use crate::effects::{ChunkedUploader, Session, bind, save_multipart};
use crate::error::{Error, Result};

/// Resumable upload URL for a session token. This path is not versioned.
pub(crate) fn tus_upload_url(config: &ApiConfig, token: &str) -> Url {
    let mut url = config.endpoint().clone();
    let base = url.path().trim_end_matches('/').to_string();
    url.set_query(None);
    url.set_fragment(None);
    url.set_path(&format!("{base}/folders/_/tus/upload/{token}"));
    url
}

/// `file` relative to `base`, with `/` separators.
fn relative_name(file: &Path, base: &Path) -> Result<String> {
    let relative = file.strip_prefix(base).map_err(|_| {
        Error::client(format!(
            "file {} is outside of the base directory {}",
            file.display(),
            base.display()
        ))
    })?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

/// Operations on one virtual folder, identified by name.
#[derive(Debug)]
pub struct VFolder<'s, S: Session> {
    session: &'s S,
    name: String,
}

impl<'s, S: Session> VFolder<'s, S> {
    pub(crate) fn new(session: &'s S, name: impl Into<String>) -> Self {
        Self { session, name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn path(&self, suffix: &str) -> String {
        format!("/folders/{}/{}", self.name, suffix)
    }

    pub fn info(&self) -> S::Output<Value> {
        let path = format!("/folders/{}", self.name);
        bind(self.session, move |ctx| async move {
            ctx.request(Method::Get, &path).fetch().await?.json().await
        })
    }

    /// Directory listing of `path` inside the folder.
    pub fn list_files(&self, path: &str) -> S::Output<Value> {
        let endpoint = self.path("files");
        let body = json!({ "path": path });
        bind(self.session, move |ctx| async move {
            let mut request = ctx.request(Method::Get, &endpoint);
            request.set_json(&body)?;
            request.fetch().await?.json().await
        })
    }

    /// Upload `files` in one multipart request. Each file is sent under its
    /// path relative to `basedir` (default: the current directory).
    pub fn upload(&self, files: Vec<PathBuf>, basedir: Option<PathBuf>) -> S::Output<String> {
        let endpoint = self.path("upload");
        bind(self.session, move |ctx| async move {
            let base = match basedir {
                Some(dir) => tokio::fs::canonicalize(dir).await?,
                None => std::env::current_dir()?,
            };
            let mut attachments = Vec::with_capacity(files.len());
            for file in files {
                let file = tokio::fs::canonicalize(&file).await?;
                let name = relative_name(&file, &base)?;
                attachments.push(AttachedFile::open(&file, name).await?);
            }

            let mut request = ctx.request(Method::Post, &endpoint);
            request.attach_files(attachments)?;
            request.fetch().await?.text().await
        })
    }

    /// Stream the multipart response for `files` into `options.target`.
    pub fn download(
        &self,
        files: Vec<String>,
        options: DownloadOptions,
    ) -> S::Output<Vec<PathBuf>> {
        let endpoint = self.path("download");
        bind(self.session, move |ctx| async move {
            let mut request = ctx.request(Method::Get, &endpoint);
            request.set_json(&json!({ "files": files }))?;
            let response = request.fetch().await?;
            save_multipart(response, &options).await
        })
    }

    /// Create a resumable upload session for `file` and upload it in chunks.
    ///
    /// Returns the number of bytes the server acknowledged.
    pub fn upload_resumable(&self, file: PathBuf, options: UploadOptions) -> S::Output<u64> {
        let endpoint = self.path("create_upload_session");
        bind(self.session, move |ctx| async move {
            let handle = tokio::fs::File::open(&file).await?;
            let size = handle.metadata().await?.len();
            let remote_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| Error::client(format!("not a file path: {}", file.display())))?;

            let response = ctx
                .request(Method::Post, &endpoint)
                .with_params([("path", remote_name), ("size", size.to_string())])
                .fetch()
                .await?;
            let headers = carry_over_headers(response.request_headers());
            let location = response.header(LOCATION.as_str()).map(str::to_owned);
            let body: Value = if location.is_some() {
                Value::Null
            } else {
                response.json().await?
            };
            let url = match location {
                Some(location) => ctx
                    .config()
                    .endpoint()
                    .join(&location)
                    .map_err(|e| {
                        Error::protocol(format!("invalid upload location {location:?}: {e}"))
                    })?,
                None => {
                    let token = body
                        .get("token")
                        .and_then(Value::as_str)
                        .ok_or_else(|| Error::protocol("upload session response has no token"))?;
                    tus_upload_url(ctx.config(), token)
                }
            };
            debug!(%url, size, "created resumable upload session");

            let mut uploader = ChunkedUploader::new(ctx, url, headers, handle, size, &options);
            uploader.upload().await
        })
    }
}
