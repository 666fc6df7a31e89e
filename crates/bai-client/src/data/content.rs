use std::fmt;
use std::io::Cursor;
use std::path::Path;

use bytes::Bytes;
use tokio::io::AsyncRead;

use crate::error::Result;

pub const TEXT_PLAIN: &str = "text/plain";
pub const OCTET_STREAM: &str = "application/octet-stream";
pub const APPLICATION_JSON: &str = "application/json";
pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// Body of a request. Exactly one representation is active at a time.
pub enum Content {
    Empty,
    Bytes(Bytes),
    Text(String),
    /// Already serialized JSON.
    Json(Bytes),
    Files(Vec<AttachedFile>),
}

impl Content {
    /// The content type implied by this representation.
    pub fn default_content_type(&self) -> &'static str {
        match self {
            Content::Empty | Content::Text(_) => TEXT_PLAIN,
            Content::Bytes(_) => OCTET_STREAM,
            Content::Json(_) => APPLICATION_JSON,
            Content::Files(_) => MULTIPART_FORM_DATA,
        }
    }

    /// Bytes that go into the body hash. Attachments are streamed by the
    /// transport and never appear here.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Content::Empty | Content::Files(_) => &[],
            Content::Bytes(b) | Content::Json(b) => b,
            Content::Text(s) => s.as_bytes(),
        }
    }

    /// `true` when no direct bytes are set; attachments do not count.
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    pub fn has_files(&self) -> bool {
        matches!(self, Content::Files(_))
    }
}

impl Default for Content {
    fn default() -> Self {
        Content::Empty
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Empty => f.write_str("Empty"),
            Content::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Content::Text(s) => write!(f, "Text({} bytes)", s.len()),
            Content::Json(b) => write!(f, "Json({} bytes)", b.len()),
            Content::Files(files) => f.debug_tuple("Files").field(files).finish(),
        }
    }
}

impl From<()> for Content {
    fn from(_: ()) -> Self {
        Content::Empty
    }
}

impl<T: Into<Content>> From<Option<T>> for Content {
    fn from(value: Option<T>) -> Self {
        value.map_or(Content::Empty, Into::into)
    }
}

impl From<&str> for Content {
    fn from(value: &str) -> Self {
        Content::Text(value.to_owned())
    }
}

impl From<String> for Content {
    fn from(value: String) -> Self {
        Content::Text(value)
    }
}

impl From<&[u8]> for Content {
    fn from(value: &[u8]) -> Self {
        Content::Bytes(Bytes::copy_from_slice(value))
    }
}

impl From<Vec<u8>> for Content {
    fn from(value: Vec<u8>) -> Self {
        Content::Bytes(Bytes::from(value))
    }
}

impl From<Bytes> for Content {
    fn from(value: Bytes) -> Self {
        Content::Bytes(value)
    }
}

pub type BoxReader = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// One file of a multipart upload.
///
/// `filename` is the path relative to the upload root; the server uses it
/// to rebuild the directory structure.
pub struct AttachedFile {
    pub filename: String,
    pub content_type: String,
    pub reader: BoxReader,
}

impl AttachedFile {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        reader: BoxReader,
    ) -> Self {
        Self { filename: filename.into(), content_type: content_type.into(), reader }
    }

    /// In-memory attachment.
    pub fn from_bytes(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data: Bytes = data.into();
        Self::new(filename, OCTET_STREAM, Box::new(Cursor::new(data)))
    }

    /// Open `path` for streaming under the name `relative_name`.
    pub async fn open(path: impl AsRef<Path>, relative_name: impl Into<String>) -> Result<Self> {
        let file = tokio::fs::File::open(path.as_ref()).await?;
        Ok(Self::new(relative_name, OCTET_STREAM, Box::new(file)))
    }
}

impl fmt::Debug for AttachedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachedFile")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}
