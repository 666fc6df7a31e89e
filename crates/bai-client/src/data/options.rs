use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bai_sign::HashType;

use super::progress::TransferProgress;

pub type ProgressCallback = Arc<dyn Fn(&TransferProgress) + Send + Sync>;

/// Where a multipart download lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadTarget {
    /// Every part is written beneath this directory.
    Directory(PathBuf),
    /// The response must contain exactly one part, written to this path.
    File(PathBuf),
}

/// Options for a streaming multipart download.
///
/// # Examples
///
/// ```
/// use bai_client::DownloadOptions;
///
/// let options = DownloadOptions::to_directory("./out").expand_archives(false);
/// ```
#[derive(Clone)]
pub struct DownloadOptions {
    pub target: DownloadTarget,

    /// Unpack `*.tar` parts into the destination instead of keeping the archive.
    ///
    /// Default: true
    pub expand_archives: bool,

    pub on_progress: Option<ProgressCallback>,
}

impl fmt::Debug for DownloadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadOptions")
            .field("target", &self.target)
            .field("expand_archives", &self.expand_archives)
            .field("on_progress", &self.on_progress.as_ref().map(|_| "{ ... }"))
            .finish()
    }
}

impl DownloadOptions {
    pub fn to_directory(dir: impl Into<PathBuf>) -> Self {
        Self {
            target: DownloadTarget::Directory(dir.into()),
            expand_archives: true,
            on_progress: None,
        }
    }

    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self {
            target: DownloadTarget::File(path.into()),
            expand_archives: false,
            on_progress: None,
        }
    }

    #[must_use]
    pub fn expand_archives(mut self, expand: bool) -> Self {
        self.expand_archives = expand;
        self
    }

    #[must_use]
    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }
}

/// How long to wait before each upload retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// The same delay before every retry.
    #[default]
    Fixed,
    /// `delay * 2^retry`.
    Exponential,
}

/// Retry bound and delay for resumable uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed over the whole upload. `0` disables retrying.
    pub max_retries: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, delay: Duration::from_secs(1), backoff: Backoff::Fixed }
    }
}

impl RetryPolicy {
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay, backoff: Backoff::Fixed }
    }

    pub fn exponential(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay, backoff: Backoff::Exponential }
    }

    pub fn none() -> Self {
        Self::fixed(0, Duration::ZERO)
    }
}

pub const DEFAULT_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

/// Options for a resumable chunked upload.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use bai_client::{RetryPolicy, UploadOptions};
///
/// let options = UploadOptions::default()
///     .chunk_size(1024 * 1024)
///     .retry(RetryPolicy::fixed(5, Duration::from_millis(500)));
/// ```
#[derive(Clone)]
pub struct UploadOptions {
    /// Default: 4 MiB
    pub chunk_size: u64,

    pub retry: RetryPolicy,

    /// When set, every chunk carries `Upload-Checksum: <algo> <base64 digest>`.
    pub checksum: Option<HashType>,

    /// Stop once this many bytes are accepted. Default: the full file size.
    pub stop_at: Option<u64>,

    pub on_progress: Option<ProgressCallback>,
}

impl fmt::Debug for UploadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadOptions")
            .field("chunk_size", &self.chunk_size)
            .field("retry", &self.retry)
            .field("checksum", &self.checksum)
            .field("stop_at", &self.stop_at)
            .field("on_progress", &self.on_progress.as_ref().map(|_| "{ ... }"))
            .finish()
    }
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry: RetryPolicy::default(),
            checksum: None,
            stop_at: None,
            on_progress: None,
        }
    }
}

impl UploadOptions {
    /// A zero chunk size is clamped to one byte.
    #[must_use]
    pub fn chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn checksum(mut self, checksum: Option<HashType>) -> Self {
        self.checksum = checksum;
        self
    }

    #[must_use]
    pub fn stop_at(mut self, stop_at: Option<u64>) -> Self {
        self.stop_at = stop_at;
        self
    }

    #[must_use]
    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_defaults() {
        let options = UploadOptions::default();
        assert_eq!(options.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(options.retry.max_retries, 3);
        assert_eq!(options.retry.backoff, Backoff::Fixed);
        assert!(options.checksum.is_none());
    }

    #[test]
    fn test_chunk_size_clamped() {
        assert_eq!(UploadOptions::default().chunk_size(0).chunk_size, 1);
    }

    #[test]
    fn test_download_targets() {
        let dir = DownloadOptions::to_directory("/tmp/out");
        assert!(dir.expand_archives);
        assert_eq!(dir.target, DownloadTarget::Directory(PathBuf::from("/tmp/out")));

        let file = DownloadOptions::to_file("/tmp/out.bin");
        assert!(!file.expand_archives);
    }

    #[test]
    fn test_debug_hides_callback() {
        let options = UploadOptions::default().on_progress(Arc::new(|_| {}));
        assert!(format!("{options:?}").contains("{ ... }"));
    }
}
