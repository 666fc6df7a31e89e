use std::fmt;
use std::time::Duration;

use bai_sign::HashType;
use url::Url;

use super::options::{Backoff, UploadOptions};

/// Lifecycle of a resumable upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadPhase {
    #[default]
    Init,
    Uploading,
    Retrying,
    Done,
    Failed,
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadPhase::Init => write!(f, "INIT"),
            UploadPhase::Uploading => write!(f, "UPLOADING"),
            UploadPhase::Retrying => write!(f, "RETRYING"),
            UploadPhase::Done => write!(f, "DONE"),
            UploadPhase::Failed => write!(f, "FAILED"),
        }
    }
}

/// Client-side bookkeeping of a resumable upload.
///
/// `offset` is only ever assigned from a value the server reported, either
/// in a chunk response or in an offset query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedTransferState {
    pub upload_url: Option<Url>,
    pub offset: u64,
    pub stop_at: u64,
    pub chunk_size: u64,
    /// Retries spent so far; never reset while the upload runs.
    pub retried: u32,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub backoff: Backoff,
    pub checksum: Option<HashType>,
    pub phase: UploadPhase,
}

impl ChunkedTransferState {
    pub fn new(stop_at: u64, options: &UploadOptions) -> Self {
        Self {
            upload_url: None,
            offset: 0,
            stop_at,
            chunk_size: options.chunk_size.max(1),
            retried: 0,
            max_retries: options.retry.max_retries,
            retry_delay: options.retry.delay,
            backoff: options.retry.backoff,
            checksum: options.checksum,
            phase: UploadPhase::Init,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.offset >= self.stop_at
    }

    /// Length of the next chunk starting at `offset`.
    pub fn next_chunk_len(&self) -> u64 {
        self.chunk_size.min(self.stop_at.saturating_sub(self.offset))
    }

    pub fn can_retry(&self) -> bool {
        self.retried < self.max_retries
    }
}
