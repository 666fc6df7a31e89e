//! Immutable data types shared by the request, session and transfer layers.
//!
//! Nothing in this module performs I/O. Configuration is passed explicitly
//! into session construction; there is no process-wide "current config".

pub mod config;
pub mod content;
pub mod method;
pub mod options;
pub mod progress;
pub mod state;

pub use config::ApiConfig;
pub use content::{AttachedFile, Content};
pub use method::Method;
pub use options::{
    Backoff, DownloadOptions, DownloadTarget, ProgressCallback, RetryPolicy, UploadOptions,
};
pub use progress::{TransferPhase, TransferProgress};
pub use state::{ChunkedTransferState, UploadPhase};
