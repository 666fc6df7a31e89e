//! Signed, session-scoped client runtime for the Backend.AI API.
//!
//! # Architecture
//!
//! This crate follows the three-layer pattern:
//! - [`data`] - Immutable configuration and value types
//! - [`core`] - Pure transformations
//! - [`effects`] - I/O behind the [`Transport`] trait
//!
//! Operation groups in [`func`] are written once and work under both
//! session flavors:
//!
//! - [`AsyncSession`]: operations return futures for the caller's runtime
//! - [`SyncSession`]: operations block; a dedicated worker thread with a
//!   private runtime runs them one at a time, in submission order
//!
//! # Key Features
//!
//! - **Deterministic signing**: every request is signed last, over the exact
//!   date header it carries (see [`bai_sign`])
//! - **Streaming download**: multipart parts are written chunk by chunk
//! - **Resumable upload**: tus chunks with server-confirmed offsets and
//!   bounded retries
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use bai_client::{ApiConfig, MockReply, MockTransport, Session, SyncSession};
//!
//! let transport = Arc::new(MockTransport::new(|_| {
//!     Ok(MockReply::json(
//!         200,
//!         &serde_json::json!({"version": "v4.20190315", "manager": "20.03.0"}),
//!     ))
//! }));
//! let config = ApiConfig::new("https://api.backend.ai").unwrap().credentials("AKIA", "secret");
//! let session = SyncSession::with_transport(config, transport).unwrap();
//!
//! assert_eq!(session.system().manager_version().unwrap(), "20.03.0");
//! session.close();
//! ```

pub mod core;
pub mod data;
pub mod effects;
mod error;
pub mod func;

pub use bai_sign::HashType;
pub use data::{
    ApiConfig, AttachedFile, Backoff, ChunkedTransferState, Content, DownloadOptions,
    DownloadTarget, Method, ProgressCallback, RetryPolicy, TransferPhase, TransferProgress,
    UploadOptions, UploadPhase,
};
pub use effects::{
    AsyncSession, BlockingResponse, ChunkedUploader, EventStream, MockReply, MockTransport,
    RecordedRequest, ReqwestTransport, Request, Response, Session, SessionContext, SyncSession,
    Transport, WebSocket, bind,
};
pub use error::{ApiError, BoxError, Error, ProblemDetails, Result};
pub use func::{Auth, LoginResult, System, VFolder};
