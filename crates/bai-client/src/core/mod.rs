//! Pure transformations used by the request and transfer layers.
//!
//! Nothing here performs I/O; each function can be tested in isolation.

mod multipart;
mod retry;
mod sanitize;
mod sse;
mod url;
mod version;

pub use multipart::{ALLOWED_TRANSFER_ENCODINGS, is_archive_part, validate_transfer_encoding};
pub use retry::{next_retry_delay, retry_delay};
pub use sanitize::sanitize_part_name;
pub use sse::{SseDecoder, SseEvent};
pub use url::{build_url, normalize_path, rel_url};
pub use version::{ApiVersion, parse_api_version};
