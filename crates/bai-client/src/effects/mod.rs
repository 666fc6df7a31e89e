//! I/O: transports, sessions, requests and transfers.
//!
//! Everything that touches the network or the filesystem lives here, behind
//! the [`Transport`] seam so sessions can run against [`MockTransport`].

pub mod binder;
pub mod bridge;
pub mod download;
pub mod events;
pub mod mock;
pub mod request;
pub mod response;
pub mod session;
pub mod transport;
pub mod upload;
pub mod websocket;

pub use binder::bind;
pub use bridge::ExecutionBridge;
pub use download::save_multipart;
pub use events::EventStream;
pub use mock::{MockReply, MockTransport, RecordedRequest};
pub use request::Request;
pub use response::{BlockingResponse, Response};
pub use session::{AsyncSession, BoxFuture, Flavor, Session, SessionContext, SyncSession};
pub use transport::{
    BoxStream, ByteStream, ReqwestTransport, Transport, WireBody, WireRequest, WireResponse,
};
pub use upload::ChunkedUploader;
pub use websocket::WebSocket;
