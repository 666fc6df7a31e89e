use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::data::{ApiConfig, Method};
use crate::effects::bridge::ExecutionBridge;
use crate::effects::request::Request;
use crate::effects::response::BlockingResponse;
use crate::effects::transport::{ReqwestTransport, Transport};
use crate::error::{Error, Result};
use crate::func::{Auth, System, VFolder};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Which caller model a session serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Async,
    Sync,
}

struct Shared {
    config: ApiConfig,
    transport: Arc<dyn Transport>,
    flavor: Flavor,
    closed: AtomicBool,
}

/// Cheap handle to a session's config, transport and open/closed state.
///
/// Operations capture a context instead of borrowing the session, which
/// lets their futures outlive the call that created them.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<Shared>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("config", &self.inner.config)
            .field("flavor", &self.inner.flavor)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl SessionContext {
    fn new(config: ApiConfig, transport: Arc<dyn Transport>, flavor: Flavor) -> Self {
        Self {
            inner: Arc::new(Shared {
                config,
                transport,
                flavor,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    pub fn flavor(&self) -> Flavor {
        self.inner.flavor
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::client("the session is already closed"))
        } else {
            Ok(())
        }
    }

    /// Transition OPEN → CLOSED. Returns `true` only for the call that did it.
    fn mark_closed(&self) -> bool {
        self.inner
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn request(&self, method: Method, path: &str) -> Request {
        Request::new(self, method, path)
    }
}

/// Common surface of [`AsyncSession`] and [`SyncSession`].
///
/// `dispatch` is the only place the two flavors differ: the async flavor
/// hands the future back to the caller, the sync flavor runs it on its
/// bridge and returns the outcome. Operation groups are written once
/// against this trait.
pub trait Session {
    type Output<T: Send + 'static>;

    fn context(&self) -> &SessionContext;

    fn dispatch<T, F>(&self, future: F) -> Self::Output<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static;

    fn system(&self) -> System<'_, Self>
    where
        Self: Sized,
    {
        System::new(self)
    }

    fn auth(&self) -> Auth<'_, Self>
    where
        Self: Sized,
    {
        Auth::new(self)
    }

    fn vfolder(&self, name: impl Into<String>) -> VFolder<'_, Self>
    where
        Self: Sized,
    {
        VFolder::new(self, name)
    }
}

/// Session for async callers; operations return futures to be awaited.
///
/// # Examples
///
/// ```no_run
/// use bai_client::{ApiConfig, AsyncSession, Session};
///
/// # async fn run() -> bai_client::Result<()> {
/// let config = ApiConfig::new("https://api.backend.ai")?.credentials("AKIA...", "secret");
/// let session = AsyncSession::new(config)?;
/// let info = session.system().hello().await?;
/// println!("{info}");
/// session.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct AsyncSession {
    context: SessionContext,
}

impl AsyncSession {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: ApiConfig, transport: Arc<dyn Transport>) -> Self {
        Self { context: SessionContext::new(config, transport, Flavor::Async) }
    }

    pub fn config(&self) -> &ApiConfig {
        self.context.config()
    }

    pub fn request(&self, method: Method, path: &str) -> Request {
        self.context.request(method, path)
    }

    pub fn is_closed(&self) -> bool {
        self.context.is_closed()
    }

    /// Release the transport. Only the first call has any effect.
    pub async fn close(&self) {
        if self.context.mark_closed() {
            self.context.transport().close().await;
            debug!("async session closed");
        }
    }
}

impl Session for AsyncSession {
    type Output<T: Send + 'static> = BoxFuture<'static, Result<T>>;

    fn context(&self) -> &SessionContext {
        &self.context
    }

    fn dispatch<T, F>(&self, future: F) -> Self::Output<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Box::pin(future)
    }
}

/// Session for blocking callers.
///
/// Every operation runs on the session's worker thread and the calling
/// thread blocks until it finishes. Calls from several threads are
/// served one at a time, in the order they were submitted. Work already
/// handed to the worker cannot be cancelled.
#[derive(Debug)]
pub struct SyncSession {
    context: SessionContext,
    bridge: Arc<ExecutionBridge>,
}

impl SyncSession {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    pub fn with_transport(config: ApiConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let bridge = ExecutionBridge::start("bai-session-worker")?;
        Ok(Self {
            context: SessionContext::new(config, transport, Flavor::Sync),
            bridge: Arc::new(bridge),
        })
    }

    pub fn config(&self) -> &ApiConfig {
        self.context.config()
    }

    pub fn request(&self, method: Method, path: &str) -> Request {
        self.context.request(method, path)
    }

    pub fn is_closed(&self) -> bool {
        self.context.is_closed()
    }

    /// Block on an arbitrary future using this session's worker.
    pub fn execute<T, F>(&self, future: F) -> Result<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        self.bridge.execute(future)
    }

    /// Send `request` and block for the response headers.
    pub fn fetch(&self, request: Request) -> Result<BlockingResponse> {
        let response = self.bridge.execute(request.fetch())?;
        Ok(BlockingResponse::new(response, self.bridge.clone()))
    }

    /// Release the transport on the worker, then stop and join the worker.
    /// Only the first call has any effect.
    pub fn close(&self) {
        if self.context.mark_closed() {
            let transport = self.context.transport().clone();
            self.bridge.shutdown(async move { transport.close().await });
            debug!("sync session closed");
        }
    }
}

impl Session for SyncSession {
    type Output<T: Send + 'static> = Result<T>;

    fn context(&self) -> &SessionContext {
        &self.context
    }

    fn dispatch<T, F>(&self, future: F) -> Self::Output<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        self.bridge.execute(future)
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.close();
    }
}
