//! Turns one async operation body into a session-flavored call.
//!
//! An operation is a closure from a [`SessionContext`] to a future. Binding
//! it to a session yields whatever that session's [`Session::Output`] is:
//! a boxed future under [`AsyncSession`](crate::AsyncSession), the result
//! itself under [`SyncSession`](crate::SyncSession). Nothing is shared
//! between sessions; each call captures its own context.

use std::future::Future;

use crate::effects::session::{Session, SessionContext};
use crate::error::Result;

/// Bind `operation` to `session` and dispatch it.
///
/// The closed-session check runs when the operation is polled, so a future
/// created before `close()` and awaited after it still fails cleanly.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use bai_client::{ApiConfig, MockReply, MockTransport, SyncSession, bind, Method};
///
/// let transport = Arc::new(MockTransport::new(|_| Ok(MockReply::text(200, "pong"))));
/// let config = ApiConfig::new("http://mock").unwrap().credentials("ak", "sk");
/// let session = SyncSession::with_transport(config, transport).unwrap();
///
/// let text: String = bind(&session, |ctx| async move {
///     ctx.request(Method::Get, "/ping").fetch().await?.text().await
/// })
/// .unwrap();
/// assert_eq!(text, "pong");
/// ```
pub fn bind<S, T, F, Fut>(session: &S, operation: F) -> S::Output<T>
where
    S: Session,
    T: Send + 'static,
    F: FnOnce(SessionContext) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let context = session.context().clone();
    let guard = context.clone();
    let future = operation(context);
    session.dispatch(async move {
        guard.ensure_open()?;
        future.await
    })
}
