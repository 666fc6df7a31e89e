//! Blocking execution of async work on a dedicated worker thread.
//!
//! The worker owns a private current-thread runtime and drains a single
//! FIFO work queue. Callers block on a per-call result channel, so the
//! outcome of each submission goes back to exactly the caller that made it.
//! Concurrent callers are serialized: one worker serves one session.

use std::any::Any;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Mutex, mpsc};
use std::thread::{self, JoinHandle, ThreadId};

use tokio::runtime::Runtime;
use tracing::{debug, trace};

use crate::error::{Error, Result};

type Job = Box<dyn FnOnce(&Runtime) + Send>;

enum Work {
    Run(Job),
    Stop,
}

fn closed() -> Error {
    Error::client("the session is already closed")
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

pub struct ExecutionBridge {
    sender: Mutex<Option<mpsc::Sender<Work>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl std::fmt::Debug for ExecutionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionBridge")
            .field("worker_id", &self.worker_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ExecutionBridge {
    /// Spawn the worker thread and wait until its runtime is ready.
    pub fn start(name: &str) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Work>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<std::io::Result<()>>(1);

        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => {
                    let _ = ready_tx.send(Ok(()));
                    runtime
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            debug!("bridge worker started");

            while let Ok(work) = receiver.recv() {
                match work {
                    Work::Run(job) => job(&runtime),
                    Work::Stop => break,
                }
            }

            drop(runtime);
            debug!("bridge worker stopped");
        })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(Error::Io(e));
            }
            Err(_) => {
                let _ = handle.join();
                return Err(Error::client("bridge worker exited during startup"));
            }
        }

        let worker_id = handle.thread().id();
        Ok(Self { sender: Mutex::new(Some(sender)), worker: Mutex::new(Some(handle)), worker_id })
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().unwrap_or_else(|e| e.into_inner()).is_none()
    }

    fn submit(&self, job: Job) -> Result<()> {
        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        let sender = sender.as_ref().ok_or_else(closed)?;
        sender.send(Work::Run(job)).map_err(|_| closed())
    }

    /// Run `future` to completion on the worker and block for its outcome.
    ///
    /// The error is returned exactly as the future produced it. A panic in
    /// the future becomes a client error; the worker keeps running.
    pub fn execute<T, F>(&self, future: F) -> Result<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        if thread::current().id() == self.worker_id {
            return Err(Error::client("blocking call issued from the session worker thread"));
        }

        let (result_tx, result_rx) = mpsc::sync_channel::<Result<T>>(1);
        self.submit(Box::new(move |runtime: &Runtime| {
            let outcome = catch_unwind(AssertUnwindSafe(move || runtime.block_on(future)))
                .unwrap_or_else(|payload| {
                    Err(Error::client(format!(
                        "operation panicked: {}",
                        panic_message(payload.as_ref())
                    )))
                });
            let _ = result_tx.send(outcome);
        }))?;
        trace!("submitted work to the bridge");

        result_rx
            .recv()
            .map_err(|_| Error::client("bridge worker stopped before completing the call"))?
    }

    /// Run `finalizer` on the worker, stop it and join it. Repeated calls are no-ops.
    ///
    /// Work submitted before shutdown still completes in order. When called
    /// from the worker thread itself the join is skipped.
    pub fn shutdown<F>(&self, finalizer: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Some(sender) = self.sender.lock().unwrap_or_else(|e| e.into_inner()).take() else {
            return;
        };
        let _ = sender.send(Work::Run(Box::new(move |runtime: &Runtime| {
            let _ = catch_unwind(AssertUnwindSafe(move || runtime.block_on(finalizer)));
        })));
        let _ = sender.send(Work::Stop);
        drop(sender);

        if thread::current().id() == self.worker_id {
            return;
        }
        if let Some(handle) = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ExecutionBridge {
    fn drop(&mut self) {
        self.shutdown(async {});
    }
}
