//! Background I/O scheduler.
//!
//! All sockets and per-camera workers live on one dedicated thread running a
//! single-threaded tokio runtime. Other threads reach it only through
//! [IoWorker::submit], which runs a future there and blocks for its result.
use crate::{Error, Result};
use std::{
    future::Future,
    sync::Mutex,
    thread::{self, JoinHandle, ThreadId},
    time::Duration,
};
use tokio::{
    runtime::{Builder, Handle},
    sync::oneshot,
    task,
};

pub struct IoWorker {
    handle: Handle,
    thread_id: ThreadId,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl IoWorker {
    const THREAD_NAME: &'static str = "ptzdeck-io";

    /// Starts the scheduler thread.
    pub fn start() -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let handle = runtime.handle().clone();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = thread::Builder::new()
            .name(Self::THREAD_NAME.to_string())
            .spawn(move || {
                debug!("I/O worker started");
                runtime.block_on(async {
                    // Either a stop request, or the IoWorker was dropped.
                    let _ = shutdown_rx.await;
                });
                // Dropping the runtime cancels any remaining tasks.
                drop(runtime);
                debug!("I/O worker stopped");
            })?;

        Ok(Self {
            handle,
            thread_id: thread.thread().id(),
            shutdown: Mutex::new(Some(shutdown_tx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Spawns a task on the scheduler without waiting for it.
    pub fn spawn<F>(&self, fut: F) -> task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(fut)
    }

    /// Runs `fut` on the scheduler, and blocks the calling thread until it
    /// finishes.
    ///
    /// This must not be called from inside an async context, as it would
    /// block that runtime.
    pub fn submit<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if Handle::try_current().is_ok() {
            error!("blocking submit called from an async context");
            return Err(Error::UnexpectedState);
        }

        let (tx, rx) = oneshot::channel();
        self.handle.spawn(async move {
            // The caller may have gone away; nothing to do then.
            let _ = tx.send(fut.await);
        });
        rx.blocking_recv().map_err(|_| Error::ChannelUnavailable)
    }

    /// [IoWorker::submit], giving up after `timeout`.
    ///
    /// The future is dropped on timeout.
    pub fn submit_timeout<F, T>(&self, timeout: Duration, fut: F) -> Result<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(async move { tokio::time::timeout(timeout, fut).await })?
            .map_err(|_| Error::Timeout)
    }

    /// Returns `true` while the scheduler thread is accepting work.
    pub fn is_running(&self) -> bool {
        self.shutdown.lock().is_ok_and(|s| s.is_some())
    }

    /// Stops the scheduler thread, cancelling all tasks on it.
    pub fn stop(&self) {
        let Some(shutdown) = self.shutdown.lock().ok().and_then(|mut s| s.take()) else {
            return;
        };
        info!("stopping I/O worker");
        let _ = shutdown.send(());

        if thread::current().id() == self.thread_id {
            // Can't join ourselves; the thread exits once this task yields.
            return;
        }
        if let Some(thread) = self.thread.lock().ok().and_then(|mut t| t.take()) {
            if thread.join().is_err() {
                error!("I/O worker thread panicked");
            }
        }
    }
}

impl Drop for IoWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
