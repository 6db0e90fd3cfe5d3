//! Fixed-size worker pool shared by every peer in a process.
//!
//! Jobs go into an unbounded FIFO queue and are picked up by `size` worker
//! tasks, so submitting never blocks the caller while at most `size` jobs run
//! at once. Each submission hands back a [`Completion`] the caller may await
//! or drop.

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::{PeerError, PeerResult};

type Job = BoxFuture<'static, ()>;
type JobQueue = Arc<AsyncMutex<mpsc::UnboundedReceiver<Job>>>;

#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    size: usize,
    queue: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `size` workers on the current tokio runtime.
    pub fn new(size: usize) -> PeerResult<Self> {
        let handle = Handle::try_current().map_err(|_| PeerError::NoRuntime)?;
        let size = size.max(1);
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let queue: JobQueue = Arc::new(AsyncMutex::new(rx));

        let workers = (0..size)
            .map(|index| handle.spawn(run_worker(index, queue.clone())))
            .collect();

        Ok(Self {
            inner: Arc::new(PoolInner {
                size,
                queue: Mutex::new(Some(tx)),
                workers: Mutex::new(workers),
            }),
        })
    }

    pub fn size(&self) -> usize {
        self.inner.size
    }

    pub fn is_closed(&self) -> bool {
        self.inner.queue.lock().is_none()
    }

    /// Queue `task` and return immediately.
    pub fn submit<F, T>(&self, task: F) -> PeerResult<Completion<T>>
    where
        F: Future<Output = PeerResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let outcome = task.await;
            let _ = done_tx.send(outcome);
        });

        let queue = self.inner.queue.lock();
        let sender = queue.as_ref().ok_or(PeerError::PoolClosed)?;
        sender.send(job).map_err(|_| PeerError::PoolClosed)?;
        Ok(Completion { rx: done_rx })
    }

    /// Stop accepting jobs, let workers drain the queue, then wait for them.
    pub async fn shutdown(&self) {
        self.inner.queue.lock().take();
        let workers: Vec<_> = self.inner.workers.lock().drain(..).collect();
        for worker in workers {
            let _ = worker.await;
        }
    }

    /// Stop accepting jobs and drop everything queued or running.
    ///
    /// Completions of dropped jobs resolve to [`PeerError::Cancelled`].
    pub fn abort(&self) {
        self.inner.queue.lock().take();
        for worker in self.inner.workers.lock().drain(..) {
            worker.abort();
        }
    }
}

async fn run_worker(index: usize, queue: JobQueue) {
    loop {
        let job = {
            let mut rx = queue.lock().await;
            rx.recv().await
        };
        let Some(job) = job else {
            break;
        };
        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
            error!(worker = index, "job panicked; worker continues");
        }
    }
    debug!(worker = index, "worker exiting, queue closed");
}

/// Outcome of a submitted job.
#[must_use = "dropping a completion detaches from the job's outcome"]
pub struct Completion<T> {
    rx: oneshot::Receiver<PeerResult<T>>,
}

impl<T> Completion<T> {
    pub async fn wait(self) -> PeerResult<T> {
        self.rx.await.unwrap_or(Err(PeerError::Cancelled))
    }
}
