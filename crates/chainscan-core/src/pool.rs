//! Bounded worker pool with cooperative shutdown.
//!
//! Tasks are closures over the pool's [`CancellationToken`]. Submitting waits
//! for queue space; a dispatcher spawns every dequeued task as a tracked tokio
//! task. [`WorkerPool::stop`] cancels the shared token, runs every task still
//! queued with that cancelled token, waits for all tracked tasks and then
//! closes the queue.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::error::ScanError;

/// Boxed future returned by a pool task.
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<(), ScanError>> + Send>>;

type Task = Box<dyn FnOnce(CancellationToken) -> TaskFuture + Send>;

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<Task>>>,
    queue: Mutex<Option<mpsc::Receiver<Task>>>,
    token: CancellationToken,
    tracker: TaskTracker,
    stopping: AtomicBool,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            sender: Mutex::new(Some(tx)),
            queue: Mutex::new(Some(rx)),
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
            stopping: AtomicBool::new(false),
        }
    }

    /// Launch the dispatcher. Must be called from within a tokio runtime.
    pub fn start(&self) {
        let Some(mut rx) = lock(&self.queue).take() else {
            warn!("worker pool already started");
            return;
        };
        let token = self.token.clone();
        let tracker = self.tracker.clone();

        self.tracker.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(task) => run_task(&tracker, &token, task),
                        None => break,
                    },
                }
            }
            drain(&mut rx, &tracker, &token).await;
            info!("worker pool dispatcher stopped");
        });
    }

    /// Enqueue a task, waiting for queue space.
    ///
    /// Fails with [`ScanError::PoolCancelled`] if the shared lifetime is
    /// cancelled while waiting, and with [`ScanError::PoolStopped`] once
    /// [`stop`](Self::stop) has completed.
    pub async fn submit<F, Fut>(&self, task: F) -> Result<(), ScanError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ScanError>> + Send + 'static,
    {
        let sender = lock(&self.sender).clone().ok_or(ScanError::PoolStopped)?;
        let task: Task = Box::new(move |token| -> TaskFuture { Box::pin(task(token)) });

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(ScanError::PoolCancelled),
            sent = sender.send(task) => sent.map_err(|_| ScanError::PoolStopped),
        }
    }

    /// Cancel every task, run the queued ones with the cancelled token, wait
    /// for them to return, then close the queue.
    ///
    /// Only the first call performs the shutdown; later calls return at once.
    pub async fn stop(&self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        self.token.cancel();
        // Never started: nothing else will hand out what is queued.
        let idle = lock(&self.queue).take();
        if let Some(mut rx) = idle {
            drain(&mut rx, &self.tracker, &self.token).await;
        }
        self.tracker.close();
        self.tracker.wait().await;

        lock(&self.sender).take();
        info!("worker pool stopped");
    }

    /// A token cancelled together with the pool, that can also be cancelled on its own.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Number of live tracked tasks, the dispatcher included.
    pub fn active_workers(&self) -> usize {
        self.tracker.len()
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

fn run_task(tracker: &TaskTracker, token: &CancellationToken, task: Task) {
    let fut = task(token.clone());
    tracker.spawn(async move {
        if let Err(e) = fut.await {
            debug!(error = %e, "pool task ended with error");
        }
    });
}

/// Close the queue and run whatever is still in it with the cancelled token,
/// so every task gets to observe the shutdown.
async fn drain(rx: &mut mpsc::Receiver<Task>, tracker: &TaskTracker, token: &CancellationToken) {
    rx.close();
    let mut drained = 0usize;
    while let Some(task) = rx.recv().await {
        run_task(tracker, token, task);
        drained += 1;
    }
    if drained > 0 {
        debug!(drained, "queued tasks handed the cancelled token");
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
