//! The [`Lane`] serial executor.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Error returned when work is handed to a lane that has shut down.
#[derive(Debug, thiserror::Error)]
#[error("lane {lane} has shut down")]
pub struct RejectedError {
    /// Name of the rejecting lane.
    pub lane: String,
}

/// Error produced by [`TaskHandle::outcome`] when the task was dropped
/// before it could complete (forced shutdown, or discarded from the queue).
#[derive(Debug, thiserror::Error)]
#[error("task was cancelled before completing")]
pub struct TaskCancelled;

/// Handle to a submitted task's outcome.
///
/// The handle may also carry an immediately-available value, used by
/// callers that must hand back an already-failed outcome for work that was
/// never enqueued.
pub struct TaskHandle<T> {
    inner: HandleInner<T>,
}

enum HandleInner<T> {
    Ready(T),
    Pending(oneshot::Receiver<T>),
}

impl<T> TaskHandle<T> {
    /// A handle whose outcome is already available.
    pub fn ready(value: T) -> Self {
        Self {
            inner: HandleInner::Ready(value),
        }
    }

    fn pending(rx: oneshot::Receiver<T>) -> Self {
        Self {
            inner: HandleInner::Pending(rx),
        }
    }

    /// Wait for the task's outcome.
    pub async fn outcome(self) -> Result<T, TaskCancelled> {
        match self.inner {
            HandleInner::Ready(value) => Ok(value),
            HandleInner::Pending(rx) => rx.await.map_err(|_| TaskCancelled),
        }
    }
}

/// Sets the termination flag when the worker future is dropped, whether it
/// ran to completion or was aborted.
struct DoneGuard(watch::Sender<bool>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        let _ = self.0.send(true);
    }
}

/// Aborts the in-flight job when the worker itself is aborted mid-await.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A strictly-serial single-worker executor.
///
/// Tasks run one at a time in submission order. A fixed-rate task whose
/// previous run is still in flight when the next tick fires is queued
/// behind it, never run concurrently with it.
pub struct Lane {
    name: String,
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    shut: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    done_rx: watch::Receiver<bool>,
    /// Self-reference for the timer tasks spawned by the scheduling
    /// methods; they must not keep the lane alive on their own.
    weak: Weak<Lane>,
}

impl Lane {
    /// Spawn a new lane with its dedicated worker task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let (done_tx, done_rx) = watch::channel(false);

        let worker_name = name.clone();
        let worker = tokio::spawn(async move {
            let _done = DoneGuard(done_tx);
            while let Some(job) = rx.recv().await {
                // Each job runs as its own task so that a panic is contained
                // and a forced shutdown can cancel it at its next await.
                let mut inflight = AbortOnDrop(tokio::spawn(job));
                match (&mut inflight.0).await {
                    Ok(()) => {}
                    Err(e) if e.is_panic() => {
                        error!(lane = %worker_name, "lane task panicked");
                    }
                    Err(_) => {
                        debug!(lane = %worker_name, "lane task cancelled");
                    }
                }
            }
            debug!(lane = %worker_name, "lane worker exiting");
        });

        Arc::new_cyclic(|weak| Self {
            name,
            tx: Mutex::new(Some(tx)),
            shut: AtomicBool::new(false),
            worker: Mutex::new(Some(worker)),
            done_rx,
            weak: weak.clone(),
        })
    }

    fn rejected(&self) -> RejectedError {
        RejectedError {
            lane: self.name.clone(),
        }
    }

    /// Enqueue a one-shot task, returning a handle to its outcome.
    pub fn submit<T, F>(&self, task: F) -> Result<TaskHandle<T>, RejectedError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let value = task.await;
            let _ = result_tx.send(value);
        });

        let guard = self.tx.lock().expect("lane sender lock poisoned");
        match guard.as_ref() {
            Some(tx) if !self.is_shutdown() => {
                tx.send(job).map_err(|_| self.rejected())?;
                Ok(TaskHandle::pending(result_rx))
            }
            _ => Err(self.rejected()),
        }
    }

    /// Enqueue a task after `delay`.
    ///
    /// The rejection check runs twice: once now, and once when the delay
    /// elapses (the lane may have shut down in between — the task is then
    /// dropped with a warning).
    pub fn schedule<F>(&self, delay: Duration, task: F) -> Result<(), RejectedError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shutdown() {
            return Err(self.rejected());
        }
        let lane = self.weak.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(lane) = lane.upgrade() {
                if let Err(e) = lane.submit(task) {
                    warn!(%e, "dropping scheduled task");
                }
            }
        });
        Ok(())
    }

    /// Run `task` at a fixed rate: first after `initial_delay`, then every
    /// `period` after the previous *scheduled* start. The serial worker
    /// guarantees runs never overlap; a late run delays its successors.
    ///
    /// `period` must be non-zero. The timer stops itself once the lane
    /// shuts down or is dropped.
    pub fn schedule_at_fixed_rate<F, Fut>(
        &self,
        initial_delay: Duration,
        period: Duration,
        task: F,
    ) where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let lane = self.weak.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + initial_delay;
            let mut ticks = tokio::time::interval_at(start, period);
            loop {
                ticks.tick().await;
                let Some(lane) = lane.upgrade() else { break };
                if lane.is_shutdown() || lane.submit(task()).is_err() {
                    break;
                }
            }
        });
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.shut.load(Ordering::SeqCst)
    }

    /// Graceful shutdown: no new work is accepted, the in-flight task and
    /// everything already queued still run to completion.
    pub fn shutdown(&self) {
        self.shut.store(true, Ordering::SeqCst);
        // Dropping the sender lets the worker drain the queue and exit.
        self.tx.lock().expect("lane sender lock poisoned").take();
    }

    /// Forced shutdown: cancels the in-flight task at its next await point
    /// and discards anything still queued.
    pub fn shutdown_now(&self) {
        self.shutdown();
        if let Some(worker) = self.worker.lock().expect("lane worker lock poisoned").as_ref() {
            worker.abort();
        }
    }

    /// Wait up to `timeout` for the worker to terminate.
    ///
    /// Returns `true` once the worker has exited (gracefully or via
    /// [`shutdown_now`](Self::shutdown_now)), `false` if the timeout
    /// elapsed first.
    pub async fn await_termination(&self, timeout: Duration) -> bool {
        let mut done = self.done_rx.clone();
        let result = tokio::time::timeout(timeout, done.wait_for(|done| *done)).await;
        result.is_ok()
    }
}

impl std::fmt::Debug for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lane")
            .field("name", &self.name)
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}
