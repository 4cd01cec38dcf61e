//! One schedulable unit of execution per chain element.
//!
//! A `Worker` owns at most one tokio task and exposes the lifecycle the
//! executor drives: start once, bounded join, interrupt, close.
//!
//! ```text
//! Idle ──start──→ Running ──(task returns)──→ Done
//!   │                │                          │
//!   └──────close─────┴───────────close──────────┴──→ Closed
//! ```

use loadchain_shared::errors::{LoadchainError, LoadchainResult};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    Idle,
    Running,
    Closed,
}

pub struct Worker {
    name: String,
    state: Mutex<WorkerState>,
    handle: Mutex<Option<JoinHandle<()>>>,
    interrupt_tx: watch::Sender<bool>,
    done_tx: Arc<watch::Sender<bool>>,
}

impl Worker {
    pub fn new(name: impl Into<String>) -> Self {
        let (interrupt_tx, _) = watch::channel(false);
        let (done_tx, _) = watch::channel(false);
        Self {
            name: name.into(),
            state: Mutex::new(WorkerState::Idle),
            handle: Mutex::new(None),
            interrupt_tx,
            done_tx: Arc::new(done_tx),
        }
    }

    /// Spawn the worker task.
    ///
    /// `body` receives the interrupt signal; the worker is marked done when
    /// the returned future resolves.
    pub fn start<F, Fut>(&self, body: F) -> LoadchainResult<()>
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.state.lock();
        match *state {
            WorkerState::Idle => {}
            WorkerState::Running => {
                return Err(LoadchainError::InvalidState(format!(
                    "{} is already started",
                    self.name
                )));
            }
            WorkerState::Closed => {
                return Err(LoadchainError::InvalidState(format!(
                    "{} is closed",
                    self.name
                )));
            }
        }

        let fut = body(self.interrupt_tx.subscribe());
        let done_tx = Arc::clone(&self.done_tx);
        let handle = tokio::spawn(async move {
            fut.await;
            done_tx.send_replace(true);
        });

        *self.handle.lock() = Some(handle);
        *state = WorkerState::Running;
        tracing::trace!(worker = %self.name, "Worker started");
        Ok(())
    }

    /// Wait up to `timeout` for the task to finish.
    ///
    /// Durations too large for the clock wait without a bound.
    pub async fn join(&self, timeout: Duration) -> LoadchainResult<bool> {
        if *self.state.lock() == WorkerState::Idle {
            return Err(LoadchainError::InvalidState(format!(
                "{} was never started",
                self.name
            )));
        }

        let mut done_rx = self.done_tx.subscribe();
        let wait = async move {
            done_rx
                .wait_for(|done| *done)
                .await
                .map(|_| ())
                .map_err(|_| LoadchainError::Internal("worker completion channel closed".into()))
        };

        match Instant::now().checked_add(timeout) {
            Some(deadline) => match tokio::time::timeout_at(deadline, wait).await {
                Ok(res) => res.map(|_| true),
                Err(_) => Ok(false),
            },
            None => wait.await.map(|_| true),
        }
    }

    /// Signal the task to stop. Idempotent.
    pub fn interrupt(&self) {
        if !self.interrupt_tx.send_replace(true) {
            tracing::trace!(worker = %self.name, "Worker interrupted");
        }
    }

    /// Interrupt, abort a still-running task and mark the worker done.
    ///
    /// Returns `true` if the task had not finished on its own.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock();
        if *state == WorkerState::Closed {
            return false;
        }
        *state = WorkerState::Closed;
        drop(state);

        self.interrupt();
        let unfinished = !self.is_done();
        if let Some(handle) = self.handle.lock().take()
            && !handle.is_finished()
        {
            handle.abort();
        }
        self.done_tx.send_replace(true);
        unfinished
    }

    pub fn is_done(&self) -> bool {
        *self.done_tx.borrow()
    }

    pub fn is_closed(&self) -> bool {
        *self.state.lock() == WorkerState::Closed
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}
