//! File-backed mediator buffers for sequential chains.
//!
//! A mediator sits between two stages: it is the consumer of the stage
//! before it and the producer of the stage after it.
//!
//! ```text
//! stage N ──put──→ [buffer file] ──drain──→ stage N+1
//!          (works before start)   (worker, one item in flight)
//! ```
//!
//! The consumer side appends to the buffer file immediately, so stage N can
//! publish while the mediator is not yet started. The producer side is the
//! worker: it replays the file into the next stage, waiting for more items
//! while stage N is still publishing. With a hand-off delay, an item is held
//! until `delay` after it was written.

use crate::chain::{Element, ItemConsumer};
use crate::worker::Worker;
use async_trait::async_trait;
use loadchain_shared::errors::{LoadchainError, LoadchainResult};
use loadchain_shared::{DataItem, SizeInBytes};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{Notify, watch};
use tokio::time::Instant;

/// Identity of a mediator buffer, derived from the run and stage parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediatorId {
    pub prefix: String,
    pub suffix: String,
}

impl MediatorId {
    pub fn new(run_name: &str, run_id: &str, size: SizeInBytes, threads: u16) -> Self {
        Self {
            prefix: format!("{}-{}", run_name, run_id),
            suffix: format!("{}x{}", size, threads),
        }
    }

    pub fn name(&self) -> String {
        format!("{}-{}", self.prefix, self.suffix)
    }
}

/// State shared with the drain worker.
struct MediatorShared {
    name: String,
    path: PathBuf,
    written: AtomicU64,
    /// Write time of every item not yet delivered, oldest first.
    written_at: Mutex<VecDeque<Instant>>,
    delay: Duration,
    upstream_done: AtomicBool,
    notify: Notify,
    consumer: OnceLock<Arc<dyn ItemConsumer>>,
}

pub struct MediatorBuffer {
    shared: Arc<MediatorShared>,
    writer: tokio::sync::Mutex<Option<File>>,
    temp_path: Mutex<Option<TempPath>>,
    worker: Worker,
}

impl MediatorBuffer {
    /// Create the buffer file inside `dir`.
    pub fn create(dir: &Path, id: &MediatorId) -> LoadchainResult<Self> {
        Self::create_with_delay(dir, id, Duration::ZERO)
    }

    /// Create the buffer file inside `dir`; items become available to the
    /// next stage `delay` after they were written.
    pub fn create_with_delay(dir: &Path, id: &MediatorId, delay: Duration) -> LoadchainResult<Self> {
        let name = id.name();
        let file = tempfile::Builder::new()
            .prefix(&format!("{}-", id.prefix))
            .suffix(&format!("-{}", id.suffix))
            .tempfile_in(dir)
            .map_err(|e| {
                LoadchainError::MediatorUnavailable(format!(
                    "{} in {}: {}",
                    name,
                    dir.display(),
                    e
                ))
            })?;

        let (file, temp_path) = file.into_parts();
        let path = temp_path.to_path_buf();

        tracing::debug!(
            mediator = %name,
            path = %path.display(),
            delay_ms = delay.as_millis() as u64,
            "Created mediator buffer"
        );

        Ok(Self {
            worker: Worker::new(name.clone()),
            shared: Arc::new(MediatorShared {
                name,
                path,
                written: AtomicU64::new(0),
                written_at: Mutex::new(VecDeque::new()),
                delay,
                upstream_done: AtomicBool::new(false),
                notify: Notify::new(),
                consumer: OnceLock::new(),
            }),
            writer: tokio::sync::Mutex::new(Some(File::from_std(file))),
            temp_path: Mutex::new(Some(temp_path)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Items written into the buffer so far.
    pub fn buffered(&self) -> u64 {
        self.shared.written.load(Ordering::Acquire)
    }
}

impl MediatorShared {
    /// Replay buffered items into the consumer until upstream is done and
    /// everything written was delivered, or until interrupted.
    async fn drain(&self, mut interrupted: watch::Receiver<bool>) -> LoadchainResult<u64> {
        let file = File::open(&self.path).await?;
        let mut reader = BufReader::new(file);
        let mut line = String::new();
        let mut delivered = 0u64;

        loop {
            if *interrupted.borrow() {
                break;
            }

            // Read `done` before `written`: once upstream is done, the count is final
            let done = self.upstream_done.load(Ordering::Acquire);
            let written = self.written.load(Ordering::Acquire);

            if delivered < written {
                line.clear();
                reader.read_line(&mut line).await?;
                let item: DataItem = line.parse()?;

                let written_at = self.written_at.lock().pop_front();
                if !self.delay.is_zero()
                    && let Some(due) = written_at.and_then(|at| at.checked_add(self.delay))
                {
                    tokio::select! {
                        _ = tokio::time::sleep_until(due) => {}
                        _ = interrupted.wait_for(|v| *v) => break,
                    }
                }

                if let Some(consumer) = self.consumer.get() {
                    tokio::select! {
                        res = consumer.put(item) => res?,
                        _ = interrupted.wait_for(|v| *v) => break,
                    }
                }
                delivered += 1;
            } else if done {
                break;
            } else {
                tokio::select! {
                    _ = self.notify.notified() => {}
                    _ = interrupted.wait_for(|v| *v) => break,
                }
            }
        }

        Ok(delivered)
    }
}

#[async_trait]
impl ItemConsumer for MediatorBuffer {
    fn name(&self) -> &str {
        &self.shared.name
    }

    async fn put(&self, item: DataItem) -> LoadchainResult<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(|| {
            LoadchainError::InvalidState(format!("{} is closed", self.shared.name))
        })?;

        writer.write_all(format!("{}\n", item).as_bytes()).await?;
        writer.flush().await?;
        self.shared.written_at.lock().push_back(Instant::now());
        drop(guard);

        self.shared.written.fetch_add(1, Ordering::Release);
        self.shared.notify.notify_one();
        Ok(())
    }

    async fn complete(&self) {
        self.shared.upstream_done.store(true, Ordering::Release);
        self.shared.notify.notify_one();
    }
}

#[async_trait]
impl Element for MediatorBuffer {
    async fn start(&self) -> LoadchainResult<()> {
        let shared = Arc::clone(&self.shared);
        self.worker.start(move |interrupted| async move {
            match shared.drain(interrupted).await {
                Ok(delivered) => {
                    tracing::debug!(mediator = %shared.name, delivered, "Mediator drained")
                }
                Err(e) => tracing::warn!(
                    mediator = %shared.name,
                    error = %e,
                    "Mediator stopped draining"
                ),
            }
            if let Some(consumer) = shared.consumer.get() {
                consumer.complete().await;
            }
        })
    }

    async fn join(&self, timeout: Duration) -> LoadchainResult<bool> {
        self.worker.join(timeout).await
    }

    async fn interrupt(&self) -> LoadchainResult<()> {
        self.worker.interrupt();
        Ok(())
    }

    async fn close(&self) -> LoadchainResult<()> {
        if self.worker.is_closed() {
            return Ok(());
        }
        self.worker.close();
        self.writer.lock().await.take();

        let temp_path = self.temp_path.lock().take();
        if let Some(temp_path) = temp_path {
            temp_path.close().map_err(|e| {
                LoadchainError::Close(format!(
                    "Failed to remove buffer file of {}: {}",
                    self.shared.name, e
                ))
            })?;
        }

        tracing::debug!(mediator = %self.shared.name, "Mediator closed");
        Ok(())
    }

    fn set_consumer(&self, next: Arc<dyn ItemConsumer>) -> LoadchainResult<()> {
        let next_name = next.name().to_string();
        self.shared
            .consumer
            .set(Arc::clone(&next))
            .map_err(|_| {
                LoadchainError::InvalidState(format!(
                    "{} already has a consumer, refusing {}",
                    self.shared.name, next_name
                ))
            })?;
        next.bind_upstream(&self.shared.name);
        Ok(())
    }

    fn consumer(&self) -> Option<Arc<dyn ItemConsumer>> {
        self.shared.consumer.get().cloned()
    }

    fn as_consumer(self: Arc<Self>) -> Arc<dyn ItemConsumer> {
        self
    }
}
