//! Workload stages.
//!
//! A [`Stage`] is one workload phase of a scenario (create, read, ...). It
//! owns a [`Worker`](crate::worker::Worker) that runs its [`Workload`], a
//! bounded input channel through which an upstream element feeds it, and a
//! settable-once consumer link to the next element.

mod factory;
mod output;
mod synthetic;
mod workload;

pub use factory::{BasicStageFactory, StageFactory};
pub use output::ItemFileOutput;
pub use synthetic::SyntheticWorkload;
pub use workload::{ItemOutput, ItemSource, StageIo, Workload};

use crate::chain::{Element, ItemConsumer};
use crate::worker::Worker;
use async_trait::async_trait;
use loadchain_shared::errors::{LoadchainError, LoadchainResult};
use loadchain_shared::DataItem;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::mpsc;

/// Capacity of a stage's input channel.
const INPUT_QUEUE_CAPACITY: usize = 1024;

/// Closed set of stage types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageType {
    Create,
    Read,
    Update,
    Delete,
}

impl StageType {
    pub const ALL: [StageType; 4] = [
        StageType::Create,
        StageType::Read,
        StageType::Update,
        StageType::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageType::Create => "create",
            StageType::Read => "read",
            StageType::Update => "update",
            StageType::Delete => "delete",
        }
    }
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageType {
    type Err = LoadchainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| LoadchainError::InvalidStageType(s.to_string()))
    }
}

/// Per-stage size and concurrency parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSettings {
    pub min_size: u64,
    pub max_size: u64,
    pub threads: u16,
    /// File with initial items; only the first stage of a chain keeps one.
    pub input_file: Option<PathBuf>,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            min_size: 1 << 20,
            max_size: 1 << 20,
            threads: 1,
            input_file: None,
        }
    }
}

/// State the worker task needs after `start` returns.
struct StageShared {
    name: String,
    kind: StageType,
    settings: StageSettings,
    workload: Arc<dyn Workload>,
    processed: Arc<AtomicU64>,
}

pub struct Stage {
    shared: Arc<StageShared>,
    consumer: OnceLock<Arc<dyn ItemConsumer>>,
    input_tx: Mutex<Option<mpsc::Sender<DataItem>>>,
    input_rx: Mutex<Option<mpsc::Receiver<DataItem>>>,
    has_upstream: AtomicBool,
    worker: Worker,
}

impl Stage {
    pub fn new(
        name: impl Into<String>,
        kind: StageType,
        settings: StageSettings,
        workload: Arc<dyn Workload>,
    ) -> Self {
        let name = name.into();
        let (input_tx, input_rx) = mpsc::channel(INPUT_QUEUE_CAPACITY);
        Self {
            worker: Worker::new(name.clone()),
            shared: Arc::new(StageShared {
                name,
                kind,
                settings,
                workload,
                processed: Arc::new(AtomicU64::new(0)),
            }),
            consumer: OnceLock::new(),
            input_tx: Mutex::new(Some(input_tx)),
            input_rx: Mutex::new(Some(input_rx)),
            has_upstream: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> StageType {
        self.shared.kind
    }

    pub fn settings(&self) -> &StageSettings {
        &self.shared.settings
    }

    /// Items this stage has processed so far.
    pub fn processed(&self) -> u64 {
        self.shared.processed.load(Ordering::Relaxed)
    }

    async fn open_source(&self) -> LoadchainResult<ItemSource> {
        if let Some(path) = &self.shared.settings.input_file {
            return ItemSource::open_file(path.clone()).await;
        }
        if self.has_upstream.load(Ordering::Acquire) {
            let rx = self.input_rx.lock().take().ok_or_else(|| {
                LoadchainError::InvalidState(format!("{} input already taken", self.shared.name))
            })?;
            return Ok(ItemSource::Upstream(rx));
        }
        Ok(ItemSource::None)
    }
}

#[async_trait]
impl ItemConsumer for Stage {
    fn name(&self) -> &str {
        &self.shared.name
    }

    async fn put(&self, item: DataItem) -> LoadchainResult<()> {
        let tx = self.input_tx.lock().clone().ok_or_else(|| {
            LoadchainError::InvalidState(format!("{} no longer accepts items", self.shared.name))
        })?;
        tx.send(item).await.map_err(|_| {
            LoadchainError::InvalidState(format!("{} input is closed", self.shared.name))
        })
    }

    async fn complete(&self) {
        // Dropping the last sender ends the worker's input stream
        self.input_tx.lock().take();
    }

    fn bind_upstream(&self, upstream: &str) {
        tracing::debug!(stage = %self.shared.name, upstream = %upstream, "Bound upstream producer");
        self.has_upstream.store(true, Ordering::Release);
    }
}

#[async_trait]
impl Element for Stage {
    async fn start(&self) -> LoadchainResult<()> {
        let source = self.open_source().await?;
        let output = ItemOutput::new(
            self.consumer.get().cloned(),
            Arc::clone(&self.shared.processed),
        );
        let shared = Arc::clone(&self.shared);

        self.worker.start(move |interrupted| async move {
            let io = StageIo {
                stage: shared.name.clone(),
                kind: shared.kind,
                settings: shared.settings.clone(),
                source,
                output: output.clone(),
                interrupted,
            };

            match shared.workload.run(io).await {
                Ok(()) => tracing::info!(
                    stage = %shared.name,
                    processed = output.processed(),
                    "Stage finished"
                ),
                Err(e) => tracing::error!(
                    stage = %shared.name,
                    processed = output.processed(),
                    error = %e,
                    "Stage workload failed"
                ),
            }
            output.complete().await;
        })?;

        tracing::debug!(stage = %self.shared.name, kind = %self.shared.kind, "Stage started");
        Ok(())
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
        let unfinished = self.worker.close();
        self.input_tx.lock().take();
        self.input_rx.lock().take();

        // A force-released producer never reaches its own completion signal
        if unfinished && let Some(consumer) = self.consumer.get() {
            consumer.complete().await;
        }

        tracing::debug!(
            stage = %self.shared.name,
            processed = self.processed(),
            "Stage closed"
        );
        Ok(())
    }

    fn set_consumer(&self, next: Arc<dyn ItemConsumer>) -> LoadchainResult<()> {
        let next_name = next.name().to_string();
        self.consumer.set(Arc::clone(&next)).map_err(|_| {
            LoadchainError::InvalidState(format!(
                "{} already has a consumer, refusing {}",
                self.shared.name, next_name
            ))
        })?;
        next.bind_upstream(&self.shared.name);
        Ok(())
    }

    fn consumer(&self) -> Option<Arc<dyn ItemConsumer>> {
        self.consumer.get().cloned()
    }

    fn as_consumer(self: Arc<Self>) -> Arc<dyn ItemConsumer> {
        self
    }
}
