//! The seam between a stage's lifecycle and the work it performs.

use super::{StageSettings, StageType};
use crate::chain::ItemConsumer;
use async_trait::async_trait;
use loadchain_shared::errors::{LoadchainError, LoadchainResult};
use loadchain_shared::DataItem;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::sync::{mpsc, watch};

/// Work logic executed by a started stage.
///
/// Implementations pull items from `io.source`, do their work and publish
/// results through `io.output`. They should return once the source is
/// exhausted or `io.interrupted` flips to `true`.
#[async_trait]
pub trait Workload: Send + Sync {
    async fn run(&self, io: StageIo) -> LoadchainResult<()>;
}

/// Everything a workload gets from its stage.
pub struct StageIo {
    pub stage: String,
    pub kind: StageType,
    pub settings: StageSettings,
    pub source: ItemSource,
    pub output: ItemOutput,
    pub interrupted: watch::Receiver<bool>,
}

/// Where a stage takes its initial items from.
pub enum ItemSource {
    /// No producer: the stage generates its own items, if it can.
    None,
    /// File-seeded items, one `name,size` line each.
    File {
        path: PathBuf,
        lines: Lines<BufReader<File>>,
    },
    /// Items published by the upstream chain element.
    Upstream(mpsc::Receiver<DataItem>),
}

impl ItemSource {
    pub async fn open_file(path: PathBuf) -> LoadchainResult<Self> {
        let file = File::open(&path).await.map_err(|e| {
            LoadchainError::Config(format!(
                "Failed to open item input file {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(ItemSource::File {
            path,
            lines: BufReader::new(file).lines(),
        })
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ItemSource::None)
    }

    /// Next item, or `None` once the source is exhausted.
    pub async fn next(&mut self) -> LoadchainResult<Option<DataItem>> {
        match self {
            ItemSource::None => Ok(None),
            ItemSource::File { path, lines } => loop {
                match lines.next_line().await? {
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => {
                        return line.parse().map(Some).map_err(|e| {
                            LoadchainError::Config(format!("{}: {}", path.display(), e))
                        });
                    }
                    None => return Ok(None),
                }
            },
            ItemSource::Upstream(rx) => Ok(rx.recv().await),
        }
    }
}

/// Publishing end of a stage: counts processed items and forwards them to
/// the wired consumer, if any.
#[derive(Clone)]
pub struct ItemOutput {
    consumer: Option<Arc<dyn ItemConsumer>>,
    processed: Arc<AtomicU64>,
}

impl ItemOutput {
    pub fn new(consumer: Option<Arc<dyn ItemConsumer>>, processed: Arc<AtomicU64>) -> Self {
        Self {
            consumer,
            processed,
        }
    }

    pub async fn put(&self, item: DataItem) -> LoadchainResult<()> {
        self.processed.fetch_add(1, Ordering::Relaxed);
        match &self.consumer {
            Some(consumer) => consumer.put(item).await,
            None => Ok(()),
        }
    }

    pub async fn complete(&self) {
        if let Some(consumer) = &self.consumer {
            consumer.complete().await;
        }
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }
}
