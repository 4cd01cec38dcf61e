//! Reference work logic: moves items through a stage without touching storage.

use super::{StageIo, StageType, Workload};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use loadchain_shared::errors::LoadchainResult;
use loadchain_shared::DataItem;
use rand::Rng;
use std::time::Duration;

/// Workload that generates or forwards items at the stage's concurrency.
///
/// - A create stage with no item source generates `count` new items with
///   sizes drawn from `[min_size, max_size]`.
/// - Every other stage processes the items its source yields.
///
/// Each processed item is published to the stage's consumer.
#[derive(Debug, Clone)]
pub struct SyntheticWorkload {
    count: u64,
    op_latency: Duration,
}

impl SyntheticWorkload {
    pub fn new(count: u64) -> Self {
        Self {
            count,
            op_latency: Duration::ZERO,
        }
    }

    /// Simulated time spent on every item.
    pub fn with_op_latency(mut self, latency: Duration) -> Self {
        self.op_latency = latency;
        self
    }

    fn generated(&self, stage: &str, min_size: u64, max_size: u64) -> BoxStream<'static, DataItem> {
        let prefix = stage.to_string();
        let (lo, hi) = if min_size <= max_size {
            (min_size, max_size)
        } else {
            (max_size, min_size)
        };
        stream::iter(0..self.count)
            .map(move |i| {
                let size = if lo == hi {
                    lo
                } else {
                    rand::rng().random_range(lo..=hi)
                };
                DataItem::new(format!("{}-{:010}", prefix, i), size)
            })
            .boxed()
    }
}

#[async_trait]
impl Workload for SyntheticWorkload {
    async fn run(&self, io: StageIo) -> LoadchainResult<()> {
        let StageIo {
            stage,
            kind,
            settings,
            source,
            output,
            mut interrupted,
        } = io;

        let items: BoxStream<'static, DataItem> = if kind == StageType::Create && source.is_none() {
            self.generated(&stage, settings.min_size, settings.max_size)
        } else {
            let stage = stage.clone();
            stream::unfold(source, move |mut source| {
                let stage = stage.clone();
                async move {
                    match source.next().await {
                        Ok(Some(item)) => Some((item, source)),
                        Ok(None) => None,
                        Err(e) => {
                            tracing::warn!(stage = %stage, error = %e, "Item source failed, stopping");
                            None
                        }
                    }
                }
            })
            .boxed()
        };

        let stop = async move {
            // A dropped sender can never interrupt
            if interrupted.wait_for(|v| *v).await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        let concurrency = usize::from(settings.threads.max(1));
        let latency = self.op_latency;

        items
            .take_until(Box::pin(stop))
            .for_each_concurrent(concurrency, |item| {
                let output = output.clone();
                let stage = stage.clone();
                async move {
                    if !latency.is_zero() {
                        tokio::time::sleep(latency).await;
                    }
                    tracing::trace!(stage = %stage, kind = %kind, item = %item.name, "Processed item");
                    if let Err(e) = output.put(item).await {
                        tracing::debug!(stage = %stage, error = %e, "Consumer rejected item");
                    }
                }
            })
            .await;

        Ok(())
    }
}
