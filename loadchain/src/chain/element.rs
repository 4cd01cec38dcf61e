//! Lifecycle contract shared by stages and mediator buffers.

use async_trait::async_trait;
use loadchain_shared::{DataItem, LoadchainResult};
use std::sync::Arc;
use std::time::Duration;

/// Receiving end of a producer→consumer link.
///
/// Every link has exactly one writer and one reader, so implementations
/// only need to be safe for a single concurrent producer.
#[async_trait]
pub trait ItemConsumer: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Accept one item from the upstream producer.
    async fn put(&self, item: DataItem) -> LoadchainResult<()>;

    /// Upstream has finished publishing. Idempotent.
    async fn complete(&self);

    /// Called by a producer when it wires itself to this consumer.
    fn bind_upstream(&self, _upstream: &str) {}
}

/// Lifecycle operations the chain executor drives.
///
/// Implemented identically by stages and mediator buffers; the executor
/// only needs the [`ChainElement`](super::ChainElement) tag to tell them
/// apart.
#[async_trait]
pub trait Element: ItemConsumer {
    /// Begin asynchronous operation.
    async fn start(&self) -> LoadchainResult<()>;

    /// Wait up to `timeout` for natural completion.
    ///
    /// Returns `true` if the element completed, `false` on timeout. A timeout
    /// does not stop the element.
    async fn join(&self, timeout: Duration) -> LoadchainResult<bool>;

    /// Best-effort cancellation signal. Idempotent.
    async fn interrupt(&self) -> LoadchainResult<()>;

    /// Release all resources. Idempotent.
    async fn close(&self) -> LoadchainResult<()>;

    /// Wire this element's output to `next`. Settable at most once.
    fn set_consumer(&self, next: Arc<dyn ItemConsumer>) -> LoadchainResult<()>;

    /// Currently wired consumer, if any.
    fn consumer(&self) -> Option<Arc<dyn ItemConsumer>>;

    /// View this element as the consumer end of a link.
    fn as_consumer(self: Arc<Self>) -> Arc<dyn ItemConsumer>;
}

pub type SharedElement = Arc<dyn Element>;
