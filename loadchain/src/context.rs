//! Per-run context shared by the chain builder and executor.

use crate::config::RunTimeout;
use crate::mediator::MediatorId;
use loadchain_shared::SizeInBytes;
use std::path::PathBuf;
use std::time::Duration;

/// Run-wide values, read once and passed explicitly.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_name: String,
    pub run_id: String,
    pub timeout: RunTimeout,
    /// Directory holding mediator buffer files.
    pub buffer_dir: PathBuf,
    /// Items file the last stage writes to.
    pub item_output_file: Option<PathBuf>,
    /// How long a mediator holds each item before handing it on.
    pub output_delay: Duration,
}

impl RunContext {
    pub fn new(
        run_name: impl Into<String>,
        run_id: impl Into<String>,
        timeout: RunTimeout,
        buffer_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            run_name: run_name.into(),
            run_id: run_id.into(),
            timeout,
            buffer_dir: buffer_dir.into(),
            item_output_file: None,
            output_delay: Duration::ZERO,
        }
    }

    pub fn with_item_output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.item_output_file = Some(path.into());
        self
    }

    pub fn with_output_delay(mut self, delay: Duration) -> Self {
        self.output_delay = delay;
        self
    }

    pub fn mediator_id(&self, size: SizeInBytes, threads: u16) -> MediatorId {
        MediatorId::new(&self.run_name, &self.run_id, size, threads)
    }
}
