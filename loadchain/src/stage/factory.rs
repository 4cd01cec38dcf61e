//! Stage construction.

use super::{Stage, StageSettings, StageType, Workload};
use crate::chain::SharedElement;
use loadchain_shared::errors::{LoadchainError, LoadchainResult};
use std::path::PathBuf;
use std::sync::Arc;

/// Builder-style factory turning a stage type plus overrides into a stage.
///
/// The factory is stateful: overrides persist across `build` calls, so the
/// chain builder only touches what changes between entries.
pub trait StageFactory: Send {
    fn set_type(&mut self, kind: StageType);

    fn set_min_size(&mut self, bytes: u64);

    fn set_max_size(&mut self, bytes: u64);

    fn set_threads_per_node(&mut self, threads: u16);

    /// `None` disables file-seeded initial items.
    fn set_input_file(&mut self, path: Option<PathBuf>);

    /// Build a stage from the current settings.
    ///
    /// `Ok(None)` means the stage could not be constructed from these
    /// settings; `Err` is an unexpected fault.
    fn build(&mut self) -> LoadchainResult<Option<SharedElement>>;
}

/// Factory producing [`Stage`]s that share one [`Workload`].
pub struct BasicStageFactory {
    kind: Option<StageType>,
    settings: StageSettings,
    workload: Arc<dyn Workload>,
    built: usize,
}

impl BasicStageFactory {
    pub fn new(defaults: StageSettings, workload: Arc<dyn Workload>) -> Self {
        Self {
            kind: None,
            settings: defaults,
            workload,
            built: 0,
        }
    }

    /// Settings the next `build` would use.
    pub fn settings(&self) -> &StageSettings {
        &self.settings
    }
}

impl StageFactory for BasicStageFactory {
    fn set_type(&mut self, kind: StageType) {
        self.kind = Some(kind);
    }

    fn set_min_size(&mut self, bytes: u64) {
        self.settings.min_size = bytes;
    }

    fn set_max_size(&mut self, bytes: u64) {
        self.settings.max_size = bytes;
    }

    fn set_threads_per_node(&mut self, threads: u16) {
        self.settings.threads = threads;
    }

    fn set_input_file(&mut self, path: Option<PathBuf>) {
        self.settings.input_file = path;
    }

    fn build(&mut self) -> LoadchainResult<Option<SharedElement>> {
        let kind = self
            .kind
            .ok_or_else(|| LoadchainError::StageConstruction("stage type was not set".into()))?;

        if self.settings.min_size > self.settings.max_size {
            tracing::warn!(
                kind = %kind,
                min_size = self.settings.min_size,
                max_size = self.settings.max_size,
                "Min item size exceeds max item size, no stage built"
            );
            return Ok(None);
        }
        if self.settings.threads == 0 {
            tracing::warn!(kind = %kind, "Zero threads per node, no stage built");
            return Ok(None);
        }

        let name = format!("{}-{}", kind, self.built);
        self.built += 1;

        tracing::debug!(
            stage = %name,
            min_size = self.settings.min_size,
            max_size = self.settings.max_size,
            threads = self.settings.threads,
            input_file = ?self.settings.input_file,
            "Building stage"
        );

        Ok(Some(Arc::new(Stage::new(
            name,
            kind,
            self.settings.clone(),
            Arc::clone(&self.workload),
        ))))
    }
}
