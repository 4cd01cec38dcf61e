//! Chain construction from an ordered list of stage type names.

use super::{BuildReport, Chain, ChainElement, ChainMode, EntryOutcome, SharedElement};
use crate::context::RunContext;
use crate::logging::marker;
use crate::mediator::MediatorBuffer;
use crate::stage::{ItemFileOutput, StageFactory, StageType};
use loadchain_shared::errors::{LoadchainError, LoadchainResult};
use loadchain_shared::SizeInBytes;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Result of building one configured entry.
enum EntryStep {
    Built(SharedElement),
    Skipped(EntryOutcome),
    /// No mediator could be created; nothing after this entry is built.
    Truncated(String),
}

/// Turns stage type names into a wired [`Chain`].
///
/// Entries that fail to resolve or build are skipped and logged; the chain
/// is built from whatever remains.
pub struct ChainBuilder {
    ctx: Arc<RunContext>,
    load_types: Vec<String>,
    factory: Box<dyn StageFactory>,
}

impl ChainBuilder {
    pub fn new(ctx: Arc<RunContext>, load_types: Vec<String>, factory: Box<dyn StageFactory>) -> Self {
        Self {
            ctx,
            load_types,
            factory,
        }
    }

    /// Build the chain. Zero sizes or threads keep the factory defaults.
    pub fn build(
        &mut self,
        simultaneous: bool,
        min_size: SizeInBytes,
        max_size: SizeInBytes,
        threads: u16,
    ) -> Chain {
        self.build_with_report(simultaneous, min_size, max_size, threads)
            .0
    }

    /// Same as [`build`](Self::build), also returning what happened to each entry.
    pub fn build_with_report(
        &mut self,
        simultaneous: bool,
        min_size: SizeInBytes,
        max_size: SizeInBytes,
        threads: u16,
    ) -> (Chain, BuildReport) {
        let mode = ChainMode::from_simultaneous(simultaneous);
        let mut chain = Chain::new();
        let mut report = BuildReport::default();
        let mut prev: Option<SharedElement> = None;

        tracing::debug!(
            mode = %mode,
            entries = self.load_types.len(),
            min_size = %min_size,
            max_size = %max_size,
            threads,
            "Building chain"
        );

        let load_types = self.load_types.clone();
        let mut entries = load_types.into_iter();
        while let Some(name) = entries.next() {
            let step = self.build_entry(mode, &name, min_size, max_size, threads, prev.as_ref(), &mut chain);
            match step {
                EntryStep::Built(stage) => {
                    if prev.is_none() {
                        // Only the head of the chain reads the input file
                        self.factory.set_input_file(None);
                    }
                    tracing::info!(marker = marker::MSG, stage = %stage.name(), "Stage added to chain");
                    report.push(EntryOutcome::Built { name });
                    prev = Some(stage);
                }
                EntryStep::Skipped(outcome) => report.push(outcome),
                EntryStep::Truncated(error) => {
                    report.push(EntryOutcome::Truncated {
                        name,
                        error: Some(error),
                    });
                    for rest in entries.by_ref() {
                        report.push(EntryOutcome::Truncated {
                            name: rest,
                            error: None,
                        });
                    }
                    break;
                }
            }
        }

        if let Some(last) = &prev {
            self.attach_item_output(last);
        }

        report.log();
        (chain, report)
    }

    /// Route the last stage's output into the configured items file.
    fn attach_item_output(&self, last: &SharedElement) {
        let Some(path) = &self.ctx.item_output_file else {
            return;
        };
        let attached = ItemFileOutput::create(path)
            .and_then(|output| last.set_consumer(Arc::new(output)));
        match attached {
            Ok(()) => tracing::info!(
                marker = marker::MSG,
                stage = %last.name(),
                path = %path.display(),
                "Last stage writes items output file"
            ),
            Err(e) => tracing::warn!(
                marker = marker::ERR,
                stage = %last.name(),
                error = %e,
                "Failed to attach items output file"
            ),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_entry(
        &mut self,
        mode: ChainMode,
        name: &str,
        min_size: SizeInBytes,
        max_size: SizeInBytes,
        threads: u16,
        prev: Option<&SharedElement>,
        chain: &mut Chain,
    ) -> EntryStep {
        let Ok(kind) = name.parse::<StageType>() else {
            return EntryStep::Skipped(EntryOutcome::SkippedInvalid { name: name.into() });
        };

        let stage = match self.construct(kind, min_size, max_size, threads) {
            Ok(Some(stage)) => stage,
            Ok(None) => {
                return EntryStep::Skipped(EntryOutcome::SkippedFailed { name: name.into() });
            }
            Err(e) => {
                return EntryStep::Skipped(EntryOutcome::SkippedFatal {
                    name: name.into(),
                    error: e.to_string(),
                });
            }
        };

        let Some(prev) = prev else {
            chain.push(ChainElement::Stage(stage.clone()));
            return EntryStep::Built(stage);
        };

        match mode {
            ChainMode::Simultaneous => {
                if let Err(e) = prev.set_consumer(Arc::clone(&stage).as_consumer()) {
                    return EntryStep::Skipped(EntryOutcome::SkippedFatal {
                        name: name.into(),
                        error: e.to_string(),
                    });
                }
                chain.push(ChainElement::Stage(stage.clone()));
            }
            ChainMode::Sequential => {
                let id = self.ctx.mediator_id(min_size, threads);
                let created = MediatorBuffer::create_with_delay(&self.ctx.buffer_dir, &id, self.ctx.output_delay);
                let mediator: SharedElement = match created {
                    Ok(mediator) => Arc::new(mediator),
                    Err(e) => return EntryStep::Truncated(e.to_string()),
                };

                // Downstream link first: a failure leaves `prev` unwired
                let wired = mediator
                    .set_consumer(Arc::clone(&stage).as_consumer())
                    .and_then(|()| prev.set_consumer(Arc::clone(&mediator).as_consumer()));
                if let Err(e) = wired {
                    return EntryStep::Skipped(EntryOutcome::SkippedFatal {
                        name: name.into(),
                        error: e.to_string(),
                    });
                }

                tracing::debug!(
                    mediator = %mediator.name(),
                    from = %prev.name(),
                    to = %stage.name(),
                    "Mediator inserted"
                );
                chain.push(ChainElement::Mediator(mediator));
                chain.push(ChainElement::Stage(stage.clone()));
            }
        }

        EntryStep::Built(stage)
    }

    /// Configure the factory for `kind` and build, turning a panic into an error.
    fn construct(
        &mut self,
        kind: StageType,
        min_size: SizeInBytes,
        max_size: SizeInBytes,
        threads: u16,
    ) -> LoadchainResult<Option<SharedElement>> {
        self.factory.set_type(kind);
        if !min_size.is_zero() {
            self.factory.set_min_size(min_size.0);
        }
        if !max_size.is_zero() {
            self.factory.set_max_size(max_size.0);
        }
        if threads > 0 {
            self.factory.set_threads_per_node(threads);
        }

        let factory = &mut self.factory;
        catch_unwind(AssertUnwindSafe(|| factory.build())).unwrap_or_else(|panic| {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(LoadchainError::StageConstruction(format!(
                "{} stage factory panicked: {}",
                kind, reason
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::testing::{EventLog, FactoryScript, ScriptedFactory};
    use crate::config::RunTimeout;
    use crate::logging::capture::{CapturedLogs, has_err_marker};
    use crate::stage::StageSettings;
    use std::path::{Path, PathBuf};

    fn ctx(dir: &Path) -> Arc<RunContext> {
        Arc::new(RunContext::new("test", "1", RunTimeout::UNBOUNDED, dir))
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn builder(dir: &Path, list: &[&str], factory: &ScriptedFactory) -> ChainBuilder {
        ChainBuilder::new(ctx(dir), names(list), Box::new(factory.clone()))
    }

    fn consumer_name(element: &ChainElement) -> Option<String> {
        element.element().consumer().map(|c| c.name().to_string())
    }

    const ZERO: SizeInBytes = SizeInBytes(0);

    #[test]
    fn test_simultaneous_links_each_stage_to_the_next() {
        let dir = tempfile::tempdir().unwrap();
        let factory = ScriptedFactory::new(&EventLog::default(), StageSettings::default());
        let chain = builder(dir.path(), &["create", "read", "update"], &factory).build(true, ZERO, ZERO, 0);

        assert_eq!(chain.len(), 3);
        assert!(chain.iter().all(ChainElement::is_stage));
        assert_eq!(chain.names(), vec!["create-0", "read-1", "update-2"]);
        assert_eq!(consumer_name(chain.get(0).unwrap()).as_deref(), Some("read-1"));
        assert_eq!(consumer_name(chain.get(1).unwrap()).as_deref(), Some("update-2"));
        assert_eq!(consumer_name(chain.get(2).unwrap()), None);
    }

    #[test]
    fn test_sequential_alternates_stages_and_mediators() {
        let dir = tempfile::tempdir().unwrap();
        let factory = ScriptedFactory::new(&EventLog::default(), StageSettings::default());
        let (chain, report) = builder(dir.path(), &["create", "read", "delete"], &factory)
            .build_with_report(false, SizeInBytes(1 << 20), ZERO, 4);

        assert_eq!(report.built(), 3);
        assert_eq!(chain.len(), 5);
        assert_eq!(chain.stage_count(), 3);
        for (i, element) in chain.iter().enumerate() {
            assert_eq!(element.is_stage(), i % 2 == 0, "element {}", i);
        }

        for i in 0..chain.len() - 1 {
            let next = chain.get(i + 1).unwrap().name().to_string();
            assert_eq!(consumer_name(chain.get(i).unwrap()), Some(next));
        }
        assert_eq!(consumer_name(chain.get(chain.len() - 1).unwrap()), None);

        let mediator = chain.get(1).unwrap().name();
        assert!(mediator.starts_with("test-1-"), "{}", mediator);
        assert!(mediator.ends_with("-1MBx4"), "{}", mediator);
        // One buffer file per mediator
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_unknown_types_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let factory = ScriptedFactory::new(&EventLog::default(), StageSettings::default());
        let logs = CapturedLogs::default();
        let (chain, report) = tracing::subscriber::with_default(logs.subscriber(), || {
            builder(dir.path(), &["create", "bogus", " READ "], &factory).build_with_report(true, ZERO, ZERO, 0)
        });

        let line = logs.line_containing("bogus").unwrap();
        assert!(line.contains("ERROR"), "{}", line);
        assert!(has_err_marker(&line), "{}", line);

        assert_eq!(chain.names(), vec!["create-0", "read-1"]);
        assert_eq!(report.invalid_names(), vec!["bogus"]);
        assert_eq!(consumer_name(chain.get(0).unwrap()).as_deref(), Some("read-1"));
    }

    #[test]
    fn test_empty_list_builds_empty_chain() {
        let dir = tempfile::tempdir().unwrap();
        let factory = ScriptedFactory::new(&EventLog::default(), StageSettings::default());

        assert!(builder(dir.path(), &[], &factory).build(true, ZERO, ZERO, 0).is_empty());
        assert!(builder(dir.path(), &[], &factory).build(false, ZERO, ZERO, 0).is_empty());
        assert!(
            builder(dir.path(), &["nope", "never"], &factory)
                .build(false, ZERO, ZERO, 0)
                .is_empty()
        );
    }

    #[test]
    fn test_only_first_built_stage_keeps_input_file() {
        let dir = tempfile::tempdir().unwrap();
        let defaults = StageSettings {
            input_file: Some(PathBuf::from("items.csv")),
            ..StageSettings::default()
        };
        let factory = ScriptedFactory::new(&EventLog::default(), defaults)
            .script(StageType::Create, FactoryScript::NoStage);

        builder(dir.path(), &["create", "read", "update", "delete"], &factory).build(false, ZERO, ZERO, 0);

        let built = factory.built();
        assert_eq!(built.len(), 3);
        assert_eq!(built[0].kind, StageType::Read);
        assert_eq!(built[0].settings.input_file, Some(PathBuf::from("items.csv")));
        assert!(built[1..].iter().all(|b| b.settings.input_file.is_none()));
    }

    #[test]
    fn test_zero_overrides_keep_factory_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let factory = ScriptedFactory::new(&EventLog::default(), StageSettings::default());
        builder(dir.path(), &["create"], &factory).build(true, ZERO, ZERO, 0);
        assert!(factory.calls().iter().all(|c| c.starts_with("input:")));
        assert_eq!(factory.built()[0].settings, StageSettings::default());

        let factory = ScriptedFactory::new(&EventLog::default(), StageSettings::default());
        builder(dir.path(), &["create"], &factory).build(true, SizeInBytes(1024), SizeInBytes(2048), 8);
        assert_eq!(&factory.calls()[..3], &["min:1024", "max:2048", "threads:8"]);
        let settings = &factory.built()[0].settings;
        assert_eq!((settings.min_size, settings.max_size, settings.threads), (1024, 2048, 8));
    }

    #[test]
    fn test_factory_failures_skip_entry() {
        let dir = tempfile::tempdir().unwrap();
        let factory = ScriptedFactory::new(&EventLog::default(), StageSettings::default())
            .script(StageType::Read, FactoryScript::NoStage)
            .script(StageType::Update, FactoryScript::Fault)
            .script(StageType::Delete, FactoryScript::Panic);

        let (chain, report) = builder(dir.path(), &["create", "read", "update", "delete", "create"], &factory)
            .build_with_report(true, ZERO, ZERO, 0);

        assert_eq!(chain.names(), vec!["create-0", "create-1"]);
        assert_eq!(consumer_name(chain.get(0).unwrap()).as_deref(), Some("create-1"));
        assert!(matches!(report.entries[1], EntryOutcome::SkippedFailed { .. }));
        assert!(matches!(report.entries[2], EntryOutcome::SkippedFatal { .. }));
        match &report.entries[3] {
            EntryOutcome::SkippedFatal { error, .. } => assert!(error.contains("panicked"), "{}", error),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_missing_buffer_dir_truncates_sequential_chain() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");
        let factory = ScriptedFactory::new(&EventLog::default(), StageSettings::default());

        let (chain, report) = builder(&missing, &["create", "read", "delete"], &factory)
            .build_with_report(false, ZERO, ZERO, 0);

        assert_eq!(chain.names(), vec!["create-0"]);
        assert_eq!(consumer_name(chain.get(0).unwrap()), None);
        assert!(matches!(
            &report.entries[1],
            EntryOutcome::Truncated { name, error: Some(_) } if name == "read"
        ));
        assert!(matches!(
            &report.entries[2],
            EntryOutcome::Truncated { name, error: None } if name == "delete"
        ));
        // Entries after the failed mediator are never built
        assert_eq!(factory.built().len(), 2);
    }

    #[test]
    fn test_missing_buffer_dir_does_not_affect_simultaneous_chain() {
        let dir = tempfile::tempdir().unwrap();
        let factory = ScriptedFactory::new(&EventLog::default(), StageSettings::default());
        let chain = builder(&dir.path().join("absent"), &["create", "read"], &factory).build(true, ZERO, ZERO, 0);
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_last_stage_writes_items_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.csv");
        let ctx = Arc::new(RunContext::new("test", "1", RunTimeout::UNBOUNDED, dir.path()).with_item_output_file(&path));
        let factory = ScriptedFactory::new(&EventLog::default(), StageSettings::default());

        let chain = ChainBuilder::new(ctx, names(&["create", "read"]), Box::new(factory.clone()))
            .build(false, ZERO, ZERO, 0);

        assert_eq!(chain.len(), 3);
        let last = chain.get(2).unwrap();
        assert!(consumer_name(last).unwrap().starts_with("items-output:"));
        assert!(path.exists());
    }

    #[test]
    fn test_unusable_items_output_file_leaves_last_stage_unwired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent").join("items.csv");
        let ctx = Arc::new(RunContext::new("test", "1", RunTimeout::UNBOUNDED, dir.path()).with_item_output_file(&path));
        let factory = ScriptedFactory::new(&EventLog::default(), StageSettings::default());

        let chain = ChainBuilder::new(ctx, names(&["create"]), Box::new(factory.clone())).build(true, ZERO, ZERO, 0);

        assert_eq!(chain.len(), 1);
        assert_eq!(consumer_name(chain.get(0).unwrap()), None);
    }

    #[test]
    fn test_sequential_mediators_carry_output_delay() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(
            RunContext::new("test", "1", RunTimeout::UNBOUNDED, dir.path())
                .with_output_delay(std::time::Duration::from_secs(2)),
        );
        let factory = ScriptedFactory::new(&EventLog::default(), StageSettings::default());

        let chain = ChainBuilder::new(ctx, names(&["create", "read"]), Box::new(factory.clone()))
            .build(false, ZERO, ZERO, 0);

        assert_eq!(chain.len(), 3);
        assert!(chain.get(1).unwrap().is_mediator());
    }

    #[test]
    fn test_failed_mediator_wiring_leaves_chain_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let factory = ScriptedFactory::new(&EventLog::default(), StageSettings::default())
            .script(StageType::Create, FactoryScript::PreWired);

        let (chain, report) = builder(dir.path(), &["create", "read"], &factory)
            .build_with_report(false, ZERO, ZERO, 0);

        assert_eq!(chain.names(), vec!["create-0"]);
        assert_eq!(consumer_name(chain.get(0).unwrap()).as_deref(), Some("elsewhere"));
        assert!(matches!(report.entries[1], EntryOutcome::SkippedFatal { .. }));
    }
}
