//! Recording doubles for builder and executor tests.

use super::{Element, ItemConsumer, SharedElement};
use crate::stage::{StageFactory, StageSettings, StageType};
use async_trait::async_trait;
use loadchain_shared::errors::{LoadchainError, LoadchainResult};
use loadchain_shared::DataItem;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Ordered `op:name` events shared by all elements of a test.
#[derive(Clone, Default)]
pub(crate) struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn record(&self, op: &str, name: &str) {
        self.0.lock().push(format!("{}:{}", op, name));
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum JoinBehavior {
    #[default]
    Complete,
    Timeout,
    Fail,
}

pub(crate) struct RecordingElement {
    name: String,
    log: EventLog,
    join: JoinBehavior,
    fail_start: bool,
    fail_close: bool,
    consumer: OnceLock<Arc<dyn ItemConsumer>>,
    closes: AtomicUsize,
    last_timeout: Mutex<Option<Duration>>,
}

impl RecordingElement {
    pub fn new(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            join: JoinBehavior::Complete,
            fail_start: false,
            fail_close: false,
            consumer: OnceLock::new(),
            closes: AtomicUsize::new(0),
            last_timeout: Mutex::new(None),
        }
    }

    pub fn with_join(mut self, join: JoinBehavior) -> Self {
        self.join = join;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn last_timeout(&self) -> Option<Duration> {
        *self.last_timeout.lock()
    }
}

#[async_trait]
impl ItemConsumer for RecordingElement {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, _item: DataItem) -> LoadchainResult<()> {
        Ok(())
    }

    async fn complete(&self) {}
}

#[async_trait]
impl Element for RecordingElement {
    async fn start(&self) -> LoadchainResult<()> {
        self.log.record("start", &self.name);
        if self.fail_start {
            return Err(LoadchainError::Execution(format!("{} refused to start", self.name)));
        }
        Ok(())
    }

    async fn join(&self, timeout: Duration) -> LoadchainResult<bool> {
        self.log.record("join", &self.name);
        *self.last_timeout.lock() = Some(timeout);
        match self.join {
            JoinBehavior::Complete => Ok(true),
            JoinBehavior::Timeout => Ok(false),
            JoinBehavior::Fail => Err(LoadchainError::Execution(format!("{} join failed", self.name))),
        }
    }

    async fn interrupt(&self) -> LoadchainResult<()> {
        self.log.record("interrupt", &self.name);
        Ok(())
    }

    async fn close(&self) -> LoadchainResult<()> {
        self.log.record("close", &self.name);
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(LoadchainError::Close(format!("{} refused to close", self.name)));
        }
        Ok(())
    }

    fn set_consumer(&self, next: Arc<dyn ItemConsumer>) -> LoadchainResult<()> {
        self.consumer
            .set(next)
            .map_err(|_| LoadchainError::InvalidState(format!("{} consumer already set", self.name)))
    }

    fn consumer(&self) -> Option<Arc<dyn ItemConsumer>> {
        self.consumer.get().cloned()
    }

    fn as_consumer(self: Arc<Self>) -> Arc<dyn ItemConsumer> {
        self
    }
}

/// What the scripted factory did for one `build` call.
#[derive(Clone)]
pub(crate) struct BuiltRecord {
    pub kind: StageType,
    pub settings: StageSettings,
}

/// How the scripted factory reacts to a stage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FactoryScript {
    NoStage,
    Fault,
    Panic,
    /// Hand out a stage whose consumer link is already taken.
    PreWired,
}

/// Stateful factory handing out [`RecordingElement`]s.
///
/// Clones share state, so a test can keep one to inspect what the builder
/// asked for.
#[derive(Clone, Default)]
pub(crate) struct ScriptedFactory {
    log: EventLog,
    kind: Arc<Mutex<Option<StageType>>>,
    settings: Arc<Mutex<StageSettings>>,
    scripts: Arc<Mutex<Vec<(StageType, FactoryScript)>>>,
    calls: Arc<Mutex<Vec<String>>>,
    built: Arc<Mutex<Vec<BuiltRecord>>>,
}

impl ScriptedFactory {
    pub fn new(log: &EventLog, defaults: StageSettings) -> Self {
        Self {
            log: log.clone(),
            settings: Arc::new(Mutex::new(defaults)),
            ..Default::default()
        }
    }

    pub fn script(self, kind: StageType, script: FactoryScript) -> Self {
        self.scripts.lock().push((kind, script));
        self
    }

    /// Setter calls in order, e.g. `min:1024`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn built(&self) -> Vec<BuiltRecord> {
        self.built.lock().clone()
    }
}

impl StageFactory for ScriptedFactory {
    fn set_type(&mut self, kind: StageType) {
        *self.kind.lock() = Some(kind);
    }

    fn set_min_size(&mut self, bytes: u64) {
        self.calls.lock().push(format!("min:{}", bytes));
        self.settings.lock().min_size = bytes;
    }

    fn set_max_size(&mut self, bytes: u64) {
        self.calls.lock().push(format!("max:{}", bytes));
        self.settings.lock().max_size = bytes;
    }

    fn set_threads_per_node(&mut self, threads: u16) {
        self.calls.lock().push(format!("threads:{}", threads));
        self.settings.lock().threads = threads;
    }

    fn set_input_file(&mut self, path: Option<PathBuf>) {
        self.calls.lock().push(format!("input:{:?}", path));
        self.settings.lock().input_file = path;
    }

    fn build(&mut self) -> LoadchainResult<Option<SharedElement>> {
        let kind = (*self.kind.lock())
            .ok_or_else(|| LoadchainError::StageConstruction("type not set".into()))?;
        let script = self
            .scripts
            .lock()
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, s)| *s);

        match script {
            Some(FactoryScript::NoStage) => return Ok(None),
            Some(FactoryScript::Fault) => {
                return Err(LoadchainError::StageConstruction(format!("{} exploded", kind)));
            }
            Some(FactoryScript::Panic) => panic!("factory panicked on {}", kind),
            Some(FactoryScript::PreWired) | None => {}
        }

        let mut built = self.built.lock();
        let name = format!("{}-{}", kind, built.len());
        built.push(BuiltRecord {
            kind,
            settings: self.settings.lock().clone(),
        });
        let element = Arc::new(RecordingElement::new(&name, &self.log));
        if script == Some(FactoryScript::PreWired) {
            element.set_consumer(Arc::new(RecordingElement::new("elsewhere", &self.log)))?;
        }
        Ok(Some(element))
    }
}
