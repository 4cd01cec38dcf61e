//! Scenario chains: building and running ordered sequences of stages.
//!
//! ## Architecture
//!
//! ```text
//! ChainBuilder → Chain → ChainExecutor
//!
//! - ChainBuilder: resolves stage types, builds stages, wires links,
//!   inserts mediator buffers in sequential mode
//! - Chain: ordered elements, each tagged Stage or Mediator
//! - ChainExecutor: start / bounded join / interrupt / close state machine
//! ```
//!
//! Chain shapes:
//!
//! ```text
//! simultaneous:  S0 → S1 → S2
//! sequential:    S0 → M1 → S1 → M2 → S2
//! ```
//!
//! ## Example
//!
//! ```ignore
//! let ctx = Arc::new(config.run_context());
//! let factory = BasicStageFactory::new(config.stage_defaults(), workload);
//! let mut builder = ChainBuilder::new(Arc::clone(&ctx), config.load_chain(), Box::new(factory));
//! let (min, max) = config.size_bounds();
//! let chain = builder.build(simultaneous, min, max, config.threads());
//! ChainExecutor::new(ctx).execute(&chain, simultaneous).await;
//! ```

mod builder;
mod element;
mod executor;
mod mode;
mod report;
#[cfg(test)]
pub(crate) mod testing;

pub use builder::ChainBuilder;
pub use element::{Element, ItemConsumer, SharedElement};
pub use executor::ChainExecutor;
pub use mode::ChainMode;
pub use report::{BuildReport, EntryOutcome};

use std::sync::Arc;

/// One element of a chain, tagged with its role.
#[derive(Clone)]
pub enum ChainElement {
    Stage(SharedElement),
    Mediator(SharedElement),
}

impl ChainElement {
    pub fn element(&self) -> &SharedElement {
        match self {
            ChainElement::Stage(element) | ChainElement::Mediator(element) => element,
        }
    }

    pub fn name(&self) -> &str {
        self.element().name()
    }

    pub fn is_stage(&self) -> bool {
        matches!(self, ChainElement::Stage(_))
    }

    pub fn is_mediator(&self) -> bool {
        matches!(self, ChainElement::Mediator(_))
    }

    /// Consumer-side view of the element, for wiring.
    pub fn as_consumer(&self) -> Arc<dyn ItemConsumer> {
        Arc::clone(self.element()).as_consumer()
    }
}

impl std::fmt::Debug for ChainElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainElement::Stage(e) => write!(f, "Stage({})", e.name()),
            ChainElement::Mediator(e) => write!(f, "Mediator({})", e.name()),
        }
    }
}

/// Ordered chain of elements.
///
/// Simultaneous chains hold only stages; sequential chains alternate
/// stage, mediator, stage, ...
#[derive(Debug, Clone, Default)]
pub struct Chain {
    elements: Vec<ChainElement>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, element: ChainElement) {
        self.elements.push(element);
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn first(&self) -> Option<&ChainElement> {
        self.elements.first()
    }

    pub fn get(&self, index: usize) -> Option<&ChainElement> {
        self.elements.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChainElement> {
        self.elements.iter()
    }

    /// Number of stage elements.
    pub fn stage_count(&self) -> usize {
        self.elements.iter().filter(|e| e.is_stage()).count()
    }

    pub fn names(&self) -> Vec<String> {
        self.elements.iter().map(|e| e.name().to_string()).collect()
    }
}

impl<'a> IntoIterator for &'a Chain {
    type Item = &'a ChainElement;
    type IntoIter = std::slice::Iter<'a, ChainElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}
