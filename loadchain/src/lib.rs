//! Scenario chain orchestration for load-testing stages.
//!
//! A scenario is an ordered list of stage types (`create`, `read`, ...).
//! [`ChainBuilder`] turns it into a wired [`Chain`], inserting file-backed
//! [`MediatorBuffer`]s between stages in sequential mode, and
//! [`ChainExecutor`] drives the chain to completion under the run timeout.

pub mod chain;
pub mod config;
pub mod context;
pub mod logging;
pub mod mediator;
pub mod stage;
pub mod worker;

pub use chain::{BuildReport, Chain, ChainBuilder, ChainElement, ChainExecutor, ChainMode};
pub use config::{RunTimeout, ScenarioConfig, TimeUnit};
pub use context::RunContext;
pub use loadchain_shared::errors::{LoadchainError, LoadchainResult};
pub use loadchain_shared::{DataItem, SizeInBytes};
pub use mediator::{MediatorBuffer, MediatorId};
pub use stage::{BasicStageFactory, Stage, StageFactory, StageSettings, StageType, SyntheticWorkload};
