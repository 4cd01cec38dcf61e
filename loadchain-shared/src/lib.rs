//! Types shared between the loadchain library and its tooling.

pub mod errors;
pub mod item;
pub mod size;

pub use errors::{LoadchainError, LoadchainResult};
pub use item::DataItem;
pub use size::SizeInBytes;
