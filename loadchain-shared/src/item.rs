//! Work item passed between chain elements.
//!
//! Items are serialized one per line as `name,size`, the same format used
//! for file-seeded inputs and for mediator buffer files.

use crate::errors::LoadchainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single data item produced or consumed by a stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataItem {
    pub name: String,
    pub size: u64,
}

impl DataItem {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

impl fmt::Display for DataItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.name, self.size)
    }
}

impl FromStr for DataItem {
    type Err = LoadchainError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        // Names may contain commas, the size is always the last field
        let (name, size) = line
            .rsplit_once(',')
            .ok_or_else(|| LoadchainError::Config(format!("malformed item line: {:?}", line)))?;

        if name.is_empty() {
            return Err(LoadchainError::Config(format!(
                "item line has an empty name: {:?}",
                line
            )));
        }

        let size = size.trim().parse::<u64>().map_err(|e| {
            LoadchainError::Config(format!("invalid item size in {:?}: {}", line, e))
        })?;

        Ok(Self::new(name, size))
    }
}
