//! Scenario configuration.
//!
//! The configuration is a flat JSON object keyed by dotted names:
//!
//! ```json
//! {
//!   "run.name": "nightly",
//!   "run.time": "5m",
//!   "scenario.chain.load": ["create", "read", "delete"],
//!   "scenario.chain.simultaneous": false,
//!   "data.size": "1MB",
//!   "load.threads": 8
//! }
//! ```
//!
//! Command-line `key=value` overrides are merged into the object before it
//! is deserialized, so they go through the same validation.

mod timeout;

pub use timeout::{RunTimeout, TimeUnit};

use crate::context::RunContext;
use crate::logging::marker;
use crate::stage::StageSettings;
use chrono::Utc;
use loadchain_shared::errors::{LoadchainError, LoadchainResult};
use loadchain_shared::SizeInBytes;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_RUN_NAME: &str = "loadchain";
const DEFAULT_ITEM_COUNT: u64 = 1_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(rename = "run.name", default, deserialize_with = "lenient_string")]
    pub run_name: Option<String>,

    #[serde(rename = "run.id", default, deserialize_with = "lenient_string")]
    pub run_id: Option<String>,

    #[serde(rename = "run.time", default)]
    pub run_time: RunTimeout,

    #[serde(
        rename = "scenario.chain.load",
        default,
        deserialize_with = "string_list"
    )]
    pub chain_load: Option<Vec<String>>,

    #[serde(rename = "scenario.chain.simultaneous", default)]
    pub chain_simultaneous: Option<bool>,

    #[serde(rename = "data.size", default)]
    pub data_size: Option<SizeInBytes>,

    #[serde(rename = "data.size.min", default)]
    pub data_size_min: Option<SizeInBytes>,

    #[serde(rename = "data.size.max", default)]
    pub data_size_max: Option<SizeInBytes>,

    #[serde(rename = "load.threads", default)]
    pub load_threads: Option<u16>,

    #[serde(rename = "load.limit.count", default)]
    pub load_limit_count: Option<u64>,

    #[serde(rename = "item.input.file", default)]
    pub item_input_file: Option<PathBuf>,

    #[serde(rename = "item.buffer.dir", default)]
    pub item_buffer_dir: Option<PathBuf>,

    #[serde(rename = "item.output.file", default)]
    pub item_output_file: Option<PathBuf>,

    /// Bare numbers are seconds.
    #[serde(rename = "item.output.delay", default)]
    pub item_output_delay: Option<RunTimeout>,
}

/// Accept a string or a bare number (`-Drun.id=42` arrives as a number).
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    }))
}

/// Accept either a JSON list or a comma-separated string.
fn string_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<String>>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Text(String),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::List(list) => list,
        Raw::Text(text) => text
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
    }))
}

impl ScenarioConfig {
    /// Load from a JSON file, applying `key=value` overrides on top.
    pub fn from_file(path: &Path, overrides: &[(String, String)]) -> LoadchainResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LoadchainError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let value: Value = serde_json::from_str(&text)?;
        Self::from_value(value, overrides)
    }

    /// Build from overrides alone.
    pub fn from_overrides(overrides: &[(String, String)]) -> LoadchainResult<Self> {
        Self::from_value(Value::Object(Map::new()), overrides)
    }

    pub fn from_value(value: Value, overrides: &[(String, String)]) -> LoadchainResult<Self> {
        let Value::Object(mut map) = value else {
            return Err(LoadchainError::Config(
                "configuration must be a JSON object".into(),
            ));
        };

        for (key, raw) in overrides {
            // Values that are valid JSON keep their type, anything else is a string
            let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.clone()));
            tracing::debug!(key = %key, value = %value, "Applying configuration override");
            map.insert(key.clone(), value);
        }

        Ok(serde_json::from_value(Value::Object(map))?)
    }

    /// Ordered stage type names; empty if the key is absent.
    pub fn load_chain(&self) -> Vec<String> {
        match &self.chain_load {
            Some(list) => {
                tracing::info!(marker = marker::MSG, chain = ?list, "Load chain");
                list.clone()
            }
            None => {
                tracing::error!(
                    marker = marker::ERR,
                    "No load type specified, try arg -Dscenario.chain.load=<VALUE> to override"
                );
                Vec::new()
            }
        }
    }

    /// Whether stages run concurrently; `false` if the key is absent.
    pub fn simultaneous(&self) -> bool {
        match self.chain_simultaneous {
            Some(flag) => {
                tracing::info!(marker = marker::MSG, simultaneous = flag, "Simultaneous chain load");
                flag
            }
            None => {
                tracing::error!(
                    marker = marker::ERR,
                    "No chain simultaneous flag specified, try arg -Dscenario.chain.simultaneous=<VALUE> to override"
                );
                false
            }
        }
    }

    /// Min and max item size; `data.size` wins over both when non-zero.
    ///
    /// Zero means "use the stage factory default".
    pub fn size_bounds(&self) -> (SizeInBytes, SizeInBytes) {
        match self.data_size {
            Some(size) if !size.is_zero() => (size, size),
            _ => (
                self.data_size_min.unwrap_or_default(),
                self.data_size_max.unwrap_or_default(),
            ),
        }
    }

    /// Threads per node; zero means "use the stage factory default".
    pub fn threads(&self) -> u16 {
        self.load_threads.unwrap_or(0)
    }

    /// Settings the stage factory starts from.
    pub fn stage_defaults(&self) -> StageSettings {
        StageSettings {
            input_file: self.item_input_file.clone(),
            ..StageSettings::default()
        }
    }

    /// Items generated by a create stage without an item source.
    pub fn item_count(&self) -> u64 {
        self.load_limit_count.unwrap_or(DEFAULT_ITEM_COUNT)
    }

    /// Hand-off delay between stages; zero when absent.
    pub fn output_delay(&self) -> Duration {
        match self.item_output_delay {
            Some(delay) if !delay.is_unbounded() => delay.as_duration(),
            _ => Duration::ZERO,
        }
    }

    pub fn run_context(&self) -> RunContext {
        let run_name = self
            .run_name
            .clone()
            .unwrap_or_else(|| DEFAULT_RUN_NAME.to_string());
        let run_id = self
            .run_id
            .clone()
            .unwrap_or_else(|| Utc::now().format("%Y.%m.%d.%H.%M.%S.%3f").to_string());
        let buffer_dir = self
            .item_buffer_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);

        let mut ctx = RunContext::new(run_name, run_id, self.run_time, buffer_dir)
            .with_output_delay(self.output_delay());
        if let Some(path) = self.item_output_file.as_ref().filter(|p| !p.as_os_str().is_empty()) {
            ctx = ctx.with_item_output_file(path);
        }
        ctx
    }
}

/// Parse a `key=value` override.
pub fn parse_override(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {:?}", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in {:?}", raw));
    }
    Ok((key.to_string(), value.to_string()))
}
