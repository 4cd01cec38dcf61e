//! Global run timeout.

use loadchain_shared::errors::LoadchainError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Seconds => "s",
            TimeUnit::Minutes => "m",
            TimeUnit::Hours => "h",
            TimeUnit::Days => "d",
        }
    }

    fn to_duration(self, value: u64) -> Duration {
        match self {
            TimeUnit::Milliseconds => Duration::from_millis(value),
            TimeUnit::Seconds => Duration::from_secs(value),
            TimeUnit::Minutes => Duration::from_secs(value.saturating_mul(60)),
            TimeUnit::Hours => Duration::from_secs(value.saturating_mul(3_600)),
            TimeUnit::Days => Duration::from_secs(value.saturating_mul(86_400)),
        }
    }
}

/// Duration plus unit bounding every driving wait of a run.
///
/// A zero value means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTimeout {
    pub value: u64,
    pub unit: TimeUnit,
}

impl RunTimeout {
    pub const UNBOUNDED: RunTimeout = RunTimeout {
        value: 0,
        unit: TimeUnit::Seconds,
    };

    pub fn new(value: u64, unit: TimeUnit) -> Self {
        Self { value, unit }
    }

    pub fn is_unbounded(&self) -> bool {
        self.value == 0
    }

    /// Wait bound for joins; `Duration::MAX` when unbounded.
    pub fn as_duration(&self) -> Duration {
        if self.is_unbounded() {
            Duration::MAX
        } else {
            self.unit.to_duration(self.value)
        }
    }
}

impl Default for RunTimeout {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

impl fmt::Display for RunTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unbounded() {
            write!(f, "unbounded")
        } else {
            write!(f, "{}{}", self.value, self.unit.suffix())
        }
    }
}

impl FromStr for RunTimeout {
    type Err = LoadchainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(s.len());
        let (number, unit) = s.split_at(split);

        let value = number
            .parse::<u64>()
            .map_err(|e| LoadchainError::Config(format!("invalid run time {:?}: {}", s, e)))?;
        let unit = match unit.trim().to_ascii_lowercase().as_str() {
            "ms" => TimeUnit::Milliseconds,
            "" | "s" => TimeUnit::Seconds,
            "m" => TimeUnit::Minutes,
            "h" => TimeUnit::Hours,
            "d" => TimeUnit::Days,
            other => {
                return Err(LoadchainError::Config(format!(
                    "unknown time unit {:?} in run time {:?}",
                    other, s
                )));
            }
        };

        Ok(Self::new(value, unit))
    }
}

impl Serialize for RunTimeout {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}{}", self.value, self.unit.suffix()))
    }
}

impl<'de> Deserialize<'de> for RunTimeout {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Seconds(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Seconds(value) => Ok(Self::new(value, TimeUnit::Seconds)),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}
