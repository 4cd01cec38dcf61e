//! Byte size values with binary unit suffixes.

use crate::errors::LoadchainError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const UNITS: [(&str, u64); 5] = [
    ("TB", 1 << 40),
    ("GB", 1 << 30),
    ("MB", 1 << 20),
    ("KB", 1 << 10),
    ("B", 1),
];

/// Size in bytes, parsed from `"4096"`, `"4KB"`, `"1MB"`, ... (binary units).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SizeInBytes(pub u64);

impl SizeInBytes {
    pub fn bytes(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for SizeInBytes {
    fn from(bytes: u64) -> Self {
        Self(bytes)
    }
}

impl FromStr for SizeInBytes {
    type Err = LoadchainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let upper = s.to_ascii_uppercase();
        // "k"/"m"/"g" are accepted as shorthands for "KB"/"MB"/"GB"
        let normalized = match upper.chars().last() {
            Some('K' | 'M' | 'G' | 'T') => format!("{}B", upper),
            _ => upper,
        };

        for (suffix, factor) in UNITS {
            if let Some(number) = normalized.strip_suffix(suffix) {
                let value = number
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| LoadchainError::Config(format!("invalid size {:?}: {}", s, e)))?;
                return value
                    .checked_mul(factor)
                    .map(Self)
                    .ok_or_else(|| LoadchainError::Config(format!("size {:?} overflows", s)));
            }
        }

        normalized
            .parse::<u64>()
            .map(Self)
            .map_err(|e| LoadchainError::Config(format!("invalid size {:?}: {}", s, e)))
    }
}

impl fmt::Display for SizeInBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "0");
        }
        for (suffix, factor) in UNITS {
            if self.0 % factor == 0 {
                return write!(f, "{}{}", self.0 / factor, suffix);
            }
        }
        unreachable!("every size is a multiple of one byte")
    }
}

impl Serialize for SizeInBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SizeInBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bytes(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bytes(bytes) => Ok(Self(bytes)),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!("4096".parse::<SizeInBytes>().unwrap().bytes(), 4096);
        assert_eq!("4KB".parse::<SizeInBytes>().unwrap().bytes(), 4096);
        assert_eq!("1mb".parse::<SizeInBytes>().unwrap().bytes(), 1 << 20);
        assert_eq!("2g".parse::<SizeInBytes>().unwrap().bytes(), 2 << 30);
        assert_eq!("10B".parse::<SizeInBytes>().unwrap().bytes(), 10);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<SizeInBytes>().is_err());
        assert!("1.5MB".parse::<SizeInBytes>().is_err());
        assert!("lots".parse::<SizeInBytes>().is_err());
    }

    #[test]
    fn test_display_uses_largest_exact_unit() {
        assert_eq!(SizeInBytes(0).to_string(), "0");
        assert_eq!(SizeInBytes(1 << 20).to_string(), "1MB");
        assert_eq!(SizeInBytes(1536).to_string(), "1536B");
        assert_eq!(SizeInBytes(3 << 10).to_string(), "3KB");
    }

    #[test]
    fn test_deserialize_number_or_string() {
        let from_num: SizeInBytes = serde_json::from_str("1024").unwrap();
        let from_str: SizeInBytes = serde_json::from_str("\"1KB\"").unwrap();
        assert_eq!(from_num, from_str);
    }
}
