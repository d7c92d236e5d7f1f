//! Human-readable byte sizes for body limits.
//!
//! # Format
//! - Plain integers are a byte count (`102400`)
//! - Strings carry an optional unit: `b`, `kb`, `mb`, `gb`, `tb`
//! - Units are powers of 1024 and case-insensitive (`100kb`, `1.5MB`)

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A size in bytes that remembers how it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteSize {
    bytes: usize,
    raw: String,
}

/// Error returned when a size string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid byte size `{0}`")]
pub struct ParseByteSizeError(String);

impl ByteSize {
    pub fn from_bytes(bytes: usize) -> Self {
        Self {
            bytes,
            raw: bytes.to_string(),
        }
    }

    pub fn as_bytes(&self) -> usize {
        self.bytes
    }
}

impl Default for ByteSize {
    fn default() -> Self {
        Self {
            bytes: 100 * 1024,
            raw: "100kb".to_string(),
        }
    }
}

impl FromStr for ByteSize {
    type Err = ParseByteSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().to_ascii_lowercase();
        let split = trimmed
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(trimmed.len());
        let (number, unit) = trimmed.split_at(split);

        let multiplier: u64 = match unit.trim() {
            "" | "b" => 1,
            "kb" => 1 << 10,
            "mb" => 1 << 20,
            "gb" => 1 << 30,
            "tb" => 1 << 40,
            _ => return Err(ParseByteSizeError(s.to_string())),
        };

        let value: f64 = number
            .parse()
            .map_err(|_| ParseByteSizeError(s.to_string()))?;
        if !value.is_finite() || value < 0.0 {
            return Err(ParseByteSizeError(s.to_string()));
        }

        let bytes = (value * multiplier as f64).floor();
        if bytes > usize::MAX as f64 {
            return Err(ParseByteSizeError(s.to_string()));
        }

        Ok(Self {
            bytes: bytes as usize,
            raw: s.trim().to_string(),
        })
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for ByteSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ByteSizeVisitor;

        impl Visitor<'_> for ByteSizeVisitor {
            type Value = ByteSize;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a byte count or a size string such as \"100kb\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<ByteSize, E> {
                usize::try_from(v)
                    .map(ByteSize::from_bytes)
                    .map_err(|_| E::custom("byte size out of range"))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<ByteSize, E> {
                usize::try_from(v)
                    .map(ByteSize::from_bytes)
                    .map_err(|_| E::custom("byte size must not be negative"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ByteSize, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(ByteSizeVisitor)
    }
}
