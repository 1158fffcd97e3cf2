//! Content fingerprints and seeded string hashing.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use xxhash_rust::xxh3::{Xxh3, xxh3_64_with_seed};

use crate::data::CanonicalRecord;
use crate::errors::CorpusError;

/// 128-bit content digest over a record's semantic fields.
///
/// Renders as 32 lowercase hex digits, which is also the cache-file form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(u128);

impl Fingerprint {
    /// Wrap a raw digest value.
    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    /// Raw digest value.
    pub const fn as_u128(self) -> u128 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = CorpusError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.len() != 32 || !trimmed.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            return Err(CorpusError::Configuration(format!(
                "invalid fingerprint '{trimmed}': expected 32 hex digits"
            )));
        }
        u128::from_str_radix(trimmed, 16)
            .map(Self)
            .map_err(|err| CorpusError::Configuration(format!("invalid fingerprint '{trimmed}': {err}")))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Fingerprint `instruction + input + output + text` (missing fields are empty).
///
/// `_category` and `_source` never participate.
pub fn fingerprint(record: &CanonicalRecord) -> Fingerprint {
    fingerprint_parts(record.semantic_fields())
}

/// Fingerprint pre-extracted semantic fields in declared order.
pub fn fingerprint_parts<'a>(parts: impl IntoIterator<Item = &'a str>) -> Fingerprint {
    let mut hasher = Xxh3::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    Fingerprint(hasher.digest128())
}

/// Seeded 64-bit hash of a string, stable across runs, platforms, and toolchains.
pub fn stable_hash_str(seed: u64, value: &str) -> u64 {
    xxh3_64_with_seed(value.as_bytes(), seed)
}
