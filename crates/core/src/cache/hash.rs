//! Content-addressed cache key generation.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::normalize::{Normalizer, normalize_query};
use crate::Error;

/// Hex-encoded SHA-256 digest identifying a cached query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey(String);

impl CacheKey {
    /// Digest of the given (already canonical) query text.
    pub fn digest(text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CacheKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == 64 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            Ok(Self(s.to_string()))
        } else {
            Err(Error::InvalidKey(s.to_string()))
        }
    }
}

impl TryFrom<String> for CacheKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

/// Compute the cache key of a query with the process-wide normalizer.
pub fn hash_query(query: &str, normalize: bool) -> CacheKey {
    if normalize { CacheKey::digest(&normalize_query(query)) } else { CacheKey::digest(query) }
}

/// Derives cache keys, optionally normalizing queries first.
#[derive(Debug, Clone)]
pub struct KeyDeriver {
    normalizer: Arc<Normalizer>,
    normalize: bool,
}

impl KeyDeriver {
    pub fn new(normalizer: Arc<Normalizer>, normalize: bool) -> Self {
        Self { normalizer, normalize }
    }

    pub fn normalizes(&self) -> bool {
        self.normalize
    }

    /// The query text that is hashed and recorded in metadata.
    pub fn canonical_query<'q>(&self, query: &'q str) -> Cow<'q, str> {
        if self.normalize { Cow::Owned(self.normalizer.normalize(query)) } else { Cow::Borrowed(query) }
    }

    pub fn derive(&self, query: &str) -> CacheKey {
        CacheKey::digest(&self.canonical_query(query))
    }
}
