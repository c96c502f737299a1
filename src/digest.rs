//! SHA-256 content digests for snapshot documents.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use tokio::task::JoinHandle;

use crate::error::{Result, SpecnovaError};

/// Lowercase hex SHA-256 of a document's UTF-8 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sha256Digest(String);

impl Sha256Digest {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn of_str(text: &str) -> Self {
        Self::of_bytes(text.as_bytes())
    }

    /// Digest a file on disk.
    pub async fn of_file(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| SpecnovaError::io(path, e))?;
        Ok(Self::of_bytes(&bytes))
    }

    pub fn parse(s: &str) -> Result<Self> {
        let valid = s.len() == 64 && s.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'));
        if !valid {
            return Err(SpecnovaError::MetaInvalid(format!(
                "'{}' is not a sha256 hex digest",
                s
            )));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the file at `path` hashes to this digest. A missing or
    /// unreadable file never matches.
    pub async fn matches_file(&self, path: &Path) -> bool {
        match Self::of_file(path).await {
            Ok(actual) => actual == *self,
            Err(_) => false,
        }
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Sha256Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Sha256Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Sha256Digest::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A digest that may still be computing on the blocking pool.
///
/// Always collapse with [`DigestState::resolve`] before comparing or
/// serializing.
#[derive(Debug)]
pub enum DigestState {
    Pending(JoinHandle<Sha256Digest>),
    Resolved(Sha256Digest),
}

impl DigestState {
    /// Start hashing `text` in the background. Must be called inside a
    /// tokio runtime.
    pub fn pending(text: String) -> Self {
        DigestState::Pending(tokio::task::spawn_blocking(move || {
            Sha256Digest::of_str(&text)
        }))
    }

    pub async fn resolve(self) -> Result<Sha256Digest> {
        match self {
            DigestState::Resolved(digest) => Ok(digest),
            DigestState::Pending(handle) => handle.await.map_err(|e| {
                SpecnovaError::io(
                    "<digest>",
                    std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
                )
            }),
        }
    }
}
