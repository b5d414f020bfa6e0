//! Content version tokens.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque, backend-supplied token identifying one state of a node's data.
///
/// Two reads observing the same token see the same structure and data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentVersion(String);

impl ContentVersion {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Strong entity tag derived from the version, stable across processes.
    /// The checksum is followed by the token length.
    pub fn freshness_token(&self) -> String {
        format!("\"{:08x}-{:x}\"", crc32fast::hash(self.0.as_bytes()), self.0.len())
    }
}

impl fmt::Display for ContentVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentVersion {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
