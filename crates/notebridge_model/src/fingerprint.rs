//! Content fingerprints.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of digest bytes kept in a fingerprint.
pub const FINGERPRINT_BYTES: usize = 16;

/// A deterministic digest of a note's folded title and body.
///
/// Equal content always yields equal fingerprints. Fingerprints are only
/// ever compared for equality; the value itself carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of a folded title and a body.
    ///
    /// The title and body are separated by a NUL byte so that moving text
    /// across the boundary changes the digest.
    pub fn of(title: &str, body: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        hasher.update([0u8]);
        hasher.update(body.as_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..FINGERPRINT_BYTES]))
    }

    /// The empty fingerprint. Never equal to a computed one.
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Wraps a stored value without validation.
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the hex representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the empty fingerprint.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if this looks like a computed fingerprint.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == FINGERPRINT_BYTES * 2
            && self.0.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
