//! Structural fingerprints for lambdas, programs and other serializable shapes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// blake3 digest of a value's JSON encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Fingerprint(blake3::hash(bytes).into())
    }

    /// Two structurally equal values always get the same fingerprint.
    pub fn of<T: Serialize>(v: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(v)?;
        Ok(Self::of_bytes(&bytes))
    }

    /// First 8 hex digits; enough to tell cache entries apart in logs.
    pub fn short(&self) -> String {
        self.0[..4].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}
