//! Content fingerprints for descriptions and documents

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::description::DescriptionDoc;

/// SHA256 over canonical JSON
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// `serde_json` keeps object keys sorted, so equal values hash equally
    pub fn from_json(value: &serde_json::Value) -> Self {
        let canonical = serde_json::to_string(value).unwrap_or_default();
        Self::from_bytes(canonical.as_bytes())
    }

    /// Hash of a description's serialized form, ignoring `modified`
    pub fn of_description(doc: &DescriptionDoc) -> Self {
        let mut doc = doc.clone();
        doc.info.modified = 0;
        match serde_json::to_value(&doc) {
            Ok(value) => Self::from_json(&value),
            Err(_) => Self::from_bytes(&[]),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn verify(&self, value: &serde_json::Value) -> bool {
        *self == Self::from_json(value)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
