//! Stable per-part identity

use crate::types::CollectionId;
use serde::{Deserialize, Serialize};

/// Ledger key for one (collection, part, title) unit of work
///
/// Lowercase hex MD5 of `"{collection}_p{part}_{title}"`. Changing the
/// format invalidates every existing ledger file.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a part
    pub fn compute(collection: &CollectionId, part: u32, title: &str) -> Self {
        let key = format!("{collection}_p{part}_{title}");
        Self(format!("{:x}", md5::compute(key.as_bytes())))
    }

    /// Hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
