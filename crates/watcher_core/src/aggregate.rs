use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A code attributed to the source it was found in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeHit {
    pub code: String,
    pub source: String,
}

impl CodeHit {
    pub fn new(code: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            source: source.into(),
        }
    }
}

/// Collapse a run's hits to one entry per code, sorted by code.
///
/// Hits must arrive in configured source order: the first source to yield a
/// code keeps the attribution. Duplicates against earlier runs are not handled
/// here; the store rejects those.
pub fn aggregate<I>(hits: I) -> Vec<CodeHit>
where
    I: IntoIterator<Item = CodeHit>,
{
    let mut first_seen: BTreeMap<String, String> = BTreeMap::new();
    for hit in hits {
        if let Entry::Vacant(slot) = first_seen.entry(hit.code) {
            slot.insert(hit.source);
        }
    }
    first_seen
        .into_iter()
        .map(|(code, source)| CodeHit { code, source })
        .collect()
}
