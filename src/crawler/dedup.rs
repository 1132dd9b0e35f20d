use std::collections::HashSet;

use crate::crawler::models::DedupKey;

/// Keys seen so far in one run. Grows only.
#[derive(Debug, Default)]
pub struct DedupIndex {
    seen: HashSet<DedupKey>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` when the key was not seen before.
    pub fn insert(&mut self, key: DedupKey) -> bool {
        self.seen.insert(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }
}
