//! Run-scoped memory of message content already evaluated.
//!
//! Keys are the raw content strings; messages differing by one character are
//! distinct. Nothing is ever evicted, so memory grows with the number of
//! distinct messages seen during the run. Nothing survives a restart.

use std::collections::HashSet;

/// Set of content strings seen during this run.
#[derive(Debug, Default)]
pub struct DedupMemory {
    seen: HashSet<String>,
}

impl DedupMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `content` has already been marked.
    pub fn seen(&self, content: &str) -> bool {
        self.seen.contains(content)
    }

    /// Record `content` as seen.
    pub fn mark(&mut self, content: &str) {
        self.check_and_mark(content);
    }

    /// Mark `content` and report whether it was new.
    ///
    /// Returns `false` when the content was already present.
    pub fn check_and_mark(&mut self, content: &str) -> bool {
        if self.seen.contains(content) {
            return false;
        }
        self.seen.insert(content.to_string())
    }

    /// Number of distinct contents seen so far.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
