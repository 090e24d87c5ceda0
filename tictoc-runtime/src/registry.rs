//! Finished per-thread trees, keyed by thread identity.
//!
//! The registry itself is plain data; the owning context keeps it behind a
//! mutex and is the only place that locks it.

use std::thread::ThreadId;

use crate::node::IntervalNode;

#[derive(Debug, Clone)]
pub(crate) struct ThreadEntry {
    pub(crate) thread: ThreadId,
    pub(crate) name: Option<String>,
    pub(crate) tree: IntervalNode,
}

/// Entries in first-registration order.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    entries: Vec<ThreadEntry>,
}

impl Registry {
    /// Store a finished tree for `thread`. A thread that flushes more than
    /// once has its trees merged, so repeated reports show running totals.
    pub(crate) fn register(&mut self, thread: ThreadId, name: Option<String>, tree: IntervalNode) {
        match self.entries.iter_mut().find(|e| e.thread == thread) {
            Some(entry) => entry.tree.merge(tree),
            None => self.entries.push(ThreadEntry { thread, name, tree }),
        }
    }

    pub(crate) fn entries(&self) -> &[ThreadEntry] {
        &self.entries
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
