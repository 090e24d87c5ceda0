//! Per-thread records that any thread can drain.
//!
//! Each thread using a context owns a [`ThreadRecord`] behind an
//! `Arc<Mutex<..>>`. The thread locks it for every tic/toc, which is
//! uncontended except while a collection looks at it. The context keeps the
//! other handle in [`Records`], so a collection takes finished trees straight
//! out of idle threads without running anything on them and without waiting
//! for threads that are busy.

use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use crate::node::IntervalNode;
use crate::stack::TimerStack;

pub(crate) type SharedRecord = Arc<Mutex<ThreadRecord>>;

pub(crate) struct ThreadRecord {
    thread: ThreadId,
    name: Option<String>,
    /// Reset generation the stack was recorded under.
    generation: u64,
    pub(crate) stack: TimerStack,
}

/// A tree that left its thread, tagged for registration.
pub(crate) struct Finished {
    pub(crate) thread: ThreadId,
    pub(crate) name: Option<String>,
    pub(crate) generation: u64,
    pub(crate) tree: IntervalNode,
}

impl ThreadRecord {
    pub(crate) fn for_current_thread(generation: u64) -> Self {
        let current = thread::current();
        Self {
            thread: current.id(),
            name: current.name().map(str::to_owned),
            generation,
            stack: TimerStack::new(),
        }
    }

    /// Drop whatever was recorded under an older generation.
    pub(crate) fn refresh(&mut self, generation: u64) {
        if self.generation != generation {
            self.stack.clear();
            self.generation = generation;
        }
    }

    /// Take the tree out of the record.
    ///
    /// Without `force`, a record with an interval still open keeps its tree.
    /// With it, open intervals are stopped now.
    pub(crate) fn take(&mut self, force: bool) -> Option<Finished> {
        if !force && self.stack.is_open() {
            tracing::debug!(thread = ?self.thread, "thread still has open timers, not flushing");
            return None;
        }
        let tree = self.stack.take_tree()?;
        Some(Finished {
            thread: self.thread,
            name: self.name.clone(),
            generation: self.generation,
            tree,
        })
    }
}

/// Every live thread record of one context.
#[derive(Default)]
pub(crate) struct Records {
    list: Mutex<Vec<SharedRecord>>,
}

impl Records {
    pub(crate) fn add(&self, record: SharedRecord) {
        self.list
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }

    pub(crate) fn remove(&self, record: &SharedRecord) {
        self.list
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|r| !Arc::ptr_eq(r, record));
    }

    /// Handles to all records, taken without holding the list lock afterwards.
    pub(crate) fn snapshot(&self) -> Vec<SharedRecord> {
        self.list.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.list.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
