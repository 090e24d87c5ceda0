//! A single named timing node and the tree it roots.
//!
//! Nodes are reused across many start/stop cycles: `start()` bumps the call
//! count and stamps the clock, `stop()` adds the elapsed wall time. Children
//! are kept in first-seen order so that rendering can sort them stably.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct IntervalNode {
    label: String,
    elapsed: Duration,
    calls: u64,
    /// Set while running; `None` when idle.
    started: Option<Instant>,
    children: Vec<IntervalNode>,
}

impl IntervalNode {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Build an idle node from already-measured values.
    pub fn from_parts(
        label: impl Into<String>,
        elapsed: Duration,
        calls: u64,
        children: Vec<IntervalNode>,
    ) -> Self {
        Self {
            label: label.into(),
            elapsed,
            calls,
            started: None,
            children,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Wall time summed over all completed cycles.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Number of times the node has been started.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    pub fn children(&self) -> &[IntervalNode] {
        &self.children
    }

    pub fn find_child(&self, label: &str) -> Option<&IntervalNode> {
        self.children.iter().find(|c| c.label == label)
    }

    pub(crate) fn start(&mut self) {
        debug_assert!(!self.is_running(), "timer '{}' started twice", self.label);
        self.calls += 1;
        self.started = Some(Instant::now());
    }

    pub(crate) fn stop(&mut self) {
        if let Some(start) = self.started.take() {
            self.elapsed += start.elapsed();
        }
    }

    /// Index of the child named `label`, inserting an empty one if absent.
    pub(crate) fn child_index(&mut self, label: &str) -> usize {
        match self.children.iter().position(|c| c.label == label) {
            Some(idx) => idx,
            None => {
                self.children.push(IntervalNode::new(label));
                self.children.len() - 1
            }
        }
    }

    pub(crate) fn child_at(&self, idx: usize) -> &IntervalNode {
        &self.children[idx]
    }

    pub(crate) fn child_at_mut(&mut self, idx: usize) -> &mut IntervalNode {
        &mut self.children[idx]
    }

    pub(crate) fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Longest label anywhere below this node (the node's own label excluded).
    pub fn max_label_length(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.label.chars().count().max(c.max_label_length()))
            .max()
            .unwrap_or(0)
    }

    /// Sum of the children's elapsed times.
    pub fn children_elapsed(&self) -> Duration {
        self.children.iter().map(|c| c.elapsed).sum()
    }

    /// Time spent in this node outside of any child. Zero when the children
    /// account for everything (or more, due to clock granularity).
    pub fn residual(&self) -> Duration {
        self.elapsed.saturating_sub(self.children_elapsed())
    }

    /// Add another measurement of the same interval into this one.
    ///
    /// Times and call counts are summed; children are matched by label and
    /// merged recursively, unknown children are appended.
    pub fn merge(&mut self, other: IntervalNode) {
        self.elapsed += other.elapsed;
        self.calls += other.calls;
        for child in other.children {
            match self.children.iter_mut().find(|c| c.label == child.label) {
                Some(existing) => existing.merge(child),
                None => self.children.push(child),
            }
        }
    }
}
