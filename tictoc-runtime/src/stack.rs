//! Per-thread interval stack.
//!
//! A `TimerStack` owns one tree and a cursor into it. The cursor is the path
//! of child indices from the implicit top-level node down to the innermost
//! open interval; child vectors only ever grow while a tree is live, so the
//! indices stay valid until the tree is taken or cleared.

use crate::error::{Result, TimerError};
use crate::node::IntervalNode;

#[derive(Debug, Default)]
pub(crate) struct TimerStack {
    root: IntervalNode,
    path: Vec<usize>,
}

fn descend<'a>(root: &'a IntervalNode, path: &[usize]) -> &'a IntervalNode {
    path.iter().fold(root, |node, &idx| node.child_at(idx))
}

fn descend_mut<'a>(root: &'a mut IntervalNode, path: &[usize]) -> &'a mut IntervalNode {
    let mut node = root;
    for &idx in path {
        node = node.child_at_mut(idx);
    }
    node
}

impl TimerStack {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Label of the innermost open interval, if any.
    pub(crate) fn open_label(&self) -> Option<&str> {
        if self.path.is_empty() {
            None
        } else {
            Some(descend(&self.root, &self.path).label())
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        !self.path.is_empty()
    }

    /// Labels of all open intervals, outermost first.
    pub(crate) fn open_path(&self) -> Vec<String> {
        (1..=self.path.len())
            .map(|depth| descend(&self.root, &self.path[..depth]).label().to_owned())
            .collect()
    }

    /// Whether an interval called `name` is open anywhere on the path.
    fn is_running_on_path(&self, name: &str) -> bool {
        let mut node = &self.root;
        for &idx in &self.path {
            node = node.child_at(idx);
            if node.label() == name {
                return true;
            }
        }
        false
    }

    /// Open `name` below the innermost open interval.
    ///
    /// A label that is still open at any depth cannot be opened again until
    /// it is stopped, whether directly inside itself or further down.
    pub(crate) fn tic(&mut self, name: &str) -> Result<()> {
        if self.is_running_on_path(name) {
            return Err(TimerError::AlreadyRunning(name.to_owned()));
        }

        if !self.root.is_running() {
            self.root.start();
        }
        let current = descend_mut(&mut self.root, &self.path);
        let idx = current.child_index(name);
        current.child_at_mut(idx).start();
        self.path.push(idx);
        Ok(())
    }

    pub(crate) fn toc(&mut self, name: &str) -> Result<()> {
        let open = match self.open_label() {
            Some(open) => open,
            None => return Err(TimerError::NoOpenInterval(name.to_owned())),
        };
        if open != name {
            return Err(TimerError::LabelMismatch {
                name: name.to_owned(),
                open: open.to_owned(),
            });
        }
        descend_mut(&mut self.root, &self.path).stop();
        self.path.pop();
        Ok(())
    }

    /// Stop every running node, innermost first, and take the tree.
    ///
    /// Returns `None` when nothing was ever timed. The stack is empty
    /// afterwards either way.
    pub(crate) fn take_tree(&mut self) -> Option<IntervalNode> {
        while !self.path.is_empty() {
            descend_mut(&mut self.root, &self.path).stop();
            self.path.pop();
        }
        self.root.stop();
        let tree = std::mem::take(&mut self.root);
        if tree.has_children() {
            Some(tree)
        } else {
            None
        }
    }

    pub(crate) fn clear(&mut self) {
        self.root = IntervalNode::default();
        self.path.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn nested_tic_toc_builds_tree() {
        let mut stack = TimerStack::new();
        stack.tic("outer").unwrap();
        stack.tic("inner").unwrap();
        assert_eq!(stack.open_label(), Some("inner"));
        assert_eq!(stack.open_path(), vec!["outer", "inner"]);
        stack.toc("inner").unwrap();
        stack.tic("inner").unwrap();
        stack.toc("inner").unwrap();
        stack.toc("outer").unwrap();
        assert!(!stack.is_open());

        let tree = stack.take_tree().unwrap();
        assert!(!tree.is_running());
        assert_eq!(tree.calls(), 1);
        let outer = tree.find_child("outer").unwrap();
        assert_eq!(outer.calls(), 1);
        assert_eq!(outer.find_child("inner").unwrap().calls(), 2);
    }

    #[test]
    fn toc_without_tic_fails() {
        let mut stack = TimerStack::new();
        let err = stack.toc("label2").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoOpenInterval);
    }

    #[test]
    fn toc_after_everything_closed_fails() {
        let mut stack = TimerStack::new();
        stack.tic("a").unwrap();
        stack.toc("a").unwrap();
        assert_eq!(stack.toc("a").unwrap_err().kind(), ErrorKind::NoOpenInterval);
    }

    #[test]
    fn toc_with_unknown_name_fails_and_keeps_state() {
        let mut stack = TimerStack::new();
        stack.tic("label1").unwrap();
        let err = stack.toc("label2").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LabelMismatch);
        assert_eq!(stack.open_label(), Some("label1"));
        stack.toc("label1").unwrap();
    }

    #[test]
    fn improper_nesting_fails_at_first_mismatch() {
        let mut stack = TimerStack::new();
        stack.tic("label5").unwrap();
        stack.tic("label6").unwrap();
        assert_eq!(
            stack.toc("label5").unwrap_err().kind(),
            ErrorKind::LabelMismatch
        );
        stack.toc("label6").unwrap();
        assert_eq!(stack.open_label(), Some("label5"));
    }

    #[test]
    fn toc_of_closed_sibling_is_rejected() {
        let mut stack = TimerStack::new();
        stack.tic("x").unwrap();
        stack.toc("x").unwrap();
        stack.tic("y").unwrap();
        let err = stack.toc("x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LabelMismatch);
        assert_eq!(stack.open_label(), Some("y"));
    }

    #[test]
    fn immediate_reentry_is_rejected() {
        let mut stack = TimerStack::new();
        stack.tic("a").unwrap();
        assert_eq!(stack.tic("a").unwrap_err().kind(), ErrorKind::AlreadyRunning);
        assert_eq!(stack.open_path(), vec!["a"]);
        assert!(stack.take_tree().unwrap().find_child("a").unwrap().children().is_empty());
    }

    #[test]
    fn reentry_below_another_interval_is_rejected() {
        let mut stack = TimerStack::new();
        stack.tic("a").unwrap();
        stack.tic("b").unwrap();
        assert_eq!(stack.tic("a").unwrap_err().kind(), ErrorKind::AlreadyRunning);
        assert_eq!(stack.open_path(), vec!["a", "b"]);
        stack.toc("b").unwrap();
        stack.toc("a").unwrap();
    }

    #[test]
    fn same_label_may_nest_once_closed() {
        let mut stack = TimerStack::new();
        stack.tic("a").unwrap();
        stack.toc("a").unwrap();
        stack.tic("b").unwrap();
        stack.tic("a").unwrap();
        assert_eq!(stack.open_path(), vec!["b", "a"]);
        stack.toc("a").unwrap();
        stack.toc("b").unwrap();
        let tree = stack.take_tree().unwrap();
        assert_eq!(tree.find_child("a").unwrap().calls(), 1);
        assert_eq!(tree.find_child("b").unwrap().find_child("a").unwrap().calls(), 1);
    }

    #[test]
    fn take_tree_stops_open_intervals() {
        let mut stack = TimerStack::new();
        stack.tic("a").unwrap();
        stack.tic("b").unwrap();
        let tree = stack.take_tree().unwrap();
        let a = tree.find_child("a").unwrap();
        assert!(!a.is_running());
        assert!(!a.find_child("b").unwrap().is_running());
        assert!(!stack.is_open());
        assert!(stack.take_tree().is_none());
    }

    #[test]
    fn take_tree_of_untouched_stack_is_none() {
        let mut stack = TimerStack::new();
        assert!(stack.take_tree().is_none());
    }

    #[test]
    fn clear_discards_everything() {
        let mut stack = TimerStack::new();
        stack.tic("a").unwrap();
        stack.clear();
        assert!(!stack.is_open());
        assert!(stack.take_tree().is_none());
    }
}
