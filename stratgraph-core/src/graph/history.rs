//! Undo/redo history of full graph snapshots.
//!
//! Each entry is the state *after* a mutation. The entry under the cursor is
//! the current state; `undo` steps the cursor back, `redo` forward. Pushing
//! while the cursor is not at the tail drops the redo tail first.

use super::edge::Edge;
use super::node::Node;

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<Snapshot>,
    cursor: usize,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::with_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl History {
    /// A limit of zero is treated as one: the current state is always kept.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: vec![Snapshot::default()],
            cursor: 0,
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Forget everything and start over from `initial`.
    pub fn reset(&mut self, initial: Snapshot) {
        self.entries.clear();
        self.entries.push(initial);
        self.cursor = 0;
    }

    pub fn push(&mut self, snapshot: Snapshot) {
        self.entries.truncate(self.cursor + 1);
        self.entries.push(snapshot);
        if self.entries.len() > self.limit {
            let overflow = self.entries.len() - self.limit;
            self.entries.drain(..overflow);
        }
        self.cursor = self.entries.len() - 1;
    }

    pub fn undo(&mut self) -> Option<&Snapshot> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.entries.get(self.cursor)
    }

    pub fn redo(&mut self) -> Option<&Snapshot> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        self.entries.get(self.cursor)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current(&self) -> Option<&Snapshot> {
        self.entries.get(self.cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::{NodeKind, Point};

    fn snap(n: usize) -> Snapshot {
        Snapshot {
            nodes: (0..n)
                .map(|i| Node::with_id(format!("n{i}"), NodeKind::Signal, Point::default()))
                .collect(),
            edges: Vec::new(),
        }
    }

    #[test]
    fn undo_redo_walks_the_cursor() {
        let mut h = History::default();
        h.reset(snap(0));
        h.push(snap(1));
        h.push(snap(2));

        assert_eq!(h.undo().map(|s| s.nodes.len()), Some(1));
        assert_eq!(h.undo().map(|s| s.nodes.len()), Some(0));
        assert!(h.undo().is_none());
        assert_eq!(h.redo().map(|s| s.nodes.len()), Some(1));
    }

    #[test]
    fn push_after_undo_truncates_redo_tail() {
        let mut h = History::default();
        h.reset(snap(0));
        h.push(snap(1));
        h.push(snap(2));
        h.undo();
        h.push(snap(5));
        assert!(!h.can_redo());
        assert_eq!(h.len(), 3);
        assert_eq!(h.current().map(|s| s.nodes.len()), Some(5));
    }

    #[test]
    fn length_is_capped_oldest_first() {
        let mut h = History::with_limit(3);
        h.reset(snap(0));
        for i in 1..=5 {
            h.push(snap(i));
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.undo().map(|s| s.nodes.len()), Some(4));
        assert_eq!(h.undo().map(|s| s.nodes.len()), Some(3));
        assert!(!h.can_undo());
    }
}
