//! Debounced editing: an explicit queue of pending node patches.
//!
//! Each (node, edit kind) pair has its own quiet period. A new edit for the
//! same pair pushes its deadline out and merges into the pending batch; a
//! later patch of the same variant replaces the earlier one. Nothing runs on
//! a timer: callers pass `Instant`s in and pull due batches out.

use std::collections::BTreeMap;
use std::mem::discriminant;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::domain::NodeId;
use crate::graph::{GraphError, GraphStore, NodePatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EditKind {
    Label,
    Condition,
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    pub label: Duration,
    pub condition: Duration,
    pub variable: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            label: Duration::from_millis(300),
            condition: Duration::from_millis(500),
            variable: Duration::from_millis(1000),
        }
    }
}

impl DebounceConfig {
    pub fn quiet_period(&self, kind: EditKind) -> Duration {
        match kind {
            EditKind::Label => self.label,
            EditKind::Condition => self.condition,
            EditKind::Variable => self.variable,
        }
    }
}

#[derive(Debug, Clone)]
struct Pending {
    patches: Vec<NodePatch>,
    deadline: Instant,
}

/// Patches for one node released together.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushBatch {
    pub node_id: NodeId,
    pub kind: EditKind,
    pub patches: Vec<NodePatch>,
}

impl FlushBatch {
    /// Apply the batch as one history entry.
    pub fn apply(&self, store: &mut GraphStore, now_ms: i64) -> Result<(), GraphError> {
        store.apply_patches(&self.node_id, &self.patches, now_ms)
    }
}

#[derive(Debug, Default)]
pub struct EditDebouncer {
    config: DebounceConfig,
    pending: BTreeMap<(NodeId, EditKind), Pending>,
}

impl EditDebouncer {
    pub fn new(config: DebounceConfig) -> Self {
        Self {
            config,
            pending: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &DebounceConfig {
        &self.config
    }

    pub fn push(&mut self, node_id: NodeId, kind: EditKind, patch: NodePatch, now: Instant) {
        let deadline = now + self.config.quiet_period(kind);
        let entry = self
            .pending
            .entry((node_id, kind))
            .or_insert_with(|| Pending {
                patches: Vec::new(),
                deadline,
            });
        entry.deadline = deadline;
        match entry
            .patches
            .iter_mut()
            .find(|p| discriminant(&**p) == discriminant(&patch))
        {
            Some(slot) => *slot = patch,
            None => entry.patches.push(patch),
        }
    }

    /// Release every batch whose quiet period has elapsed, oldest deadline first.
    pub fn due(&mut self, now: Instant) -> Vec<FlushBatch> {
        let mut ready: Vec<_> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(key, p)| (p.deadline, key.clone()))
            .collect();
        ready.sort();
        let batches: Vec<FlushBatch> = ready
            .into_iter()
            .filter_map(|(_, key)| self.take(key))
            .collect();
        if !batches.is_empty() {
            debug!(batches = batches.len(), "debounced edits due");
        }
        batches
    }

    /// Release everything pending regardless of deadlines.
    pub fn flush_all(&mut self) -> Vec<FlushBatch> {
        let keys: Vec<_> = self.pending.keys().cloned().collect();
        keys.into_iter().filter_map(|key| self.take(key)).collect()
    }

    /// Release everything pending for one node, ahead of its deadlines.
    pub fn flush_node(&mut self, node_id: &NodeId) -> Vec<FlushBatch> {
        let keys: Vec<_> = self
            .pending
            .keys()
            .filter(|(id, _)| id == node_id)
            .cloned()
            .collect();
        keys.into_iter().filter_map(|key| self.take(key)).collect()
    }

    /// Drop pending edits for a node (e.g. it was deleted). Returns the
    /// number of patches dropped.
    pub fn cancel(&mut self, node_id: &NodeId) -> usize {
        let mut dropped = 0;
        self.pending.retain(|(id, _), p| {
            if id == node_id {
                dropped += p.patches.len();
                false
            } else {
                true
            }
        });
        dropped
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.values().map(|p| p.patches.len()).sum()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    fn take(&mut self, key: (NodeId, EditKind)) -> Option<FlushBatch> {
        let pending = self.pending.remove(&key)?;
        let (node_id, kind) = key;
        Some(FlushBatch {
            node_id,
            kind,
            patches: pending.patches,
        })
    }
}
