//! Long-period autosave, gated by state hash and the transient edge guard.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use stratgraph_core::fingerprint::StateHash;
use stratgraph_core::graph::GraphStore;
use tracing::{debug, info, warn};

use crate::document::StrategyDocument;
use crate::repository::LocalStrategyStore;
use crate::storage::{KeyValueStore, StorageError};

pub const DEFAULT_AUTOSAVE_MS: u64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutosaveOutcome {
    /// No save scheduled, or its quiet period has not elapsed.
    Idle,
    /// State matches the last save; nothing written.
    Unchanged,
    /// Edges are empty while connectable nodes exist. Write deferred.
    SkippedTransient,
    Saved(StateHash),
}

#[derive(Debug)]
pub struct Autosaver {
    quiet: Duration,
    deadline: Option<Instant>,
    last_saved: Option<StateHash>,
}

impl Default for Autosaver {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_AUTOSAVE_MS))
    }
}

impl Autosaver {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            deadline: None,
            last_saved: None,
        }
    }

    /// Record the state that is already persisted.
    pub fn mark_saved(&mut self, hash: StateHash) {
        self.last_saved = Some(hash);
    }

    pub fn last_saved(&self) -> Option<StateHash> {
        self.last_saved
    }

    /// Restart the quiet period.
    pub fn notify_change(&mut self, now: Instant) {
        self.deadline = Some(now + self.quiet);
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Save if the quiet period has elapsed.
    pub fn poll<S: KeyValueStore>(
        &mut self,
        now: Instant,
        store: &GraphStore,
        doc: &mut StrategyDocument,
        repo: &mut LocalStrategyStore<S>,
        user_id: &str,
        wall: DateTime<Utc>,
    ) -> Result<AutosaveOutcome, StorageError> {
        match self.deadline {
            Some(deadline) if deadline <= now => self.save_now(store, doc, repo, user_id, wall),
            _ => Ok(AutosaveOutcome::Idle),
        }
    }

    /// Save immediately, ignoring the quiet period. Both gates still apply.
    pub fn save_now<S: KeyValueStore>(
        &mut self,
        store: &GraphStore,
        doc: &mut StrategyDocument,
        repo: &mut LocalStrategyStore<S>,
        user_id: &str,
        wall: DateTime<Utc>,
    ) -> Result<AutosaveOutcome, StorageError> {
        self.deadline = None;

        if is_transient(store) {
            warn!(
                strategy = %doc.id,
                nodes = store.nodes().len(),
                "edges empty while connectable nodes exist; deferring autosave"
            );
            return Ok(AutosaveOutcome::SkippedTransient);
        }

        let hash = store.state_hash();
        if self.last_saved == Some(hash) {
            debug!(strategy = %doc.id, "autosave skipped, state unchanged");
            return Ok(AutosaveOutcome::Unchanged);
        }

        doc.capture(store, wall);
        repo.save(user_id, doc)?;
        self.last_saved = Some(hash);
        info!(strategy = %doc.id, %hash, "autosaved");
        Ok(AutosaveOutcome::Saved(hash))
    }
}

/// Edges empty while non-start, non-virtual nodes exist.
pub fn is_transient(store: &GraphStore) -> bool {
    store.edges().is_empty() && store.nodes().iter().any(|n| n.kind().is_connectable())
}
