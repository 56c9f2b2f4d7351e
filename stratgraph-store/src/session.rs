//! An open strategy being edited.
//!
//! Binds the graph store, the edit debouncer, the autosaver and the
//! repository. Time only moves when the caller passes it in: `Instant`s for
//! quiet periods and a wall-clock `DateTime` for stamps and `lastModified`.

use std::time::Instant;

use chrono::{DateTime, Utc};
use stratgraph_core::debounce::{EditDebouncer, EditKind, FlushBatch};
use stratgraph_core::domain::{NodeId, StrategyId};
use stratgraph_core::fingerprint::state_hash;
use stratgraph_core::graph::{GraphError, GraphStore, Node, NodePatch};
use stratgraph_core::reentry::{select_target, ReEntryError};
use stratgraph_core::registry::apply_mount_corrections;
use stratgraph_core::variables::{AssignmentClipboard, PasteReport};
use tracing::{debug, info, warn};

use crate::autosave::{AutosaveOutcome, Autosaver};
use crate::config::StoreConfig;
use crate::document::StrategyDocument;
use crate::repository::LocalStrategyStore;
use crate::storage::{KeyValueStore, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    ReEntry(#[from] ReEntryError),
}

/// What one `tick` did.
#[derive(Debug)]
pub struct TickReport {
    pub flushed: usize,
    /// Batches the store refused; the rest of the tick still ran.
    pub rejected: Vec<(NodeId, GraphError)>,
    pub autosave: AutosaveOutcome,
}

#[derive(Debug)]
pub struct StrategySession<S> {
    repo: LocalStrategyStore<S>,
    user_id: String,
    document: StrategyDocument,
    store: GraphStore,
    debouncer: EditDebouncer,
    autosaver: Autosaver,
}

impl<S: KeyValueStore> StrategySession<S> {
    /// Load (and migrate) a stored strategy and start a fresh history.
    pub fn open(
        mut repo: LocalStrategyStore<S>,
        user_id: &str,
        strategy_id: &StrategyId,
        config: &StoreConfig,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        let document = repo.load(user_id, strategy_id)?;
        let mut store = GraphStore::with_history_limit(config.history_limit);
        document.load_into(&mut store);

        let mut autosaver = Autosaver::new(config.autosave_period());
        autosaver.mark_saved(state_hash(
            &document.nodes,
            &document.edges,
            &document.global_variables,
        ));
        let corrected = apply_mount_corrections(&mut store, wall.timestamp_millis())?;
        let normalized = store.nodes() != document.nodes.as_slice()
            || store.edges() != document.edges.as_slice();
        if normalized {
            autosaver.notify_change(now);
        }

        info!(
            strategy = %strategy_id,
            nodes = store.nodes().len(),
            edges = store.edges().len(),
            corrected,
            normalized,
            "opened strategy"
        );
        Ok(Self {
            repo,
            user_id: user_id.to_string(),
            document,
            store,
            debouncer: EditDebouncer::new(config.debounce()),
            autosaver,
        })
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn document(&self) -> &StrategyDocument {
        &self.document
    }

    pub fn repository(&self) -> &LocalStrategyStore<S> {
        &self.repo
    }

    pub fn into_repository(self) -> LocalStrategyStore<S> {
        self.repo
    }

    pub fn has_pending_edits(&self) -> bool {
        !self.debouncer.is_idle()
    }

    /// Queue a debounced field edit.
    pub fn queue_edit(&mut self, node_id: NodeId, patch: NodePatch, kind: EditKind, now: Instant) {
        self.debouncer.push(node_id, kind, patch, now);
    }

    /// Apply an immediate structural edit and schedule an autosave.
    pub fn apply<T>(
        &mut self,
        now: Instant,
        edit: impl FnOnce(&mut GraphStore) -> Result<T, GraphError>,
    ) -> Result<T, GraphError> {
        let out = edit(&mut self.store)?;
        self.autosaver.notify_change(now);
        Ok(out)
    }

    /// Delete a node, dropping any edits still pending for it.
    pub fn remove_node(
        &mut self,
        node_id: &NodeId,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Result<Node, GraphError> {
        let dropped = self.debouncer.cancel(node_id);
        if dropped > 0 {
            debug!(node = %node_id, dropped, "cancelled pending edits for removed node");
        }
        self.apply(now, |store| store.remove_node(node_id, wall.timestamp_millis()))
    }

    /// Point a re-entry-signal node at `target` (or unlink it) and schedule
    /// an autosave.
    pub fn select_reentry_target(
        &mut self,
        node_id: &NodeId,
        target: Option<&NodeId>,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        select_target(&mut self.store, node_id, target, wall.timestamp_millis())?;
        self.autosaver.notify_change(now);
        Ok(())
    }

    /// Paste copied global-variable assignments onto a node.
    ///
    /// Pending edits for the node land first so a later flush cannot
    /// overwrite the paste. Nothing is recorded when nothing was pasted.
    pub fn paste_assignments(
        &mut self,
        clipboard: &AssignmentClipboard,
        node_id: &NodeId,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Result<PasteReport, SessionError> {
        let batches = self.debouncer.flush_node(node_id);
        let (flushed, rejected) = self.apply_batches(batches, wall);
        if flushed > 0 {
            self.autosaver.notify_change(now);
        }
        if let Some((_, e)) = rejected.into_iter().next() {
            return Err(e.into());
        }

        let node = self
            .store
            .node(node_id)
            .ok_or_else(|| GraphError::UnknownNode(node_id.clone()))?;
        let mut updates = node
            .data
            .global_variable_updates()
            .cloned()
            .ok_or(GraphError::PatchNotApplicable {
                patch: "globalVariableUpdates",
                kind: node.kind(),
            })?;
        let report = clipboard.paste_into(&mut updates, self.store.global_variables());
        if report.pasted > 0 {
            self.store.update_node(
                node_id,
                NodePatch::SetGlobalVariableUpdates(updates),
                wall.timestamp_millis(),
            )?;
            self.autosaver.notify_change(now);
        }
        debug!(node = %node_id, pasted = report.pasted, missing = report.missing, duplicate = report.duplicate, "pasted assignments");
        Ok(report)
    }

    pub fn undo(&mut self, now: Instant) -> bool {
        let changed = self.store.undo();
        if changed {
            self.autosaver.notify_change(now);
        }
        changed
    }

    pub fn redo(&mut self, now: Instant) -> bool {
        let changed = self.store.redo();
        if changed {
            self.autosaver.notify_change(now);
        }
        changed
    }

    /// Flush due edits, then give the autosaver its turn.
    pub fn tick(&mut self, now: Instant, wall: DateTime<Utc>) -> Result<TickReport, SessionError> {
        let batches = self.debouncer.due(now);
        let (flushed, rejected) = self.apply_batches(batches, wall);
        if flushed > 0 {
            self.autosaver.notify_change(now);
        }
        let autosave = self.autosaver.poll(
            now,
            &self.store,
            &mut self.document,
            &mut self.repo,
            &self.user_id,
            wall,
        )?;
        Ok(TickReport {
            flushed,
            rejected,
            autosave,
        })
    }

    /// Flush everything pending and force a final save.
    pub fn close(&mut self, wall: DateTime<Utc>) -> Result<TickReport, SessionError> {
        let batches = self.debouncer.flush_all();
        let (flushed, rejected) = self.apply_batches(batches, wall);
        let autosave = self.autosaver.save_now(
            &self.store,
            &mut self.document,
            &mut self.repo,
            &self.user_id,
            wall,
        )?;
        info!(strategy = %self.document.id, flushed, ?autosave, "closed strategy");
        Ok(TickReport {
            flushed,
            rejected,
            autosave,
        })
    }

    fn apply_batches(
        &mut self,
        batches: Vec<FlushBatch>,
        wall: DateTime<Utc>,
    ) -> (usize, Vec<(NodeId, GraphError)>) {
        let now_ms = wall.timestamp_millis();
        let mut flushed = 0;
        let mut rejected = Vec::new();
        for batch in batches {
            match batch.apply(&mut self.store, now_ms) {
                Ok(()) => flushed += 1,
                Err(e) => {
                    warn!(node = %batch.node_id, kind = ?batch.kind, error = %e, "dropped edit batch");
                    rejected.push((batch.node_id, e));
                }
            }
        }
        (flushed, rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;
    use std::time::Duration;
    use stratgraph_core::graph::{NodeKind, Point};

    fn wall(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn seeded() -> (LocalStrategyStore<MemoryStore>, StrategyId) {
        let mut doc = StrategyDocument::new("S", "u", wall(0));
        let start = doc.nodes[0].id.clone();
        doc.nodes.push(Node::with_id("sig", NodeKind::Signal, Point::default()));
        doc.edges.push(stratgraph_core::graph::Edge::link(start, "sig".into()));
        let mut repo = LocalStrategyStore::new(MemoryStore::new());
        repo.save("u", &doc).unwrap();
        (repo, doc.id)
    }

    #[test]
    fn queued_edits_flush_then_autosave() {
        let (repo, id) = seeded();
        let t0 = Instant::now();
        let mut session =
            StrategySession::open(repo, "u", &id, &StoreConfig::default(), t0, wall(1)).unwrap();

        session.queue_edit("sig".into(), NodePatch::SetLabel("Breakout".into()), EditKind::Label, t0);
        let early = session.tick(t0 + Duration::from_millis(100), wall(1)).unwrap();
        assert_eq!(early.flushed, 0);

        let flushed = session.tick(t0 + Duration::from_millis(300), wall(2)).unwrap();
        assert_eq!(flushed.flushed, 1);
        assert_eq!(flushed.autosave, AutosaveOutcome::Idle);

        let saved = session.tick(t0 + Duration::from_millis(2300), wall(3)).unwrap();
        assert!(matches!(saved.autosave, AutosaveOutcome::Saved(_)));

        let mut repo = session.into_repository();
        let stored = repo.load("u", &id).unwrap();
        let sig = stored.nodes.iter().find(|n| n.id.as_str() == "sig").unwrap();
        assert_eq!(sig.label(), "Breakout");
        assert_eq!(stored.last_modified, wall(3));
    }

    #[test]
    fn close_flushes_pending_edits_synchronously() {
        let (repo, id) = seeded();
        let t0 = Instant::now();
        let mut session =
            StrategySession::open(repo, "u", &id, &StoreConfig::default(), t0, wall(1)).unwrap();
        session.queue_edit("sig".into(), NodePatch::SetLabel("Late".into()), EditKind::Label, t0);

        let report = session.close(wall(2)).unwrap();
        assert_eq!(report.flushed, 1);
        assert!(matches!(report.autosave, AutosaveOutcome::Saved(_)));
        assert!(!session.has_pending_edits());
    }

    #[test]
    fn removing_a_node_drops_its_pending_edits() {
        let (repo, id) = seeded();
        let t0 = Instant::now();
        let mut session =
            StrategySession::open(repo, "u", &id, &StoreConfig::default(), t0, wall(1)).unwrap();
        session.queue_edit("sig".into(), NodePatch::SetLabel("gone".into()), EditKind::Label, t0);
        session.remove_node(&"sig".into(), t0, wall(2)).unwrap();

        let report = session.close(wall(3)).unwrap();
        assert_eq!(report.flushed, 0);
        assert!(report.rejected.is_empty());
    }

    #[test]
    fn undo_after_open_has_nothing_to_undo() {
        let (repo, id) = seeded();
        let t0 = Instant::now();
        let mut session =
            StrategySession::open(repo, "u", &id, &StoreConfig::default(), t0, wall(1)).unwrap();
        assert!(!session.undo(t0));
        session
            .apply(t0, |store| store.update_node(&"sig".into(), NodePatch::SetLabel("x".into()), 5))
            .unwrap();
        assert!(session.undo(t0));
        assert!(session.redo(t0));
        assert_eq!(session.store().node(&"sig".into()).unwrap().label(), "x");
    }
}
