//! The graph store: single owner of nodes, edges and global variables.
//!
//! Every tracked mutation validates first, applies in full, then pushes one
//! post-mutation snapshot onto the history. Failed mutations leave the store
//! exactly as it was.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::domain::stamp::next_stamp_at;
use crate::domain::{
    EdgeId, GlobalVariable, GlobalVariableId, NodeId, Position, PositionId,
};
use crate::fingerprint::{state_hash, StateHash};
use crate::reentry::resync_mirrors;
use crate::signals::{GraphSignal, SignalBus};
use crate::variables::{derive_trailing_variables, VariableError};

use super::edge::Edge;
use super::history::{History, Snapshot, DEFAULT_HISTORY_LIMIT};
use super::node::{Node, NodeData, NodeKind};
use super::patch::{check_local_vpis, NodePatch};

// ─── Error type ──────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),
    #[error("Node already exists: {0}")]
    DuplicateNode(NodeId),
    #[error("Unknown edge: {0}")]
    UnknownEdge(EdgeId),
    #[error("Edge would connect node {0} to itself")]
    SelfLoop(NodeId),
    #[error("Edge {from} -> {to} already exists")]
    DuplicateEdge { from: NodeId, to: NodeId },
    #[error("Edge id used more than once: {0}")]
    DuplicateEdgeId(EdgeId),
    #[error("{kind} node {node} cannot be an edge {end}")]
    NotConnectable {
        node: NodeId,
        kind: NodeKind,
        end: &'static str,
    },
    #[error("Outgoing edges of re-entry-signal node {0} follow its target selection")]
    ManagedEdge(NodeId),
    #[error("Refusing to replace {existing} edges with an empty set while connected nodes exist")]
    TransientEdgeWipe { existing: usize },
    #[error("VPI already in use: {0}")]
    DuplicateVpi(String),
    #[error("VPI must not be empty")]
    EmptyVpi,
    #[error("Unknown position {position} on node {node}")]
    UnknownPosition { node: NodeId, position: PositionId },
    #[error("Patch '{patch}' does not apply to {kind} nodes")]
    PatchNotApplicable { patch: &'static str, kind: NodeKind },
    #[error("Constant {0} is not a finite number")]
    NonFiniteConstant(f64),
    #[error("{field} is mirrored from the target entry node and cannot be edited")]
    MirroredField { field: &'static str },
    #[error("Unknown global variable: {0}")]
    UnknownGlobalVariable(GlobalVariableId),
    #[error("Global variable name already in use: {0}")]
    DuplicateGlobalVariable(String),
    #[error("Name must not be empty")]
    EmptyName,
    #[error(transparent)]
    Variable(#[from] VariableError),
}

// ─── Store ───────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct GraphStore {
    pub(crate) nodes: Vec<Node>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) global_variables: Vec<GlobalVariable>,
    history: History,
    /// Nodes that had at least one incident edge since the last history reset.
    connected: BTreeSet<NodeId>,
    signals: SignalBus,
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphStore {
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            global_variables: Vec::new(),
            history: History::with_limit(limit),
            connected: BTreeSet::new(),
            signals: SignalBus::default(),
        }
    }

    /// Replace the whole graph with a freshly loaded strategy and start a new
    /// history from it. Re-entry links are normalized before the baseline
    /// snapshot is taken.
    pub fn load(&mut self, nodes: Vec<Node>, edges: Vec<Edge>, globals: Vec<GlobalVariable>) {
        self.nodes = nodes;
        self.edges = edges;
        self.global_variables = globals;
        let resynced = self.resync_links();
        if resynced > 0 {
            debug!(resynced, "normalized re-entry links on load");
        }
        self.reset_history();
    }

    // ─── Accessors ───────────────────────────────────────────────────

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn global_variables(&self) -> &[GlobalVariable] {
        &self.global_variables
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn signals_mut(&mut self) -> &mut SignalBus {
        &mut self.signals
    }

    pub fn emit(&mut self, signal: GraphSignal) {
        self.signals.emit(signal);
    }

    /// Nodes that belong in exports (virtual markers excluded).
    pub fn exportable_nodes(&self) -> Vec<Node> {
        self.nodes
            .iter()
            .filter(|n| !n.kind().is_virtual())
            .cloned()
            .collect()
    }

    pub fn state_hash(&self) -> StateHash {
        state_hash(&self.nodes, &self.edges, &self.global_variables)
    }

    pub(crate) fn node_index(&self, id: &NodeId) -> Result<usize, GraphError> {
        self.nodes
            .iter()
            .position(|n| &n.id == id)
            .ok_or_else(|| GraphError::UnknownNode(id.clone()))
    }

    // ─── Raw setters & history ───────────────────────────────────────

    /// Replace all nodes. Untracked: pair with `add_history_item`.
    pub fn set_nodes(&mut self, nodes: Vec<Node>) {
        self.nodes = nodes;
        self.resync_links();
        self.note_connected();
    }

    /// Replace all edges. Untracked: pair with `add_history_item`.
    ///
    /// An empty set is refused while it would disconnect nodes that were
    /// connected earlier in this session; such a write is a transient state
    /// of the editor, not a user intent.
    pub fn set_edges(&mut self, edges: Vec<Edge>) -> Result<(), GraphError> {
        check_unique_edge_ids(&edges)?;
        if edges.is_empty() && !self.edges.is_empty() && self.has_connected_nodes() {
            warn!(
                existing = self.edges.len(),
                "refusing transient empty edge set"
            );
            return Err(GraphError::TransientEdgeWipe {
                existing: self.edges.len(),
            });
        }
        self.edges = edges;
        self.resync_links();
        self.note_connected();
        Ok(())
    }

    pub fn set_global_variables(&mut self, globals: Vec<GlobalVariable>) {
        self.global_variables = globals;
    }

    pub fn add_history_item(&mut self, nodes: Vec<Node>, edges: Vec<Edge>) {
        self.history.push(Snapshot { nodes, edges });
    }

    /// Start a new history from the current state. Call once per loaded strategy.
    pub fn reset_history(&mut self) {
        self.history.reset(self.snapshot());
        self.connected.clear();
        self.note_connected();
    }

    pub fn undo(&mut self) -> bool {
        match self.history.undo().cloned() {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo().cloned() {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub(crate) fn commit(&mut self) {
        self.history.push(self.snapshot());
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.nodes = snapshot.nodes;
        self.edges = snapshot.edges;
        self.resync_links();
        self.note_connected();
    }

    /// Re-mirror every re-entry link after a bulk replacement.
    ///
    /// Bulk setters carry no clock; touched nodes are stamped no earlier than
    /// the newest `lastUpdated` in the graph.
    fn resync_links(&mut self) -> usize {
        let now = self
            .nodes
            .iter()
            .map(|n| n.data.last_updated())
            .max()
            .unwrap_or_default();
        let resynced = resync_mirrors(&mut self.nodes, &mut self.edges, now);
        if resynced > 0 {
            self.signals.emit(GraphSignal::EdgesRefresh);
        }
        resynced
    }

    pub(crate) fn note_connected(&mut self) {
        for edge in &self.edges {
            self.connected.insert(edge.source.clone());
            self.connected.insert(edge.target.clone());
        }
    }

    fn has_connected_nodes(&self) -> bool {
        self.nodes
            .iter()
            .any(|n| n.kind().is_connectable() && self.connected.contains(&n.id))
    }

    // ─── Nodes ───────────────────────────────────────────────────────

    pub fn add_node(&mut self, mut node: Node) -> Result<(), GraphError> {
        if self.node(&node.id).is_some() {
            return Err(GraphError::DuplicateNode(node.id));
        }
        if let NodeData::Entry(d) = &mut node.data {
            check_local_vpis(&d.positions)?;
            self.check_global_vpis(&node.id, &d.positions)?;
            d.trailing_variables = derive_trailing_variables(&d.positions, &d.trailing_variables);
        }
        debug!(node = %node.id, kind = %node.kind(), "add node");
        self.nodes.push(node);
        self.commit();
        Ok(())
    }

    /// Remove a node with its incident edges. Re-entry nodes targeting it
    /// lose their target.
    pub fn remove_node(&mut self, id: &NodeId, now: i64) -> Result<Node, GraphError> {
        let idx = self.node_index(id)?;
        let removed = self.nodes.remove(idx);
        self.edges.retain(|e| !e.touches(id));
        let resynced = resync_mirrors(&mut self.nodes, &mut self.edges, now);
        debug!(node = %id, resynced, "remove node");
        self.commit();
        if resynced > 0 {
            self.signals.emit(GraphSignal::EdgesRefresh);
        }
        Ok(removed)
    }

    /// Merge `patch` into the node's data and stamp `lastUpdated`.
    pub fn update_node(&mut self, id: &NodeId, patch: NodePatch, now: i64) -> Result<(), GraphError> {
        self.apply_patches(id, std::slice::from_ref(&patch), now)
    }

    /// Apply several patches to one node as a single history entry.
    pub fn apply_patches(
        &mut self,
        id: &NodeId,
        patches: &[NodePatch],
        now: i64,
    ) -> Result<(), GraphError> {
        if patches.is_empty() {
            return Ok(());
        }
        self.patch_node(id, patches, now)?;
        self.commit();
        Ok(())
    }

    /// Apply a patch without recording history (mount-time corrections).
    pub fn correct_node(&mut self, id: &NodeId, patch: NodePatch, now: i64) -> Result<(), GraphError> {
        self.patch_node(id, std::slice::from_ref(&patch), now)
    }

    fn patch_node(&mut self, id: &NodeId, patches: &[NodePatch], now: i64) -> Result<(), GraphError> {
        let idx = self.node_index(id)?;
        let mut data = self.nodes[idx].data.clone();
        let mut positions_changed = false;
        for patch in patches {
            if let NodePatch::SetPositions(positions) = patch {
                self.check_global_vpis(id, positions)?;
                positions_changed = true;
            }
            patch.apply(&mut data)?;
        }
        data.set_last_updated(next_stamp_at(data.last_updated(), now));
        self.nodes[idx].data = data;

        if positions_changed {
            resync_mirrors(&mut self.nodes, &mut self.edges, now);
        }
        debug!(node = %id, patches = patches.len(), "patched node");
        Ok(())
    }

    // ─── Edges ───────────────────────────────────────────────────────

    /// Connect `source -> target`. Virtual markers take no edges and the
    /// start node is never a target.
    pub fn add_edge(&mut self, source: &NodeId, target: &NodeId) -> Result<EdgeId, GraphError> {
        let source_kind = self
            .node(source)
            .map(Node::kind)
            .ok_or_else(|| GraphError::UnknownNode(source.clone()))?;
        let target_kind = self
            .node(target)
            .map(Node::kind)
            .ok_or_else(|| GraphError::UnknownNode(target.clone()))?;
        if source == target {
            return Err(GraphError::SelfLoop(source.clone()));
        }
        if source_kind.is_virtual() {
            return Err(GraphError::NotConnectable {
                node: source.clone(),
                kind: source_kind,
                end: "source",
            });
        }
        if !target_kind.is_connectable() {
            return Err(GraphError::NotConnectable {
                node: target.clone(),
                kind: target_kind,
                end: "target",
            });
        }
        if source_kind == NodeKind::ReEntrySignal {
            return Err(GraphError::ManagedEdge(source.clone()));
        }
        if self
            .edges
            .iter()
            .any(|e| &e.source == source && &e.target == target)
        {
            return Err(GraphError::DuplicateEdge {
                from: source.clone(),
                to: target.clone(),
            });
        }

        let edge = Edge::link(source.clone(), target.clone());
        let id = edge.id.clone();
        self.edges.push(edge);
        self.note_connected();
        self.commit();
        Ok(id)
    }

    /// Remove an edge. Removing a re-entry link also clears the target.
    pub fn remove_edge(&mut self, id: &EdgeId, now: i64) -> Result<Edge, GraphError> {
        let idx = self
            .edges
            .iter()
            .position(|e| &e.id == id)
            .ok_or_else(|| GraphError::UnknownEdge(id.clone()))?;
        let edge = self.edges.remove(idx);

        if let Some(node) = self.nodes.iter_mut().find(|n| n.id == edge.source) {
            if let NodeData::ReEntrySignal(d) = &mut node.data {
                if d.target_entry_node_id.as_ref() == Some(&edge.target) {
                    d.target_entry_node_id = None;
                    d.retry_config.max_entries = 1;
                    d.last_updated = next_stamp_at(d.last_updated, now);
                }
            }
        }
        self.commit();
        Ok(edge)
    }

    // ─── Positions ───────────────────────────────────────────────────

    /// True if any position other than `except` already uses `vpi`.
    pub fn vpi_in_use(&self, vpi: &str, except: Option<&PositionId>) -> bool {
        let vpi = vpi.trim();
        self.nodes
            .iter()
            .flat_map(|n| n.data.positions())
            .any(|p| p.vpi.trim() == vpi && Some(&p.id) != except)
    }

    fn check_global_vpis(&self, owner: &NodeId, positions: &[Position]) -> Result<(), GraphError> {
        let taken: BTreeSet<&str> = self
            .nodes
            .iter()
            .filter(|n| &n.id != owner)
            .flat_map(|n| n.data.positions())
            .map(|p| p.vpi.trim())
            .collect();
        match positions.iter().find(|p| taken.contains(p.vpi.trim())) {
            Some(p) => Err(GraphError::DuplicateVpi(p.vpi.trim().to_string())),
            None => Ok(()),
        }
    }

    pub fn add_position(
        &mut self,
        node_id: &NodeId,
        mut position: Position,
        now: i64,
    ) -> Result<PositionId, GraphError> {
        let idx = self.node_index(node_id)?;
        let node = &self.nodes[idx];
        if node.kind() != NodeKind::Entry {
            return Err(GraphError::PatchNotApplicable {
                patch: "positions",
                kind: node.kind(),
            });
        }
        position.source_node_id = node_id.clone();
        let id = position.id.clone();
        let mut positions = node.data.positions().to_vec();
        positions.push(position);

        self.patch_node(node_id, &[NodePatch::SetPositions(positions)], now)?;
        self.commit();
        Ok(id)
    }

    pub fn set_position_vpi(
        &mut self,
        node_id: &NodeId,
        position_id: &PositionId,
        vpi: &str,
        now: i64,
    ) -> Result<(), GraphError> {
        let vpi = vpi.trim();
        if vpi.is_empty() {
            return Err(GraphError::EmptyVpi);
        }
        if self.vpi_in_use(vpi, Some(position_id)) {
            return Err(GraphError::DuplicateVpi(vpi.to_string()));
        }
        let idx = self.node_index(node_id)?;
        let mut positions = self.nodes[idx].data.positions().to_vec();
        let position = positions
            .iter_mut()
            .find(|p| &p.id == position_id)
            .ok_or_else(|| GraphError::UnknownPosition {
                node: node_id.clone(),
                position: position_id.clone(),
            })?;
        position.vpi = vpi.to_string();

        self.patch_node(node_id, &[NodePatch::SetPositions(positions)], now)?;
        self.commit();
        Ok(())
    }

    // ─── Global variables ────────────────────────────────────────────

    fn check_global_name(&self, name: &str, except: Option<&GlobalVariableId>) -> Result<(), GraphError> {
        if name.is_empty() {
            return Err(GraphError::EmptyName);
        }
        let key = name.to_lowercase();
        if self
            .global_variables
            .iter()
            .any(|gv| gv.name.trim().to_lowercase() == key && Some(&gv.id) != except)
        {
            return Err(GraphError::DuplicateGlobalVariable(name.to_string()));
        }
        Ok(())
    }

    pub fn add_global_variable(&mut self, name: &str) -> Result<GlobalVariableId, GraphError> {
        let name = name.trim();
        self.check_global_name(name, None)?;
        let gv = GlobalVariable::new(name);
        let id = gv.id.clone();
        self.global_variables.push(gv);
        Ok(id)
    }

    /// Rename a global variable and refresh every cached reference to it.
    ///
    /// Returns the number of references rewritten.
    pub fn rename_global_variable(
        &mut self,
        id: &GlobalVariableId,
        name: &str,
        now: i64,
    ) -> Result<usize, GraphError> {
        let name = name.trim();
        self.check_global_name(name, Some(id))?;
        let gv = self
            .global_variables
            .iter_mut()
            .find(|gv| &gv.id == id)
            .ok_or_else(|| GraphError::UnknownGlobalVariable(id.clone()))?;
        gv.name = name.to_string();

        let mut rewritten = 0;
        for node in &mut self.nodes {
            let n = rename_references(&mut node.data, id, name);
            if n > 0 {
                node.data
                    .set_last_updated(next_stamp_at(node.data.last_updated(), now));
                rewritten += n;
            }
        }
        if rewritten > 0 {
            self.commit();
        }
        Ok(rewritten)
    }

    /// Remove a global variable and every assignment that targets it.
    pub fn remove_global_variable(
        &mut self,
        id: &GlobalVariableId,
        now: i64,
    ) -> Result<GlobalVariable, GraphError> {
        let idx = self
            .global_variables
            .iter()
            .position(|gv| &gv.id == id)
            .ok_or_else(|| GraphError::UnknownGlobalVariable(id.clone()))?;
        let removed = self.global_variables.remove(idx);

        let mut stripped = 0;
        for node in &mut self.nodes {
            let stamp = next_stamp_at(node.data.last_updated(), now);
            if let Some(updates) = node.data.global_variable_updates_mut() {
                let before = updates.len();
                updates.retain(|u| &u.global_variable_id != id);
                if updates.len() != before {
                    stripped += before - updates.len();
                    node.data.set_last_updated(stamp);
                }
            }
        }
        debug!(variable = %id, stripped, "removed global variable");
        if stripped > 0 {
            self.commit();
        }
        Ok(removed)
    }
}

/// Refresh cached names of `id` in every expression and assignment of a node.
fn rename_references(data: &mut NodeData, id: &GlobalVariableId, name: &str) -> usize {
    let key = id.as_str();
    let mut n = 0;
    if let Some(tree) = data.conditions_mut() {
        n += tree.rename_global_variable(key, name);
    }
    if let Some(vars) = data.variables_mut() {
        n += vars
            .iter_mut()
            .map(|v| v.expression.rename_global_variable(key, name))
            .sum::<usize>();
    }
    if let Some(updates) = data.global_variable_updates_mut() {
        for update in updates.iter_mut() {
            if &update.global_variable_id == id && update.global_variable_name != name {
                update.global_variable_name = name.to_string();
                n += 1;
            }
            n += update.expression.rename_global_variable(key, name);
        }
    }
    if let NodeData::Modify(d) = data {
        for level in [&mut d.stop_loss, &mut d.target].into_iter().flatten() {
            n += level.rename_global_variable(key, name);
        }
    }
    n
}

fn check_unique_edge_ids(edges: &[Edge]) -> Result<(), GraphError> {
    let mut seen = BTreeSet::new();
    match edges.iter().find(|e| !seen.insert(&e.id)) {
        Some(dup) => Err(GraphError::DuplicateEdgeId(dup.id.clone())),
        None => Ok(()),
    }
}
