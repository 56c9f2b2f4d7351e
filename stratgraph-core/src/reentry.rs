//! Re-entry linking: binds a `re-entry-signal` node to the entry it re-enters.
//!
//! The node's `targetEntryNodeId`, its single outgoing edge and its mirrored
//! `retryConfig.maxEntries` always move together.

use std::collections::BTreeMap;

use tracing::info;

use crate::domain::stamp::next_stamp_at;
use crate::domain::NodeId;
use crate::graph::{Edge, GraphStore, Node, NodeData, NodeKind};
use crate::signals::GraphSignal;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReEntryError {
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),
    #[error("Node {node} is a {kind} node, not a re-entry-signal node")]
    NotReEntrySignal { node: NodeId, kind: NodeKind },
    #[error("Target node {0} does not exist")]
    UnknownTarget(NodeId),
    #[error("Target node {node} is a {kind} node; only entry nodes can be re-entered")]
    TargetNotEntry { node: NodeId, kind: NodeKind },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReEntryWarning {
    TargetRequired { node: NodeId },
}

impl std::fmt::Display for ReEntryWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReEntryWarning::TargetRequired { node } => {
                write!(f, "Re-entry signal {node} needs a target entry node")
            }
        }
    }
}

/// `maxEntries` of the target's first position, or 1 without a target.
pub fn mirrored_max_entries(nodes: &[Node], target: Option<&NodeId>) -> u32 {
    target
        .and_then(|t| nodes.iter().find(|n| &n.id == t))
        .and_then(|n| n.data.positions().first())
        .map_or(1, |p| p.max_entries)
}

/// Point a re-entry-signal node at `target` (or unlink it with `None`).
///
/// Data and edge change together and land as one history entry.
pub fn select_target(
    store: &mut GraphStore,
    node_id: &NodeId,
    target: Option<&NodeId>,
    now: i64,
) -> Result<(), ReEntryError> {
    let idx = store
        .node_index(node_id)
        .map_err(|_| ReEntryError::UnknownNode(node_id.clone()))?;
    let kind = store.nodes[idx].kind();
    if kind != NodeKind::ReEntrySignal {
        return Err(ReEntryError::NotReEntrySignal {
            node: node_id.clone(),
            kind,
        });
    }
    if let Some(t) = target {
        let target_node = store
            .node(t)
            .ok_or_else(|| ReEntryError::UnknownTarget(t.clone()))?;
        if target_node.kind() != NodeKind::Entry {
            return Err(ReEntryError::TargetNotEntry {
                node: t.clone(),
                kind: target_node.kind(),
            });
        }
    }

    let max_entries = mirrored_max_entries(&store.nodes, target);
    if let NodeData::ReEntrySignal(d) = &mut store.nodes[idx].data {
        d.target_entry_node_id = target.cloned();
        d.retry_config.max_entries = max_entries;
        d.last_updated = next_stamp_at(d.last_updated, now);
    }
    let kept = target.and_then(|t| {
        store
            .edges
            .iter()
            .find(|e| &e.source == node_id && &e.target == t)
            .cloned()
    });
    store.edges.retain(|e| &e.source != node_id);
    if let Some(t) = target {
        store
            .edges
            .push(kept.unwrap_or_else(|| Edge::link(node_id.clone(), t.clone())));
    }
    store.note_connected();
    store.commit();
    store.emit(GraphSignal::EdgesRefresh);

    info!(node = %node_id, target = ?target.map(NodeId::as_str), max_entries, "re-entry target selected");
    Ok(())
}

/// Re-establish every re-entry link after entry nodes changed or vanished.
///
/// Mirrors `maxEntries` from each target, clears targets that no longer
/// exist, and makes outgoing edges match the target. A node left without a
/// target but with a single edge to an entry node adopts that entry.
/// Returns the number of re-entry nodes touched.
pub fn resync_mirrors(nodes: &mut [Node], edges: &mut Vec<Edge>, now: i64) -> usize {
    let entry_max: BTreeMap<NodeId, u32> = nodes
        .iter()
        .filter(|n| n.kind() == NodeKind::Entry)
        .map(|n| {
            let max = n.data.positions().first().map_or(1, |p| p.max_entries);
            (n.id.clone(), max)
        })
        .collect();

    let mut touched = 0;
    for node in nodes.iter_mut() {
        let NodeData::ReEntrySignal(d) = &mut node.data else {
            continue;
        };
        let id = &node.id;
        let mut changed = false;

        let dangling = d
            .target_entry_node_id
            .as_ref()
            .is_some_and(|t| !entry_max.contains_key(t));
        if dangling {
            d.target_entry_node_id = None;
            changed = true;
        }

        let outgoing: Vec<&Edge> = edges.iter().filter(|e| &e.source == id).collect();
        if d.target_entry_node_id.is_none() {
            if let [only] = outgoing.as_slice() {
                if !dangling && entry_max.contains_key(&only.target) {
                    d.target_entry_node_id = Some(only.target.clone());
                    changed = true;
                }
            }
        }

        let consistent = match &d.target_entry_node_id {
            Some(t) => matches!(outgoing.as_slice(), [only] if &only.target == t),
            None => outgoing.is_empty(),
        };
        if !consistent {
            edges.retain(|e| &e.source != id);
            if let Some(t) = &d.target_entry_node_id {
                edges.push(Edge::link(id.clone(), t.clone()));
            }
            changed = true;
        }

        let expected = d
            .target_entry_node_id
            .as_ref()
            .and_then(|t| entry_max.get(t).copied())
            .unwrap_or(1);
        if d.retry_config.max_entries != expected {
            d.retry_config.max_entries = expected;
            changed = true;
        }

        if changed {
            d.last_updated = next_stamp_at(d.last_updated, now);
            touched += 1;
        }
    }
    touched
}

/// "Target required" while entry nodes exist but none is selected.
pub fn target_warning(store: &GraphStore, node_id: &NodeId) -> Option<ReEntryWarning> {
    let node = store.node(node_id)?;
    let NodeData::ReEntrySignal(d) = &node.data else {
        return None;
    };
    let has_entries = store.nodes().iter().any(|n| n.kind() == NodeKind::Entry);
    (d.target_entry_node_id.is_none() && has_entries).then(|| ReEntryWarning::TargetRequired {
        node: node_id.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Position;
    use crate::graph::{NodePatch, Point};

    fn entry_with_max(id: &str, vpi: &str, max: u32) -> Node {
        let mut node = Node::with_id(id, NodeKind::Entry, Point::default());
        if let NodeData::Entry(d) = &mut node.data {
            let mut pos = Position::new(vpi, NodeId::new(id));
            pos.max_entries = max;
            d.positions.push(pos);
        }
        node
    }

    fn store() -> GraphStore {
        let mut store = GraphStore::new();
        store.load(
            vec![
                entry_with_max("e1", "p1", 3),
                entry_with_max("e2", "p2", 7),
                Node::with_id("r", NodeKind::ReEntrySignal, Point::default()),
                Node::with_id("x", NodeKind::Exit, Point::default()),
            ],
            Vec::new(),
            Vec::new(),
        );
        store
    }

    fn outgoing(store: &GraphStore, id: &str) -> Vec<NodeId> {
        store
            .edges()
            .iter()
            .filter(|e| e.source.as_str() == id)
            .map(|e| e.target.clone())
            .collect()
    }

    fn mirrored(store: &GraphStore, id: &str) -> (Option<NodeId>, u32) {
        match &store.node(&id.into()).unwrap().data {
            NodeData::ReEntrySignal(d) => (d.target_entry_node_id.clone(), d.retry_config.max_entries),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn switching_targets_keeps_one_edge_and_one_history_entry_each() {
        let mut store = store();
        let r = NodeId::new("r");
        let before = store.history().len();

        select_target(&mut store, &r, Some(&"e1".into()), 10).unwrap();
        assert_eq!(outgoing(&store, "r"), vec![NodeId::new("e1")]);
        assert_eq!(mirrored(&store, "r"), (Some("e1".into()), 3));

        select_target(&mut store, &r, Some(&"e2".into()), 11).unwrap();
        assert_eq!(outgoing(&store, "r"), vec![NodeId::new("e2")]);
        assert_eq!(mirrored(&store, "r").1, 7);

        select_target(&mut store, &r, None, 12).unwrap();
        assert!(outgoing(&store, "r").is_empty());
        assert_eq!(mirrored(&store, "r"), (None, 1));
        assert_eq!(store.history().len(), before + 3);
    }

    #[test]
    fn target_must_be_an_existing_entry() {
        let mut store = store();
        let r = NodeId::new("r");
        assert_eq!(
            select_target(&mut store, &r, Some(&"x".into()), 1),
            Err(ReEntryError::TargetNotEntry {
                node: "x".into(),
                kind: NodeKind::Exit
            })
        );
        assert!(matches!(
            select_target(&mut store, &r, Some(&"ghost".into()), 1),
            Err(ReEntryError::UnknownTarget(_))
        ));
        assert!(matches!(
            select_target(&mut store, &"e1".into(), None, 1),
            Err(ReEntryError::NotReEntrySignal { .. })
        ));
    }

    #[test]
    fn entry_edits_re_mirror_without_touching_edges() {
        let mut store = store();
        let r = NodeId::new("r");
        select_target(&mut store, &r, Some(&"e1".into()), 10).unwrap();
        let edges_before = store.edges().to_vec();

        let mut positions = store.node(&"e1".into()).unwrap().data.positions().to_vec();
        positions[0].max_entries = 5;
        store
            .update_node(&"e1".into(), NodePatch::SetPositions(positions), 20)
            .unwrap();

        assert_eq!(mirrored(&store, "r").1, 5);
        assert_eq!(store.edges(), edges_before.as_slice());
    }

    #[test]
    fn deleting_the_target_clears_the_link() {
        let mut store = store();
        let r = NodeId::new("r");
        select_target(&mut store, &r, Some(&"e1".into()), 10).unwrap();
        store.remove_node(&"e1".into(), 20).unwrap();
        assert_eq!(mirrored(&store, "r"), (None, 1));
        assert!(outgoing(&store, "r").is_empty());
        assert!(target_warning(&store, &r).is_some());
    }

    #[test]
    fn warning_only_when_entries_exist() {
        let mut store = GraphStore::new();
        store.load(
            vec![Node::with_id("r", NodeKind::ReEntrySignal, Point::default())],
            Vec::new(),
            Vec::new(),
        );
        assert_eq!(target_warning(&store, &"r".into()), None);
    }

    #[test]
    fn resync_adopts_a_lone_legacy_edge() {
        let mut nodes = vec![
            entry_with_max("e1", "p1", 4),
            Node::with_id("r", NodeKind::ReEntrySignal, Point::default()),
        ];
        let mut edges = vec![Edge::link("r".into(), "e1".into())];
        assert_eq!(resync_mirrors(&mut nodes, &mut edges, 1), 1);
        match &nodes[1].data {
            NodeData::ReEntrySignal(d) => {
                assert_eq!(d.target_entry_node_id, Some(NodeId::new("e1")));
                assert_eq!(d.retry_config.max_entries, 4);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(edges.len(), 1);
        assert_eq!(resync_mirrors(&mut nodes, &mut edges, 2), 0);
    }
}
