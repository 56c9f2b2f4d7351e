//! State hashing: deterministic identity of a strategy's editable content.
//!
//! The autosaver compares hashes to skip writes when nothing changed.

use serde::Serialize;
use tracing::warn;

use crate::domain::GlobalVariable;
use crate::graph::{Edge, Node};

/// BLAKE3 digest of (nodes, edges, globalVariables).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateHash(blake3::Hash);

impl StateHash {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }
}

impl std::fmt::Display for StateHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HashInput<'a> {
    nodes: &'a [Node],
    edges: &'a [Edge],
    global_variables: &'a [GlobalVariable],
}

/// Hash the canonical JSON of the graph state.
///
/// Records serialize in declaration order and maps are ordered, so equal
/// states hash equal regardless of how they were built.
pub fn state_hash(nodes: &[Node], edges: &[Edge], globals: &[GlobalVariable]) -> StateHash {
    let input = HashInput {
        nodes,
        edges,
        global_variables: globals,
    };
    let mut hasher = blake3::Hasher::new();
    if let Err(e) = serde_json::to_writer(&mut hasher, &input) {
        warn!(error = %e, "state hash input failed to serialize");
    }
    StateHash(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeKind, Point};

    #[test]
    fn equal_states_hash_equal() {
        let nodes = vec![Node::with_id("s", NodeKind::Start, Point::default())];
        let a = state_hash(&nodes, &[], &[]);
        let b = state_hash(&nodes.clone(), &[], &[]);
        assert_eq!(a, b);
        assert_eq!(a.to_hex().len(), 64);
    }

    #[test]
    fn hex_matches_blake3_encoding() {
        let hash = StateHash::from_bytes(b"stratgraph");
        assert_eq!(hash.to_hex(), blake3::hash(b"stratgraph").to_hex().as_str());
        assert_eq!(hash.to_string(), hash.to_hex());
    }

    #[test]
    fn any_change_changes_the_hash() {
        let mut nodes = vec![Node::with_id("s", NodeKind::Start, Point::default())];
        let before = state_hash(&nodes, &[], &[]);
        nodes[0].data.set_label("Open".into());
        assert_ne!(state_hash(&nodes, &[], &[]), before);

        let globals = vec![GlobalVariable::new("x")];
        assert_ne!(state_hash(&nodes, &[], &globals), state_hash(&nodes, &[], &[]));
    }
}
