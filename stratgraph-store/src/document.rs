//! The persisted strategy document.
//!
//! Field names are camelCase and timestamps RFC 3339 on the wire:
//! `{ id, name, nodes, edges, globalVariables, created, lastModified,
//! description, userId?, strategyId? }`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stratgraph_core::domain::{GlobalVariable, NodeId, StrategyId};
use stratgraph_core::graph::{Edge, GraphStore, Node, NodeKind, Point};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyDocument {
    pub id: StrategyId,
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub global_variables: Vec<GlobalVariable>,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_id: Option<StrategyId>,
}

impl StrategyDocument {
    /// A new strategy holding only its `start` node.
    pub fn new(name: impl Into<String>, user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        let id = StrategyId::generate();
        Self {
            strategy_id: Some(id.clone()),
            id,
            name: name.into(),
            nodes: vec![Node::with_id(
                NodeId::generate(),
                NodeKind::Start,
                Point::new(250.0, 50.0),
            )],
            edges: Vec::new(),
            global_variables: Vec::new(),
            created: now,
            last_modified: now,
            description: String::new(),
            user_id: Some(user_id.into()),
        }
    }

    pub fn summary(&self) -> StrategySummary {
        StrategySummary {
            id: self.id.clone(),
            name: self.name.clone(),
            created: self.created,
            last_modified: self.last_modified,
            description: self.description.clone(),
        }
    }

    /// Copy the editable state out of a graph store.
    pub fn capture(&mut self, store: &GraphStore, now: DateTime<Utc>) {
        self.nodes = store.nodes().to_vec();
        self.edges = store.edges().to_vec();
        self.global_variables = store.global_variables().to_vec();
        self.last_modified = now;
    }

    /// Load the document into a store, starting a fresh history.
    pub fn load_into(&self, store: &mut GraphStore) {
        store.load(
            self.nodes.clone(),
            self.edges.clone(),
            self.global_variables.clone(),
        );
    }
}

/// One entry of a user's strategy list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategySummary {
    pub id: StrategyId,
    pub name: String,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
}
