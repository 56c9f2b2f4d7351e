//! The three variable namespaces a node can carry, plus strategy-wide globals.

use super::ids::{GlobalVariableId, NodeId, PositionId, VariableId};
use super::position::TrailingConfig;
use crate::ast::Expression;
use serde::{Deserialize, Serialize};

/// A user-defined named expression scoped to one node ("snapshot variable").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeVariable {
    pub id: VariableId,
    pub name: String,
    pub expression: Expression,
    pub node_id: NodeId,
}

/// Wire tag carried by every trailing variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailingTag {
    #[default]
    Trailing,
}

/// Which price a trailing variable follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailingSource {
    /// The position's own premium/price.
    Position,
    /// The underlying instrument (option positions only).
    Underlying,
}

impl TrailingSource {
    pub fn suffix(self) -> &'static str {
        match self {
            TrailingSource::Position => "Position",
            TrailingSource::Underlying => "Underlying",
        }
    }
}

/// A derived variable exposing a position's trailing-stop level.
///
/// Never created by users directly: see `variables::derive_trailing_variables`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailingVariable {
    pub id: VariableId,
    pub name: String,
    #[serde(rename = "type", default)]
    pub tag: TrailingTag,
    pub position_id: PositionId,
    #[serde(default = "default_source")]
    pub source: TrailingSource,
    pub config: TrailingConfig,
}

fn default_source() -> TrailingSource {
    TrailingSource::Position
}

/// A strategy-wide named value, written by per-node assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalVariable {
    pub id: GlobalVariableId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_value: Option<f64>,
    #[serde(default)]
    pub description: String,
}

impl GlobalVariable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: GlobalVariableId::generate(),
            name: name.into(),
            initial_value: None,
            description: String::new(),
        }
    }
}

/// Assigns a value to one global variable when the owning node executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalVariableUpdate {
    pub id: VariableId,
    pub global_variable_id: GlobalVariableId,
    /// Cached name, used to re-resolve the target when ids churn.
    pub global_variable_name: String,
    pub expression: Expression,
}
