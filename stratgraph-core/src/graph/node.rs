//! Graph nodes and their per-kind data records.
//!
//! `data` is a discriminated union keyed by the node's `type`. On the wire a
//! node is `{id, type, position, data}`; the typed variant is decoded from
//! `data` according to `type`, so the kind and the data shape cannot disagree.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ast::{Expression, GroupCondition};
use crate::domain::{
    GlobalVariableUpdate, IndicatorDefinition, NodeId, NodeVariable, Position, TrailingVariable,
};

// ─── Node kinds ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Start,
    Entry,
    Exit,
    Signal,
    EntrySignal,
    ExitSignal,
    Action,
    Alert,
    End,
    ForceEnd,
    SquareOff,
    Modify,
    ReEntry,
    ReEntrySignal,
    Virtual,
    Overview,
}

impl NodeKind {
    pub const ALL: [NodeKind; 16] = [
        NodeKind::Start,
        NodeKind::Entry,
        NodeKind::Exit,
        NodeKind::Signal,
        NodeKind::EntrySignal,
        NodeKind::ExitSignal,
        NodeKind::Action,
        NodeKind::Alert,
        NodeKind::End,
        NodeKind::ForceEnd,
        NodeKind::SquareOff,
        NodeKind::Modify,
        NodeKind::ReEntry,
        NodeKind::ReEntrySignal,
        NodeKind::Virtual,
        NodeKind::Overview,
    ];

    /// Wire name (the node's `type`).
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Start => "start",
            NodeKind::Entry => "entry",
            NodeKind::Exit => "exit",
            NodeKind::Signal => "signal",
            NodeKind::EntrySignal => "entry-signal",
            NodeKind::ExitSignal => "exit-signal",
            NodeKind::Action => "action",
            NodeKind::Alert => "alert",
            NodeKind::End => "end",
            NodeKind::ForceEnd => "force-end",
            NodeKind::SquareOff => "square-off",
            NodeKind::Modify => "modify",
            NodeKind::ReEntry => "re-entry",
            NodeKind::ReEntrySignal => "re-entry-signal",
            NodeKind::Virtual => "virtual",
            NodeKind::Overview => "overview",
        }
    }

    /// Default label for a freshly created node.
    pub fn display_name(self) -> &'static str {
        match self {
            NodeKind::Start => "Start",
            NodeKind::Entry => "Entry",
            NodeKind::Exit => "Exit",
            NodeKind::Signal => "Signal",
            NodeKind::EntrySignal => "Entry Signal",
            NodeKind::ExitSignal => "Exit Signal",
            NodeKind::Action => "Action",
            NodeKind::Alert => "Alert",
            NodeKind::End => "End",
            NodeKind::ForceEnd => "Force End",
            NodeKind::SquareOff => "Square Off",
            NodeKind::Modify => "Modify",
            NodeKind::ReEntry => "Re-Entry",
            NodeKind::ReEntrySignal => "Re-Entry Signal",
            NodeKind::Virtual => "Virtual",
            NodeKind::Overview => "Overview",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown node type: {s}"))
    }
}

/// What an action-bearing node does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionRole {
    Entry,
    Exit,
    Alert,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

// ─── Per-kind data records ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartData {
    pub label: String,
    pub symbol: String,
    pub timeframe: String,
    pub indicators: Vec<IndicatorDefinition>,
    pub last_updated: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntryData {
    pub label: String,
    pub action_type: Option<ActionRole>,
    pub positions: Vec<Position>,
    pub variables: Vec<NodeVariable>,
    pub trailing_variables: Vec<TrailingVariable>,
    pub global_variable_updates: Vec<GlobalVariableUpdate>,
    pub last_updated: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExitData {
    pub label: String,
    pub action_type: Option<ActionRole>,
    /// Positions this exit closes; empty closes all.
    pub target_position_vpis: Vec<String>,
    pub variables: Vec<NodeVariable>,
    pub global_variable_updates: Vec<GlobalVariableUpdate>,
    pub last_updated: i64,
}

/// Shared by `signal`, `entry-signal` and `exit-signal`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignalData {
    pub label: String,
    pub conditions: GroupCondition,
    pub variables: Vec<NodeVariable>,
    pub last_updated: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionData {
    pub label: String,
    pub action_type: Option<ActionRole>,
    pub variables: Vec<NodeVariable>,
    pub global_variable_updates: Vec<GlobalVariableUpdate>,
    pub last_updated: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertData {
    pub label: String,
    pub action_type: Option<ActionRole>,
    pub message: String,
    pub channels: Vec<String>,
    pub global_variable_updates: Vec<GlobalVariableUpdate>,
    pub last_updated: i64,
}

/// `end` and `force-end`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TerminalData {
    pub label: String,
    pub last_updated: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SquareOffData {
    pub label: String,
    pub target_position_vpis: Vec<String>,
    pub last_updated: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModifyData {
    pub label: String,
    pub target_position_vpi: Option<String>,
    pub stop_loss: Option<Expression>,
    pub target: Option<Expression>,
    pub last_updated: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    pub max_entries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_entries: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReEntryData {
    pub label: String,
    pub conditions: GroupCondition,
    pub retry_config: RetryConfig,
    pub last_updated: i64,
}

/// A re-entry loop bound to one entry node.
///
/// `retry_config.max_entries` mirrors the target's first position and is
/// never edited directly; the outgoing edge exists iff a target is set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReEntrySignalData {
    pub label: String,
    pub conditions: GroupCondition,
    pub target_entry_node_id: Option<NodeId>,
    pub retry_config: RetryConfig,
    pub variables: Vec<NodeVariable>,
    pub last_updated: i64,
}

/// `virtual` and `overview` markers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarkerData {
    pub label: String,
    pub last_updated: i64,
}

// ─── Data union ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Start(StartData),
    Entry(EntryData),
    Exit(ExitData),
    Signal(SignalData),
    EntrySignal(SignalData),
    ExitSignal(SignalData),
    Action(ActionData),
    Alert(AlertData),
    End(TerminalData),
    ForceEnd(TerminalData),
    SquareOff(SquareOffData),
    Modify(ModifyData),
    ReEntry(ReEntryData),
    ReEntrySignal(ReEntrySignalData),
    Virtual(MarkerData),
    Overview(MarkerData),
}

/// Evaluate `$body` with `$d` bound to the inner record, whatever the variant.
macro_rules! with_data {
    ($data:expr, $d:ident => $body:expr) => {
        match $data {
            NodeData::Start($d) => $body,
            NodeData::Entry($d) => $body,
            NodeData::Exit($d) => $body,
            NodeData::Signal($d) | NodeData::EntrySignal($d) | NodeData::ExitSignal($d) => $body,
            NodeData::Action($d) => $body,
            NodeData::Alert($d) => $body,
            NodeData::End($d) | NodeData::ForceEnd($d) => $body,
            NodeData::SquareOff($d) => $body,
            NodeData::Modify($d) => $body,
            NodeData::ReEntry($d) => $body,
            NodeData::ReEntrySignal($d) => $body,
            NodeData::Virtual($d) | NodeData::Overview($d) => $body,
        }
    };
}

impl NodeData {
    /// Fresh data record for a new node of `kind`.
    pub fn default_for(kind: NodeKind) -> Self {
        let label = kind.display_name().to_string();
        match kind {
            NodeKind::Start => NodeData::Start(StartData {
                label,
                ..Default::default()
            }),
            NodeKind::Entry => NodeData::Entry(EntryData {
                label,
                action_type: Some(ActionRole::Entry),
                ..Default::default()
            }),
            NodeKind::Exit => NodeData::Exit(ExitData {
                label,
                action_type: Some(ActionRole::Exit),
                ..Default::default()
            }),
            NodeKind::Signal => NodeData::Signal(SignalData {
                label,
                ..Default::default()
            }),
            NodeKind::EntrySignal => NodeData::EntrySignal(SignalData {
                label,
                ..Default::default()
            }),
            NodeKind::ExitSignal => NodeData::ExitSignal(SignalData {
                label,
                ..Default::default()
            }),
            NodeKind::Action => NodeData::Action(ActionData {
                label,
                ..Default::default()
            }),
            NodeKind::Alert => NodeData::Alert(AlertData {
                label,
                action_type: Some(ActionRole::Alert),
                ..Default::default()
            }),
            NodeKind::End => NodeData::End(TerminalData {
                label,
                last_updated: 0,
            }),
            NodeKind::ForceEnd => NodeData::ForceEnd(TerminalData {
                label,
                last_updated: 0,
            }),
            NodeKind::SquareOff => NodeData::SquareOff(SquareOffData {
                label,
                ..Default::default()
            }),
            NodeKind::Modify => NodeData::Modify(ModifyData {
                label,
                ..Default::default()
            }),
            NodeKind::ReEntry => NodeData::ReEntry(ReEntryData {
                label,
                ..Default::default()
            }),
            NodeKind::ReEntrySignal => NodeData::ReEntrySignal(ReEntrySignalData {
                label,
                ..Default::default()
            }),
            NodeKind::Virtual => NodeData::Virtual(MarkerData {
                label,
                last_updated: 0,
            }),
            NodeKind::Overview => NodeData::Overview(MarkerData {
                label,
                last_updated: 0,
            }),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NodeData::Start(_) => NodeKind::Start,
            NodeData::Entry(_) => NodeKind::Entry,
            NodeData::Exit(_) => NodeKind::Exit,
            NodeData::Signal(_) => NodeKind::Signal,
            NodeData::EntrySignal(_) => NodeKind::EntrySignal,
            NodeData::ExitSignal(_) => NodeKind::ExitSignal,
            NodeData::Action(_) => NodeKind::Action,
            NodeData::Alert(_) => NodeKind::Alert,
            NodeData::End(_) => NodeKind::End,
            NodeData::ForceEnd(_) => NodeKind::ForceEnd,
            NodeData::SquareOff(_) => NodeKind::SquareOff,
            NodeData::Modify(_) => NodeKind::Modify,
            NodeData::ReEntry(_) => NodeKind::ReEntry,
            NodeData::ReEntrySignal(_) => NodeKind::ReEntrySignal,
            NodeData::Virtual(_) => NodeKind::Virtual,
            NodeData::Overview(_) => NodeKind::Overview,
        }
    }

    /// Decode the wire `data` object for a node of `kind`.
    ///
    /// Missing fields take their defaults; a `null` or absent object yields
    /// `default_for(kind)`.
    pub fn from_value(kind: NodeKind, value: Value) -> Result<Self, serde_json::Error> {
        if value.is_null() {
            return Ok(Self::default_for(kind));
        }
        Ok(match kind {
            NodeKind::Start => NodeData::Start(serde_json::from_value(value)?),
            NodeKind::Entry => NodeData::Entry(serde_json::from_value(value)?),
            NodeKind::Exit => NodeData::Exit(serde_json::from_value(value)?),
            NodeKind::Signal => NodeData::Signal(serde_json::from_value(value)?),
            NodeKind::EntrySignal => NodeData::EntrySignal(serde_json::from_value(value)?),
            NodeKind::ExitSignal => NodeData::ExitSignal(serde_json::from_value(value)?),
            NodeKind::Action => NodeData::Action(serde_json::from_value(value)?),
            NodeKind::Alert => NodeData::Alert(serde_json::from_value(value)?),
            NodeKind::End => NodeData::End(serde_json::from_value(value)?),
            NodeKind::ForceEnd => NodeData::ForceEnd(serde_json::from_value(value)?),
            NodeKind::SquareOff => NodeData::SquareOff(serde_json::from_value(value)?),
            NodeKind::Modify => NodeData::Modify(serde_json::from_value(value)?),
            NodeKind::ReEntry => NodeData::ReEntry(serde_json::from_value(value)?),
            NodeKind::ReEntrySignal => NodeData::ReEntrySignal(serde_json::from_value(value)?),
            NodeKind::Virtual => NodeData::Virtual(serde_json::from_value(value)?),
            NodeKind::Overview => NodeData::Overview(serde_json::from_value(value)?),
        })
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn label(&self) -> &str {
        with_data!(self, d => d.label.as_str())
    }

    pub fn set_label(&mut self, label: String) {
        with_data!(self, d => d.label = label)
    }

    pub fn last_updated(&self) -> i64 {
        with_data!(self, d => d.last_updated)
    }

    pub fn set_last_updated(&mut self, stamp: i64) {
        with_data!(self, d => d.last_updated = stamp)
    }

    pub fn action_type(&self) -> Option<ActionRole> {
        match self {
            NodeData::Entry(d) => d.action_type,
            NodeData::Exit(d) => d.action_type,
            NodeData::Action(d) => d.action_type,
            NodeData::Alert(d) => d.action_type,
            _ => None,
        }
    }

    /// The action role slot, for kinds that have one.
    pub fn action_type_mut(&mut self) -> Option<&mut Option<ActionRole>> {
        match self {
            NodeData::Entry(d) => Some(&mut d.action_type),
            NodeData::Exit(d) => Some(&mut d.action_type),
            NodeData::Action(d) => Some(&mut d.action_type),
            NodeData::Alert(d) => Some(&mut d.action_type),
            _ => None,
        }
    }

    pub fn conditions(&self) -> Option<&GroupCondition> {
        match self {
            NodeData::Signal(d) | NodeData::EntrySignal(d) | NodeData::ExitSignal(d) => {
                Some(&d.conditions)
            }
            NodeData::ReEntry(d) => Some(&d.conditions),
            NodeData::ReEntrySignal(d) => Some(&d.conditions),
            _ => None,
        }
    }

    pub fn conditions_mut(&mut self) -> Option<&mut GroupCondition> {
        match self {
            NodeData::Signal(d) | NodeData::EntrySignal(d) | NodeData::ExitSignal(d) => {
                Some(&mut d.conditions)
            }
            NodeData::ReEntry(d) => Some(&mut d.conditions),
            NodeData::ReEntrySignal(d) => Some(&mut d.conditions),
            _ => None,
        }
    }

    /// Snapshot variables, for kinds that can declare them.
    pub fn variables(&self) -> Option<&Vec<NodeVariable>> {
        match self {
            NodeData::Entry(d) => Some(&d.variables),
            NodeData::Exit(d) => Some(&d.variables),
            NodeData::Signal(d) | NodeData::EntrySignal(d) | NodeData::ExitSignal(d) => {
                Some(&d.variables)
            }
            NodeData::Action(d) => Some(&d.variables),
            NodeData::ReEntrySignal(d) => Some(&d.variables),
            _ => None,
        }
    }

    pub fn variables_mut(&mut self) -> Option<&mut Vec<NodeVariable>> {
        match self {
            NodeData::Entry(d) => Some(&mut d.variables),
            NodeData::Exit(d) => Some(&mut d.variables),
            NodeData::Signal(d) | NodeData::EntrySignal(d) | NodeData::ExitSignal(d) => {
                Some(&mut d.variables)
            }
            NodeData::Action(d) => Some(&mut d.variables),
            NodeData::ReEntrySignal(d) => Some(&mut d.variables),
            _ => None,
        }
    }

    /// Global variable assignments, for kinds that execute an action.
    pub fn global_variable_updates(&self) -> Option<&Vec<GlobalVariableUpdate>> {
        match self {
            NodeData::Entry(d) => Some(&d.global_variable_updates),
            NodeData::Exit(d) => Some(&d.global_variable_updates),
            NodeData::Action(d) => Some(&d.global_variable_updates),
            NodeData::Alert(d) => Some(&d.global_variable_updates),
            _ => None,
        }
    }

    pub fn global_variable_updates_mut(&mut self) -> Option<&mut Vec<GlobalVariableUpdate>> {
        match self {
            NodeData::Entry(d) => Some(&mut d.global_variable_updates),
            NodeData::Exit(d) => Some(&mut d.global_variable_updates),
            NodeData::Action(d) => Some(&mut d.global_variable_updates),
            NodeData::Alert(d) => Some(&mut d.global_variable_updates),
            _ => None,
        }
    }

    pub fn positions(&self) -> &[Position] {
        match self {
            NodeData::Entry(d) => d.positions.as_slice(),
            _ => &[],
        }
    }
}

// ─── Node ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawNode")]
pub struct Node {
    pub id: NodeId,
    pub position: Point,
    pub data: NodeData,
}

impl Node {
    pub fn new(kind: NodeKind, position: Point) -> Self {
        Self::with_id(NodeId::generate(), kind, position)
    }

    pub fn with_id(id: impl Into<NodeId>, kind: NodeKind, position: Point) -> Self {
        Self {
            id: id.into(),
            position,
            data: NodeData::default_for(kind),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }

    pub fn label(&self) -> &str {
        self.data.label()
    }
}

/// Wire shape of a node, with `data` still untyped.
#[derive(Debug, Clone, Deserialize)]
struct RawNode {
    id: NodeId,
    #[serde(rename = "type")]
    kind: NodeKind,
    position: Point,
    #[serde(default)]
    data: Value,
}

impl TryFrom<RawNode> for Node {
    type Error = serde_json::Error;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        Ok(Node {
            id: raw.id,
            position: raw.position,
            data: NodeData::from_value(raw.kind, raw.data)?,
        })
    }
}

#[derive(Serialize)]
struct WireNode<'a> {
    id: &'a NodeId,
    #[serde(rename = "type")]
    kind: NodeKind,
    position: &'a Point,
    data: &'a NodeData,
}

impl Serialize for Node {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireNode {
            id: &self.id,
            kind: self.kind(),
            position: &self.position,
            data: &self.data,
        }
        .serialize(serializer)
    }
}

/// The bare data record; the variant travels in the node's `type`.
impl Serialize for NodeData {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        with_data!(self, d => d.serialize(serializer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_round_trip_through_wire_names() {
        for kind in NodeKind::ALL {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
            assert_eq!(kind.as_str().parse::<NodeKind>().unwrap(), kind);
        }
    }

    #[test]
    fn node_decodes_data_by_type() {
        let json = r#"{
            "id": "n1",
            "type": "re-entry-signal",
            "position": {"x": 10.0, "y": 20.0},
            "data": {"label": "Retry", "targetEntryNodeId": "entry-1", "retryConfig": {"maxEntries": 3}}
        }"#;
        let node: Node = serde_json::from_str(json).unwrap();
        assert_eq!(node.kind(), NodeKind::ReEntrySignal);
        match &node.data {
            NodeData::ReEntrySignal(d) => {
                assert_eq!(d.target_entry_node_id, Some(NodeId::new("entry-1")));
                assert_eq!(d.retry_config.max_entries, 3);
                assert!(d.conditions.is_empty());
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn missing_data_uses_kind_defaults() {
        let json = r#"{"id": "x", "type": "exit", "position": {"x": 0, "y": 0}}"#;
        let node: Node = serde_json::from_str(json).unwrap();
        assert_eq!(node.data.action_type(), Some(ActionRole::Exit));
        assert_eq!(node.label(), "Exit");
    }

    #[test]
    fn serialized_node_carries_type_and_camel_case_data() {
        let node = Node::with_id("e1", NodeKind::Entry, Point::new(1.0, 2.0));
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "entry");
        assert_eq!(json["data"]["actionType"], "entry");
        assert!(json["data"]["globalVariableUpdates"].is_array());
        assert_eq!(json["data"]["lastUpdated"], 0);

        let back: Node = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn data_serializes_without_variant_tag() {
        let node = Node::with_id("r1", NodeKind::ReEntrySignal, Point::default());
        let data = node.data.to_value().unwrap();
        assert!(data.get("type").is_none());
        assert_eq!(data["retryConfig"]["maxEntries"], 1);
        assert_eq!(NodeData::from_value(NodeKind::ReEntrySignal, data).unwrap(), node.data);
    }

    #[test]
    fn accessors_follow_the_variant() {
        let mut node = Node::with_id("s1", NodeKind::EntrySignal, Point::default());
        assert!(node.data.conditions().is_some());
        assert!(node.data.global_variable_updates().is_none());
        node.data.set_label("Breakout".into());
        node.data.set_last_updated(42);
        assert_eq!(node.label(), "Breakout");
        assert_eq!(node.data.last_updated(), 42);
    }
}
