//! Node type registry: per-kind role, editor, and mount-time normalisation.
//!
//! Dispatch is a closed enum; adding a node kind fails to compile until every
//! match here handles it.

use tracing::debug;

use crate::graph::{ActionRole, GraphError, GraphStore, Node, NodeKind, NodePatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    Start,
    Entry,
    Exit,
    Signal,
    Action,
    Alert,
    Terminal,
    SquareOff,
    Modify,
    ReEntry,
    ReEntrySignal,
    Marker,
}

/// The property editor shown for a selected node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditorKind {
    Start,
    Entry,
    Exit,
    Signal,
    Action,
    Alert,
    Terminal,
    SquareOff,
    Modify,
    ReEntry,
    ReEntrySignal,
    /// Read-only summary for virtual and overview markers.
    Marker,
}

/// A panel inside an editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditorSection {
    Label,
    Instrument,
    Indicators,
    Conditions,
    Positions,
    TargetPositions,
    Variables,
    GlobalVariables,
    Message,
    RetryConfig,
    TargetEntry,
    ModifyLevels,
}

impl EditorKind {
    pub fn sections(self) -> &'static [EditorSection] {
        use EditorSection::*;
        match self {
            EditorKind::Start => &[Label, Instrument, Indicators],
            EditorKind::Entry => &[Label, Positions, Variables, GlobalVariables],
            EditorKind::Exit => &[Label, TargetPositions, Variables, GlobalVariables],
            EditorKind::Signal => &[Label, Conditions, Variables],
            EditorKind::Action => &[Label, Variables, GlobalVariables],
            EditorKind::Alert => &[Label, Message, GlobalVariables],
            EditorKind::Terminal => &[Label],
            EditorKind::SquareOff => &[Label, TargetPositions],
            EditorKind::Modify => &[Label, ModifyLevels],
            EditorKind::ReEntry => &[Label, Conditions, RetryConfig],
            EditorKind::ReEntrySignal => &[Label, TargetEntry, Conditions, Variables],
            EditorKind::Marker => &[],
        }
    }
}

impl NodeKind {
    pub fn role(self) -> NodeRole {
        match self {
            NodeKind::Start => NodeRole::Start,
            NodeKind::Entry => NodeRole::Entry,
            NodeKind::Exit => NodeRole::Exit,
            NodeKind::Signal | NodeKind::EntrySignal | NodeKind::ExitSignal => NodeRole::Signal,
            NodeKind::Action => NodeRole::Action,
            NodeKind::Alert => NodeRole::Alert,
            NodeKind::End | NodeKind::ForceEnd => NodeRole::Terminal,
            NodeKind::SquareOff => NodeRole::SquareOff,
            NodeKind::Modify => NodeRole::Modify,
            NodeKind::ReEntry => NodeRole::ReEntry,
            NodeKind::ReEntrySignal => NodeRole::ReEntrySignal,
            NodeKind::Virtual | NodeKind::Overview => NodeRole::Marker,
        }
    }

    pub fn editor(self) -> EditorKind {
        match self.role() {
            NodeRole::Start => EditorKind::Start,
            NodeRole::Entry => EditorKind::Entry,
            NodeRole::Exit => EditorKind::Exit,
            NodeRole::Signal => EditorKind::Signal,
            NodeRole::Action => EditorKind::Action,
            NodeRole::Alert => EditorKind::Alert,
            NodeRole::Terminal => EditorKind::Terminal,
            NodeRole::SquareOff => EditorKind::SquareOff,
            NodeRole::Modify => EditorKind::Modify,
            NodeRole::ReEntry => EditorKind::ReEntry,
            NodeRole::ReEntrySignal => EditorKind::ReEntrySignal,
            NodeRole::Marker => EditorKind::Marker,
        }
    }

    /// Role forced by the kind's editor, regardless of stored data.
    pub fn fixed_action_role(self) -> Option<ActionRole> {
        match self {
            NodeKind::Exit => Some(ActionRole::Exit),
            NodeKind::Alert => Some(ActionRole::Alert),
            _ => None,
        }
    }

    pub fn is_virtual(self) -> bool {
        matches!(self, NodeKind::Virtual | NodeKind::Overview)
    }

    /// Participates in control flow other than as its root.
    pub fn is_connectable(self) -> bool {
        !self.is_virtual() && self != NodeKind::Start
    }
}

/// Corrective patch a node's editor applies when it is first shown.
pub fn normalize_on_mount(node: &Node) -> Option<NodePatch> {
    let fixed = node.kind().fixed_action_role()?;
    (node.data.action_type() != Some(fixed)).then_some(NodePatch::SetActionRole(fixed))
}

/// Apply every mount correction without recording history.
///
/// Returns the number of nodes corrected.
pub fn apply_mount_corrections(store: &mut GraphStore, now: i64) -> Result<usize, GraphError> {
    let corrections: Vec<_> = store
        .nodes()
        .iter()
        .filter_map(|node| normalize_on_mount(node).map(|patch| (node.id.clone(), patch)))
        .collect();
    for (id, patch) in &corrections {
        debug!(node = %id, patch = patch.name(), "mount correction");
        store.correct_node(id, patch.clone(), now)?;
    }
    Ok(corrections.len())
}
