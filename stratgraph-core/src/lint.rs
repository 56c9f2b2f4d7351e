//! Advisory checks over a whole strategy graph.
//!
//! Nothing here blocks a mutation; findings are surfaced by the CLI and the
//! editor's problems list.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use crate::domain::{EdgeId, GlobalVariable, NodeId};
use crate::graph::{Edge, Node, NodeData, NodeKind};
use crate::reentry::mirrored_max_entries;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LintFinding {
    MissingStart,
    MultipleStarts { count: usize },
    Unreachable { node: NodeId, kind: NodeKind },
    DanglingEdge { edge: EdgeId, endpoint: NodeId },
    ReEntryTargetMissing { node: NodeId },
    ReEntryMirrorStale { node: NodeId, expected: u32, found: u32 },
    IncompleteConditions { node: NodeId, count: usize },
    UnknownGlobalVariable { node: NodeId, variable_id: String },
    DuplicateVpi { vpi: String },
}

impl LintFinding {
    pub fn severity(&self) -> Severity {
        match self {
            LintFinding::MissingStart
            | LintFinding::MultipleStarts { .. }
            | LintFinding::DanglingEdge { .. }
            | LintFinding::DuplicateVpi { .. } => Severity::Error,
            _ => Severity::Warning,
        }
    }
}

impl fmt::Display for LintFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LintFinding::MissingStart => write!(f, "strategy has no start node"),
            LintFinding::MultipleStarts { count } => {
                write!(f, "strategy has {count} start nodes")
            }
            LintFinding::Unreachable { node, kind } => {
                write!(f, "{kind} node {node} is not reachable from start")
            }
            LintFinding::DanglingEdge { edge, endpoint } => {
                write!(f, "edge {edge} references missing node {endpoint}")
            }
            LintFinding::ReEntryTargetMissing { node } => {
                write!(f, "re-entry signal {node} has no target entry node")
            }
            LintFinding::ReEntryMirrorStale {
                node,
                expected,
                found,
            } => write!(
                f,
                "re-entry signal {node} mirrors maxEntries {found}, target has {expected}"
            ),
            LintFinding::IncompleteConditions { node, count } => {
                write!(f, "node {node} has {count} incomplete condition(s)")
            }
            LintFinding::UnknownGlobalVariable { node, variable_id } => {
                write!(f, "node {node} references unknown global variable {variable_id}")
            }
            LintFinding::DuplicateVpi { vpi } => write!(f, "vpi {vpi} is used more than once"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LintReport {
    pub findings: Vec<LintFinding>,
}

impl LintReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.findings
            .iter()
            .any(|f| f.severity() == Severity::Error)
    }
}

pub fn lint(nodes: &[Node], edges: &[Edge], globals: &[GlobalVariable]) -> LintReport {
    let mut findings = Vec::new();
    let ids: BTreeSet<&NodeId> = nodes.iter().map(|n| &n.id).collect();

    // Structure
    let starts: Vec<&Node> = nodes.iter().filter(|n| n.kind() == NodeKind::Start).collect();
    match starts.len() {
        0 => findings.push(LintFinding::MissingStart),
        1 => {}
        count => findings.push(LintFinding::MultipleStarts { count }),
    }
    for edge in edges {
        for endpoint in [&edge.source, &edge.target] {
            if !ids.contains(endpoint) {
                findings.push(LintFinding::DanglingEdge {
                    edge: edge.id.clone(),
                    endpoint: endpoint.clone(),
                });
            }
        }
    }

    // Reachability
    if !starts.is_empty() {
        let reached = reachable_from(starts.iter().map(|n| &n.id), edges);
        for node in nodes {
            if node.kind().is_connectable() && !reached.contains(&node.id) {
                findings.push(LintFinding::Unreachable {
                    node: node.id.clone(),
                    kind: node.kind(),
                });
            }
        }
    }

    // Positions
    let mut vpi_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for position in nodes.iter().flat_map(|n| n.data.positions()) {
        *vpi_counts.entry(position.vpi.trim()).or_default() += 1;
    }
    for (vpi, count) in vpi_counts {
        if count > 1 {
            findings.push(LintFinding::DuplicateVpi { vpi: vpi.to_string() });
        }
    }

    // Per-node content
    let known_globals: BTreeSet<&str> = globals.iter().map(|gv| gv.id.as_str()).collect();
    for node in nodes {
        if let NodeData::ReEntrySignal(d) = &node.data {
            match &d.target_entry_node_id {
                None => findings.push(LintFinding::ReEntryTargetMissing {
                    node: node.id.clone(),
                }),
                Some(target) => {
                    let expected = mirrored_max_entries(nodes, Some(target));
                    if expected != d.retry_config.max_entries {
                        findings.push(LintFinding::ReEntryMirrorStale {
                            node: node.id.clone(),
                            expected,
                            found: d.retry_config.max_entries,
                        });
                    }
                }
            }
        }

        if let Some(tree) = node.data.conditions() {
            let count = tree.incomplete_leaf_count();
            if count > 0 {
                findings.push(LintFinding::IncompleteConditions {
                    node: node.id.clone(),
                    count,
                });
            }
            for variable_id in tree.referenced_global_variables() {
                if !known_globals.contains(variable_id.as_str()) {
                    findings.push(LintFinding::UnknownGlobalVariable {
                        node: node.id.clone(),
                        variable_id,
                    });
                }
            }
        }

        for update in node.data.global_variable_updates().into_iter().flatten() {
            if !known_globals.contains(update.global_variable_id.as_str()) {
                findings.push(LintFinding::UnknownGlobalVariable {
                    node: node.id.clone(),
                    variable_id: update.global_variable_id.to_string(),
                });
            }
        }
    }

    LintReport { findings }
}

fn reachable_from<'a>(
    roots: impl Iterator<Item = &'a NodeId>,
    edges: &'a [Edge],
) -> BTreeSet<&'a NodeId> {
    let mut adjacency: BTreeMap<&NodeId, Vec<&NodeId>> = BTreeMap::new();
    for edge in edges {
        adjacency.entry(&edge.source).or_default().push(&edge.target);
    }
    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<&NodeId> = roots.collect();
    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        if let Some(next) = adjacency.get(id) {
            queue.extend(next.iter().copied());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Condition, ComparisonOperator, Expression, GroupCondition};
    use crate::graph::Point;

    fn node(id: &str, kind: NodeKind) -> Node {
        Node::with_id(id, kind, Point::default())
    }

    #[test]
    fn connected_graph_is_clean() {
        let nodes = vec![
            node("s", NodeKind::Start),
            node("sig", NodeKind::EntrySignal),
            node("e", NodeKind::Entry),
            node("v", NodeKind::Virtual),
        ];
        let edges = vec![
            Edge::link("s".into(), "sig".into()),
            Edge::link("sig".into(), "e".into()),
        ];
        let report = lint(&nodes, &edges, &[]);
        assert!(report.is_clean(), "{:?}", report.findings);
    }

    #[test]
    fn unreachable_and_dangling_are_reported() {
        let nodes = vec![node("s", NodeKind::Start), node("x", NodeKind::Exit)];
        let edges = vec![Edge::link("s".into(), "ghost".into())];
        let report = lint(&nodes, &edges, &[]);
        assert!(report.has_errors());
        assert!(report.findings.contains(&LintFinding::Unreachable {
            node: "x".into(),
            kind: NodeKind::Exit
        }));
        assert!(report
            .findings
            .iter()
            .any(|f| matches!(f, LintFinding::DanglingEdge { .. })));
    }

    #[test]
    fn missing_start_and_re_entry_target() {
        let nodes = vec![node("r", NodeKind::ReEntrySignal)];
        let report = lint(&nodes, &[], &[]);
        assert!(report.findings.contains(&LintFinding::MissingStart));
        assert!(report
            .findings
            .contains(&LintFinding::ReEntryTargetMissing { node: "r".into() }));
    }

    #[test]
    fn unknown_globals_and_incomplete_leaves() {
        let mut sig = node("sig", NodeKind::Signal);
        if let NodeData::Signal(d) = &mut sig.data {
            let mut tree = GroupCondition::default();
            tree.push_leaf(Condition::new(
                Expression::global("gv-missing", "ghost"),
                ComparisonOperator::GreaterThan,
                Expression::constant(1.0),
            ));
            tree.push_leaf(Condition::new(
                Expression::indicator(""),
                ComparisonOperator::LessThan,
                Expression::constant(1.0),
            ));
            d.conditions = tree;
        }
        let nodes = vec![node("s", NodeKind::Start), sig];
        let edges = vec![Edge::link("s".into(), "sig".into())];
        let report = lint(&nodes, &edges, &[]);
        assert_eq!(
            report.findings,
            vec![
                LintFinding::IncompleteConditions {
                    node: "sig".into(),
                    count: 1
                },
                LintFinding::UnknownGlobalVariable {
                    node: "sig".into(),
                    variable_id: "gv-missing".into()
                },
            ]
        );
        assert!(!report.has_errors());
    }
}
