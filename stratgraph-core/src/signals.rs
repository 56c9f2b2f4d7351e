//! Cross-component signals: fire-and-forget notifications to editor panels.
//!
//! Subscribers receive over `mpsc` channels. A subscriber that drops its
//! receiver is pruned on the next emit.

use std::sync::mpsc::{channel, Receiver, Sender};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::{Edge, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayoutAlgorithm {
    #[serde(rename = "dagre-tb")]
    DagreTopBottom,
    #[serde(rename = "dagre-lr")]
    DagreLeftRight,
    #[serde(rename = "grid")]
    Grid,
}

impl LayoutAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            LayoutAlgorithm::DagreTopBottom => "dagre-tb",
            LayoutAlgorithm::DagreLeftRight => "dagre-lr",
            LayoutAlgorithm::Grid => "grid",
        }
    }
}

impl std::str::FromStr for LayoutAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dagre-tb" => Ok(LayoutAlgorithm::DagreTopBottom),
            "dagre-lr" => Ok(LayoutAlgorithm::DagreLeftRight),
            "grid" => Ok(LayoutAlgorithm::Grid),
            other => Err(format!("unknown layout: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GraphSignal {
    /// Edges changed outside the normal connect gesture; redraw them.
    EdgesRefresh,
    /// A strategy was imported straight into the open canvas.
    DirectImport { nodes: Vec<Node>, edges: Vec<Edge> },
    GlobalVariablePanelOpen,
    AutoArrange { layout: LayoutAlgorithm },
    VisualizationPanelToggle,
}

impl GraphSignal {
    pub fn name(&self) -> &'static str {
        match self {
            GraphSignal::EdgesRefresh => "edges-refresh",
            GraphSignal::DirectImport { .. } => "direct-import",
            GraphSignal::GlobalVariablePanelOpen => "global-variable-panel-open",
            GraphSignal::AutoArrange { .. } => "auto-arrange",
            GraphSignal::VisualizationPanelToggle => "visualization-panel-toggle",
        }
    }
}

#[derive(Debug, Default)]
pub struct SignalBus {
    subscribers: Vec<Sender<GraphSignal>>,
}

impl SignalBus {
    pub fn subscribe(&mut self) -> Receiver<GraphSignal> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver `signal` to every live subscriber. Returns the delivery count.
    pub fn emit(&mut self, signal: GraphSignal) -> usize {
        let name = signal.name();
        self.subscribers.retain(|tx| tx.send(signal.clone()).is_ok());
        debug!(signal = name, delivered = self.subscribers.len(), "emit");
        self.subscribers.len()
    }
}
