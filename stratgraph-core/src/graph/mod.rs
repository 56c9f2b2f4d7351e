//! Strategy graph: nodes, edges, patches, history and the owning store.

pub mod edge;
pub mod history;
pub mod node;
pub mod patch;
pub mod store;

pub use edge::Edge;
pub use history::{History, Snapshot, DEFAULT_HISTORY_LIMIT};
pub use node::{
    ActionData, ActionRole, AlertData, EntryData, ExitData, MarkerData, ModifyData, Node,
    NodeData, NodeKind, Point, ReEntryData, ReEntrySignalData, RetryConfig, SignalData,
    SquareOffData, StartData, TerminalData,
};
pub use patch::NodePatch;
pub use store::{GraphError, GraphStore};
