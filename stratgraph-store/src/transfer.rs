//! Import and export of strategy files.
//!
//! Export formats:
//! - `.json`: plain document JSON, privileged users only
//! - `.tls`: obfuscated with the static key
//! - `.tlsu`: obfuscated with a key bound to the exporting user
//!
//! Import pipeline: detect (JSON parse first) -> decode -> migrate ->
//! validate -> issue a fresh identity. Nothing is written unless every
//! stage succeeds.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stratgraph_core::domain::{GlobalVariable, NodeId, StrategyId};
use stratgraph_core::graph::{Edge, Node};
use tracing::{debug, info, warn};

use crate::cipher::{self, CipherError, CipherKey};
use crate::document::{StrategyDocument, StrategySummary};
use crate::migration::migrate_document;
use crate::repository::LocalStrategyStore;
use crate::storage::{KeyValueStore, StorageError};

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("invalid strategy file: {0}")]
    Validation(String),
    #[error("a strategy named {name:?} already exists")]
    Conflict { name: String },
    #[error("access denied: {0}")]
    Access(String),
    #[error("corrupted strategy file: {0}")]
    Corruption(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl TransferError {
    /// The single message shown to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            TransferError::Validation(detail) => {
                format!("This file is not a valid strategy ({detail}). Nothing was imported.")
            }
            TransferError::Conflict { name } => {
                format!("You already have a strategy called \"{name}\".")
            }
            TransferError::Access(_) => {
                "You do not have permission to open or create this file.".to_string()
            }
            TransferError::Corruption(_) => {
                "The file is damaged or was not exported by this application.".to_string()
            }
            TransferError::Storage(_) => {
                "The strategy could not be saved. Please try again.".to_string()
            }
        }
    }
}

impl From<CipherError> for TransferError {
    fn from(e: CipherError) -> Self {
        match e {
            CipherError::OwnerMismatch => {
                TransferError::Access("file was exported for another user".into())
            }
            other => TransferError::Corruption(other.to_string()),
        }
    }
}

// ─── Export ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Tls,
    Tlsu,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Tls => "tls",
            ExportFormat::Tlsu => "tlsu",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "tls" => Ok(ExportFormat::Tls),
            "tlsu" => Ok(ExportFormat::Tlsu),
            other => Err(format!("unknown export format: {other}")),
        }
    }
}

/// Who is asking for an export or import.
#[derive(Debug, Clone, Copy)]
pub struct Requester<'a> {
    pub user_id: &'a str,
    /// May export plain JSON.
    pub privileged: bool,
}

/// Render a document in the requested format.
///
/// Virtual marker nodes are left out together with any edge that touches
/// them; provenance (`userId`, `strategyId`) records the exporter and the
/// source strategy.
pub fn export_document(
    doc: &StrategyDocument,
    format: ExportFormat,
    requester: Requester<'_>,
) -> Result<String, TransferError> {
    if format == ExportFormat::Json && !requester.privileged {
        return Err(TransferError::Access(
            "plain JSON export requires a privileged account".into(),
        ));
    }

    let mut exported = doc.clone();
    exported.nodes.retain(|n| !n.kind().is_virtual());
    let kept: BTreeSet<&NodeId> = exported.nodes.iter().map(|n| &n.id).collect();
    let edges_before = exported.edges.len();
    exported
        .edges
        .retain(|e| kept.contains(&e.source) && kept.contains(&e.target));
    let dropped_edges = edges_before - exported.edges.len();
    if dropped_edges > 0 {
        debug!(strategy = %doc.id, dropped_edges, "dropped edges to virtual nodes");
    }
    exported.user_id = Some(requester.user_id.to_string());
    exported.strategy_id = Some(doc.strategy_id.clone().unwrap_or_else(|| doc.id.clone()));

    let json = serde_json::to_string_pretty(&exported)
        .map_err(|e| TransferError::Corruption(e.to_string()))?;
    let text = match format {
        ExportFormat::Json => json,
        ExportFormat::Tls => cipher::seal(&json, CipherKey::Static),
        ExportFormat::Tlsu => cipher::seal(&json, CipherKey::User(requester.user_id)),
    };
    info!(strategy = %doc.id, %format, nodes = exported.nodes.len(), "exported strategy");
    Ok(text)
}

// ─── Import ──────────────────────────────────────────────────────────

/// Fields an import needs; identity and timestamps are always re-issued.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportPayload {
    #[serde(default)]
    name: String,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    #[serde(default)]
    global_variables: Vec<GlobalVariable>,
    #[serde(default)]
    description: String,
}

/// Turn file text into document JSON, opening an envelope when the text is
/// not JSON itself.
pub fn decode_import(text: &str, user_id: &str) -> Result<Value, TransferError> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if value.is_object() {
            return Ok(value);
        }
    }
    let json = cipher::open(text, user_id)?;
    serde_json::from_str(&json).map_err(|e| TransferError::Corruption(e.to_string()))
}

/// Structural validation of raw document JSON.
pub fn validate_structure(doc: &Value) -> Result<(), TransferError> {
    let invalid = |msg: String| Err(TransferError::Validation(msg));

    let Some(nodes) = doc.get("nodes").and_then(Value::as_array) else {
        return invalid("missing nodes array".into());
    };
    let Some(edges) = doc.get("edges").and_then(Value::as_array) else {
        return invalid("missing edges array".into());
    };

    let mut ids = BTreeSet::new();
    for (i, node) in nodes.iter().enumerate() {
        for field in ["id", "type", "position"] {
            if node.get(field).map_or(true, Value::is_null) {
                return invalid(format!("node {i} is missing {field}"));
            }
        }
        if let Some(id) = node.get("id").and_then(Value::as_str) {
            if !ids.insert(id) {
                return invalid(format!("node id {id:?} is used more than once"));
            }
        }
    }
    let mut edge_ids = BTreeSet::new();
    for (i, edge) in edges.iter().enumerate() {
        for field in ["id", "source", "target"] {
            if edge.get(field).map_or(true, Value::is_null) {
                return invalid(format!("edge {i} is missing {field}"));
            }
        }
        if let Some(id) = edge.get("id").and_then(Value::as_str) {
            if !edge_ids.insert(id) {
                return invalid(format!("edge id {id:?} is used more than once"));
            }
        }
        for end in ["source", "target"] {
            let endpoint = edge.get(end).and_then(Value::as_str).unwrap_or_default();
            if !ids.contains(endpoint) {
                return invalid(format!("edge {i} {end} references unknown node {endpoint:?}"));
            }
        }
    }
    Ok(())
}

/// Run the full pipeline and build the document to be stored.
///
/// The result has a fresh id and strategyId, `now` as both timestamps, and
/// the importer as owner.
pub fn prepare_import(
    text: &str,
    importer: &str,
    now: DateTime<Utc>,
) -> Result<StrategyDocument, TransferError> {
    let mut raw = decode_import(text, importer)?;
    let report = migrate_document(&mut raw);
    if report.changed() {
        warn!(
            tags = report.expression_tags,
            fields = report.renamed_fields,
            "imported file used a legacy format"
        );
    }
    validate_structure(&raw)?;
    let payload: ImportPayload =
        serde_json::from_value(raw).map_err(|e| TransferError::Validation(e.to_string()))?;

    let id = StrategyId::generate();
    Ok(StrategyDocument {
        strategy_id: Some(id.clone()),
        id,
        name: payload.name,
        nodes: payload.nodes,
        edges: payload.edges,
        global_variables: payload.global_variables,
        created: now,
        last_modified: now,
        description: payload.description,
        user_id: Some(importer.to_string()),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictChoice {
    /// Overwrite the existing strategy, keeping its id.
    Replace,
    /// Store alongside under `"<name> (n)"`.
    KeepBoth,
    Cancel,
}

impl FromStr for ConflictChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "replace" => Ok(ConflictChoice::Replace),
            "keep-both" => Ok(ConflictChoice::KeepBoth),
            "cancel" => Ok(ConflictChoice::Cancel),
            other => Err(format!("unknown conflict choice: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    Imported(StrategySummary),
    /// The name is taken; nothing was stored. Resolve with `resolve_conflict`.
    NameConflict {
        candidate: Box<StrategyDocument>,
        existing: StrategySummary,
    },
    Cancelled,
}

/// Import file text into a user's repository.
pub fn import_strategy<S: KeyValueStore>(
    repo: &mut LocalStrategyStore<S>,
    text: &str,
    importer: &str,
    now: DateTime<Utc>,
) -> Result<ImportOutcome, TransferError> {
    let doc = prepare_import(text, importer, now)?;
    if let Some(existing) = repo.find_by_name(importer, &doc.name)? {
        info!(name = %doc.name, existing = %existing.id, "import name conflict");
        return Ok(ImportOutcome::NameConflict {
            candidate: Box::new(doc),
            existing,
        });
    }
    repo.save(importer, &doc)?;
    info!(strategy = %doc.id, name = %doc.name, nodes = doc.nodes.len(), "imported strategy");
    Ok(ImportOutcome::Imported(doc.summary()))
}

/// Finish an import that hit a name conflict.
pub fn resolve_conflict<S: KeyValueStore>(
    repo: &mut LocalStrategyStore<S>,
    importer: &str,
    mut candidate: StrategyDocument,
    existing: &StrategySummary,
    choice: ConflictChoice,
) -> Result<ImportOutcome, TransferError> {
    match choice {
        ConflictChoice::Cancel => return Ok(ImportOutcome::Cancelled),
        ConflictChoice::Replace => {
            candidate.id = existing.id.clone();
            candidate.strategy_id = Some(existing.id.clone());
            candidate.created = existing.created;
        }
        ConflictChoice::KeepBoth => {
            let taken: BTreeSet<String> =
                repo.list(importer)?.into_iter().map(|s| s.name).collect();
            candidate.name = next_free_name(&candidate.name, &taken);
        }
    }
    repo.save(importer, &candidate)?;
    info!(strategy = %candidate.id, name = %candidate.name, ?choice, "imported strategy");
    Ok(ImportOutcome::Imported(candidate.summary()))
}

/// First `"<name> (n)"`, n = 1, 2, ..., not in `taken`.
pub fn next_free_name(name: &str, taken: &BTreeSet<String>) -> String {
    (1..)
        .map(|n| format!("{name} ({n})"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;
    use serde_json::json;
    use stratgraph_core::graph::{NodeKind, Point};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn sample() -> StrategyDocument {
        let mut doc = StrategyDocument::new("Breakout", "alice", at(100));
        let start = doc.nodes[0].id.clone();
        doc.nodes.push(Node::with_id("entry-1", NodeKind::Entry, Point::new(0.0, 100.0)));
        doc.nodes.push(Node::with_id("overview", NodeKind::Overview, Point::default()));
        doc.edges.push(Edge::link(start, "entry-1".into()));
        doc
    }

    const ALICE: Requester<'static> = Requester {
        user_id: "alice",
        privileged: false,
    };

    #[test]
    fn plain_export_requires_privilege() {
        let err = export_document(&sample(), ExportFormat::Json, ALICE).unwrap_err();
        assert!(matches!(err, TransferError::Access(_)));
        let admin = Requester {
            privileged: true,
            ..ALICE
        };
        let text = export_document(&sample(), ExportFormat::Json, admin).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(value["userId"], "alice");
    }

    #[test]
    fn user_bound_export_rejects_other_importers() {
        let text = export_document(&sample(), ExportFormat::Tlsu, ALICE).unwrap();
        assert!(prepare_import(&text, "alice", at(200)).is_ok());
        let err = prepare_import(&text, "bob", at(200)).unwrap_err();
        assert!(matches!(err, TransferError::Access(_)));
    }

    #[test]
    fn import_issues_a_fresh_identity() {
        let original = sample();
        let text = export_document(&original, ExportFormat::Tls, ALICE).unwrap();
        let imported = prepare_import(&text, "bob", at(500)).unwrap();

        assert_ne!(imported.id, original.id);
        assert_ne!(imported.strategy_id, original.strategy_id);
        assert_eq!(imported.created, at(500));
        assert_eq!(imported.user_id.as_deref(), Some("bob"));
        assert_eq!(imported.name, "Breakout");
        assert_eq!(imported.edges, original.edges);
    }

    #[test]
    fn structural_validation_catches_each_defect() {
        let cases = [
            (json!({"edges": []}), "nodes"),
            (json!({"nodes": []}), "edges"),
            (json!({"nodes": [{"id": "a", "type": "start"}], "edges": []}), "position"),
            (
                json!({"nodes": [], "edges": [{"id": "e", "source": "a"}]}),
                "target",
            ),
            (
                json!({
                    "nodes": [{"id": "a", "type": "start", "position": {"x": 0, "y": 0}}],
                    "edges": [{"id": "e", "source": "a", "target": "ghost"}]
                }),
                "ghost",
            ),
            (
                json!({
                    "nodes": [
                        {"id": "a", "type": "start", "position": {"x": 0, "y": 0}},
                        {"id": "b", "type": "exit", "position": {"x": 0, "y": 100}}
                    ],
                    "edges": [
                        {"id": "e", "source": "a", "target": "b"},
                        {"id": "e", "source": "b", "target": "a"}
                    ]
                }),
                "used more than once",
            ),
        ];
        for (doc, needle) in cases {
            match validate_structure(&doc) {
                Err(TransferError::Validation(msg)) => assert!(msg.contains(needle), "{msg}"),
                other => panic!("expected validation error for {needle}, got {other:?}"),
            }
        }
    }

    #[test]
    fn export_drops_edges_of_left_out_markers() {
        let mut doc = sample();
        doc.edges.push(Edge::link("entry-1".into(), "overview".into()));
        let text = export_document(&doc, ExportFormat::Tls, ALICE).unwrap();
        let imported = prepare_import(&text, "alice", at(300)).unwrap();
        assert_eq!(imported.edges.len(), 1);
        assert!(imported.edges.iter().all(|e| e.target.as_str() != "overview"));
    }

    #[test]
    fn garbage_is_corruption_not_validation() {
        let err = prepare_import("definitely not a strategy", "u", at(0)).unwrap_err();
        assert!(matches!(err, TransferError::Corruption(_)));
        assert!(err.user_message().contains("damaged"));
    }

    #[test]
    fn undecodable_node_data_fails_validation() {
        let text = json!({
            "nodes": [{"id": "a", "type": "warp-drive", "position": {"x": 0, "y": 0}}],
            "edges": []
        })
        .to_string();
        let err = prepare_import(&text, "u", at(0)).unwrap_err();
        assert!(matches!(err, TransferError::Validation(_)));
    }

    #[test]
    fn name_conflict_is_resolved_by_caller_choice() {
        let mut repo = LocalStrategyStore::new(MemoryStore::new());
        let existing = sample();
        repo.save("alice", &existing).unwrap();
        let text = export_document(&existing, ExportFormat::Tls, ALICE).unwrap();

        let ImportOutcome::NameConflict { candidate, existing: clash } =
            import_strategy(&mut repo, &text, "alice", at(900)).unwrap()
        else {
            panic!("expected a name conflict");
        };
        assert_eq!(clash.id, existing.id);
        assert_eq!(repo.list("alice").unwrap().len(), 1);

        let cancelled =
            resolve_conflict(&mut repo, "alice", (*candidate).clone(), &clash, ConflictChoice::Cancel)
                .unwrap();
        assert_eq!(cancelled, ImportOutcome::Cancelled);

        let kept = resolve_conflict(
            &mut repo,
            "alice",
            (*candidate).clone(),
            &clash,
            ConflictChoice::KeepBoth,
        )
        .unwrap();
        let ImportOutcome::Imported(kept) = kept else {
            panic!("expected import");
        };
        assert_eq!(kept.name, "Breakout (1)");

        let replaced =
            resolve_conflict(&mut repo, "alice", *candidate, &clash, ConflictChoice::Replace)
                .unwrap();
        let ImportOutcome::Imported(replaced) = replaced else {
            panic!("expected import");
        };
        assert_eq!(replaced.id, existing.id);
        assert_eq!(repo.list("alice").unwrap().len(), 2);
    }

    #[test]
    fn free_names_skip_taken_suffixes() {
        let taken: BTreeSet<String> = ["A", "A (1)", "A (2)"].iter().map(|s| s.to_string()).collect();
        assert_eq!(next_free_name("A", &taken), "A (3)");
    }

    #[test]
    fn format_parsing_accepts_extensions() {
        assert_eq!(".tlsu".parse::<ExportFormat>().unwrap(), ExportFormat::Tlsu);
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
