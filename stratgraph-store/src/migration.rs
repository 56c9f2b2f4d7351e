//! Legacy format migration over raw JSON.
//!
//! Runs before typed decoding so that documents written by older editors
//! still decode. Only node `data` objects are walked; node `type` tags and
//! document-level fields are never touched.
//!
//! Rewrites:
//! - expression tags `priceData` / `candleData` -> `marketData`, `complex` -> `math`
//! - field `globalVariableAssignments` -> `globalVariableUpdates`
//! - field `maxReEntries` -> `maxEntries`

use serde_json::{Map, Value};
use tracing::debug;

const LEGACY_EXPRESSION_TAGS: [(&str, &str); 3] = [
    ("priceData", "marketData"),
    ("candleData", "marketData"),
    ("complex", "math"),
];

const LEGACY_FIELDS: [(&str, &str); 2] = [
    ("globalVariableAssignments", "globalVariableUpdates"),
    ("maxReEntries", "maxEntries"),
];

/// What a migration pass rewrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub expression_tags: usize,
    pub renamed_fields: usize,
}

impl MigrationReport {
    pub fn changed(&self) -> bool {
        self.expression_tags > 0 || self.renamed_fields > 0
    }

    fn absorb(&mut self, other: MigrationReport) {
        self.expression_tags += other.expression_tags;
        self.renamed_fields += other.renamed_fields;
    }
}

/// Migrate every node's `data` in a raw document (or export payload).
///
/// Idempotent: a second pass over the result reports no changes.
pub fn migrate_document(doc: &mut Value) -> MigrationReport {
    let mut report = MigrationReport::default();
    let Some(nodes) = doc.get_mut("nodes").and_then(Value::as_array_mut) else {
        return report;
    };
    for node in nodes {
        if let Some(data) = node.get_mut("data") {
            let node_report = migrate_value(data);
            if node_report.changed() {
                let node_id = node.get("id").and_then(|id| id.as_str()).unwrap_or("?");
                debug!(
                    node = node_id,
                    tags = node_report.expression_tags,
                    fields = node_report.renamed_fields,
                    "migrated legacy node data"
                );
            }
            report.absorb(node_report);
        }
    }
    report
}

/// Recursively migrate one JSON value.
pub fn migrate_value(value: &mut Value) -> MigrationReport {
    let mut report = MigrationReport::default();
    walk(value, &mut report);
    report
}

fn walk(value: &mut Value, report: &mut MigrationReport) {
    match value {
        Value::Object(map) => {
            rename_fields(map, report);
            rewrite_tag(map, report);
            for child in map.values_mut() {
                walk(child, report);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, report);
            }
        }
        _ => {}
    }
}

fn rewrite_tag(map: &mut Map<String, Value>, report: &mut MigrationReport) {
    let Some(Value::String(tag)) = map.get_mut("type") else {
        return;
    };
    if let Some((_, current)) = LEGACY_EXPRESSION_TAGS
        .iter()
        .find(|(legacy, _)| tag.as_str() == *legacy)
    {
        *tag = (*current).to_string();
        report.expression_tags += 1;
    }
}

fn rename_fields(map: &mut Map<String, Value>, report: &mut MigrationReport) {
    for (legacy, current) in LEGACY_FIELDS {
        let Some(old) = map.remove(legacy) else {
            continue;
        };
        // A document carrying both names keeps the current one.
        if !map.contains_key(current) {
            map.insert(current.to_string(), old);
        }
        report.renamed_fields += 1;
    }
}
