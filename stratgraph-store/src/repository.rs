//! Per-user strategy repository over a key/value backend.
//!
//! Key scheme:
//! - `strategy/<userId>/<strategyId>` holds a full `StrategyDocument`
//! - `strategies/<userId>` holds the user's `StrategySummary` list

use serde_json::Value;
use stratgraph_core::domain::StrategyId;
use tracing::{info, warn};

use crate::document::{StrategyDocument, StrategySummary};
use crate::migration::migrate_document;
use crate::storage::{KeyValueStore, StorageError};

pub fn strategy_key(user_id: &str, strategy_id: &StrategyId) -> String {
    format!("strategy/{user_id}/{strategy_id}")
}

pub fn index_key(user_id: &str) -> String {
    format!("strategies/{user_id}")
}

#[derive(Debug)]
pub struct LocalStrategyStore<S> {
    backend: S,
}

impl<S: KeyValueStore> LocalStrategyStore<S> {
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn into_backend(self) -> S {
        self.backend
    }

    pub fn list(&self, user_id: &str) -> Result<Vec<StrategySummary>, StorageError> {
        let key = index_key(user_id);
        match self.backend.get(&key)? {
            None => Ok(Vec::new()),
            Some(text) => {
                serde_json::from_str(&text).map_err(|source| StorageError::Decode { key, source })
            }
        }
    }

    pub fn find_by_name(
        &self,
        user_id: &str,
        name: &str,
    ) -> Result<Option<StrategySummary>, StorageError> {
        Ok(self
            .list(user_id)?
            .into_iter()
            .find(|s| s.name.trim() == name.trim()))
    }

    /// Load a document, migrating legacy data and writing the result back.
    pub fn load(
        &mut self,
        user_id: &str,
        strategy_id: &StrategyId,
    ) -> Result<StrategyDocument, StorageError> {
        let key = strategy_key(user_id, strategy_id);
        let text = self
            .backend
            .get(&key)?
            .ok_or_else(|| StorageError::NotFound(key.clone()))?;
        let mut raw: Value = serde_json::from_str(&text).map_err(|source| StorageError::Decode {
            key: key.clone(),
            source,
        })?;
        let report = migrate_document(&mut raw);
        let doc: StrategyDocument = serde_json::from_value(raw).map_err(|source| {
            StorageError::Decode {
                key: key.clone(),
                source,
            }
        })?;
        if report.changed() {
            warn!(
                strategy = %strategy_id,
                tags = report.expression_tags,
                fields = report.renamed_fields,
                "migrated legacy strategy, writing back"
            );
            self.write_document(&key, &doc)?;
        }
        Ok(doc)
    }

    /// Write a document and upsert its entry in the user's list.
    pub fn save(&mut self, user_id: &str, doc: &StrategyDocument) -> Result<(), StorageError> {
        self.write_document(&strategy_key(user_id, &doc.id), doc)?;

        let mut index = self.list(user_id)?;
        let summary = doc.summary();
        match index.iter_mut().find(|s| s.id == doc.id) {
            Some(existing) => *existing = summary,
            None => index.push(summary),
        }
        self.write_index(user_id, &index)?;
        info!(strategy = %doc.id, name = %doc.name, "saved strategy");
        Ok(())
    }

    /// Returns whether the strategy existed.
    pub fn delete(&mut self, user_id: &str, strategy_id: &StrategyId) -> Result<bool, StorageError> {
        let existed = self.backend.delete(&strategy_key(user_id, strategy_id))?;
        let mut index = self.list(user_id)?;
        let before = index.len();
        index.retain(|s| &s.id != strategy_id);
        if index.len() != before {
            self.write_index(user_id, &index)?;
        }
        Ok(existed || index.len() != before)
    }

    /// Load (and so migrate) every stored strategy of a user.
    ///
    /// Returns the ids of documents that needed migration.
    pub fn migrate_all(&mut self, user_id: &str) -> Result<Vec<StrategyId>, StorageError> {
        let mut migrated = Vec::new();
        for summary in self.list(user_id)? {
            let key = strategy_key(user_id, &summary.id);
            let before = self.backend.get(&key)?;
            self.load(user_id, &summary.id)?;
            if self.backend.get(&key)? != before {
                migrated.push(summary.id);
            }
        }
        Ok(migrated)
    }

    fn write_document(&mut self, key: &str, doc: &StrategyDocument) -> Result<(), StorageError> {
        let text = serde_json::to_string(doc).map_err(|source| StorageError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.backend.put(key, &text)
    }

    fn write_index(&mut self, user_id: &str, index: &[StrategySummary]) -> Result<(), StorageError> {
        let key = index_key(user_id);
        let text = serde_json::to_string(index).map_err(|source| StorageError::Encode {
            key: key.clone(),
            source,
        })?;
        self.backend.put(&key, &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::{TimeZone, Utc};

    fn doc(name: &str) -> StrategyDocument {
        StrategyDocument::new(name, "u1", Utc.timestamp_opt(1_000, 0).unwrap())
    }

    #[test]
    fn save_upserts_the_index() {
        let mut repo = LocalStrategyStore::new(MemoryStore::new());
        let mut a = doc("A");
        repo.save("u1", &a).unwrap();
        repo.save("u1", &doc("B")).unwrap();
        a.name = "A2".into();
        repo.save("u1", &a).unwrap();

        let names: Vec<_> = repo.list("u1").unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["A2", "B"]);
        assert_eq!(repo.load("u1", &a.id).unwrap(), a);
        assert!(repo.list("someone-else").unwrap().is_empty());
    }

    #[test]
    fn missing_strategy_is_not_found() {
        let mut repo = LocalStrategyStore::new(MemoryStore::new());
        let err = repo.load("u1", &StrategyId::new("nope")).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(key) if key == "strategy/u1/nope"));
    }

    #[test]
    fn delete_removes_document_and_summary() {
        let mut repo = LocalStrategyStore::new(MemoryStore::new());
        let a = doc("A");
        repo.save("u1", &a).unwrap();
        assert!(repo.delete("u1", &a.id).unwrap());
        assert!(repo.list("u1").unwrap().is_empty());
        assert!(!repo.delete("u1", &a.id).unwrap());
    }

    #[test]
    fn legacy_documents_are_migrated_once_and_written_back() {
        let mut repo = LocalStrategyStore::new(MemoryStore::new());
        let a = doc("Legacy");
        repo.save("u1", &a).unwrap();

        let key = strategy_key("u1", &a.id);
        let mut raw: Value = serde_json::from_str(&repo.backend().get(&key).unwrap().unwrap()).unwrap();
        raw["nodes"][0]["data"]["globalVariableAssignments"] = serde_json::json!([]);
        let mut backend = repo.into_backend();
        backend.put(&key, &raw.to_string()).unwrap();
        let mut repo = LocalStrategyStore::new(backend);

        assert_eq!(repo.migrate_all("u1").unwrap(), vec![a.id.clone()]);
        assert!(repo.migrate_all("u1").unwrap().is_empty());
        let stored = repo.backend().get(&key).unwrap().unwrap();
        assert!(!stored.contains("globalVariableAssignments"));
    }
}
