//! StratGraph Store — persistence for strategy graphs.
//!
//! This crate builds on `stratgraph-core` to provide:
//! - The strategy document format and per-user key/value repository
//! - Legacy format migration on load and import
//! - Import/export as plain JSON or obfuscated `.tls` / `.tlsu` envelopes
//! - Hash-gated autosave and the editing session that drives it
//! - TOML configuration

pub mod autosave;
pub mod cipher;
pub mod config;
pub mod document;
pub mod migration;
pub mod repository;
pub mod session;
pub mod storage;
pub mod transfer;

pub use autosave::{AutosaveOutcome, Autosaver, DEFAULT_AUTOSAVE_MS};
pub use cipher::{CipherError, CipherKey};
pub use config::{ConfigError, StoreConfig};
pub use document::{StrategyDocument, StrategySummary};
pub use migration::{migrate_document, MigrationReport};
pub use repository::LocalStrategyStore;
pub use session::{SessionError, StrategySession, TickReport};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
pub use transfer::{
    export_document, import_strategy, prepare_import, resolve_conflict, ConflictChoice,
    ExportFormat, ImportOutcome, Requester, TransferError,
};
