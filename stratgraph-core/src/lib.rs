//! StratGraph Core — the strategy graph model.
//!
//! - Condition/expression AST with default synthesis and readable previews
//! - Graph store with undo/redo history and edge guards
//! - Node type registry (closed enum dispatch, mount-time normalisation)
//! - Variable scoping: snapshot, trailing, and global-variable assignments
//! - Re-entry linking between re-entry-signal and entry nodes
//! - Lint, edit debouncing, and cross-component signals

pub mod ast;
pub mod debounce;
pub mod domain;
pub mod fingerprint;
pub mod graph;
pub mod lint;
pub mod reentry;
pub mod registry;
pub mod signals;
pub mod variables;
