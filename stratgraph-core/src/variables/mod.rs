//! Variable scoping: per-node snapshot variables, derived trailing variables,
//! and per-node assignments to strategy-wide global variables.

pub mod assignments;
pub mod clipboard;
pub mod snapshot;
pub mod trailing;

use crate::domain::{GlobalVariableId, VariableId};

pub use assignments::{
    assign_global_variable, available_global_variables, remove_assignment,
    update_assignment_expression, validate_assignments,
};
pub use clipboard::{AssignmentClipboard, PasteReport};
pub use snapshot::{
    add_variable, remove_variable, rename_variable, update_variable_expression, validate_names,
};
pub use trailing::{derive_trailing_variables, trailing_variable_name};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VariableError {
    #[error("Variable name must not be empty")]
    EmptyName,
    #[error("A variable named '{0}' already exists on this node")]
    DuplicateName(String),
    #[error("Unknown variable: {0}")]
    UnknownVariable(VariableId),
    #[error("Unknown global variable: {0}")]
    UnknownGlobalVariable(GlobalVariableId),
    #[error("Global variable '{0}' is already assigned on this node")]
    AlreadyAssigned(String),
}
