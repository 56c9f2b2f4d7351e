//! Per-node assignments to global variables.
//!
//! A node assigns each global variable at most once.

use std::collections::BTreeSet;

use crate::ast::{create_default_expression, Expression, ExpressionKind};
use crate::domain::{GlobalVariable, GlobalVariableUpdate, VariableId};
use crate::graph::Node;

use super::VariableError;

/// Globals the node could still assign (not assigned on it yet).
///
/// Nodes without an assignment slot get an empty list.
pub fn available_global_variables<'a>(
    node: &Node,
    globals: &'a [GlobalVariable],
) -> Vec<&'a GlobalVariable> {
    let Some(updates) = node.data.global_variable_updates() else {
        return Vec::new();
    };
    globals
        .iter()
        .filter(|gv| !updates.iter().any(|u| u.global_variable_id == gv.id))
        .collect()
}

pub fn validate_assignments(updates: &[GlobalVariableUpdate]) -> Result<(), VariableError> {
    let mut seen = BTreeSet::new();
    for update in updates {
        if !seen.insert(&update.global_variable_id) {
            return Err(VariableError::AlreadyAssigned(
                update.global_variable_name.clone(),
            ));
        }
    }
    Ok(())
}

/// Add an assignment for `global`, starting from a `0` constant.
pub fn assign_global_variable(
    updates: &mut Vec<GlobalVariableUpdate>,
    global: &GlobalVariable,
) -> Result<VariableId, VariableError> {
    if updates.iter().any(|u| u.global_variable_id == global.id) {
        return Err(VariableError::AlreadyAssigned(global.name.clone()));
    }
    let id = VariableId::generate();
    updates.push(GlobalVariableUpdate {
        id: id.clone(),
        global_variable_id: global.id.clone(),
        global_variable_name: global.name.clone(),
        expression: create_default_expression(ExpressionKind::Constant),
    });
    Ok(id)
}

pub fn update_assignment_expression(
    updates: &mut [GlobalVariableUpdate],
    id: &VariableId,
    expression: Expression,
) -> Result<(), VariableError> {
    let update = updates
        .iter_mut()
        .find(|u| &u.id == id)
        .ok_or_else(|| VariableError::UnknownVariable(id.clone()))?;
    update.expression = expression;
    Ok(())
}

pub fn remove_assignment(
    updates: &mut Vec<GlobalVariableUpdate>,
    id: &VariableId,
) -> Result<GlobalVariableUpdate, VariableError> {
    let idx = updates
        .iter()
        .position(|u| &u.id == id)
        .ok_or_else(|| VariableError::UnknownVariable(id.clone()))?;
    Ok(updates.remove(idx))
}
