//! Snapshot variables: named expressions captured when a node fires.
//!
//! Names are unique within a node, compared trimmed and case-insensitively.

use std::collections::BTreeSet;

use crate::ast::Expression;
use crate::domain::{NodeId, NodeVariable, VariableId};

use super::VariableError;

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn check_name(
    vars: &[NodeVariable],
    name: &str,
    except: Option<&VariableId>,
) -> Result<String, VariableError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(VariableError::EmptyName);
    }
    let key = name_key(name);
    if vars
        .iter()
        .any(|v| name_key(&v.name) == key && Some(&v.id) != except)
    {
        return Err(VariableError::DuplicateName(name.to_string()));
    }
    Ok(name.to_string())
}

pub fn validate_names(vars: &[NodeVariable]) -> Result<(), VariableError> {
    let mut seen = BTreeSet::new();
    for var in vars {
        let key = name_key(&var.name);
        if key.is_empty() {
            return Err(VariableError::EmptyName);
        }
        if !seen.insert(key) {
            return Err(VariableError::DuplicateName(var.name.trim().to_string()));
        }
    }
    Ok(())
}

pub fn add_variable(
    vars: &mut Vec<NodeVariable>,
    node_id: &NodeId,
    name: &str,
    expression: Expression,
) -> Result<VariableId, VariableError> {
    let name = check_name(vars, name, None)?;
    let id = VariableId::generate();
    vars.push(NodeVariable {
        id: id.clone(),
        name,
        expression,
        node_id: node_id.clone(),
    });
    Ok(id)
}

pub fn rename_variable(
    vars: &mut [NodeVariable],
    id: &VariableId,
    name: &str,
) -> Result<(), VariableError> {
    let name = check_name(vars, name, Some(id))?;
    let var = vars
        .iter_mut()
        .find(|v| &v.id == id)
        .ok_or_else(|| VariableError::UnknownVariable(id.clone()))?;
    var.name = name;
    Ok(())
}

pub fn update_variable_expression(
    vars: &mut [NodeVariable],
    id: &VariableId,
    expression: Expression,
) -> Result<(), VariableError> {
    let var = vars
        .iter_mut()
        .find(|v| &v.id == id)
        .ok_or_else(|| VariableError::UnknownVariable(id.clone()))?;
    var.expression = expression;
    Ok(())
}

pub fn remove_variable(
    vars: &mut Vec<NodeVariable>,
    id: &VariableId,
) -> Result<NodeVariable, VariableError> {
    let idx = vars
        .iter()
        .position(|v| &v.id == id)
        .ok_or_else(|| VariableError::UnknownVariable(id.clone()))?;
    Ok(vars.remove(idx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{create_default_expression, ExpressionKind};

    fn expr() -> Expression {
        create_default_expression(ExpressionKind::MarketData)
    }

    #[test]
    fn names_are_unique_ignoring_case_and_whitespace() {
        let node = NodeId::new("n1");
        let mut vars = Vec::new();
        add_variable(&mut vars, &node, "entryPrice", expr()).unwrap();
        assert_eq!(
            add_variable(&mut vars, &node, "  EntryPrice ", expr()),
            Err(VariableError::DuplicateName("EntryPrice".into()))
        );
        assert_eq!(
            add_variable(&mut vars, &node, "   ", expr()),
            Err(VariableError::EmptyName)
        );
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn rename_to_own_name_is_allowed() {
        let node = NodeId::new("n1");
        let mut vars = Vec::new();
        let a = add_variable(&mut vars, &node, "a", expr()).unwrap();
        add_variable(&mut vars, &node, "b", expr()).unwrap();
        rename_variable(&mut vars, &a, "A").unwrap();
        assert_eq!(vars[0].name, "A");
        assert!(rename_variable(&mut vars, &a, "B").is_err());
    }

    #[test]
    fn update_and_remove_by_id() {
        let node = NodeId::new("n1");
        let mut vars = Vec::new();
        let id = add_variable(&mut vars, &node, "x", expr()).unwrap();
        update_variable_expression(&mut vars, &id, Expression::constant(3.0)).unwrap();
        assert_eq!(vars[0].expression, Expression::constant(3.0));
        let removed = remove_variable(&mut vars, &id).unwrap();
        assert_eq!(removed.name, "x");
        assert_eq!(
            remove_variable(&mut vars, &id),
            Err(VariableError::UnknownVariable(id))
        );
    }
}
