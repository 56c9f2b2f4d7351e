//! Condition trees — recursive AND/OR groups of comparisons.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::expression::{create_default_expression, Expression, ExpressionKind};
use crate::domain::ConditionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComparisonOperator {
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Equal,
    NotEqual,
    CrossesAbove,
    CrossesBelow,
}

impl ComparisonOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOperator::GreaterThan => ">",
            ComparisonOperator::LessThan => "<",
            ComparisonOperator::GreaterThanOrEqual => ">=",
            ComparisonOperator::LessThanOrEqual => "<=",
            ComparisonOperator::Equal => "==",
            ComparisonOperator::NotEqual => "!=",
            ComparisonOperator::CrossesAbove => "crosses above",
            ComparisonOperator::CrossesBelow => "crosses below",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GroupLogic {
    And,
    Or,
}

impl GroupLogic {
    pub fn keyword(self) -> &'static str {
        match self {
            GroupLogic::And => "AND",
            GroupLogic::Or => "OR",
        }
    }
}

/// A leaf comparison `lhs <operator> rhs`.
///
/// Missing operands make the leaf incomplete; it is stored as-is so that a
/// partially edited condition survives autosave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub id: ConditionId,
    #[serde(default)]
    pub lhs: Option<Expression>,
    pub operator: ComparisonOperator,
    #[serde(default)]
    pub rhs: Option<Expression>,
}

impl Condition {
    pub fn new(lhs: Expression, operator: ComparisonOperator, rhs: Expression) -> Self {
        Self {
            id: ConditionId::generate(),
            lhs: Some(lhs),
            operator,
            rhs: Some(rhs),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!((&self.lhs, &self.rhs), (Some(l), Some(r)) if l.is_complete() && r.is_complete())
    }
}

/// Either a leaf or a nested group.
///
/// Untagged on the wire: groups are recognised by their `groupLogic` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionNode {
    Group(GroupCondition),
    Leaf(Condition),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupCondition {
    pub id: ConditionId,
    pub group_logic: GroupLogic,
    #[serde(default)]
    pub conditions: Vec<ConditionNode>,
}

impl Default for GroupCondition {
    fn default() -> Self {
        create_default_group(GroupLogic::And)
    }
}

/// A fresh leaf: `Close > 0`.
pub fn create_default_condition() -> Condition {
    Condition::new(
        create_default_expression(ExpressionKind::MarketData),
        ComparisonOperator::GreaterThan,
        create_default_expression(ExpressionKind::Constant),
    )
}

/// An empty group (vacuously satisfied).
pub fn create_default_group(logic: GroupLogic) -> GroupCondition {
    GroupCondition {
        id: ConditionId::generate(),
        group_logic: logic,
        conditions: Vec::new(),
    }
}

impl GroupCondition {
    pub fn with(logic: GroupLogic, conditions: Vec<ConditionNode>) -> Self {
        Self {
            id: ConditionId::generate(),
            group_logic: logic,
            conditions,
        }
    }

    pub fn push_leaf(&mut self, condition: Condition) {
        self.conditions.push(ConditionNode::Leaf(condition));
    }

    pub fn push_group(&mut self, group: GroupCondition) {
        self.conditions.push(ConditionNode::Group(group));
    }

    /// True when the group has no leaves at any depth.
    pub fn is_empty(&self) -> bool {
        self.leaf_count() == 0
    }

    pub fn leaf_count(&self) -> usize {
        self.conditions
            .iter()
            .map(|node| match node {
                ConditionNode::Leaf(_) => 1,
                ConditionNode::Group(group) => group.leaf_count(),
            })
            .sum()
    }

    /// All leaves, depth-first, in stored order.
    pub fn leaves(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Condition>) {
        for node in &self.conditions {
            match node {
                ConditionNode::Leaf(leaf) => out.push(leaf),
                ConditionNode::Group(group) => group.collect_leaves(out),
            }
        }
    }

    pub fn incomplete_leaf_count(&self) -> usize {
        self.leaves().iter().filter(|leaf| !leaf.is_complete()).count()
    }

    /// Find a group (this one or any descendant) by id.
    pub fn find_group_mut(&mut self, id: &ConditionId) -> Option<&mut GroupCondition> {
        if &self.id == id {
            return Some(self);
        }
        self.conditions.iter_mut().find_map(|node| match node {
            ConditionNode::Group(group) => group.find_group_mut(id),
            ConditionNode::Leaf(_) => None,
        })
    }

    /// Remove a leaf or nested group by id. Returns whether anything was removed.
    pub fn remove(&mut self, id: &ConditionId) -> bool {
        let before = self.conditions.len();
        self.conditions.retain(|node| match node {
            ConditionNode::Leaf(leaf) => &leaf.id != id,
            ConditionNode::Group(group) => &group.id != id,
        });
        if self.conditions.len() != before {
            return true;
        }
        self.conditions.iter_mut().any(|node| match node {
            ConditionNode::Group(group) => group.remove(id),
            ConditionNode::Leaf(_) => false,
        })
    }

    /// Global variable ids referenced by any leaf.
    pub fn referenced_global_variables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for leaf in self.leaves() {
            for operand in [&leaf.lhs, &leaf.rhs].into_iter().flatten() {
                operand.collect_global_variables(&mut out);
            }
        }
        out
    }

    pub fn first_non_finite(&self) -> Option<f64> {
        self.leaves().into_iter().find_map(|leaf| {
            [&leaf.lhs, &leaf.rhs]
                .into_iter()
                .flatten()
                .find_map(Expression::first_non_finite)
        })
    }

    /// Refresh cached global variable names across every leaf.
    pub fn rename_global_variable(&mut self, variable_id: &str, new_name: &str) -> usize {
        self.conditions
            .iter_mut()
            .map(|node| match node {
                ConditionNode::Leaf(leaf) => [&mut leaf.lhs, &mut leaf.rhs]
                    .into_iter()
                    .flatten()
                    .map(|operand| operand.rename_global_variable(variable_id, new_name))
                    .sum::<usize>(),
                ConditionNode::Group(group) => group.rename_global_variable(variable_id, new_name),
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::expression::PriceField;

    fn sample_tree() -> GroupCondition {
        let mut inner = create_default_group(GroupLogic::Or);
        inner.push_leaf(create_default_condition());
        inner.push_leaf(Condition {
            id: ConditionId::new("broken"),
            lhs: None,
            operator: ComparisonOperator::LessThan,
            rhs: Some(Expression::constant(1.0)),
        });

        let mut root = create_default_group(GroupLogic::And);
        root.push_leaf(create_default_condition());
        root.push_group(inner);
        root
    }

    #[test]
    fn leaf_count_spans_nested_groups() {
        let tree = sample_tree();
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(tree.incomplete_leaf_count(), 1);
        assert!(!tree.is_empty());
        assert!(create_default_group(GroupLogic::And).is_empty());
    }

    #[test]
    fn remove_reaches_nested_leaves() {
        let mut tree = sample_tree();
        assert!(tree.remove(&ConditionId::new("broken")));
        assert_eq!(tree.leaf_count(), 2);
        assert!(!tree.remove(&ConditionId::new("broken")));
    }

    #[test]
    fn untagged_nodes_deserialize_by_shape() {
        let json = r#"{
            "id": "root",
            "groupLogic": "AND",
            "conditions": [
                {"id": "c1", "lhs": {"type": "marketData", "field": "close"},
                 "operator": "crossesAbove", "rhs": {"type": "indicator", "indicatorId": "ema-1"}},
                {"id": "g1", "groupLogic": "OR", "conditions": []}
            ]
        }"#;
        let tree: GroupCondition = serde_json::from_str(json).unwrap();
        assert_eq!(tree.conditions.len(), 2);
        match &tree.conditions[0] {
            ConditionNode::Leaf(leaf) => {
                assert_eq!(leaf.operator, ComparisonOperator::CrossesAbove);
                assert_eq!(leaf.lhs, Some(Expression::market(PriceField::Close)));
            }
            other => panic!("expected leaf, got {other:?}"),
        }
        assert!(matches!(tree.conditions[1], ConditionNode::Group(_)));
    }

    #[test]
    fn referenced_globals_cover_both_operands() {
        let mut root = create_default_group(GroupLogic::And);
        root.push_leaf(Condition::new(
            Expression::global("gv-a", "a"),
            ComparisonOperator::Equal,
            Expression::global("gv-b", "b"),
        ));
        let ids = root.referenced_global_variables();
        assert!(ids.contains("gv-a") && ids.contains("gv-b"));
        assert_eq!(root.rename_global_variable("gv-a", "alpha"), 1);
    }
}
