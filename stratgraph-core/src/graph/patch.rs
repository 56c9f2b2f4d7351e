//! Merge patches applied to a node's typed data.
//!
//! Every patch replaces exactly one field group and leaves sibling fields
//! untouched, so a label edit and a condition edit flushed in either order
//! produce the same record.

use crate::ast::{Expression, GroupCondition};
use crate::domain::{GlobalVariableUpdate, IndicatorDefinition, NodeVariable, Position};
use crate::variables::{derive_trailing_variables, validate_assignments, validate_names};

use super::node::{ActionRole, NodeData, RetryConfig};
use super::store::GraphError;

#[derive(Debug, Clone, PartialEq)]
pub enum NodePatch {
    SetLabel(String),
    SetConditions(GroupCondition),
    SetVariables(Vec<NodeVariable>),
    /// Entry nodes only. Trailing variables are re-derived on apply.
    SetPositions(Vec<Position>),
    SetGlobalVariableUpdates(Vec<GlobalVariableUpdate>),
    SetActionRole(ActionRole),
    SetAlertMessage(String),
    /// `re-entry` loops only; `re-entry-signal` nodes mirror their target.
    SetRetryConfig(RetryConfig),
    SetIndicators(Vec<IndicatorDefinition>),
    SetSymbol(String),
    SetTargetPositions(Vec<String>),
    SetModifyLevels {
        target_position_vpi: Option<String>,
        stop_loss: Option<Expression>,
        target: Option<Expression>,
    },
}

impl NodePatch {
    pub fn name(&self) -> &'static str {
        match self {
            NodePatch::SetLabel(_) => "label",
            NodePatch::SetConditions(_) => "conditions",
            NodePatch::SetVariables(_) => "variables",
            NodePatch::SetPositions(_) => "positions",
            NodePatch::SetGlobalVariableUpdates(_) => "globalVariableUpdates",
            NodePatch::SetActionRole(_) => "actionType",
            NodePatch::SetAlertMessage(_) => "message",
            NodePatch::SetRetryConfig(_) => "retryConfig",
            NodePatch::SetIndicators(_) => "indicators",
            NodePatch::SetSymbol(_) => "symbol",
            NodePatch::SetTargetPositions(_) => "targetPositionVpis",
            NodePatch::SetModifyLevels { .. } => "modifyLevels",
        }
    }

    /// Merge this patch into `data`.
    ///
    /// On error `data` is left untouched.
    pub fn apply(&self, data: &mut NodeData) -> Result<(), GraphError> {
        let kind = data.kind();
        let not_applicable = || GraphError::PatchNotApplicable {
            patch: self.name(),
            kind,
        };

        match (self, data) {
            (NodePatch::SetLabel(label), data) => data.set_label(label.clone()),

            (NodePatch::SetConditions(tree), data) => {
                if let Some(value) = tree.first_non_finite() {
                    return Err(GraphError::NonFiniteConstant(value));
                }
                *data.conditions_mut().ok_or_else(not_applicable)? = tree.clone();
            }

            (NodePatch::SetVariables(vars), data) => {
                let slot = data.variables_mut().ok_or_else(not_applicable)?;
                validate_names(vars)?;
                check_finite(vars.iter().map(|v| &v.expression))?;
                *slot = vars.clone();
            }

            (NodePatch::SetPositions(positions), NodeData::Entry(d)) => {
                check_local_vpis(positions)?;
                d.trailing_variables = derive_trailing_variables(positions, &d.trailing_variables);
                d.positions = positions.clone();
            }

            (NodePatch::SetGlobalVariableUpdates(updates), data) => {
                let slot = data.global_variable_updates_mut().ok_or_else(not_applicable)?;
                validate_assignments(updates)?;
                check_finite(updates.iter().map(|u| &u.expression))?;
                *slot = updates.clone();
            }

            (NodePatch::SetActionRole(role), data) => {
                if kind.fixed_action_role().is_some_and(|fixed| fixed != *role) {
                    return Err(not_applicable());
                }
                *data.action_type_mut().ok_or_else(not_applicable)? = Some(*role);
            }

            (NodePatch::SetAlertMessage(message), NodeData::Alert(d)) => {
                d.message = message.clone();
            }

            (NodePatch::SetRetryConfig(_), NodeData::ReEntrySignal(_)) => {
                return Err(GraphError::MirroredField {
                    field: "retryConfig.maxEntries",
                });
            }
            (NodePatch::SetRetryConfig(config), NodeData::ReEntry(d)) => {
                d.retry_config = *config;
            }

            (NodePatch::SetIndicators(indicators), NodeData::Start(d)) => {
                d.indicators = indicators.clone();
            }
            (NodePatch::SetSymbol(symbol), NodeData::Start(d)) => {
                d.symbol = symbol.clone();
            }

            (NodePatch::SetTargetPositions(vpis), NodeData::Exit(d)) => {
                d.target_position_vpis = vpis.clone();
            }
            (NodePatch::SetTargetPositions(vpis), NodeData::SquareOff(d)) => {
                d.target_position_vpis = vpis.clone();
            }

            (
                NodePatch::SetModifyLevels {
                    target_position_vpi,
                    stop_loss,
                    target,
                },
                NodeData::Modify(d),
            ) => {
                check_finite(stop_loss.iter().chain(target.iter()))?;
                d.target_position_vpi = target_position_vpi.clone();
                d.stop_loss = stop_loss.clone();
                d.target = target.clone();
            }

            _ => return Err(not_applicable()),
        }
        Ok(())
    }
}

/// VPIs must be non-empty and distinct within one node's position list.
pub(crate) fn check_local_vpis(positions: &[Position]) -> Result<(), GraphError> {
    let mut seen = std::collections::BTreeSet::new();
    for position in positions {
        let vpi = position.vpi.trim();
        if vpi.is_empty() {
            return Err(GraphError::EmptyVpi);
        }
        if !seen.insert(vpi) {
            return Err(GraphError::DuplicateVpi(vpi.to_string()));
        }
    }
    Ok(())
}

fn check_finite<'a>(expressions: impl IntoIterator<Item = &'a Expression>) -> Result<(), GraphError> {
    match expressions.into_iter().find_map(Expression::first_non_finite) {
        Some(value) => Err(GraphError::NonFiniteConstant(value)),
        None => Ok(()),
    }
}
