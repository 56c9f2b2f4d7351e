//! Human-readable previews of expressions and condition trees.
//!
//! Rendering is pure and total: it never fails. Sub-trees that are
//! incomplete or malformed render as a sentinel containing `Incomplete` or
//! `Error`, and group rendering drops such leaves so one bad leaf never blanks
//! the whole preview.

use std::collections::BTreeMap;

use super::condition::{Condition, ConditionNode, GroupCondition};
use super::expression::Expression;
use crate::domain::{GlobalVariable, IndicatorDefinition};
use crate::graph::StartData;

/// Metadata needed to render references readably.
///
/// Indicator definitions come from the strategy's `start` node; global
/// variable names from the strategy's global variable list.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    indicators: BTreeMap<String, IndicatorDefinition>,
    global_variables: BTreeMap<String, String>,
}

impl RenderContext {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_start(start: &StartData) -> Self {
        Self::from_indicators(&start.indicators)
    }

    pub fn from_indicators(indicators: &[IndicatorDefinition]) -> Self {
        Self {
            indicators: indicators
                .iter()
                .map(|def| (def.id.clone(), def.clone()))
                .collect(),
            global_variables: BTreeMap::new(),
        }
    }

    pub fn with_global_variables(mut self, globals: &[GlobalVariable]) -> Self {
        self.global_variables = globals
            .iter()
            .map(|gv| (gv.id.0.clone(), gv.name.clone()))
            .collect();
        self
    }

    pub fn indicator(&self, id: &str) -> Option<&IndicatorDefinition> {
        self.indicators.get(id)
    }
}

/// True for strings produced by the renderer for incomplete or broken input.
pub fn is_sentinel(rendered: &str) -> bool {
    rendered.contains("Incomplete") || rendered.contains("Error")
}

pub fn expression_to_string(expr: &Expression, ctx: &RenderContext) -> String {
    render_expression(expr, ctx).unwrap_or_else(|sentinel| sentinel)
}

pub fn condition_to_string(condition: &Condition, ctx: &RenderContext) -> String {
    render_condition(condition, ctx).unwrap_or_else(|sentinel| sentinel)
}

/// Render a condition tree, e.g. `RSI(14) > 70 AND (Close > 100 OR Volume > 5000)`.
///
/// Empty groups render as the empty string. Leaves are kept in stored order.
pub fn group_condition_to_string(group: &GroupCondition, ctx: &RenderContext) -> String {
    render_group(group, ctx, false)
}

fn render_group(group: &GroupCondition, ctx: &RenderContext, nested: bool) -> String {
    let parts: Vec<String> = group
        .conditions
        .iter()
        .filter_map(|node| match node {
            ConditionNode::Leaf(leaf) => render_condition(leaf, ctx).ok(),
            ConditionNode::Group(inner) => {
                let rendered = render_group(inner, ctx, true);
                (!rendered.is_empty()).then_some(rendered)
            }
        })
        .collect();

    if parts.is_empty() {
        return String::new();
    }

    let separator = format!(" {} ", group.group_logic.keyword());
    let joined = parts.join(&separator);
    if nested {
        format!("({joined})")
    } else {
        joined
    }
}

// Err carries the sentinel to display in place of the sub-tree.
type Rendered = Result<String, String>;

fn render_condition(condition: &Condition, ctx: &RenderContext) -> Rendered {
    let (Some(lhs), Some(rhs)) = (&condition.lhs, &condition.rhs) else {
        return Err("Incomplete condition".to_string());
    };
    let lhs = render_expression(lhs, ctx)?;
    let rhs = render_expression(rhs, ctx)?;
    Ok(format!("{lhs} {} {rhs}", condition.operator.symbol()))
}

fn render_expression(expr: &Expression, ctx: &RenderContext) -> Rendered {
    match expr {
        Expression::Constant { value } => {
            if value.is_finite() {
                Ok(format!("{value}"))
            } else {
                Err("Error: invalid number".to_string())
            }
        }
        Expression::Indicator {
            indicator_id,
            output,
            offset,
        } => {
            if indicator_id.trim().is_empty() {
                return Err("Incomplete indicator".to_string());
            }
            let def = ctx
                .indicator(indicator_id)
                .ok_or_else(|| format!("Error: unknown indicator {indicator_id}"))?;
            let mut out = def.display_name();
            if let Some(output) = output.as_deref().filter(|o| !o.is_empty()) {
                out.push('.');
                out.push_str(output);
            }
            Ok(with_offset(out, *offset))
        }
        Expression::MarketData {
            field,
            timeframe,
            offset,
        } => {
            let mut out = field.label().to_string();
            if let Some(tf) = timeframe.as_deref().filter(|tf| !tf.is_empty()) {
                out = format!("{out}({tf})");
            }
            Ok(with_offset(out, *offset))
        }
        Expression::PositionData { field, vpi } => match vpi.as_deref() {
            Some(vpi) if !vpi.is_empty() => Ok(format!("{}({vpi})", field.label())),
            _ => Ok(field.label().to_string()),
        },
        Expression::GlobalVariable { variable_id, name } => {
            if variable_id.trim().is_empty() {
                return Err("Incomplete global variable".to_string());
            }
            let resolved = ctx
                .global_variables
                .get(variable_id)
                .map(String::as_str)
                .unwrap_or(name.as_str());
            if resolved.is_empty() {
                Err(format!("Error: unknown global variable {variable_id}"))
            } else {
                Ok(resolved.to_string())
            }
        }
        Expression::Math {
            operator,
            left,
            right,
        } => {
            let (Some(left), Some(right)) = (left, right) else {
                return Err("Incomplete expression".to_string());
            };
            let left = render_expression(left, ctx)?;
            let right = render_expression(right, ctx)?;
            Ok(match operator.symbol() {
                Some(symbol) => format!("({left} {symbol} {right})"),
                None => format!("{}({left}, {right})", operator.function_name()),
            })
        }
    }
}

fn with_offset(rendered: String, offset: u32) -> String {
    if offset == 0 {
        rendered
    } else {
        format!("{rendered}[{offset}]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::condition::{
        create_default_group, ComparisonOperator, Condition, GroupLogic,
    };
    use crate::ast::expression::{MathOperator, PositionField, PriceField};
    use crate::domain::ConditionId;

    fn ctx() -> RenderContext {
        RenderContext::from_indicators(&[
            IndicatorDefinition::new("rsi-1", "RSI", &[("period", 14.0)]),
            IndicatorDefinition::new("ema-1", "EMA", &[("period", 20.0)]),
        ])
    }

    fn leaf(lhs: Expression, op: ComparisonOperator, rhs: Expression) -> Condition {
        Condition::new(lhs, op, rhs)
    }

    #[test]
    fn indicator_renders_with_params_output_and_offset() {
        let expr = Expression::Indicator {
            indicator_id: "rsi-1".into(),
            output: Some("signal".into()),
            offset: 2,
        };
        assert_eq!(expression_to_string(&expr, &ctx()), "RSI(14).signal[2]");
    }

    #[test]
    fn unknown_and_unselected_indicators_are_sentinels() {
        let unknown = expression_to_string(&Expression::indicator("nope"), &ctx());
        assert!(is_sentinel(&unknown), "{unknown}");
        let unselected = expression_to_string(&Expression::indicator(""), &ctx());
        assert!(unselected.contains("Incomplete"));
    }

    #[test]
    fn math_renders_infix_and_function_forms() {
        let expr = Expression::math(
            MathOperator::Add,
            Expression::market(PriceField::Close),
            Expression::math(
                MathOperator::Max,
                Expression::constant(5.0),
                Expression::PositionData {
                    field: PositionField::EntryPrice,
                    vpi: Some("p1".into()),
                },
            ),
        );
        assert_eq!(
            expression_to_string(&expr, &ctx()),
            "(Close + max(5, Entry Price(p1)))"
        );
    }

    #[test]
    fn math_with_missing_operand_is_incomplete() {
        let expr = Expression::Math {
            operator: MathOperator::Divide,
            left: None,
            right: Some(Box::new(Expression::constant(2.0))),
        };
        assert_eq!(expression_to_string(&expr, &ctx()), "Incomplete expression");
    }

    #[test]
    fn global_variable_prefers_context_name() {
        let gv = GlobalVariable {
            id: "gv-1".into(),
            name: "tradeCount".into(),
            initial_value: None,
            description: String::new(),
        };
        let ctx = ctx().with_global_variables(&[gv]);
        let expr = Expression::global("gv-1", "staleName");
        assert_eq!(expression_to_string(&expr, &ctx), "tradeCount");
    }

    #[test]
    fn nested_groups_are_parenthesised_with_their_own_logic() {
        let mut inner = create_default_group(GroupLogic::Or);
        inner.push_leaf(leaf(
            Expression::market(PriceField::Close),
            ComparisonOperator::GreaterThan,
            Expression::constant(100.0),
        ));
        inner.push_leaf(leaf(
            Expression::market(PriceField::Volume),
            ComparisonOperator::GreaterThan,
            Expression::constant(5000.0),
        ));

        let mut root = create_default_group(GroupLogic::And);
        root.push_leaf(leaf(
            Expression::indicator("rsi-1"),
            ComparisonOperator::GreaterThan,
            Expression::constant(70.0),
        ));
        root.push_group(inner);

        assert_eq!(
            group_condition_to_string(&root, &ctx()),
            "RSI(14) > 70 AND (Close > 100 OR Volume > 5000)"
        );
    }

    #[test]
    fn incomplete_leaf_is_dropped_not_fatal() {
        let mut root = create_default_group(GroupLogic::And);
        root.push_leaf(leaf(
            Expression::indicator("ema-1"),
            ComparisonOperator::CrossesAbove,
            Expression::indicator("rsi-1"),
        ));
        root.push_leaf(Condition {
            id: ConditionId::new("half"),
            lhs: Some(Expression::market(PriceField::Close)),
            operator: ComparisonOperator::LessThan,
            rhs: None,
        });
        assert_eq!(
            group_condition_to_string(&root, &ctx()),
            "EMA(20) crosses above RSI(14)"
        );
    }

    #[test]
    fn empty_groups_render_empty_and_vanish_when_nested() {
        let mut root = create_default_group(GroupLogic::Or);
        assert_eq!(group_condition_to_string(&root, &ctx()), "");

        root.push_group(create_default_group(GroupLogic::And));
        root.push_leaf(leaf(
            Expression::market(PriceField::High),
            ComparisonOperator::GreaterThanOrEqual,
            Expression::market(PriceField::Open),
        ));
        assert_eq!(group_condition_to_string(&root, &ctx()), "High >= Open");
    }
}
