//! Expression trees — the computed values nodes act on.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Discriminant of an `Expression`, used to synthesise defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExpressionKind {
    Constant,
    Indicator,
    MarketData,
    PositionData,
    GlobalVariable,
    Math,
}

impl ExpressionKind {
    pub const ALL: [ExpressionKind; 6] = [
        ExpressionKind::Constant,
        ExpressionKind::Indicator,
        ExpressionKind::MarketData,
        ExpressionKind::PositionData,
        ExpressionKind::GlobalVariable,
        ExpressionKind::Math,
    ];

    /// Wire name of the kind (the `type` tag).
    pub fn as_str(self) -> &'static str {
        match self {
            ExpressionKind::Constant => "constant",
            ExpressionKind::Indicator => "indicator",
            ExpressionKind::MarketData => "marketData",
            ExpressionKind::PositionData => "positionData",
            ExpressionKind::GlobalVariable => "globalVariable",
            ExpressionKind::Math => "math",
        }
    }
}

/// Candle fields available to `marketData` expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    Volume,
    /// Last traded price.
    Ltp,
}

impl PriceField {
    pub fn label(self) -> &'static str {
        match self {
            PriceField::Open => "Open",
            PriceField::High => "High",
            PriceField::Low => "Low",
            PriceField::Close => "Close",
            PriceField::Volume => "Volume",
            PriceField::Ltp => "LTP",
        }
    }
}

/// Live position fields available to `positionData` expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PositionField {
    EntryPrice,
    CurrentPrice,
    Pnl,
    PnlPercent,
    Quantity,
    HighestPrice,
    LowestPrice,
}

impl PositionField {
    pub fn label(self) -> &'static str {
        match self {
            PositionField::EntryPrice => "Entry Price",
            PositionField::CurrentPrice => "Current Price",
            PositionField::Pnl => "P&L",
            PositionField::PnlPercent => "P&L %",
            PositionField::Quantity => "Quantity",
            PositionField::HighestPrice => "Highest Price",
            PositionField::LowestPrice => "Lowest Price",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MathOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Min,
    Max,
}

impl MathOperator {
    /// Infix symbol, or `None` for the function-style operators.
    pub fn symbol(self) -> Option<&'static str> {
        match self {
            MathOperator::Add => Some("+"),
            MathOperator::Subtract => Some("-"),
            MathOperator::Multiply => Some("*"),
            MathOperator::Divide => Some("/"),
            MathOperator::Modulo => Some("%"),
            MathOperator::Min | MathOperator::Max => None,
        }
    }

    pub fn function_name(self) -> &'static str {
        match self {
            MathOperator::Min => "min",
            MathOperator::Max => "max",
            MathOperator::Add => "add",
            MathOperator::Subtract => "sub",
            MathOperator::Multiply => "mul",
            MathOperator::Divide => "div",
            MathOperator::Modulo => "mod",
        }
    }
}

/// A computed value.
///
/// Tagged by `type` on the wire. Operands of `math` are optional so that a
/// half-built expression can be stored while the user is still editing it;
/// such expressions are *incomplete* and render as a sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Expression {
    Constant {
        value: f64,
    },
    #[serde(rename_all = "camelCase")]
    Indicator {
        indicator_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
        /// Bars back from the current bar.
        #[serde(default)]
        offset: u32,
    },
    #[serde(rename_all = "camelCase")]
    MarketData {
        field: PriceField,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeframe: Option<String>,
        #[serde(default)]
        offset: u32,
    },
    #[serde(rename_all = "camelCase")]
    PositionData {
        field: PositionField,
        /// Which virtual position; `None` means the node's own position.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        vpi: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    GlobalVariable {
        variable_id: String,
        #[serde(default)]
        name: String,
    },
    Math {
        operator: MathOperator,
        #[serde(default)]
        left: Option<Box<Expression>>,
        #[serde(default)]
        right: Option<Box<Expression>>,
    },
}

/// Minimal instance of each expression kind.
///
/// Used whenever a new variable, assignment or condition operand is created.
/// Reference kinds that need a user choice (`indicator`, `globalVariable`)
/// start unselected and therefore incomplete.
pub fn create_default_expression(kind: ExpressionKind) -> Expression {
    match kind {
        ExpressionKind::Constant => Expression::Constant { value: 0.0 },
        ExpressionKind::Indicator => Expression::Indicator {
            indicator_id: String::new(),
            output: None,
            offset: 0,
        },
        ExpressionKind::MarketData => Expression::MarketData {
            field: PriceField::Close,
            timeframe: None,
            offset: 0,
        },
        ExpressionKind::PositionData => Expression::PositionData {
            field: PositionField::Pnl,
            vpi: None,
        },
        ExpressionKind::GlobalVariable => Expression::GlobalVariable {
            variable_id: String::new(),
            name: String::new(),
        },
        ExpressionKind::Math => Expression::Math {
            operator: MathOperator::Add,
            left: Some(Box::new(Expression::constant(0.0))),
            right: Some(Box::new(Expression::constant(0.0))),
        },
    }
}

impl Expression {
    pub fn constant(value: f64) -> Self {
        Expression::Constant { value }
    }

    pub fn indicator(indicator_id: impl Into<String>) -> Self {
        Expression::Indicator {
            indicator_id: indicator_id.into(),
            output: None,
            offset: 0,
        }
    }

    pub fn market(field: PriceField) -> Self {
        Expression::MarketData {
            field,
            timeframe: None,
            offset: 0,
        }
    }

    pub fn global(variable_id: impl Into<String>, name: impl Into<String>) -> Self {
        Expression::GlobalVariable {
            variable_id: variable_id.into(),
            name: name.into(),
        }
    }

    pub fn math(operator: MathOperator, left: Expression, right: Expression) -> Self {
        Expression::Math {
            operator,
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
        }
    }

    pub fn kind(&self) -> ExpressionKind {
        match self {
            Expression::Constant { .. } => ExpressionKind::Constant,
            Expression::Indicator { .. } => ExpressionKind::Indicator,
            Expression::MarketData { .. } => ExpressionKind::MarketData,
            Expression::PositionData { .. } => ExpressionKind::PositionData,
            Expression::GlobalVariable { .. } => ExpressionKind::GlobalVariable,
            Expression::Math { .. } => ExpressionKind::Math,
        }
    }

    /// Structural completeness, independent of any render context.
    pub fn is_complete(&self) -> bool {
        match self {
            Expression::Constant { value } => value.is_finite(),
            Expression::Indicator { indicator_id, .. } => !indicator_id.trim().is_empty(),
            Expression::MarketData { .. } | Expression::PositionData { .. } => true,
            Expression::GlobalVariable { variable_id, .. } => !variable_id.trim().is_empty(),
            Expression::Math { left, right, .. } => match (left, right) {
                (Some(l), Some(r)) => l.is_complete() && r.is_complete(),
                _ => false,
            },
        }
    }

    /// First NaN or infinite constant in the tree. Such values have no JSON
    /// representation.
    pub fn first_non_finite(&self) -> Option<f64> {
        match self {
            Expression::Constant { value } if !value.is_finite() => Some(*value),
            Expression::Math { left, right, .. } => [left, right]
                .into_iter()
                .flatten()
                .find_map(|operand| operand.first_non_finite()),
            _ => None,
        }
    }

    /// Collect every global variable id referenced anywhere in the tree.
    pub fn collect_global_variables(&self, out: &mut BTreeSet<String>) {
        match self {
            Expression::GlobalVariable { variable_id, .. } if !variable_id.is_empty() => {
                out.insert(variable_id.clone());
            }
            Expression::Math { left, right, .. } => {
                for operand in [left, right].into_iter().flatten() {
                    operand.collect_global_variables(out);
                }
            }
            _ => {}
        }
    }

    /// Refresh the cached name of every reference to `variable_id`.
    ///
    /// Returns the number of references rewritten.
    pub fn rename_global_variable(&mut self, variable_id: &str, new_name: &str) -> usize {
        match self {
            Expression::GlobalVariable { variable_id: id, name } if id.as_str() == variable_id => {
                *name = new_name.to_string();
                1
            }
            Expression::Math { left, right, .. } => [left, right]
                .into_iter()
                .flatten()
                .map(|operand| operand.rename_global_variable(variable_id, new_name))
                .sum(),
            _ => 0,
        }
    }

    /// Depth of the tree (a leaf has depth 1).
    pub fn depth(&self) -> usize {
        match self {
            Expression::Math { left, right, .. } => {
                1 + [left, right]
                    .into_iter()
                    .flatten()
                    .map(|operand| operand.depth())
                    .max()
                    .unwrap_or(0)
            }
            _ => 1,
        }
    }
}
