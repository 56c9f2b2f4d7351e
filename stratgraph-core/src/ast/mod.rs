//! Condition/expression AST: construction, defaults and previews.

pub mod condition;
pub mod expression;
pub mod render;

pub use condition::{
    create_default_condition, create_default_group, ComparisonOperator, Condition, ConditionNode,
    GroupCondition, GroupLogic,
};
pub use expression::{
    create_default_expression, Expression, ExpressionKind, MathOperator, PositionField, PriceField,
};
pub use render::{
    condition_to_string, expression_to_string, group_condition_to_string, is_sentinel,
    RenderContext,
};
