//! Domain types shared by the graph, the AST, and persistence.

pub mod ids;
pub mod indicator;
pub mod position;
pub mod stamp;
pub mod variable;

pub use ids::{
    ConditionId, EdgeId, GlobalVariableId, NodeId, PositionId, StrategyId, VariableId,
};
pub use indicator::{IndicatorDefinition, IndicatorParam};
pub use position::{
    OptionDetails, OptionType, OrderType, Position, PositionType, ProductType, TrailingConfig,
    TrailingType,
};
pub use stamp::next_stamp;
pub use variable::{
    GlobalVariable, GlobalVariableUpdate, NodeVariable, TrailingSource, TrailingTag,
    TrailingVariable,
};
