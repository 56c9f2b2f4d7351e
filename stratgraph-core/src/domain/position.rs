//! Virtual positions — the strategy-scoped logical positions an entry node opens.

use super::ids::{NodeId, PositionId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionType {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductType {
    /// Squared off by the broker at session end.
    #[serde(rename = "MIS")]
    Intraday,
    /// Carried overnight.
    #[serde(rename = "NRML")]
    Carry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionType {
    #[serde(rename = "CE")]
    Call,
    #[serde(rename = "PE")]
    Put,
}

/// Contract selection for option positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionDetails {
    /// Expiry selector, e.g. `current-week`, `next-month`.
    pub expiry: String,
    /// Strike selector relative to the underlying, e.g. `ATM`, `ITM1`, `OTM2`.
    pub strike_type: String,
    pub option_type: OptionType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailingType {
    Points,
    Percentage,
}

/// Trailing-stop parameters attached to a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailingConfig {
    pub enabled: bool,
    pub trailing_type: TrailingType,
    /// Distance kept between the stop and the best price seen.
    pub trail_distance: f64,
    /// Minimum favourable move before the stop ratchets again.
    #[serde(default)]
    pub trail_step: f64,
}

impl Default for TrailingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            trailing_type: TrailingType::Points,
            trail_distance: 0.0,
            trail_step: 0.0,
        }
    }
}

/// A virtual position opened by an entry node.
///
/// `vpi` is unique across the whole strategy (checked by the graph store on
/// create and edit); `vpt` is an optional user-facing alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: PositionId,
    pub vpi: String,
    #[serde(default)]
    pub vpt: String,
    #[serde(default)]
    pub priority: u32,
    pub position_type: PositionType,
    pub order_type: OrderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<f64>,
    pub lots: u32,
    pub product_type: ProductType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_details: Option<OptionDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trailing_config: Option<TrailingConfig>,
    pub source_node_id: NodeId,
    /// Re-entry limit; mirrored read-only by linked re-entry-signal nodes.
    #[serde(default = "default_max_entries")]
    pub max_entries: u32,
}

fn default_max_entries() -> u32 {
    1
}

impl Position {
    /// Market buy of one lot, intraday, no trailing.
    pub fn new(vpi: impl Into<String>, source_node_id: NodeId) -> Self {
        Self {
            id: PositionId::generate(),
            vpi: vpi.into(),
            vpt: String::new(),
            priority: 1,
            position_type: PositionType::Buy,
            order_type: OrderType::Market,
            limit_price: None,
            lots: 1,
            product_type: ProductType::Intraday,
            option_details: None,
            trailing_config: None,
            source_node_id,
            max_entries: default_max_entries(),
        }
    }

    pub fn is_option(&self) -> bool {
        self.option_details.is_some()
    }

    /// The alias shown to users: `vpt` when set, otherwise `vpi`.
    pub fn display_alias(&self) -> &str {
        let vpt = self.vpt.trim();
        if vpt.is_empty() {
            &self.vpi
        } else {
            vpt
        }
    }

    /// The enabled trailing config, if any.
    pub fn active_trailing(&self) -> Option<&TrailingConfig> {
        self.trailing_config.as_ref().filter(|c| c.enabled)
    }
}
