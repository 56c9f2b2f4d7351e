//! Indicator definitions declared on the start node.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorParam {
    pub name: String,
    pub value: f64,
}

/// An indicator instance the strategy computes, e.g. `RSI` with period 14.
///
/// Expressions reference indicators by `id`; the name and parameters are only
/// needed to render readable previews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub params: Vec<IndicatorParam>,
    /// Named outputs for multi-line indicators (e.g. `upper`, `lower`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,
}

impl IndicatorDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, params: &[(&str, f64)]) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            params: params
                .iter()
                .map(|(name, value)| IndicatorParam {
                    name: (*name).to_string(),
                    value: *value,
                })
                .collect(),
            outputs: Vec::new(),
        }
    }

    /// `RSI(14)`, `BB(20, 2)`, or just `VWAP` without parameters.
    pub fn display_name(&self) -> String {
        if self.params.is_empty() {
            return self.name.clone();
        }
        let params: Vec<String> = self.params.iter().map(|p| format!("{}", p.value)).collect();
        format!("{}({})", self.name, params.join(", "))
    }
}
