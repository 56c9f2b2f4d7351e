//! Trailing variables, derived from positions with trailing stops enabled.

use crate::domain::{Position, TrailingSource, TrailingTag, TrailingVariable, VariableId};

pub fn trailing_variable_name(position: &Position, source: TrailingSource) -> String {
    format!("Trailing_{}_{}", position.display_alias(), source.suffix())
}

/// Recompute a node's trailing variables from its positions.
///
/// The result holds one `Position` variable per position with trailing
/// enabled, plus an `Underlying` variable for option positions. Ids of
/// `existing` variables are reused when the same position and source survive.
pub fn derive_trailing_variables(
    positions: &[Position],
    existing: &[TrailingVariable],
) -> Vec<TrailingVariable> {
    let mut out = Vec::new();
    for position in positions {
        let Some(config) = position.active_trailing() else {
            continue;
        };
        let mut sources = vec![TrailingSource::Position];
        if position.is_option() {
            sources.push(TrailingSource::Underlying);
        }
        for source in sources {
            let id = existing
                .iter()
                .find(|v| v.position_id == position.id && v.source == source)
                .map(|v| v.id.clone())
                .unwrap_or_else(VariableId::generate);
            out.push(TrailingVariable {
                id,
                name: trailing_variable_name(position, source),
                tag: TrailingTag::Trailing,
                position_id: position.id.clone(),
                source,
                config: config.clone(),
            });
        }
    }
    out
}
