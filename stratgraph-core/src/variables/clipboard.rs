//! Copy/paste of global variable assignments between nodes.
//!
//! The clipboard is an ordinary value owned by the editing session; there is
//! no process-wide instance.

use tracing::debug;

use crate::domain::{GlobalVariable, GlobalVariableUpdate, VariableId};

/// Outcome counts of one paste.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PasteReport {
    pub pasted: usize,
    /// Target global variable no longer exists.
    pub missing: usize,
    /// Target node already assigns that global variable.
    pub duplicate: usize,
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentClipboard {
    payload: Option<Vec<GlobalVariableUpdate>>,
}

impl AssignmentClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture `updates`, replacing any earlier copy.
    pub fn copy(&mut self, updates: &[GlobalVariableUpdate]) {
        debug!(count = updates.len(), "copied assignments");
        self.payload = Some(updates.to_vec());
    }

    pub fn is_empty(&self) -> bool {
        self.payload.as_ref().map_or(true, Vec::is_empty)
    }

    pub fn clear(&mut self) {
        self.payload = None;
    }

    /// Paste the copied assignments into `target`.
    ///
    /// Each assignment is re-resolved against `globals`, by id first and then
    /// by name. Unresolvable assignments and ones whose global is already
    /// assigned on the target are skipped.
    pub fn paste_into(
        &self,
        target: &mut Vec<GlobalVariableUpdate>,
        globals: &[GlobalVariable],
    ) -> PasteReport {
        let mut report = PasteReport::default();
        let Some(payload) = &self.payload else {
            return report;
        };

        for update in payload {
            let resolved = globals
                .iter()
                .find(|gv| gv.id == update.global_variable_id)
                .or_else(|| {
                    globals
                        .iter()
                        .find(|gv| gv.name.trim() == update.global_variable_name.trim())
                });
            let Some(global) = resolved else {
                report.missing += 1;
                continue;
            };
            if target.iter().any(|u| u.global_variable_id == global.id) {
                report.duplicate += 1;
                continue;
            }
            target.push(GlobalVariableUpdate {
                id: VariableId::generate(),
                global_variable_id: global.id.clone(),
                global_variable_name: global.name.clone(),
                expression: update.expression.clone(),
            });
            report.pasted += 1;
        }
        debug!(?report, "pasted assignments");
        report
    }
}
