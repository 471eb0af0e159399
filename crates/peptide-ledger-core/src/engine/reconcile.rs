//! Ledger replay and drift correction.
//!
//! The dose ledger is the source of truth. A vial's `remaining_amount_units`
//! is a cached projection, `initial - used` clamped at zero, that may drift
//! when something other than this engine writes the record.

use serde::{Deserialize, Serialize};

use crate::models::{Peptide, TypicalDose};

use super::EngineResult;

/// A vial whose stored counter disagrees with ledger replay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VialDrift {
    pub vial_id: String,
    /// Counter as stored
    pub stored_remaining: u32,
    /// Counter according to the ledger
    pub replayed_remaining: u32,
}

impl VialDrift {
    /// Stored minus replayed; positive means the counter overstates stock.
    pub fn delta(&self) -> i64 {
        self.stored_remaining as i64 - self.replayed_remaining as i64
    }
}

/// Outcome of reconciling one peptide.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconcileReport {
    pub peptide_id: String,
    /// Drift found (and corrected) per vial
    pub drifts: Vec<VialDrift>,
    /// Remaining doses in the active vial after correction
    pub remaining_doses: u32,
    /// Whether the inventory mirror was rewritten
    pub mirror_refreshed: bool,
}

impl ReconcileReport {
    pub fn is_consistent(&self) -> bool {
        self.drifts.is_empty()
    }
}

impl Peptide {
    /// Remaining units of `vial_id` by ledger replay.
    pub fn replayed_remaining(&self, vial_id: &str, typical: TypicalDose) -> EngineResult<u32> {
        let initial = self
            .vial(vial_id)
            .map(|v| v.initial_amount_units)
            .unwrap_or(0);
        let used = self.used_units_for_vial(vial_id, typical)?;
        Ok(initial.saturating_sub(used))
    }

    /// Remaining doses in the active vial by ledger replay; zero without one.
    pub fn remaining_doses(&self, typical: TypicalDose) -> EngineResult<u32> {
        match self.active_vial() {
            Some(vial) => self.replayed_remaining(&vial.id, typical),
            None => Ok(0),
        }
    }

    /// Vials whose stored counter disagrees with replay.
    pub fn detect_drift(&self, typical: TypicalDose) -> EngineResult<Vec<VialDrift>> {
        let used = self.used_units_by_vial(typical)?;
        Ok(self
            .vials
            .iter()
            .filter_map(|vial| {
                let replayed = vial
                    .initial_amount_units
                    .saturating_sub(used.get(&vial.id).copied().unwrap_or(0));
                (vial.remaining_amount_units != replayed).then(|| VialDrift {
                    vial_id: vial.id.clone(),
                    stored_remaining: vial.remaining_amount_units,
                    replayed_remaining: replayed,
                })
            })
            .collect())
    }

    /// Overwrite every vial counter with its replayed value.
    ///
    /// Returns the drift that was corrected.
    pub fn apply_projection(&mut self, typical: TypicalDose) -> EngineResult<Vec<VialDrift>> {
        let drifts = self.detect_drift(typical)?;
        for drift in &drifts {
            if let Some(vial) = self.vial_mut(&drift.vial_id) {
                vial.remaining_amount_units = drift.replayed_remaining;
            }
        }
        Ok(drifts)
    }
}
