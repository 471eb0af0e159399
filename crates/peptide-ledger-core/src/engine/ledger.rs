//! Dose ledger operations.

use std::collections::HashMap;

use crate::models::{DoseInput, DoseLogEntry, Peptide, TypicalDose};

use super::units::units_for;
use super::{EngineError, EngineResult};

impl Peptide {
    /// Append a dose drawn from the active vial.
    ///
    /// The entry's `vial_id` is always the active vial's, whatever the caller
    /// had in mind.
    pub fn append_dose(&mut self, input: DoseInput) -> EngineResult<DoseLogEntry> {
        let vial_id = self
            .active_vial()
            .map(|v| v.id.clone())
            .ok_or_else(|| EngineError::NoActiveVial(self.id.clone()))?;

        let entry = input.into_entry(&vial_id);
        self.dose_logs.push(entry.clone());
        Ok(entry)
    }

    /// Remove an entry from the ledger. Removing an absent entry is an error.
    pub fn remove_dose(&mut self, entry_id: &str) -> EngineResult<DoseLogEntry> {
        let index = self
            .dose_logs
            .iter()
            .position(|e| e.id == entry_id)
            .ok_or_else(|| EngineError::NotFound(format!("dose log entry {}", entry_id)))?;
        Ok(self.dose_logs.remove(index))
    }

    /// Units drawn from `vial_id` according to the ledger.
    pub fn used_units_for_vial(&self, vial_id: &str, typical: TypicalDose) -> EngineResult<u32> {
        self.dose_logs_for_vial(vial_id)
            .try_fold(0u32, |total, entry| -> EngineResult<u32> {
                let units = units_for(entry.amount, entry.unit, typical)?;
                Ok(total.saturating_add(units))
            })
    }

    /// Ledger usage for every vial referenced by at least one entry.
    pub fn used_units_by_vial(&self, typical: TypicalDose) -> EngineResult<HashMap<String, u32>> {
        let mut used: HashMap<String, u32> = HashMap::new();
        for entry in &self.dose_logs {
            let units = units_for(entry.amount, entry.unit, typical)?;
            let total = used.entry(entry.vial_id.clone()).or_insert(0);
            *total = total.saturating_add(units);
        }
        Ok(used)
    }
}
