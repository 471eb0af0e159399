//! Dose ledger / vial inventory reconciliation engine.
//!
//! Every mutation follows the same shape: load the peptide, apply vial and
//! ledger changes in memory, re-project vial counters from the ledger, save
//! the peptide in one write, then push the inventory mirror best-effort.
//! A failed mirror push is repaired by the next read.

mod ledger;
pub mod mirror;
mod reconcile;
pub mod units;
mod vials;

pub use reconcile::*;
pub use units::{resolve_typical_dose, units_for, ConversionError};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::models::{
    CompletionType, DoseInput, DoseLogEntry, DoseUnit, InventoryMirrorRecord, NewPeptide,
    NewVial, Peptide, TypicalDose, Vial, VialStatus,
};
use crate::store::{PeptideStore, StoreError};

/// Engine errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No active vial for peptide {0}")]
    NoActiveVial(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Vial {vial_id} is already {status}")]
    AlreadyTerminal { vial_id: String, status: VialStatus },

    #[error("Persistence error: {0}")]
    Persistence(StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ConversionError> for EngineError {
    fn from(e: ConversionError) -> Self {
        EngineError::Validation(e.to_string())
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => EngineError::NotFound(what),
            other => EngineError::Persistence(other),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Engine settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    /// Used for peptides without a configured typical dose
    pub fallback_typical_dose: TypicalDose,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            fallback_typical_dose: TypicalDose::new(300.0, DoseUnit::Mcg),
        }
    }
}

impl From<&LedgerConfig> for EngineSettings {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            fallback_typical_dose: config.dosing.fallback_typical_dose(),
        }
    }
}

/// Owns the invariant between vial counters, the dose ledger and the
/// inventory mirror.
pub struct ReconciliationEngine<S> {
    store: S,
    settings: EngineSettings,
}

impl<S: PeptideStore> ReconciliationEngine<S> {
    pub fn new(store: S, settings: EngineSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // =========================================================================
    // Peptides and vials
    // =========================================================================

    /// Create a peptide and its inventory mirror.
    pub fn create_peptide(&self, new_peptide: NewPeptide) -> EngineResult<Peptide> {
        let name = new_peptide.name.trim();
        if name.is_empty() {
            return Err(EngineError::Validation("Peptide name is required".into()));
        }
        if let Some(typical) = new_peptide.dosing.typical_dose {
            if !typical.amount.is_finite() || typical.amount <= 0.0 {
                return Err(ConversionError::InvalidTypicalDose(typical.amount).into());
            }
        }

        let mut peptide = Peptide::new(name.to_string(), new_peptide.dosing, new_peptide.schedule);
        self.commit(&mut peptide)?;
        info!(peptide_id = %peptide.id, name = %peptide.name, "peptide created");

        let typical = self.typical_dose(&peptide);
        self.push_mirror(&peptide, typical);
        Ok(peptide)
    }

    /// Load a peptide.
    pub fn peptide(&self, peptide_id: &str) -> EngineResult<Peptide> {
        Ok(self.store.load_peptide(peptide_id)?)
    }

    /// Load the stored inventory mirror as-is.
    pub fn inventory_mirror(&self, peptide_id: &str) -> EngineResult<InventoryMirrorRecord> {
        Ok(self.store.load_inventory_mirror(peptide_id)?)
    }

    /// Add a vial to a peptide.
    pub fn add_vial(&self, peptide_id: &str, new_vial: NewVial) -> EngineResult<Vial> {
        let mut peptide = self.store.load_peptide(peptide_id)?;
        let vial = peptide.add_vial(new_vial)?;
        self.commit(&mut peptide)?;
        info!(
            peptide_id,
            vial_id = %vial.id,
            units = vial.initial_amount_units,
            active = vial.is_active(),
            "vial added"
        );

        let typical = self.typical_dose(&peptide);
        self.push_mirror(&peptide, typical);
        Ok(vial)
    }

    /// Make a vial the one new doses are drawn from.
    pub fn activate_vial(&self, peptide_id: &str, vial_id: &str) -> EngineResult<Peptide> {
        let mut peptide = self.store.load_peptide(peptide_id)?;
        peptide.activate_vial(vial_id)?;
        self.commit(&mut peptide)?;
        info!(peptide_id, vial_id, "vial activated");

        let typical = self.typical_dose(&peptide);
        self.push_mirror(&peptide, typical);
        Ok(peptide)
    }

    /// Retire a vial as completed.
    pub fn complete_vial(
        &self,
        peptide_id: &str,
        vial_id: &str,
        completion_type: CompletionType,
        reason: Option<String>,
    ) -> EngineResult<Vial> {
        self.retire(peptide_id, vial_id, |peptide| {
            peptide.complete_vial(vial_id, completion_type, reason)
        })
    }

    /// Discard a vial.
    pub fn discard_vial(&self, peptide_id: &str, vial_id: &str, reason: String) -> EngineResult<Vial> {
        self.retire(peptide_id, vial_id, |peptide| {
            peptide.discard_vial(vial_id, reason)
        })
    }

    fn retire(
        &self,
        peptide_id: &str,
        vial_id: &str,
        apply: impl FnOnce(&mut Peptide) -> EngineResult<Vial>,
    ) -> EngineResult<Vial> {
        let mut peptide = self.store.load_peptide(peptide_id)?;
        let typical = self.typical_dose(&peptide);
        // wasted doses must come from an up-to-date counter
        self.correct_drift(&mut peptide, typical)?;

        let vial = apply(&mut peptide)?;
        self.commit(&mut peptide)?;
        info!(
            peptide_id,
            vial_id,
            status = %vial.status,
            wasted = vial.completion.as_ref().map(|c| c.wasted_doses).unwrap_or(0),
            "vial retired"
        );

        self.push_mirror(&peptide, typical);
        Ok(vial)
    }

    // =========================================================================
    // Dose ledger
    // =========================================================================

    /// Log a dose against the active vial.
    ///
    /// The debit and the new ledger entry are saved in a single write.
    /// Logging never fails because the vial is empty.
    pub fn log_dose(&self, peptide_id: &str, input: DoseInput) -> EngineResult<DoseLogEntry> {
        let mut peptide = self.store.load_peptide(peptide_id)?;
        let active_id = peptide
            .active_vial()
            .map(|v| v.id.clone())
            .ok_or_else(|| EngineError::NoActiveVial(peptide_id.to_string()))?;

        if let Some(taken_at) = &input.taken_at {
            chrono::DateTime::parse_from_rfc3339(taken_at).map_err(|e| {
                EngineError::Validation(format!("Invalid dose timestamp {}: {}", taken_at, e))
            })?;
        }
        let typical = self.typical_dose(&peptide);
        let units = units_for(input.amount, input.unit, typical)?;

        self.correct_drift(&mut peptide, typical)?;
        if let Some(vial) = peptide.vial_mut(&active_id) {
            let shortfall = vial.debit(units);
            if shortfall > 0 {
                debug!(peptide_id, vial_id = %active_id, shortfall, "dose exceeds tracked inventory");
            }
        }
        let entry = peptide.append_dose(input)?;
        self.normalize(&mut peptide, typical)?;
        self.commit(&mut peptide)?;
        info!(
            peptide_id,
            vial_id = %entry.vial_id,
            entry_id = %entry.id,
            units,
            "dose logged"
        );

        self.push_mirror(&peptide, typical);
        Ok(entry)
    }

    /// Undo a logged dose, returning its units to the vial it came from.
    ///
    /// That vial may no longer be the active one, or may already be retired;
    /// a retired vial's recorded waste is left as it was at completion.
    /// Reverting the same entry twice fails with `NotFound`.
    pub fn revert_dose(&self, peptide_id: &str, entry_id: &str) -> EngineResult<Peptide> {
        let mut peptide = self.store.load_peptide(peptide_id)?;
        let entry = peptide
            .dose_log(entry_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("dose log entry {}", entry_id)))?;
        let typical = self.typical_dose(&peptide);
        let units = units_for(entry.amount, entry.unit, typical)?;

        self.correct_drift(&mut peptide, typical)?;
        match peptide.vial_mut(&entry.vial_id) {
            Some(vial) => {
                vial.credit(units);
                if let Some(completion) = &vial.completion {
                    // wasted_doses is written once and no longer matches
                    info!(
                        peptide_id,
                        vial_id = %vial.id,
                        status = %vial.status,
                        recorded_waste = completion.wasted_doses,
                        "dose reverted into a retired vial"
                    );
                }
            }
            None => warn!(
                peptide_id,
                entry_id,
                vial_id = %entry.vial_id,
                "reverted entry references a missing vial"
            ),
        }
        peptide.remove_dose(entry_id)?;
        self.normalize(&mut peptide, typical)?;
        self.commit(&mut peptide)?;
        info!(peptide_id, vial_id = %entry.vial_id, entry_id, units, "dose reverted");

        self.push_mirror(&peptide, typical);
        Ok(peptide)
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Remaining doses in the active vial, by ledger replay.
    ///
    /// Drift in stored counters is reported and corrected, and a stale
    /// inventory mirror is rewritten.
    pub fn remaining_doses(&self, peptide_id: &str) -> EngineResult<u32> {
        Ok(self.reconcile(peptide_id)?.remaining_doses)
    }

    /// Replay the ledger over every vial, persist corrections and refresh the
    /// mirror when stale.
    ///
    /// Failing to persist a correction is logged, not returned: the replayed
    /// values reported are correct either way.
    pub fn reconcile(&self, peptide_id: &str) -> EngineResult<ReconcileReport> {
        let mut peptide = self.store.load_peptide(peptide_id)?;
        let typical = self.typical_dose(&peptide);

        let drifts = self.correct_drift(&mut peptide, typical)?;
        if !drifts.is_empty() {
            match self.commit(&mut peptide) {
                Ok(()) => info!(peptide_id, corrected = drifts.len(), "drift correction saved"),
                Err(e) => warn!(peptide_id, error = %e, "could not save drift correction"),
            }
        }

        let remaining_doses = peptide.remaining_doses(typical)?;
        let mirror_refreshed = self.refresh_mirror_if_stale(&peptide, typical)?;

        Ok(ReconcileReport {
            peptide_id: peptide.id,
            drifts,
            remaining_doses,
            mirror_refreshed,
        })
    }

    /// Rebuild and save the inventory mirror, surfacing any failure.
    pub fn sync_mirror(&self, peptide_id: &str) -> EngineResult<InventoryMirrorRecord> {
        let peptide = self.store.load_peptide(peptide_id)?;
        let typical = self.typical_dose(&peptide);
        let record = mirror::build_mirror(&peptide, typical)?;
        self.store.save_inventory_mirror(&record)?;
        Ok(record)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn typical_dose(&self, peptide: &Peptide) -> TypicalDose {
        let (typical, degraded) =
            resolve_typical_dose(&peptide.dosing, self.settings.fallback_typical_dose);
        if degraded {
            warn!(
                peptide_id = %peptide.id,
                amount = typical.amount,
                unit = %typical.unit,
                "no typical dose configured, using fallback"
            );
        }
        typical
    }

    fn commit(&self, peptide: &mut Peptide) -> EngineResult<()> {
        peptide.touch();
        peptide.revision = self.store.save_peptide(peptide)?;
        Ok(())
    }

    /// Correct counters that drifted before this engine touched the record.
    fn correct_drift(&self, peptide: &mut Peptide, typical: TypicalDose) -> EngineResult<Vec<VialDrift>> {
        let drifts = peptide.apply_projection(typical)?;
        for drift in &drifts {
            warn!(
                peptide_id = %peptide.id,
                vial_id = %drift.vial_id,
                stored = drift.stored_remaining,
                replayed = drift.replayed_remaining,
                "vial counter drifted from dose ledger"
            );
        }
        Ok(drifts)
    }

    /// Re-project counters after a debit or credit; only clamped overdraws
    /// move anything here.
    fn normalize(&self, peptide: &mut Peptide, typical: TypicalDose) -> EngineResult<()> {
        for adjusted in peptide.apply_projection(typical)? {
            debug!(
                peptide_id = %peptide.id,
                vial_id = %adjusted.vial_id,
                from = adjusted.stored_remaining,
                to = adjusted.replayed_remaining,
                "vial counter normalized to ledger replay"
            );
        }
        Ok(())
    }

    /// Best-effort mirror write; failure leaves the mirror stale until the
    /// next reconcile.
    fn push_mirror(&self, peptide: &Peptide, typical: TypicalDose) -> bool {
        let result = mirror::build_mirror(peptide, typical)
            .and_then(|record| {
                self.store
                    .save_inventory_mirror(&record)
                    .map_err(EngineError::from)
            });
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(peptide_id = %peptide.id, error = %e, "inventory mirror push failed");
                false
            }
        }
    }

    fn refresh_mirror_if_stale(&self, peptide: &Peptide, typical: TypicalDose) -> EngineResult<bool> {
        let stale = match self.store.load_inventory_mirror(&peptide.id) {
            Ok(record) => mirror::is_stale(&record, peptide)?,
            Err(StoreError::NotFound(_)) => true,
            Err(e) => {
                warn!(peptide_id = %peptide.id, error = %e, "could not load inventory mirror");
                true
            }
        };
        if !stale {
            return Ok(false);
        }
        debug!(peptide_id = %peptide.id, "inventory mirror stale, refreshing");
        Ok(self.push_mirror(peptide, typical))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn engine() -> ReconciliationEngine<MemoryStore> {
        ReconciliationEngine::new(MemoryStore::new(), EngineSettings::default())
    }

    fn seeded(engine: &ReconciliationEngine<MemoryStore>, capacity: u32) -> (String, String) {
        let peptide = engine
            .create_peptide(NewPeptide {
                name: "BPC-157".into(),
                ..Default::default()
            })
            .unwrap();
        let vial = engine
            .add_vial(
                &peptide.id,
                NewVial {
                    initial_amount_units: capacity,
                    activate: true,
                    ..Default::default()
                },
            )
            .unwrap();
        (peptide.id, vial.id)
    }

    #[test]
    fn test_create_peptide_creates_mirror() {
        let engine = engine();
        let peptide = engine
            .create_peptide(NewPeptide {
                name: "  TB-500 ".into(),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(peptide.name, "TB-500");
        assert_eq!(peptide.revision, 1);
        let mirror = engine.inventory_mirror(&peptide.id).unwrap();
        assert_eq!(mirror.peptide_name, "TB-500");
        assert_eq!(mirror.vial_count, 0);
    }

    #[test]
    fn test_create_peptide_validation() {
        let engine = engine();
        assert!(matches!(
            engine.create_peptide(NewPeptide::default()),
            Err(EngineError::Validation(_))
        ));

        let bad_dose = NewPeptide {
            name: "X".into(),
            dosing: crate::models::DosingConfig {
                typical_dose: Some(TypicalDose::new(0.0, DoseUnit::Mcg)),
            },
            ..Default::default()
        };
        assert!(matches!(
            engine.create_peptide(bad_dose),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_log_dose_debits_active_vial() {
        let engine = engine();
        let (peptide_id, vial_id) = seeded(&engine, 30);

        let entry = engine
            .log_dose(&peptide_id, DoseInput::new(300.0, DoseUnit::Mcg))
            .unwrap();
        assert_eq!(entry.vial_id, vial_id);

        let peptide = engine.peptide(&peptide_id).unwrap();
        assert_eq!(peptide.vial(&vial_id).unwrap().remaining_amount_units, 29);
        assert_eq!(peptide.dose_logs.len(), 1);
        assert_eq!(engine.inventory_mirror(&peptide_id).unwrap().used_doses, 1);
    }

    #[test]
    fn test_log_dose_without_active_vial() {
        let engine = engine();
        let peptide = engine
            .create_peptide(NewPeptide {
                name: "BPC-157".into(),
                ..Default::default()
            })
            .unwrap();

        let err = engine
            .log_dose(&peptide.id, DoseInput::new(300.0, DoseUnit::Mcg))
            .unwrap_err();
        assert!(matches!(err, EngineError::NoActiveVial(_)));
        assert_eq!(engine.peptide(&peptide.id).unwrap().revision, 1);
    }

    #[test]
    fn test_log_dose_rejects_bad_input_before_mutation() {
        let engine = engine();
        let (peptide_id, _) = seeded(&engine, 30);
        let before = engine.peptide(&peptide_id).unwrap();

        let err = engine
            .log_dose(&peptide_id, DoseInput::new(0.0, DoseUnit::Mcg))
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let mut input = DoseInput::new(300.0, DoseUnit::Mcg);
        input.taken_at = Some("yesterday".into());
        assert!(matches!(
            engine.log_dose(&peptide_id, input),
            Err(EngineError::Validation(_))
        ));

        assert_eq!(engine.peptide(&peptide_id).unwrap(), before);
    }

    #[test]
    fn test_unknown_peptide_is_not_found() {
        let engine = engine();
        assert!(matches!(
            engine.log_dose("missing", DoseInput::new(300.0, DoseUnit::Mcg)),
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            engine.remaining_doses("missing"),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn test_failed_peptide_save_applies_nothing() {
        let engine = engine();
        let (peptide_id, _) = seeded(&engine, 30);
        let before = engine.peptide(&peptide_id).unwrap();

        engine.store().fail_peptide_saves(1);
        let err = engine
            .log_dose(&peptide_id, DoseInput::new(300.0, DoseUnit::Mcg))
            .unwrap_err();
        assert!(matches!(err, EngineError::Persistence(_)));
        assert_eq!(engine.peptide(&peptide_id).unwrap(), before);
    }

    #[test]
    fn test_complete_vial_twice() {
        let engine = engine();
        let (peptide_id, vial_id) = seeded(&engine, 10);

        let vial = engine
            .complete_vial(&peptide_id, &vial_id, CompletionType::Finished, None)
            .unwrap();
        assert_eq!(vial.status, VialStatus::Completed);
        assert_eq!(vial.completion.unwrap().wasted_doses, 10);

        let err = engine
            .complete_vial(&peptide_id, &vial_id, CompletionType::Finished, None)
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyTerminal { .. }));
    }

    #[test]
    fn test_sync_mirror_surfaces_failure() {
        let engine = engine();
        let (peptide_id, _) = seeded(&engine, 10);

        engine.store().fail_mirror_saves(1);
        assert!(matches!(
            engine.sync_mirror(&peptide_id),
            Err(EngineError::Persistence(_))
        ));
        let record = engine.sync_mirror(&peptide_id).unwrap();
        assert_eq!(record.total_doses, 10);
    }
}
