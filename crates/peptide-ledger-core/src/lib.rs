//! Peptide Ledger Core Library
//!
//! Local-first dose ledger and vial inventory tracking for peptide protocols.
//!
//! # Architecture
//!
//! ```text
//!        log_dose / revert_dose / vial lifecycle
//!                          │
//!              ┌───────────▼───────────┐
//!              │ ReconciliationEngine  │
//!              │  correct drift        │
//!              │  debit / credit vial  │
//!              │  append / remove log  │
//!              │  re-project counters  │
//!              └───────────┬───────────┘
//!                          │ one write: vials + dose ledger
//!              ┌───────────▼───────────┐
//!              │   peptides (SQLite)   │  authoritative
//!              └───────────┬───────────┘
//!                          │ best-effort push, repaired on read
//!              ┌───────────▼───────────┐
//!              │   inventory_mirror    │  denormalized list view
//!              └───────────────────────┘
//! ```
//!
//! # Core Principle
//!
//! **The dose ledger is the source of truth.** A vial's remaining count is a
//! cached projection of `initial - sum(units of its logged doses)`, and the
//! inventory mirror is a cache of that projection.
//!
//! # Modules
//!
//! - [`models`]: Domain types (Peptide, Vial, DoseLogEntry, etc.)
//! - [`engine`]: Reconciliation engine, unit conversion and ledger replay
//! - [`store`]: Persistence collaborator trait, retry decorator, memory store
//! - [`db`]: SQLite persistence collaborator
//! - [`config`]: TOML configuration
//! - [`logging`]: Tracing subscriber setup

pub mod config;
pub mod db;
pub mod engine;
pub mod logging;
pub mod models;
pub mod store;

// Re-export commonly used types
pub use config::{Environment, LedgerConfig};
pub use db::Database;
pub use engine::{
    EngineError, EngineResult, EngineSettings, ReconcileReport, ReconciliationEngine, VialDrift,
};
pub use models::{
    CompletionType, DoseInput, DoseLogEntry, DoseUnit, DosingConfig, Frequency,
    InventoryMirrorRecord, NewPeptide, NewVial, Peptide, Reconstitution, Schedule, TimeOfDay,
    TypicalDose, Vial, VialCompletion, VialStatus,
};
pub use store::{MemoryStore, PeptideStore, RetryPolicy, RetryingStore, StoreError};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::str::FromStr;
use std::sync::{Arc, Mutex};

type TrackerEngine = ReconciliationEngine<RetryingStore<Database>>;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum PeptideTrackerError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("No active vial: {0}")]
    NoActiveVial(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Vial already retired: {0}")]
    AlreadyTerminal(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<EngineError> for PeptideTrackerError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Validation(msg) => PeptideTrackerError::Validation(msg),
            EngineError::NoActiveVial(peptide_id) => PeptideTrackerError::NoActiveVial(peptide_id),
            EngineError::NotFound(what) => PeptideTrackerError::NotFound(what),
            EngineError::AlreadyTerminal { .. } => PeptideTrackerError::AlreadyTerminal(e.to_string()),
            EngineError::Persistence(_) | EngineError::Serialization(_) => {
                PeptideTrackerError::Persistence(e.to_string())
            }
        }
    }
}

impl From<db::DbError> for PeptideTrackerError {
    fn from(e: db::DbError) -> Self {
        PeptideTrackerError::Persistence(e.to_string())
    }
}

impl From<anyhow::Error> for PeptideTrackerError {
    fn from(e: anyhow::Error) -> Self {
        PeptideTrackerError::Configuration(format!("{:#}", e))
    }
}

impl<T> From<std::sync::PoisonError<T>> for PeptideTrackerError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        PeptideTrackerError::Persistence(format!("Lock poisoned: {}", e))
    }
}

fn parse_field<T: FromStr<Err = String>>(value: &str) -> Result<T, PeptideTrackerError> {
    value.parse().map_err(PeptideTrackerError::Validation)
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open the tracker described by a TOML config file.
///
/// The config's `store.environment` selects the database file.
#[uniffi::export]
pub fn open_tracker(config_path: String) -> Result<Arc<PeptideTracker>, PeptideTrackerError> {
    let config = LedgerConfig::load(&config_path)?;
    logging::init(&config.logging.level);
    let db = Database::open_with_config(&config.store)?;
    Ok(Arc::new(PeptideTracker::new(db, &config)))
}

/// Create a tracker over an in-memory database (for testing).
#[uniffi::export]
pub fn open_tracker_in_memory() -> Result<Arc<PeptideTracker>, PeptideTrackerError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(PeptideTracker::new(db, &LedgerConfig::default())))
}

/// Install the log subscriber. Returns false if one was already installed.
#[uniffi::export]
pub fn init_logging(level: String) -> bool {
    logging::init(&level)
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe engine wrapper for FFI.
#[derive(uniffi::Object)]
pub struct PeptideTracker {
    engine: Arc<Mutex<TrackerEngine>>,
}

impl PeptideTracker {
    fn new(db: Database, config: &LedgerConfig) -> Self {
        let store = RetryingStore::new(db, config.retry);
        let engine = ReconciliationEngine::new(store, EngineSettings::from(config));
        Self {
            engine: Arc::new(Mutex::new(engine)),
        }
    }
}

#[uniffi::export]
impl PeptideTracker {
    // =========================================================================
    // Peptides
    // =========================================================================

    pub fn create_peptide(&self, peptide: FfiNewPeptide) -> Result<FfiPeptide, PeptideTrackerError> {
        let new_peptide = NewPeptide::try_from(peptide)?;
        let engine = self.engine.lock()?;
        Ok(engine.create_peptide(new_peptide)?.into())
    }

    pub fn get_peptide(&self, peptide_id: String) -> Result<FfiPeptide, PeptideTrackerError> {
        let engine = self.engine.lock()?;
        Ok(engine.peptide(&peptide_id)?.into())
    }

    /// The stored mirror row, which may lag the ledger until the next reconcile.
    pub fn get_inventory_mirror(
        &self,
        peptide_id: String,
    ) -> Result<FfiInventoryMirror, PeptideTrackerError> {
        let engine = self.engine.lock()?;
        Ok(engine.inventory_mirror(&peptide_id)?.into())
    }

    // =========================================================================
    // Vials
    // =========================================================================

    pub fn add_vial(
        &self,
        peptide_id: String,
        vial: FfiNewVial,
    ) -> Result<FfiVial, PeptideTrackerError> {
        let engine = self.engine.lock()?;
        Ok(engine.add_vial(&peptide_id, vial.into())?.into())
    }

    pub fn activate_vial(
        &self,
        peptide_id: String,
        vial_id: String,
    ) -> Result<FfiPeptide, PeptideTrackerError> {
        let engine = self.engine.lock()?;
        Ok(engine.activate_vial(&peptide_id, &vial_id)?.into())
    }

    /// Retire a vial. `completion_type` is one of finished, expired or
    /// contaminated; use `discard_vial` to discard.
    pub fn complete_vial(
        &self,
        peptide_id: String,
        vial_id: String,
        completion_type: String,
        reason: Option<String>,
    ) -> Result<FfiVial, PeptideTrackerError> {
        let completion_type: CompletionType = parse_field(&completion_type)?;
        let engine = self.engine.lock()?;
        Ok(engine
            .complete_vial(&peptide_id, &vial_id, completion_type, reason)?
            .into())
    }

    pub fn discard_vial(
        &self,
        peptide_id: String,
        vial_id: String,
        reason: String,
    ) -> Result<FfiVial, PeptideTrackerError> {
        let engine = self.engine.lock()?;
        Ok(engine.discard_vial(&peptide_id, &vial_id, reason)?.into())
    }

    // =========================================================================
    // Dose Ledger
    // =========================================================================

    pub fn log_dose(
        &self,
        peptide_id: String,
        dose: FfiDoseInput,
    ) -> Result<FfiDoseLogEntry, PeptideTrackerError> {
        let input = DoseInput::try_from(dose)?;
        let engine = self.engine.lock()?;
        Ok(engine.log_dose(&peptide_id, input)?.into())
    }

    pub fn revert_dose(
        &self,
        peptide_id: String,
        entry_id: String,
    ) -> Result<FfiPeptide, PeptideTrackerError> {
        let engine = self.engine.lock()?;
        Ok(engine.revert_dose(&peptide_id, &entry_id)?.into())
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    pub fn remaining_doses(&self, peptide_id: String) -> Result<u32, PeptideTrackerError> {
        let engine = self.engine.lock()?;
        Ok(engine.remaining_doses(&peptide_id)?)
    }

    pub fn reconcile(&self, peptide_id: String) -> Result<FfiReconcileReport, PeptideTrackerError> {
        let engine = self.engine.lock()?;
        Ok(engine.reconcile(&peptide_id)?.into())
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe peptide to create.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewPeptide {
    pub name: String,
    pub typical_dose_amount: Option<f64>,
    /// mcg, mg or iu; defaults to mcg when an amount is given
    pub typical_dose_unit: Option<String>,
    pub frequency: Option<String>,
    pub times_of_day: Vec<String>,
}

impl TryFrom<FfiNewPeptide> for NewPeptide {
    type Error = PeptideTrackerError;

    fn try_from(peptide: FfiNewPeptide) -> Result<Self, Self::Error> {
        let typical_dose = match peptide.typical_dose_amount {
            Some(amount) => {
                let unit = match peptide.typical_dose_unit.as_deref() {
                    Some(unit) => parse_field(unit)?,
                    None => DoseUnit::Mcg,
                };
                Some(TypicalDose::new(amount, unit))
            }
            None => None,
        };
        let frequency = match peptide.frequency.as_deref() {
            Some(frequency) => parse_field(frequency)?,
            None => Frequency::default(),
        };
        let times_of_day = peptide
            .times_of_day
            .iter()
            .map(|slot| parse_field(slot))
            .collect::<Result<Vec<TimeOfDay>, _>>()?;

        Ok(NewPeptide {
            name: peptide.name,
            dosing: DosingConfig { typical_dose },
            schedule: Schedule {
                frequency,
                times_of_day,
            },
        })
    }
}

/// FFI-safe peptide with its vials and ledger.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPeptide {
    pub id: String,
    pub name: String,
    pub typical_dose_amount: Option<f64>,
    pub typical_dose_unit: Option<String>,
    pub frequency: String,
    pub times_of_day: Vec<String>,
    pub active_vial_id: Option<String>,
    pub vials: Vec<FfiVial>,
    pub dose_logs: Vec<FfiDoseLogEntry>,
    pub revision: u64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Peptide> for FfiPeptide {
    fn from(peptide: Peptide) -> Self {
        let active_vial_id = peptide.active_vial().map(|v| v.id.clone());
        let typical = peptide.dosing.typical_dose;
        Self {
            id: peptide.id,
            name: peptide.name,
            typical_dose_amount: typical.map(|t| t.amount),
            typical_dose_unit: typical.map(|t| t.unit.to_string()),
            frequency: peptide.schedule.frequency.as_str().to_string(),
            times_of_day: peptide
                .schedule
                .times_of_day
                .iter()
                .map(|slot| slot.as_str().to_string())
                .collect(),
            active_vial_id,
            vials: peptide.vials.into_iter().map(|v| v.into()).collect(),
            dose_logs: peptide.dose_logs.into_iter().map(|e| e.into()).collect(),
            revision: peptide.revision,
            created_at: peptide.created_at,
            updated_at: peptide.updated_at,
        }
    }
}

/// FFI-safe vial to add.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewVial {
    pub initial_amount_units: u32,
    pub diluent_volume_ml: Option<f64>,
    pub expires_at: Option<String>,
    pub activate: bool,
}

impl From<FfiNewVial> for NewVial {
    fn from(vial: FfiNewVial) -> Self {
        NewVial {
            initial_amount_units: vial.initial_amount_units,
            reconstitution: vial.diluent_volume_ml.map(|diluent_volume_ml| Reconstitution {
                diluent_volume_ml,
                reconstituted_at: chrono::Utc::now().to_rfc3339(),
            }),
            expires_at: vial.expires_at,
            activate: vial.activate,
        }
    }
}

/// FFI-safe vial.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVial {
    pub id: String,
    pub initial_amount_units: u32,
    pub remaining_amount_units: u32,
    pub status: String,
    pub completion_type: Option<String>,
    pub completion_reason: Option<String>,
    pub wasted_doses: Option<u32>,
    pub completed_at: Option<String>,
    pub diluent_volume_ml: Option<f64>,
    pub expires_at: Option<String>,
    pub created_at: String,
}

impl From<Vial> for FfiVial {
    fn from(vial: Vial) -> Self {
        let completion = vial.completion;
        Self {
            id: vial.id,
            initial_amount_units: vial.initial_amount_units,
            remaining_amount_units: vial.remaining_amount_units,
            status: vial.status.as_str().to_string(),
            completion_type: completion
                .as_ref()
                .map(|c| c.completion_type.as_str().to_string()),
            completion_reason: completion.as_ref().and_then(|c| c.reason.clone()),
            wasted_doses: completion.as_ref().map(|c| c.wasted_doses),
            completed_at: completion.map(|c| c.completed_at),
            diluent_volume_ml: vial.reconstitution.map(|r| r.diluent_volume_ml),
            expires_at: vial.expires_at,
            created_at: vial.created_at,
        }
    }
}

/// FFI-safe dose to log.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDoseInput {
    pub amount: f64,
    pub unit: String,
    pub time_of_day: Option<String>,
    /// RFC 3339; defaults to now
    pub taken_at: Option<String>,
    pub note: Option<String>,
}

impl TryFrom<FfiDoseInput> for DoseInput {
    type Error = PeptideTrackerError;

    fn try_from(dose: FfiDoseInput) -> Result<Self, Self::Error> {
        let time_of_day = match dose.time_of_day.as_deref() {
            Some(slot) => Some(parse_field(slot)?),
            None => None,
        };
        Ok(DoseInput {
            amount: dose.amount,
            unit: parse_field(&dose.unit)?,
            time_of_day,
            taken_at: dose.taken_at,
            note: dose.note,
        })
    }
}

/// FFI-safe dose log entry.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDoseLogEntry {
    pub id: String,
    pub logged_at: String,
    pub time_of_day: String,
    pub amount: f64,
    pub unit: String,
    pub vial_id: String,
    pub note: Option<String>,
}

impl From<DoseLogEntry> for FfiDoseLogEntry {
    fn from(entry: DoseLogEntry) -> Self {
        Self {
            id: entry.id,
            logged_at: entry.logged_at,
            time_of_day: entry.time_of_day.as_str().to_string(),
            amount: entry.amount,
            unit: entry.unit.to_string(),
            vial_id: entry.vial_id,
            note: entry.note,
        }
    }
}

/// FFI-safe inventory mirror row.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiInventoryMirror {
    pub peptide_id: String,
    pub peptide_name: String,
    pub used_doses: u32,
    pub remaining_doses: u32,
    pub total_doses: u32,
    /// e.g. "7/30"
    pub used_doses_display: String,
    pub vial_count: u32,
    pub active_vial_id: Option<String>,
    pub next_expiry: Option<String>,
    pub updated_at: String,
}

impl From<InventoryMirrorRecord> for FfiInventoryMirror {
    fn from(record: InventoryMirrorRecord) -> Self {
        Self {
            used_doses_display: record.used_doses_display(),
            peptide_id: record.peptide_id,
            peptide_name: record.peptide_name,
            used_doses: record.used_doses,
            remaining_doses: record.remaining_doses,
            total_doses: record.total_doses,
            vial_count: record.vial_count,
            active_vial_id: record.active_vial_id,
            next_expiry: record.next_expiry,
            updated_at: record.updated_at,
        }
    }
}

/// FFI-safe drift record.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVialDrift {
    pub vial_id: String,
    pub stored_remaining: u32,
    pub replayed_remaining: u32,
}

/// FFI-safe reconciliation report.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiReconcileReport {
    pub peptide_id: String,
    pub remaining_doses: u32,
    pub drifts: Vec<FfiVialDrift>,
    pub mirror_refreshed: bool,
}

impl From<ReconcileReport> for FfiReconcileReport {
    fn from(report: ReconcileReport) -> Self {
        Self {
            peptide_id: report.peptide_id,
            remaining_doses: report.remaining_doses,
            drifts: report
                .drifts
                .into_iter()
                .map(|d| FfiVialDrift {
                    vial_id: d.vial_id,
                    stored_remaining: d.stored_remaining,
                    replayed_remaining: d.replayed_remaining,
                })
                .collect(),
            mirror_refreshed: report.mirror_refreshed,
        }
    }
}
