//! Persistence collaborator contract.
//!
//! The engine never assumes cross-record transactions. A peptide record
//! (its vials and dose ledger together) is written in one call, and the
//! inventory mirror in another.

mod memory;
mod retry;

pub use memory::*;
pub use retry::*;

use thiserror::Error;

use crate::models::{InventoryMirrorRecord, Peptide};

/// Persistence errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Revision conflict on {id}: expected {expected}, found {found}")]
    Conflict { id: String, expected: u64, found: u64 },

    #[error("Transient store failure: {0}")]
    Transient(String),

    #[error("Store error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether repeating the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Backing store for peptides and their inventory mirror.
pub trait PeptideStore {
    /// Load a peptide with its vials and dose ledger.
    fn load_peptide(&self, id: &str) -> StoreResult<Peptide>;

    /// Write a peptide record atomically.
    ///
    /// `peptide.revision` is the revision the caller loaded; 0 creates the
    /// record. Returns the new revision, or `Conflict` if the stored revision
    /// moved on.
    fn save_peptide(&self, peptide: &Peptide) -> StoreResult<u64>;

    /// Load the inventory mirror for a peptide.
    fn load_inventory_mirror(&self, peptide_id: &str) -> StoreResult<InventoryMirrorRecord>;

    /// Insert or replace the inventory mirror for a peptide.
    fn save_inventory_mirror(&self, record: &InventoryMirrorRecord) -> StoreResult<()>;
}

impl<S: PeptideStore + ?Sized> PeptideStore for &S {
    fn load_peptide(&self, id: &str) -> StoreResult<Peptide> {
        (**self).load_peptide(id)
    }

    fn save_peptide(&self, peptide: &Peptide) -> StoreResult<u64> {
        (**self).save_peptide(peptide)
    }

    fn load_inventory_mirror(&self, peptide_id: &str) -> StoreResult<InventoryMirrorRecord> {
        (**self).load_inventory_mirror(peptide_id)
    }

    fn save_inventory_mirror(&self, record: &InventoryMirrorRecord) -> StoreResult<()> {
        (**self).save_inventory_mirror(record)
    }
}
