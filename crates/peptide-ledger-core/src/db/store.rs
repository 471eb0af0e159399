//! `PeptideStore` backed by SQLite.

use super::Database;
use crate::models::{InventoryMirrorRecord, Peptide};
use crate::store::{PeptideStore, StoreError, StoreResult};

impl PeptideStore for Database {
    fn load_peptide(&self, id: &str) -> StoreResult<Peptide> {
        self.get_peptide(id)?
            .ok_or_else(|| StoreError::NotFound(format!("peptide {}", id)))
    }

    fn save_peptide(&self, peptide: &Peptide) -> StoreResult<u64> {
        let revision = if peptide.revision == 0 {
            self.insert_peptide(peptide)?
        } else {
            self.update_peptide(peptide)?
        };
        Ok(revision)
    }

    fn load_inventory_mirror(&self, peptide_id: &str) -> StoreResult<InventoryMirrorRecord> {
        self.get_inventory_mirror(peptide_id)?
            .ok_or_else(|| StoreError::NotFound(format!("inventory mirror {}", peptide_id)))
    }

    fn save_inventory_mirror(&self, record: &InventoryMirrorRecord) -> StoreResult<()> {
        self.upsert_inventory_mirror(record).map_err(StoreError::from)
    }
}
