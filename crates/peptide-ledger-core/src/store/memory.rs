//! In-memory store with failure injection.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{PeptideStore, StoreError, StoreResult};
use crate::models::{InventoryMirrorRecord, Peptide};

#[derive(Default)]
struct MemoryState {
    peptides: HashMap<String, Peptide>,
    mirrors: HashMap<String, InventoryMirrorRecord>,
    failing_peptide_saves: u32,
    failing_mirror_saves: u32,
    failing_peptide_loads: u32,
}

/// Process-local store, mostly for tests and previews.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("Memory store lock poisoned".into()))
    }

    /// Fail the next `count` peptide saves with a transient error.
    pub fn fail_peptide_saves(&self, count: u32) {
        if let Ok(mut state) = self.lock() {
            state.failing_peptide_saves = count;
        }
    }

    /// Fail the next `count` mirror saves with a transient error.
    pub fn fail_mirror_saves(&self, count: u32) {
        if let Ok(mut state) = self.lock() {
            state.failing_mirror_saves = count;
        }
    }

    /// Fail the next `count` peptide loads with a transient error.
    pub fn fail_peptide_loads(&self, count: u32) {
        if let Ok(mut state) = self.lock() {
            state.failing_peptide_loads = count;
        }
    }

    /// Overwrite a stored peptide without revision checks, the way an
    /// external tool sharing the backing store would.
    pub fn put_peptide_unchecked(&self, peptide: Peptide) {
        if let Ok(mut state) = self.lock() {
            state.peptides.insert(peptide.id.clone(), peptide);
        }
    }

    /// Drop a mirror record.
    pub fn remove_inventory_mirror(&self, peptide_id: &str) {
        if let Ok(mut state) = self.lock() {
            state.mirrors.remove(peptide_id);
        }
    }
}

fn take_failure(counter: &mut u32, what: &str) -> StoreResult<()> {
    if *counter > 0 {
        *counter -= 1;
        return Err(StoreError::Transient(format!("injected {} failure", what)));
    }
    Ok(())
}

impl PeptideStore for MemoryStore {
    fn load_peptide(&self, id: &str) -> StoreResult<Peptide> {
        let mut state = self.lock()?;
        take_failure(&mut state.failing_peptide_loads, "peptide load")?;
        state
            .peptides
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("peptide {}", id)))
    }

    fn save_peptide(&self, peptide: &Peptide) -> StoreResult<u64> {
        let mut state = self.lock()?;
        take_failure(&mut state.failing_peptide_saves, "peptide save")?;

        let found = state
            .peptides
            .get(&peptide.id)
            .map(|p| p.revision)
            .unwrap_or(0);
        if found != peptide.revision {
            return Err(StoreError::Conflict {
                id: peptide.id.clone(),
                expected: peptide.revision,
                found,
            });
        }

        let mut stored = peptide.clone();
        stored.revision = peptide.revision + 1;
        let revision = stored.revision;
        state.peptides.insert(stored.id.clone(), stored);
        Ok(revision)
    }

    fn load_inventory_mirror(&self, peptide_id: &str) -> StoreResult<InventoryMirrorRecord> {
        let state = self.lock()?;
        state
            .mirrors
            .get(peptide_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("inventory mirror {}", peptide_id)))
    }

    fn save_inventory_mirror(&self, record: &InventoryMirrorRecord) -> StoreResult<()> {
        let mut state = self.lock()?;
        take_failure(&mut state.failing_mirror_saves, "mirror save")?;
        state
            .mirrors
            .insert(record.peptide_id.clone(), record.clone());
        Ok(())
    }
}
