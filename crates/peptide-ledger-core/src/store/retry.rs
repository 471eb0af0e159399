//! Bounded retries for transient store failures.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{PeptideStore, StoreResult};
use crate::models::{InventoryMirrorRecord, Peptide};

/// Retry policy for transient failures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first
    pub max_attempts: u32,
    /// Pause between attempts
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 50,
        }
    }
}

/// Store decorator that repeats calls failing with `StoreError::Transient`.
///
/// Conflicts and missing records are returned immediately; after
/// `max_attempts` the last transient error is returned to the caller.
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: PeptideStore> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn run<T>(&self, op: &str, mut call: impl FnMut(&S) -> StoreResult<T>) -> StoreResult<T> {
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call(&self.inner) {
                Err(err) if err.is_transient() && attempt < attempts => {
                    warn!(op, attempt, max_attempts = attempts, error = %err, "retrying store call");
                    if self.policy.backoff_ms > 0 {
                        thread::sleep(Duration::from_millis(self.policy.backoff_ms));
                    }
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

impl<S: PeptideStore> PeptideStore for RetryingStore<S> {
    fn load_peptide(&self, id: &str) -> StoreResult<Peptide> {
        self.run("load_peptide", |s| s.load_peptide(id))
    }

    fn save_peptide(&self, peptide: &Peptide) -> StoreResult<u64> {
        self.run("save_peptide", |s| s.save_peptide(peptide))
    }

    fn load_inventory_mirror(&self, peptide_id: &str) -> StoreResult<InventoryMirrorRecord> {
        self.run("load_inventory_mirror", |s| {
            s.load_inventory_mirror(peptide_id)
        })
    }

    fn save_inventory_mirror(&self, record: &InventoryMirrorRecord) -> StoreResult<()> {
        self.run("save_inventory_mirror", |s| s.save_inventory_mirror(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DosingConfig, Schedule};
    use crate::store::{MemoryStore, StoreError};

    fn no_wait(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff_ms: 0,
        }
    }

    fn peptide() -> Peptide {
        Peptide::new("Ipamorelin".into(), DosingConfig::default(), Schedule::default())
    }

    #[test]
    fn test_transient_failure_retried() {
        let store = RetryingStore::new(MemoryStore::new(), no_wait(3));
        store.inner().fail_peptide_saves(2);

        assert_eq!(store.save_peptide(&peptide()).unwrap(), 1);
    }

    #[test]
    fn test_attempts_are_bounded() {
        let store = RetryingStore::new(MemoryStore::new(), no_wait(3));
        store.inner().fail_peptide_saves(5);

        let err = store.save_peptide(&peptide()).unwrap_err();
        assert!(err.is_transient());

        // three consumed, two left
        assert!(store.inner().save_peptide(&peptide()).is_err());
        assert!(store.inner().save_peptide(&peptide()).is_err());
    }

    #[test]
    fn test_conflict_not_retried() {
        let store = RetryingStore::new(MemoryStore::new(), no_wait(5));
        let peptide = peptide();
        store.save_peptide(&peptide).unwrap();

        let err = store.save_peptide(&peptide).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[test]
    fn test_zero_attempts_still_calls_once() {
        let store = RetryingStore::new(MemoryStore::new(), no_wait(0));
        assert_eq!(store.save_peptide(&peptide()).unwrap(), 1);
    }
}
