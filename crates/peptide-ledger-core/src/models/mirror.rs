//! Inventory mirror model.

use serde::{Deserialize, Serialize};

/// Denormalized per-peptide inventory counters for list views.
///
/// Never authoritative: every field can be rebuilt by replaying the peptide's
/// dose ledger against its vials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryMirrorRecord {
    /// Peptide this record mirrors
    pub peptide_id: String,
    /// Peptide display name
    pub peptide_name: String,
    /// Units drawn from the active vial
    pub used_doses: u32,
    /// Units left in the active vial
    pub remaining_doses: u32,
    /// Capacity of the active vial
    pub total_doses: u32,
    /// Vials not yet completed or discarded
    pub vial_count: u32,
    /// Active vial, if any
    pub active_vial_id: Option<String>,
    /// Earliest expiry among open vials
    pub next_expiry: Option<String>,
    /// Fingerprint of the vials and ledger this record was built from
    pub ledger_digest: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl InventoryMirrorRecord {
    /// Counter as shown in list views, e.g. "7/30".
    pub fn used_doses_display(&self) -> String {
        format!("{}/{}", self.used_doses, self.total_doses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_used_doses_display() {
        let record = InventoryMirrorRecord {
            peptide_id: "p".into(),
            peptide_name: "BPC-157".into(),
            used_doses: 7,
            remaining_doses: 23,
            total_doses: 30,
            vial_count: 1,
            active_vial_id: Some("v".into()),
            next_expiry: None,
            ledger_digest: String::new(),
            updated_at: String::new(),
        };
        assert_eq!(record.used_doses_display(), "7/30");
    }
}
