//! Inventory mirror projection.

use chrono::DateTime;
use sha2::{Digest, Sha256};

use crate::models::{InventoryMirrorRecord, Peptide, TypicalDose};

use super::EngineResult;

/// SHA-256 over everything a mirror record is derived from.
pub fn ledger_digest(peptide: &Peptide) -> Result<String, serde_json::Error> {
    let payload = serde_json::to_vec(&(
        &peptide.name,
        &peptide.dosing,
        &peptide.vials,
        &peptide.dose_logs,
    ))?;
    let mut hasher = Sha256::new();
    hasher.update(&payload);
    Ok(hex::encode(hasher.finalize()))
}

/// Build the mirror record for a peptide from ledger replay.
pub fn build_mirror(peptide: &Peptide, typical: TypicalDose) -> EngineResult<InventoryMirrorRecord> {
    let (active_vial_id, used_doses, total_doses) = match peptide.active_vial() {
        Some(vial) => (
            Some(vial.id.clone()),
            peptide.used_units_for_vial(&vial.id, typical)?,
            vial.initial_amount_units,
        ),
        None => (None, 0, 0),
    };

    // compared as instants; records written elsewhere may carry any offset
    let next_expiry = peptide
        .vials
        .iter()
        .filter(|v| !v.is_terminal())
        .filter_map(|v| v.expires_at.as_deref())
        .filter_map(|at| DateTime::parse_from_rfc3339(at).ok().map(|parsed| (parsed, at)))
        .min_by_key(|(parsed, _)| *parsed)
        .map(|(_, at)| at.to_string());

    Ok(InventoryMirrorRecord {
        peptide_id: peptide.id.clone(),
        peptide_name: peptide.name.clone(),
        used_doses,
        remaining_doses: total_doses.saturating_sub(used_doses),
        total_doses,
        vial_count: peptide.open_vial_count() as u32,
        active_vial_id,
        next_expiry,
        ledger_digest: ledger_digest(peptide)?,
        updated_at: chrono::Utc::now().to_rfc3339(),
    })
}

/// Whether a stored mirror record no longer matches the peptide.
pub fn is_stale(record: &InventoryMirrorRecord, peptide: &Peptide) -> EngineResult<bool> {
    Ok(record.ledger_digest != ledger_digest(peptide)?)
}
