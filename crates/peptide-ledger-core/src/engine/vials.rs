//! Vial store operations.

use crate::models::{CompletionType, NewVial, Peptide, Vial, VialCompletion, VialStatus};

use super::{EngineError, EngineResult};

impl Vial {
    /// Draw `units` from the vial, clamping at zero.
    ///
    /// Returns the shortfall that could not be drawn. An overdraw is not an
    /// error: logging a dose never depends on tracked inventory.
    pub fn debit(&mut self, units: u32) -> u32 {
        let shortfall = units.saturating_sub(self.remaining_amount_units);
        self.remaining_amount_units = self.remaining_amount_units.saturating_sub(units);
        shortfall
    }

    /// Return `units` to the vial. Not capped at the initial amount.
    pub fn credit(&mut self, units: u32) {
        self.remaining_amount_units = self.remaining_amount_units.saturating_add(units);
    }

    fn finish(&mut self, status: VialStatus, completion_type: CompletionType, reason: Option<String>) {
        self.completion = Some(VialCompletion {
            completion_type,
            reason,
            wasted_doses: self.remaining_amount_units,
            completed_at: chrono::Utc::now().to_rfc3339(),
        });
        self.status = status;
    }

    fn ensure_open(&self) -> EngineResult<()> {
        if self.is_terminal() {
            return Err(EngineError::AlreadyTerminal {
                vial_id: self.id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }
}

impl Peptide {
    /// Add a vial at full capacity, optionally making it the active one.
    pub fn add_vial(&mut self, new_vial: NewVial) -> EngineResult<Vial> {
        if new_vial.initial_amount_units == 0 {
            return Err(EngineError::Validation(
                "Vial capacity must be at least one unit".into(),
            ));
        }
        if let Some(recon) = &new_vial.reconstitution {
            if !recon.diluent_volume_ml.is_finite() || recon.diluent_volume_ml <= 0.0 {
                return Err(EngineError::Validation(format!(
                    "Diluent volume must be positive, got {}",
                    recon.diluent_volume_ml
                )));
            }
        }
        let expires_at = new_vial
            .expires_at
            .as_deref()
            .map(normalize_expiry)
            .transpose()?;

        let mut vial = Vial::new(new_vial.initial_amount_units);
        vial.reconstitution = new_vial.reconstitution;
        vial.expires_at = expires_at;
        let vial_id = vial.id.clone();
        self.vials.push(vial);

        if new_vial.activate {
            self.activate_vial(&vial_id)?;
        }
        self.vial(&vial_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("vial {}", vial_id)))
    }

    /// Make `vial_id` the single active vial, demoting any other.
    pub fn activate_vial(&mut self, vial_id: &str) -> EngineResult<()> {
        let target = self
            .vial(vial_id)
            .ok_or_else(|| EngineError::NotFound(format!("vial {}", vial_id)))?;
        target.ensure_open()?;

        for vial in self.vials.iter_mut() {
            if vial.id == vial_id {
                vial.status = VialStatus::Active;
            } else if vial.is_active() {
                vial.status = VialStatus::Inactive;
            }
        }
        Ok(())
    }

    /// Retire a vial as completed; its remaining units are recorded as wasted.
    pub fn complete_vial(
        &mut self,
        vial_id: &str,
        completion_type: CompletionType,
        reason: Option<String>,
    ) -> EngineResult<Vial> {
        if completion_type == CompletionType::Discarded {
            return Err(EngineError::Validation(
                "Discarded vials must go through discard".into(),
            ));
        }
        self.retire_vial(vial_id, VialStatus::Completed, completion_type, reason)
    }

    /// Throw a vial away. Irreversible.
    pub fn discard_vial(&mut self, vial_id: &str, reason: String) -> EngineResult<Vial> {
        self.retire_vial(
            vial_id,
            VialStatus::Discarded,
            CompletionType::Discarded,
            Some(reason),
        )
    }

    fn retire_vial(
        &mut self,
        vial_id: &str,
        status: VialStatus,
        completion_type: CompletionType,
        reason: Option<String>,
    ) -> EngineResult<Vial> {
        let vial = self
            .vial_mut(vial_id)
            .ok_or_else(|| EngineError::NotFound(format!("vial {}", vial_id)))?;
        vial.ensure_open()?;
        vial.finish(status, completion_type, reason);
        Ok(vial.clone())
    }
}

/// Expiry dates are stored in UTC so they compare as instants.
fn normalize_expiry(expires_at: &str) -> EngineResult<String> {
    chrono::DateTime::parse_from_rfc3339(expires_at)
        .map(|at| at.with_timezone(&chrono::Utc).to_rfc3339())
        .map_err(|e| {
            EngineError::Validation(format!("Invalid expiry date {}: {}", expires_at, e))
        })
}
