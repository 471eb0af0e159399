//! Dose amount → vial unit conversion.

use thiserror::Error;

use crate::models::{DoseUnit, DosingConfig, TypicalDose};

/// Quotients within this distance above an integer round down to it, so that
/// `0.3 mg / 300 mcg` counts as one unit rather than two.
const CEIL_TOLERANCE: f64 = 1e-9;

/// Conversion errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error("Dose amount must be a positive number, got {0}")]
    InvalidAmount(f64),

    #[error("Typical dose must be a positive number, got {0}")]
    InvalidTypicalDose(f64),

    #[error("Cannot convert {from} into {to}")]
    IncompatibleUnits { from: DoseUnit, to: DoseUnit },

    #[error("Dose of {0} units exceeds the representable range")]
    Overflow(f64),
}

pub type ConversionResult<T> = Result<T, ConversionError>;

/// Whole vial units consumed by a dose: `ceil(amount / typical)`.
///
/// Any partial unit counts as a full one.
pub fn units_for(amount: f64, unit: DoseUnit, typical: TypicalDose) -> ConversionResult<u32> {
    if !typical.amount.is_finite() || typical.amount <= 0.0 {
        return Err(ConversionError::InvalidTypicalDose(typical.amount));
    }
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ConversionError::InvalidAmount(amount));
    }

    let factor = unit
        .factor_to(typical.unit)
        .ok_or(ConversionError::IncompatibleUnits {
            from: unit,
            to: typical.unit,
        })?;

    let ratio = amount * factor / typical.amount;
    let units = (ratio - CEIL_TOLERANCE).ceil().max(1.0);
    if units > u32::MAX as f64 {
        return Err(ConversionError::Overflow(units));
    }
    Ok(units as u32)
}

/// Typical dose for a peptide, falling back to `fallback` when unset.
///
/// Returns whether the fallback was used so callers can report the degraded
/// configuration.
pub fn resolve_typical_dose(dosing: &DosingConfig, fallback: TypicalDose) -> (TypicalDose, bool) {
    match dosing.typical_dose {
        Some(typical) => (typical, false),
        None => (fallback, true),
    }
}
