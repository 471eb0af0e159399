//! Domain models for the peptide ledger.

mod dose;
mod mirror;
mod peptide;
mod vial;

pub use dose::*;
pub use mirror::*;
pub use peptide::*;
pub use vial::*;
