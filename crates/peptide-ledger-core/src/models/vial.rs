//! Vial models.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Vial lifecycle status.
///
/// `Inactive <-> Active -> {Completed | Discarded}`; the last two are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VialStatus {
    /// Reconstituted or in stock, not being drawn from
    Inactive,
    /// The vial new doses are drawn from
    Active,
    /// Thrown away before being used up
    Discarded,
    /// Finished, expired or otherwise retired
    Completed,
}

impl VialStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, VialStatus::Completed | VialStatus::Discarded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VialStatus::Inactive => "inactive",
            VialStatus::Active => "active",
            VialStatus::Discarded => "discarded",
            VialStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for VialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a vial left service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompletionType {
    /// All doses drawn
    Finished,
    /// Past its usable date
    Expired,
    /// Contaminated or damaged
    Contaminated,
    /// Explicitly discarded
    Discarded,
}

impl CompletionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionType::Finished => "finished",
            CompletionType::Expired => "expired",
            CompletionType::Contaminated => "contaminated",
            CompletionType::Discarded => "discarded",
        }
    }
}

impl std::str::FromStr for CompletionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "finished" => Ok(CompletionType::Finished),
            "expired" => Ok(CompletionType::Expired),
            "contaminated" => Ok(CompletionType::Contaminated),
            "discarded" => Ok(CompletionType::Discarded),
            other => Err(format!("Unknown completion type: {}", other)),
        }
    }
}

/// Completion record, written once when a vial becomes terminal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VialCompletion {
    pub completion_type: CompletionType,
    pub reason: Option<String>,
    /// Units left in the vial at completion
    pub wasted_doses: u32,
    pub completed_at: String,
}

/// Reconstitution details. Informational only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reconstitution {
    /// Bacteriostatic water added, in mL
    pub diluent_volume_ml: f64,
    pub reconstituted_at: String,
}

/// A finite vial of reconstituted peptide, measured in whole dosing units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vial {
    /// Unique vial ID
    pub id: String,
    /// Capacity at creation (fixed)
    pub initial_amount_units: u32,
    /// Cached projection of `initial - used`; the ledger is authoritative
    pub remaining_amount_units: u32,
    /// Lifecycle status
    pub status: VialStatus,
    /// Set once on completion or discard
    pub completion: Option<VialCompletion>,
    /// Reconstitution metadata
    pub reconstitution: Option<Reconstitution>,
    /// Expiry date (RFC 3339)
    pub expires_at: Option<String>,
    /// Creation timestamp
    pub created_at: String,
}

impl Vial {
    /// Create a new inactive vial with full capacity.
    pub fn new(initial_amount_units: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            initial_amount_units,
            remaining_amount_units: initial_amount_units,
            status: VialStatus::Inactive,
            completion: None,
            reconstitution: None,
            expires_at: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == VialStatus::Active
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Caller-supplied vial to add to a peptide.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewVial {
    pub initial_amount_units: u32,
    pub reconstitution: Option<Reconstitution>,
    pub expires_at: Option<String>,
    /// Make this the active vial immediately
    pub activate: bool,
}
