//! Peptide models.

use serde::{Deserialize, Serialize};

use super::dose::{DoseLogEntry, DoseUnit, TimeOfDay};
use super::vial::Vial;

/// The dose one vial unit corresponds to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TypicalDose {
    pub amount: f64,
    pub unit: DoseUnit,
}

impl TypicalDose {
    pub fn new(amount: f64, unit: DoseUnit) -> Self {
        Self { amount, unit }
    }
}

/// Dosing configuration for a peptide.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DosingConfig {
    /// Unset means the configured fallback applies
    pub typical_dose: Option<TypicalDose>,
}

/// How often a peptide is scheduled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    #[default]
    Daily,
    EveryOtherDay,
    TwiceWeekly,
    Weekly,
    AsNeeded,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::EveryOtherDay => "every_other_day",
            Frequency::TwiceWeekly => "twice_weekly",
            Frequency::Weekly => "weekly",
            Frequency::AsNeeded => "as_needed",
        }
    }
}

impl std::str::FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "every_other_day" => Ok(Frequency::EveryOtherDay),
            "twice_weekly" => Ok(Frequency::TwiceWeekly),
            "weekly" => Ok(Frequency::Weekly),
            "as_needed" => Ok(Frequency::AsNeeded),
            other => Err(format!("Unknown frequency: {}", other)),
        }
    }
}

/// Dosing schedule (informational; reminders live outside this crate).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Schedule {
    pub frequency: Frequency,
    pub times_of_day: Vec<TimeOfDay>,
}

/// A tracked peptide: its vials and its dose ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Peptide {
    /// Unique peptide ID
    pub id: String,
    /// Display name
    pub name: String,
    /// Dosing configuration
    pub dosing: DosingConfig,
    /// Schedule
    pub schedule: Schedule,
    /// Vials, in creation order
    pub vials: Vec<Vial>,
    /// Dose ledger, in logging order
    pub dose_logs: Vec<DoseLogEntry>,
    /// Optimistic concurrency revision; 0 until first saved
    pub revision: u64,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl Peptide {
    /// Create a new, unsaved peptide with no vials.
    pub fn new(name: String, dosing: DosingConfig, schedule: Schedule) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            dosing,
            schedule,
            vials: Vec::new(),
            dose_logs: Vec::new(),
            revision: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// The vial currently drawn from.
    pub fn active_vial(&self) -> Option<&Vial> {
        self.vials.iter().find(|v| v.is_active())
    }

    pub fn vial(&self, vial_id: &str) -> Option<&Vial> {
        self.vials.iter().find(|v| v.id == vial_id)
    }

    pub fn vial_mut(&mut self, vial_id: &str) -> Option<&mut Vial> {
        self.vials.iter_mut().find(|v| v.id == vial_id)
    }

    pub fn dose_log(&self, entry_id: &str) -> Option<&DoseLogEntry> {
        self.dose_logs.iter().find(|e| e.id == entry_id)
    }

    /// Entries drawn from a given vial.
    pub fn dose_logs_for_vial<'a>(
        &'a self,
        vial_id: &'a str,
    ) -> impl Iterator<Item = &'a DoseLogEntry> + 'a {
        self.dose_logs.iter().filter(move |e| e.vial_id == vial_id)
    }

    /// Vials still in service.
    pub fn open_vial_count(&self) -> usize {
        self.vials.iter().filter(|v| !v.is_terminal()).count()
    }

    /// Touch the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}

/// Caller-supplied peptide to create.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewPeptide {
    pub name: String,
    pub dosing: DosingConfig,
    pub schedule: Schedule,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VialStatus;

    #[test]
    fn test_new_peptide() {
        let peptide = Peptide::new("BPC-157".into(), DosingConfig::default(), Schedule::default());
        assert_eq!(peptide.name, "BPC-157");
        assert_eq!(peptide.revision, 0);
        assert!(peptide.active_vial().is_none());
        assert_eq!(peptide.id.len(), 36);
    }

    #[test]
    fn test_active_vial_lookup() {
        let mut peptide =
            Peptide::new("TB-500".into(), DosingConfig::default(), Schedule::default());
        let first = Vial::new(10);
        let mut second = Vial::new(20);
        second.status = VialStatus::Active;
        let second_id = second.id.clone();
        peptide.vials.push(first);
        peptide.vials.push(second);

        assert_eq!(peptide.active_vial().unwrap().id, second_id);
        assert_eq!(peptide.open_vial_count(), 2);
    }

    #[test]
    fn test_frequency_parse() {
        assert_eq!("every_other_day".parse::<Frequency>(), Ok(Frequency::EveryOtherDay));
        assert_eq!(" Weekly ".parse::<Frequency>(), Ok(Frequency::Weekly));
        assert!("fortnightly".parse::<Frequency>().is_err());
        assert_eq!(Frequency::AsNeeded.as_str(), "as_needed");
    }
}
