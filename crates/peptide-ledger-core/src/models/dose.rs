//! Dose log models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Unit a dose amount is expressed in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DoseUnit {
    /// Micrograms
    Mcg,
    /// Milligrams
    Mg,
    /// International units
    Iu,
}

impl DoseUnit {
    /// Canonical lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            DoseUnit::Mcg => "mcg",
            DoseUnit::Mg => "mg",
            DoseUnit::Iu => "iu",
        }
    }

    /// Factor to convert an amount in `self` into `target`, if the units are
    /// commensurable.
    pub fn factor_to(&self, target: DoseUnit) -> Option<f64> {
        match (self, target) {
            (a, b) if *a == b => Some(1.0),
            (DoseUnit::Mg, DoseUnit::Mcg) => Some(1000.0),
            (DoseUnit::Mcg, DoseUnit::Mg) => Some(0.001),
            _ => None,
        }
    }
}

impl fmt::Display for DoseUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DoseUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mcg" | "ug" | "µg" | "μg" => Ok(DoseUnit::Mcg),
            "mg" => Ok(DoseUnit::Mg),
            "iu" => Ok(DoseUnit::Iu),
            other => Err(format!("Unknown dose unit: {}", other)),
        }
    }
}

/// Time-of-day slot a dose belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    /// Slot for an hour of the day (0-23).
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => TimeOfDay::Morning,
            12..=16 => TimeOfDay::Afternoon,
            17..=20 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }

    /// Slot for an RFC 3339 timestamp, using the timestamp's own offset.
    pub fn from_timestamp(timestamp: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(timestamp)
            .ok()
            .map(|dt| Self::from_hour(dt.hour()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Night => "night",
        }
    }
}

impl FromStr for TimeOfDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "morning" => Ok(TimeOfDay::Morning),
            "afternoon" => Ok(TimeOfDay::Afternoon),
            "evening" => Ok(TimeOfDay::Evening),
            "night" => Ok(TimeOfDay::Night),
            other => Err(format!("Unknown time of day: {}", other)),
        }
    }
}

/// A single administered dose. Never edited in place; reverting deletes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoseLogEntry {
    /// Unique entry ID
    pub id: String,
    /// When the dose was taken (RFC 3339)
    pub logged_at: String,
    /// Schedule slot
    pub time_of_day: TimeOfDay,
    /// Dose amount
    pub amount: f64,
    /// Dose unit
    pub unit: DoseUnit,
    /// Vial the dose was drawn from
    pub vial_id: String,
    /// Free-text note
    pub note: Option<String>,
}

/// Caller-supplied dose to log.
#[derive(Debug, Clone, PartialEq)]
pub struct DoseInput {
    pub amount: f64,
    pub unit: DoseUnit,
    /// Defaults to the slot of `taken_at`
    pub time_of_day: Option<TimeOfDay>,
    /// Defaults to now
    pub taken_at: Option<String>,
    pub note: Option<String>,
}

impl DoseInput {
    /// Dose taken now, slot derived from the clock.
    pub fn new(amount: f64, unit: DoseUnit) -> Self {
        Self {
            amount,
            unit,
            time_of_day: None,
            taken_at: None,
            note: None,
        }
    }

    /// Build the ledger entry for this input, drawn from `vial_id`.
    pub fn into_entry(self, vial_id: &str) -> DoseLogEntry {
        let logged_at = self
            .taken_at
            .unwrap_or_else(|| chrono::Local::now().to_rfc3339());
        let time_of_day = self
            .time_of_day
            .or_else(|| TimeOfDay::from_timestamp(&logged_at))
            .unwrap_or(TimeOfDay::Morning);

        DoseLogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            logged_at,
            time_of_day,
            amount: self.amount,
            unit: self.unit,
            vial_id: vial_id.to_string(),
            note: self.note,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_parsing() {
        assert_eq!("mcg".parse::<DoseUnit>(), Ok(DoseUnit::Mcg));
        assert_eq!("µg".parse::<DoseUnit>(), Ok(DoseUnit::Mcg));
        assert_eq!(" MG ".parse::<DoseUnit>(), Ok(DoseUnit::Mg));
        assert_eq!("IU".parse::<DoseUnit>(), Ok(DoseUnit::Iu));
        assert!("ml".parse::<DoseUnit>().is_err());
    }

    #[test]
    fn test_unit_factors() {
        assert_eq!(DoseUnit::Mg.factor_to(DoseUnit::Mcg), Some(1000.0));
        assert_eq!(DoseUnit::Mcg.factor_to(DoseUnit::Mcg), Some(1.0));
        assert_eq!(DoseUnit::Iu.factor_to(DoseUnit::Mcg), None);
    }

    #[test]
    fn test_time_of_day_from_hour() {
        assert_eq!(TimeOfDay::from_hour(7), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(12), TimeOfDay::Afternoon);
        assert_eq!(TimeOfDay::from_hour(20), TimeOfDay::Evening);
        assert_eq!(TimeOfDay::from_hour(23), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(3), TimeOfDay::Night);
    }

    #[test]
    fn test_entry_slot_from_timestamp() {
        let mut input = DoseInput::new(250.0, DoseUnit::Mcg);
        input.taken_at = Some("2024-03-01T18:30:00-05:00".into());

        let entry = input.into_entry("vial-1");
        assert_eq!(entry.time_of_day, TimeOfDay::Evening);
        assert_eq!(entry.vial_id, "vial-1");
        assert_eq!(entry.id.len(), 36);
    }

    #[test]
    fn test_explicit_slot_wins() {
        let mut input = DoseInput::new(250.0, DoseUnit::Mcg);
        input.taken_at = Some("2024-03-01T18:30:00Z".into());
        input.time_of_day = Some(TimeOfDay::Morning);

        assert_eq!(input.into_entry("v").time_of_day, TimeOfDay::Morning);
    }
}
