//! Peptide record database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{DoseLogEntry, DosingConfig, Peptide, Schedule, Vial};

const SELECT_PEPTIDE: &str = r#"
    SELECT id, name, dosing, schedule, vials, dose_logs,
           revision, created_at, updated_at
    FROM peptides
"#;

impl Database {
    /// Insert a peptide that has never been saved. Returns the stored revision.
    pub fn insert_peptide(&self, peptide: &Peptide) -> DbResult<u64> {
        if let Some(found) = self.peptide_revision(&peptide.id)? {
            return Err(DbError::Conflict {
                id: peptide.id.clone(),
                expected: 0,
                found,
            });
        }

        self.conn.execute(
            r#"
            INSERT INTO peptides (
                id, name, dosing, schedule, vials, dose_logs,
                revision, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8)
            "#,
            params![
                peptide.id,
                peptide.name,
                serde_json::to_string(&peptide.dosing)?,
                serde_json::to_string(&peptide.schedule)?,
                serde_json::to_string(&peptide.vials)?,
                serde_json::to_string(&peptide.dose_logs)?,
                peptide.created_at,
                peptide.updated_at,
            ],
        )?;
        Ok(1)
    }

    /// Overwrite a peptide if its stored revision still matches.
    ///
    /// Vials and dose logs are written in the same statement, so a reader
    /// never sees one without the other.
    pub fn update_peptide(&self, peptide: &Peptide) -> DbResult<u64> {
        let expected = peptide.revision;
        let rows_affected = self.conn.execute(
            r#"
            UPDATE peptides SET
                name = ?3,
                dosing = ?4,
                schedule = ?5,
                vials = ?6,
                dose_logs = ?7,
                revision = revision + 1,
                updated_at = ?8
            WHERE id = ?1 AND revision = ?2
            "#,
            params![
                peptide.id,
                expected as i64,
                peptide.name,
                serde_json::to_string(&peptide.dosing)?,
                serde_json::to_string(&peptide.schedule)?,
                serde_json::to_string(&peptide.vials)?,
                serde_json::to_string(&peptide.dose_logs)?,
                peptide.updated_at,
            ],
        )?;

        if rows_affected == 0 {
            return match self.peptide_revision(&peptide.id)? {
                None => Err(DbError::NotFound(format!("peptide {}", peptide.id))),
                Some(found) => Err(DbError::Conflict {
                    id: peptide.id.clone(),
                    expected,
                    found,
                }),
            };
        }
        Ok(expected + 1)
    }

    /// Get a peptide by ID.
    pub fn get_peptide(&self, id: &str) -> DbResult<Option<Peptide>> {
        self.conn
            .query_row(&format!("{} WHERE id = ?", SELECT_PEPTIDE), [id], PeptideRow::from_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Current stored revision, if the peptide exists.
    pub fn peptide_revision(&self, id: &str) -> DbResult<Option<u64>> {
        let revision: Option<i64> = self
            .conn
            .query_row("SELECT revision FROM peptides WHERE id = ?", [id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(revision.map(|r| r as u64))
    }
}

/// Internal row struct for database mapping.
struct PeptideRow {
    id: String,
    name: String,
    dosing: String,
    schedule: String,
    vials: String,
    dose_logs: String,
    revision: i64,
    created_at: String,
    updated_at: String,
}

impl PeptideRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            dosing: row.get(2)?,
            schedule: row.get(3)?,
            vials: row.get(4)?,
            dose_logs: row.get(5)?,
            revision: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

impl TryFrom<PeptideRow> for Peptide {
    type Error = DbError;

    fn try_from(row: PeptideRow) -> Result<Self, Self::Error> {
        let dosing: DosingConfig = serde_json::from_str(&row.dosing)?;
        let schedule: Schedule = serde_json::from_str(&row.schedule)?;
        let vials: Vec<Vial> = serde_json::from_str(&row.vials)?;
        let dose_logs: Vec<DoseLogEntry> = serde_json::from_str(&row.dose_logs)?;

        Ok(Peptide {
            id: row.id,
            name: row.name,
            dosing,
            schedule,
            vials,
            dose_logs,
            revision: row.revision as u64,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DoseInput, DoseUnit, TypicalDose, VialStatus};

    fn sample_peptide() -> Peptide {
        let mut peptide = Peptide::new(
            "BPC-157".into(),
            DosingConfig {
                typical_dose: Some(TypicalDose::new(250.0, DoseUnit::Mcg)),
            },
            Schedule::default(),
        );
        let mut vial = Vial::new(20);
        vial.status = VialStatus::Active;
        let entry = DoseInput::new(250.0, DoseUnit::Mcg).into_entry(&vial.id);
        peptide.vials.push(vial);
        peptide.dose_logs.push(entry);
        peptide
    }

    #[test]
    fn test_insert_and_get() {
        let db = Database::open_in_memory().unwrap();
        let peptide = sample_peptide();

        assert_eq!(db.insert_peptide(&peptide).unwrap(), 1);

        let loaded = db.get_peptide(&peptide.id).unwrap().unwrap();
        assert_eq!(loaded.name, "BPC-157");
        assert_eq!(loaded.revision, 1);
        assert_eq!(loaded.vials, peptide.vials);
        assert_eq!(loaded.dose_logs, peptide.dose_logs);
    }

    #[test]
    fn test_get_missing() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_peptide("nope").unwrap().is_none());
    }

    #[test]
    fn test_double_insert_conflicts() {
        let db = Database::open_in_memory().unwrap();
        let peptide = sample_peptide();
        db.insert_peptide(&peptide).unwrap();

        let err = db.insert_peptide(&peptide).unwrap_err();
        assert!(matches!(err, DbError::Conflict { expected: 0, found: 1, .. }));
    }

    #[test]
    fn test_update_bumps_revision() {
        let db = Database::open_in_memory().unwrap();
        let mut peptide = sample_peptide();
        peptide.revision = db.insert_peptide(&peptide).unwrap();

        peptide.dose_logs.clear();
        peptide.revision = db.update_peptide(&peptide).unwrap();
        assert_eq!(peptide.revision, 2);

        let loaded = db.get_peptide(&peptide.id).unwrap().unwrap();
        assert!(loaded.dose_logs.is_empty());
        assert_eq!(loaded.revision, 2);
    }

    #[test]
    fn test_stale_update_conflicts() {
        let db = Database::open_in_memory().unwrap();
        let mut peptide = sample_peptide();
        peptide.revision = db.insert_peptide(&peptide).unwrap();

        let stale = peptide.clone();
        peptide.revision = db.update_peptide(&peptide).unwrap();

        let err = db.update_peptide(&stale).unwrap_err();
        assert!(matches!(err, DbError::Conflict { expected: 1, found: 2, .. }));
    }

    #[test]
    fn test_update_missing() {
        let db = Database::open_in_memory().unwrap();
        let mut peptide = sample_peptide();
        peptide.revision = 1;
        assert!(matches!(
            db.update_peptide(&peptide),
            Err(DbError::NotFound(_))
        ));
    }

    #[test]
    fn test_stored_json_uses_snake_case() {
        let db = Database::open_in_memory().unwrap();
        let peptide = sample_peptide();
        db.insert_peptide(&peptide).unwrap();

        let (vials, dosing): (String, String) = db
            .conn()
            .query_row(
                "SELECT vials, dosing FROM peptides WHERE id = ?",
                [&peptide.id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();

        assert!(vials.contains("\"initial_amount_units\":20"));
        assert!(vials.contains("\"status\":\"active\""));
        assert!(dosing.contains("\"typical_dose\""));
        assert!(!vials.contains("initialAmountUnits"));
    }

    #[test]
    fn test_camel_case_document_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute(
                r#"
                INSERT INTO peptides (id, name, dosing, schedule, vials)
                VALUES ('p1', 'BPC', '{}', '{"frequency":"daily","times_of_day":[]}', ?)
                "#,
                [r#"[{"id":"v1","initialAmountUnits":10,"remainingAmountUnits":10,"status":"active","createdAt":"2024-01-01T00:00:00Z"}]"#],
            )
            .unwrap();

        assert!(matches!(db.get_peptide("p1"), Err(DbError::Json(_))));
    }
}
