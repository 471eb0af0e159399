//! SQLite schema definition.

/// Column order of `peptides`. Part of the storage contract: external tools
/// read these names, so they never change casing or spelling.
pub const PEPTIDE_COLUMNS: &[&str] = &[
    "id",
    "name",
    "dosing",
    "schedule",
    "vials",
    "dose_logs",
    "revision",
    "created_at",
    "updated_at",
];

/// Column order of `inventory_mirror`.
pub const MIRROR_COLUMNS: &[&str] = &[
    "peptide_id",
    "peptide_name",
    "used_doses",
    "remaining_doses",
    "total_doses",
    "vial_count",
    "active_vial_id",
    "next_expiry",
    "ledger_digest",
    "updated_at",
];

/// Complete database schema for the peptide ledger.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Peptides (schedule/log record)
-- ============================================================================

-- Vials and dose logs live in the same row so one UPDATE changes both
CREATE TABLE IF NOT EXISTS peptides (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    dosing TEXT NOT NULL,                         -- JSON DosingConfig
    schedule TEXT NOT NULL,                       -- JSON Schedule
    vials TEXT NOT NULL DEFAULT '[]',             -- JSON array of Vial
    dose_logs TEXT NOT NULL DEFAULT '[]',         -- JSON array of DoseLogEntry
    revision INTEGER NOT NULL DEFAULT 1 CHECK (revision >= 1),
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_peptides_name ON peptides(name);

-- At most one active vial per peptide
CREATE TRIGGER IF NOT EXISTS peptides_single_active_vial_insert BEFORE INSERT ON peptides
WHEN (
    SELECT COUNT(*) FROM json_each(new.vials) AS v
    WHERE json_extract(v.value, '$.status') = 'active'
) > 1
BEGIN
    SELECT RAISE(ABORT, 'At most one vial may be active');
END;

CREATE TRIGGER IF NOT EXISTS peptides_single_active_vial_update BEFORE UPDATE OF vials ON peptides
WHEN (
    SELECT COUNT(*) FROM json_each(new.vials) AS v
    WHERE json_extract(v.value, '$.status') = 'active'
) > 1
BEGIN
    SELECT RAISE(ABORT, 'At most one vial may be active');
END;

-- ============================================================================
-- Inventory Mirror (denormalized, non-authoritative)
-- ============================================================================

CREATE TABLE IF NOT EXISTS inventory_mirror (
    peptide_id TEXT PRIMARY KEY REFERENCES peptides(id) ON DELETE CASCADE,
    peptide_name TEXT NOT NULL,
    used_doses INTEGER NOT NULL DEFAULT 0,
    remaining_doses INTEGER NOT NULL DEFAULT 0,
    total_doses INTEGER NOT NULL DEFAULT 0,
    vial_count INTEGER NOT NULL DEFAULT 0,
    active_vial_id TEXT,
    next_expiry TEXT,
    ledger_digest TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn columns(conn: &Connection, table: &str) -> Vec<String> {
        conn.prepare(&format!("PRAGMA table_info({})", table))
            .unwrap()
            .query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_column_contract() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        assert_eq!(columns(&conn, "peptides"), PEPTIDE_COLUMNS);
        assert_eq!(columns(&conn, "inventory_mirror"), MIRROR_COLUMNS);
    }

    #[test]
    fn test_single_active_vial_trigger() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        let two_active = r#"[{"id":"a","status":"active"},{"id":"b","status":"active"}]"#;
        let one_active = r#"[{"id":"a","status":"active"},{"id":"b","status":"inactive"}]"#;

        let result = conn.execute(
            "INSERT INTO peptides (id, name, dosing, schedule, vials) VALUES ('p1', 'BPC', '{}', '{}', ?)",
            [two_active],
        );
        assert!(result.is_err());

        conn.execute(
            "INSERT INTO peptides (id, name, dosing, schedule, vials) VALUES ('p1', 'BPC', '{}', '{}', ?)",
            [one_active],
        )
        .unwrap();

        let result = conn.execute("UPDATE peptides SET vials = ? WHERE id = 'p1'", [two_active]);
        assert!(result.is_err());
    }

    #[test]
    fn test_mirror_requires_peptide() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        let result = conn.execute(
            "INSERT INTO inventory_mirror (peptide_id, peptide_name, ledger_digest) VALUES ('ghost', 'X', '')",
            [],
        );
        assert!(result.is_err());
    }
}
