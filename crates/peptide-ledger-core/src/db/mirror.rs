//! Inventory mirror database operations.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbResult};
use crate::models::InventoryMirrorRecord;

impl Database {
    /// Insert or replace the mirror row for a peptide.
    pub fn upsert_inventory_mirror(&self, record: &InventoryMirrorRecord) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO inventory_mirror (
                peptide_id, peptide_name, used_doses, remaining_doses, total_doses,
                vial_count, active_vial_id, next_expiry, ledger_digest, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(peptide_id) DO UPDATE SET
                peptide_name = excluded.peptide_name,
                used_doses = excluded.used_doses,
                remaining_doses = excluded.remaining_doses,
                total_doses = excluded.total_doses,
                vial_count = excluded.vial_count,
                active_vial_id = excluded.active_vial_id,
                next_expiry = excluded.next_expiry,
                ledger_digest = excluded.ledger_digest,
                updated_at = excluded.updated_at
            "#,
            params![
                record.peptide_id,
                record.peptide_name,
                record.used_doses,
                record.remaining_doses,
                record.total_doses,
                record.vial_count,
                record.active_vial_id,
                record.next_expiry,
                record.ledger_digest,
                record.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_inventory_mirror(&self, peptide_id: &str) -> DbResult<Option<InventoryMirrorRecord>> {
        let record = self
            .conn
            .query_row(
                r#"
                SELECT peptide_id, peptide_name, used_doses, remaining_doses, total_doses,
                       vial_count, active_vial_id, next_expiry, ledger_digest, updated_at
                FROM inventory_mirror
                WHERE peptide_id = ?
                "#,
                [peptide_id],
                |row| {
                    Ok(InventoryMirrorRecord {
                        peptide_id: row.get(0)?,
                        peptide_name: row.get(1)?,
                        used_doses: row.get(2)?,
                        remaining_doses: row.get(3)?,
                        total_doses: row.get(4)?,
                        vial_count: row.get(5)?,
                        active_vial_id: row.get(6)?,
                        next_expiry: row.get(7)?,
                        ledger_digest: row.get(8)?,
                        updated_at: row.get(9)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }
}
