//! SQLite persistence for the peptide ledger.

mod schema;
mod mirror;
mod peptides;
mod store;

pub use schema::*;

use rusqlite::{Connection, ErrorCode};
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::config::StoreConfig;
use crate::store::StoreError;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Revision conflict on {id}: expected {expected}, found {found}")]
    Conflict { id: String, expected: u64, found: u64 },
}

pub type DbResult<T> = Result<T, DbError>;

impl From<DbError> for StoreError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Sqlite(rusqlite::Error::SqliteFailure(ref failure, _))
                if matches!(
                    failure.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) =>
            {
                StoreError::Transient(e.to_string())
            }
            DbError::NotFound(what) => StoreError::NotFound(what),
            DbError::Conflict {
                id,
                expected,
                found,
            } => StoreError::Conflict {
                id,
                expected,
                found,
            },
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Open the database selected by the store configuration.
    pub fn open_with_config(config: &StoreConfig) -> DbResult<Self> {
        let path = config.database_path();
        info!(environment = ?config.environment, path = %path.display(), "opening peptide database");
        Self::open(path)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn test_schema_initialized() {
        let db = Database::open_in_memory().unwrap();

        let tables: Vec<String> = db
            .conn()
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"peptides".to_string()));
        assert!(tables.contains(&"inventory_mirror".to_string()));
    }

    #[test]
    fn test_open_with_config_uses_environment_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            environment: Environment::Production,
            development_path: dir.path().join("dev.sqlite"),
            production_path: dir.path().join("prod.sqlite"),
        };

        Database::open_with_config(&config).unwrap();
        assert!(dir.path().join("prod.sqlite").exists());
        assert!(!dir.path().join("dev.sqlite").exists());
    }

    #[test]
    fn test_busy_maps_to_transient() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        let err: StoreError = DbError::from(busy).into();
        assert!(err.is_transient());

        let err: StoreError = DbError::NotFound("peptide x".into()).into();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
