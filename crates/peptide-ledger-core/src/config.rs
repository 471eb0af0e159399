//! Ledger configuration.
//!
//! The backing database is chosen by an explicit `environment` value that is
//! handed to the store constructor; nothing in the engine inspects it.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{DoseUnit, TypicalDose};
use crate::store::RetryPolicy;

/// Deployment environment selecting the backing database.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LedgerConfig {
    pub store: StoreConfig,
    pub dosing: DosingDefaults,
    pub retry: RetryPolicy,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub environment: Environment,
    pub development_path: PathBuf,
    pub production_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DosingDefaults {
    /// Typical dose assumed for peptides that have none configured
    pub fallback_typical_dose_amount: f64,
    pub fallback_typical_dose_unit: DoseUnit,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive; `RUST_LOG` takes precedence
    pub level: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            dosing: DosingDefaults::default(),
            retry: RetryPolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            development_path: PathBuf::from("peptide-ledger-dev.sqlite"),
            production_path: PathBuf::from("peptide-ledger.sqlite"),
        }
    }
}

impl Default for DosingDefaults {
    fn default() -> Self {
        Self {
            fallback_typical_dose_amount: 300.0,
            fallback_typical_dose_unit: DoseUnit::Mcg,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl StoreConfig {
    /// Database file for the configured environment.
    pub fn database_path(&self) -> &Path {
        match self.environment {
            Environment::Development => &self.development_path,
            Environment::Production => &self.production_path,
        }
    }
}

impl DosingDefaults {
    pub fn fallback_typical_dose(&self) -> TypicalDose {
        TypicalDose::new(
            self.fallback_typical_dose_amount,
            self.fallback_typical_dose_unit,
        )
    }
}

impl LedgerConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source).context("Failed to parse ledger config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&source)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        let amount = self.dosing.fallback_typical_dose_amount;
        if !amount.is_finite() || amount <= 0.0 {
            bail!("dosing.fallback_typical_dose_amount must be positive, got {}", amount);
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if self.store.database_path().as_os_str().is_empty() {
            bail!(
                "store path for {:?} environment is empty",
                self.store.environment
            );
        }
        Ok(())
    }
}
