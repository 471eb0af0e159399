//! Engine over the SQLite store.

use peptide_ledger_core::config::{Environment, LedgerConfig, StoreConfig};
use peptide_ledger_core::db::Database;
use peptide_ledger_core::models::{DoseInput, DoseUnit, NewPeptide, NewVial};
use peptide_ledger_core::store::{PeptideStore, RetryingStore, StoreError};
use peptide_ledger_core::{EngineSettings, ReconciliationEngine};

fn open_engine(config: &LedgerConfig) -> ReconciliationEngine<RetryingStore<Database>> {
    let db = Database::open_with_config(&config.store).unwrap();
    ReconciliationEngine::new(
        RetryingStore::new(db, config.retry),
        EngineSettings::from(config),
    )
}

#[test]
fn test_ledger_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = LedgerConfig {
        store: StoreConfig {
            environment: Environment::Development,
            development_path: dir.path().join("ledger.sqlite"),
            production_path: dir.path().join("unused.sqlite"),
        },
        ..Default::default()
    };

    let (peptide_id, entry_id) = {
        let engine = open_engine(&config);
        let peptide = engine
            .create_peptide(NewPeptide {
                name: "Semax".into(),
                ..Default::default()
            })
            .unwrap();
        engine
            .add_vial(
                &peptide.id,
                NewVial {
                    initial_amount_units: 30,
                    activate: true,
                    ..Default::default()
                },
            )
            .unwrap();
        let mut last = None;
        for _ in 0..5 {
            last = Some(
                engine
                    .log_dose(&peptide.id, DoseInput::new(300.0, DoseUnit::Mcg))
                    .unwrap(),
            );
        }
        (peptide.id, last.unwrap().id)
    };

    let engine = open_engine(&config);
    assert_eq!(engine.remaining_doses(&peptide_id).unwrap(), 25);
    engine.revert_dose(&peptide_id, &entry_id).unwrap();
    assert_eq!(engine.remaining_doses(&peptide_id).unwrap(), 26);

    let mirror = engine.inventory_mirror(&peptide_id).unwrap();
    assert_eq!(mirror.used_doses_display(), "4/30");
    assert!(!dir.path().join("unused.sqlite").exists());
}

#[test]
fn test_concurrent_writer_conflict_is_reported() {
    let db = Database::open_in_memory().unwrap();
    let engine = ReconciliationEngine::new(&db, EngineSettings::default());
    let peptide = engine
        .create_peptide(NewPeptide {
            name: "Selank".into(),
            ..Default::default()
        })
        .unwrap();
    engine
        .add_vial(
            &peptide.id,
            NewVial {
                initial_amount_units: 10,
                activate: true,
                ..Default::default()
            },
        )
        .unwrap();

    let stale = db.load_peptide(&peptide.id).unwrap();
    engine
        .log_dose(&peptide.id, DoseInput::new(300.0, DoseUnit::Mcg))
        .unwrap();

    assert!(matches!(
        db.save_peptide(&stale),
        Err(StoreError::Conflict { .. })
    ));
    assert_eq!(engine.remaining_doses(&peptide.id).unwrap(), 9);
}
