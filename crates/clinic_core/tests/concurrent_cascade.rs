use clinic_core::db::{open_db, open_db_with_config};
use clinic_core::model::clinic::{AppointmentKind, NewAppointment, NewPatient};
use clinic_core::{
    CascadeError, CascadeExecutor, ClinicRepository, CoreConfig, DependencyCatalog, FieldFilter,
    RecordId, RecordRef, RecordStore, SqliteClinicRepository, SqliteRecordStore,
};
use std::path::Path;
use std::sync::Arc;
use std::thread;

fn seed_patients(path: &Path, patients: usize, appointments_each: i64) -> Vec<RecordId> {
    let conn = open_db(path).unwrap();
    let repo = SqliteClinicRepository::try_new(&conn).unwrap();
    (0..patients)
        .map(|_| {
            let patient = repo.create_patient(&NewPatient::new("Shared", "Chart")).unwrap();
            for slot in 0..appointments_each {
                repo.create_appointment(&NewAppointment::scheduled(
                    patient,
                    slot * 1_000,
                    20,
                    AppointmentKind::Checkup,
                ))
                .unwrap();
            }
            patient
        })
        .collect()
}

#[test]
fn cascades_on_separate_connections_serialize_and_both_commit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clinic.db");
    let patients = seed_patients(&path, 2, 200);
    let executor = Arc::new(CascadeExecutor::new(DependencyCatalog::clinic_default()));

    let handles: Vec<_> = patients
        .iter()
        .copied()
        .map(|patient| {
            let path = path.clone();
            let executor = Arc::clone(&executor);
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let store = SqliteRecordStore::try_new(&conn).unwrap();
                executor
                    .cascade_delete(&store, "patients", patient)
                    .map(|report| report.total_removed())
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap(), 200);
    }

    let conn = open_db(&path).unwrap();
    let store = SqliteRecordStore::try_new(&conn).unwrap();
    for patient in patients {
        assert!(!store.exists(&RecordRef::new("patients", patient)).unwrap());
        assert_eq!(
            store
                .count_by_filter("appointments", &FieldFilter::equals("patient", patient))
                .unwrap(),
            0
        );
    }
}

#[test]
fn lock_wait_is_bounded_and_reported_as_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clinic.db");
    let patient = seed_patients(&path, 1, 2)[0];
    let executor = CascadeExecutor::new(DependencyCatalog::clinic_default());

    let holder_conn = open_db(&path).unwrap();
    let holder = SqliteRecordStore::try_new(&holder_conn).unwrap();
    let held = holder.begin_transaction().unwrap();

    let config = CoreConfig::from_json_str(r#"{"busy_timeout_ms": 50}"#).unwrap();
    let waiter_conn = open_db_with_config(&path, &config).unwrap();
    let waiter = SqliteRecordStore::try_new(&waiter_conn).unwrap();
    let err = executor
        .cascade_delete(&waiter, "patients", patient)
        .unwrap_err();

    assert!(matches!(err, CascadeError::BeginFailure(_)));
    assert!(err.is_timeout());
    assert!(err.is_fatal());

    drop(held);
    let report = executor
        .cascade_delete(&waiter, "patients", patient)
        .unwrap();
    assert_eq!(report.total_removed(), 2);
}
