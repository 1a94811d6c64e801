use clinic_core::db::open_db_in_memory;
use clinic_core::model::clinic::{
    AppointmentKind, ClaimStatus, InvoiceStatus, NewAppointment, NewInsuranceClaim, NewInvoice,
    NewInvoiceItem, NewPatient, NewPayment, NewTreatmentRecord, PaymentMethod,
};
use clinic_core::{
    CascadeError, CascadeExecutor, CascadeRule, ClinicRepository, DependencyCatalog, FieldFilter,
    RecordId, RecordRef, SqliteClinicRepository, SqliteRecordStore,
};
use rusqlite::{params, Connection};
use uuid::Uuid;

struct SeededPatient {
    patient: RecordId,
    appointments: Vec<RecordId>,
    treatment: RecordId,
}

/// Patient with two appointments, one treatment record and no insurance claims.
fn seed_p1(conn: &Connection) -> SeededPatient {
    let repo = SqliteClinicRepository::try_new(conn).unwrap();
    let patient = repo.create_patient(&NewPatient::new("Ada", "Lovelace")).unwrap();
    let appointments = (0..2)
        .map(|slot| {
            repo.create_appointment(&NewAppointment::scheduled(
                patient,
                1_700_000_000_000 + slot * 3_600_000,
                30,
                AppointmentKind::Checkup,
            ))
            .unwrap()
        })
        .collect();
    let treatment = repo
        .create_treatment_record(&NewTreatmentRecord {
            patient,
            procedure_name: "filling".to_string(),
            tooth_number: Some(14),
            notes: None,
            performed_at: 1_700_000_000_000,
        })
        .unwrap();
    SeededPatient {
        patient,
        appointments,
        treatment,
    }
}

fn count(store: &SqliteRecordStore<'_>, collection: &str, field: &str, value: RecordId) -> u64 {
    store
        .count_by_filter(collection, &FieldFilter::equals(field, value))
        .unwrap()
}

fn patient_exists(store: &SqliteRecordStore<'_>, id: RecordId) -> bool {
    store.exists(&RecordRef::new("patients", id)).unwrap()
}

fn executor() -> CascadeExecutor {
    CascadeExecutor::new(DependencyCatalog::clinic_default())
}

#[test]
fn p1_cascade_removes_three_dependents_and_the_patient() {
    let conn = open_db_in_memory().unwrap();
    let seeded = seed_p1(&conn);
    let bystander = seed_p1(&conn);
    let store = SqliteRecordStore::try_new(&conn).unwrap();

    let report = executor()
        .cascade_delete(&store, "patients", seeded.patient)
        .unwrap();

    assert_eq!(report.root, RecordRef::new("patients", seeded.patient));
    assert_eq!(report.total_removed(), 3);
    assert_eq!(report.removed_from("appointments"), 2);
    assert_eq!(report.removed_from("treatment_records"), 1);
    assert_eq!(report.removed_from("insurance_claims"), 0);

    assert!(!patient_exists(&store, seeded.patient));
    assert_eq!(count(&store, "appointments", "patient", seeded.patient), 0);
    assert_eq!(count(&store, "treatment_records", "patient", seeded.patient), 0);
    for appointment in &seeded.appointments {
        assert!(!store
            .exists(&RecordRef::new("appointments", *appointment))
            .unwrap());
    }

    assert!(patient_exists(&store, bystander.patient));
    assert_eq!(count(&store, "appointments", "patient", bystander.patient), 2);
    assert_eq!(count(&store, "treatment_records", "patient", bystander.patient), 1);
}

#[test]
fn forced_delete_failure_rolls_back_every_change() {
    let conn = open_db_in_memory().unwrap();
    let seeded = seed_p1(&conn);
    conn.execute_batch(&format!(
        "CREATE TRIGGER lock_treatment BEFORE DELETE ON treatment_records
         WHEN OLD.id = '{}'
         BEGIN
            SELECT RAISE(ABORT, 'treatment record is locked');
         END;",
        seeded.treatment
    ))
    .unwrap();
    let store = SqliteRecordStore::try_new(&conn).unwrap();

    let err = executor()
        .cascade_delete(&store, "patients", seeded.patient)
        .unwrap_err();

    match &err {
        CascadeError::DeleteFailure { record, .. } => {
            assert_eq!(*record, RecordRef::new("treatment_records", seeded.treatment));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_fatal());
    assert!(!err.is_timeout());

    // Appointments were deleted before the failure; the rollback restores them.
    assert!(patient_exists(&store, seeded.patient));
    assert_eq!(count(&store, "appointments", "patient", seeded.patient), 2);
    assert_eq!(count(&store, "treatment_records", "patient", seeded.patient), 1);

    conn.execute_batch("DROP TRIGGER lock_treatment;").unwrap();
    let report = executor()
        .cascade_delete(&store, "patients", seeded.patient)
        .unwrap();
    assert_eq!(report.total_removed(), 3);
}

#[test]
fn second_cascade_of_same_patient_is_root_not_found() {
    let conn = open_db_in_memory().unwrap();
    let seeded = seed_p1(&conn);
    let store = SqliteRecordStore::try_new(&conn).unwrap();
    let executor = executor();

    executor
        .cascade_delete(&store, "patients", seeded.patient)
        .unwrap();
    let err = executor
        .cascade_delete(&store, "patients", seeded.patient)
        .unwrap_err();

    assert!(err.is_already_deleted());
    assert!(!err.is_fatal());
    assert!(
        matches!(&err, CascadeError::RootNotFound(root) if root.id == seeded.patient)
    );
}

#[test]
fn unknown_patient_is_root_not_found() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteRecordStore::try_new(&conn).unwrap();

    let err = executor()
        .cascade_delete(&store, "patients", Uuid::new_v4())
        .unwrap_err();

    assert!(err.is_already_deleted());
}

#[test]
fn ten_thousand_dependents_across_three_collections_are_removed() {
    let mut conn = open_db_in_memory().unwrap();
    let repo_patient = {
        let repo = SqliteClinicRepository::try_new(&conn).unwrap();
        repo.create_patient(&NewPatient::new("Grace", "Hopper")).unwrap()
    };
    let patient = repo_patient.to_string();

    {
        let tx = conn.transaction().unwrap();
        {
            let mut appointment = tx
                .prepare(
                    "INSERT INTO appointments (id, patient, start_time, duration_minutes, status, kind)
                     VALUES (?1, ?2, ?3, 30, 'completed', 'cleaning');",
                )
                .unwrap();
            let mut treatment = tx
                .prepare(
                    "INSERT INTO treatment_records (id, patient, procedure_name, performed_at)
                     VALUES (?1, ?2, 'scaling', ?3);",
                )
                .unwrap();
            let mut transfer = tx
                .prepare(
                    "INSERT INTO patient_transfers (id, patient, from_clinic, to_clinic, transferred_at)
                     VALUES (?1, ?2, 'north', 'south', ?3);",
                )
                .unwrap();
            for index in 0..10_000_i64 {
                let id = Uuid::new_v4().to_string();
                let statement = match index % 3 {
                    0 => &mut appointment,
                    1 => &mut treatment,
                    _ => &mut transfer,
                };
                statement.execute(params![id, patient, index]).unwrap();
            }
        }
        tx.commit().unwrap();
    }

    let store = SqliteRecordStore::try_new(&conn).unwrap();
    let report = executor()
        .cascade_delete(&store, "patients", repo_patient)
        .unwrap();

    assert_eq!(report.total_removed(), 10_000);
    assert_eq!(report.removed_from("appointments"), 3_334);
    assert_eq!(report.removed_from("treatment_records"), 3_333);
    assert_eq!(report.removed_from("patient_transfers"), 3_333);
    assert_eq!(count(&store, "appointments", "patient", repo_patient), 0);
    assert_eq!(count(&store, "treatment_records", "patient", repo_patient), 0);
    assert_eq!(count(&store, "patient_transfers", "patient", repo_patient), 0);
    assert!(!patient_exists(&store, repo_patient));
}

#[test]
fn invoices_are_purged_with_their_items_and_payments() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteClinicRepository::try_new(&conn).unwrap();
    let patient = repo.create_patient(&NewPatient::new("Alan", "Turing")).unwrap();
    let invoice = repo
        .create_invoice(&NewInvoice {
            patient,
            invoice_number: "INV-0001".to_string(),
            total_cents: 25_000,
            status: InvoiceStatus::Issued,
        })
        .unwrap();
    for description in ["exam", "x-ray"] {
        repo.add_invoice_item(&NewInvoiceItem {
            invoice,
            description: description.to_string(),
            quantity: 1,
            unit_price_cents: 12_500,
        })
        .unwrap();
    }
    repo.record_payment(&NewPayment {
        patient,
        invoice,
        amount_cents: 10_000,
        method: PaymentMethod::Card,
    })
    .unwrap();
    repo.create_insurance_claim(&NewInsuranceClaim {
        patient,
        claim_number: "CLM-77".to_string(),
        claimed_amount_cents: 15_000,
        status: ClaimStatus::Submitted,
    })
    .unwrap();
    let store = SqliteRecordStore::try_new(&conn).unwrap();

    let report = executor()
        .cascade_delete(&store, "patients", patient)
        .unwrap();

    assert_eq!(report.removed_from("insurance_claims"), 1);
    assert_eq!(report.removed_from("payments"), 1);
    assert_eq!(report.removed_from("invoices"), 1);
    assert_eq!(report.removed_from("invoice_items"), 2);
    assert_eq!(report.total_removed(), 5);
    assert_eq!(count(&store, "invoice_items", "invoice", invoice), 0);
    assert!(!store.exists(&RecordRef::new("invoices", invoice)).unwrap());
}

#[test]
fn uncatalogued_reference_blocks_root_delete_and_rolls_back() {
    let conn = open_db_in_memory().unwrap();
    let seeded = seed_p1(&conn);
    conn.execute_batch(
        "CREATE TABLE x_rays (
            id TEXT PRIMARY KEY NOT NULL,
            patient TEXT NOT NULL REFERENCES patients (id)
        );",
    )
    .unwrap();
    conn.execute(
        "INSERT INTO x_rays (id, patient) VALUES (?1, ?2);",
        params![Uuid::new_v4().to_string(), seeded.patient.to_string()],
    )
    .unwrap();
    let store = SqliteRecordStore::try_new(&conn).unwrap();

    let err = executor()
        .cascade_delete(&store, "patients", seeded.patient)
        .unwrap_err();

    assert!(
        matches!(&err, CascadeError::DeleteFailure { record, .. } if record.collection == "patients")
    );
    assert!(patient_exists(&store, seeded.patient));
    assert_eq!(count(&store, "appointments", "patient", seeded.patient), 2);
}

#[test]
fn query_failure_rolls_back_earlier_collections() {
    let conn = open_db_in_memory().unwrap();
    let seeded = seed_p1(&conn);
    let store = SqliteRecordStore::try_new(&conn).unwrap();
    let executor = CascadeExecutor::new(
        DependencyCatalog::from_rules(&[
            CascadeRule::new("patients", "appointments", "patient"),
            CascadeRule::new("patients", "treatment_records", "owner"),
        ])
        .unwrap(),
    );

    let err = executor
        .cascade_delete(&store, "patients", seeded.patient)
        .unwrap_err();

    assert!(
        matches!(&err, CascadeError::QueryFailure { collection, .. } if collection == "treatment_records")
    );
    assert_eq!(count(&store, "appointments", "patient", seeded.patient), 2);
    assert!(patient_exists(&store, seeded.patient));
}

#[test]
fn clinic_catalog_matches_schema() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteRecordStore::try_new(&conn).unwrap();
    store
        .ensure_catalog_ready(executor().catalog())
        .unwrap();
}

#[test]
fn misnamed_field_on_unreferenced_collection_is_query_failure() {
    let conn = open_db_in_memory().unwrap();
    let seeded = seed_p1(&conn);
    conn.execute_batch(
        "CREATE TABLE x_rays (
            id TEXT PRIMARY KEY NOT NULL,
            patient TEXT NOT NULL
        );",
    )
    .unwrap();
    conn.execute(
        "INSERT INTO x_rays (id, patient) VALUES (?1, ?2);",
        params![Uuid::new_v4().to_string(), seeded.patient.to_string()],
    )
    .unwrap();
    let store = SqliteRecordStore::try_new(&conn).unwrap();
    let executor = CascadeExecutor::new(
        DependencyCatalog::from_rules(&[
            CascadeRule::new("patients", "appointments", "patient"),
            CascadeRule::new("patients", "x_rays", "patient_id"),
        ])
        .unwrap(),
    );

    let err = executor
        .cascade_delete(&store, "patients", seeded.patient)
        .unwrap_err();

    assert!(
        matches!(&err, CascadeError::QueryFailure { collection, .. } if collection == "x_rays")
    );
    assert!(patient_exists(&store, seeded.patient));
    assert_eq!(count(&store, "x_rays", "patient", seeded.patient), 1);
    assert_eq!(count(&store, "appointments", "patient", seeded.patient), 2);
}

#[test]
fn payment_of_another_patient_on_invoice_blocks_cascade() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteClinicRepository::try_new(&conn).unwrap();
    let billed = repo.create_patient(&NewPatient::new("Alan", "Turing")).unwrap();
    let payer = repo.create_patient(&NewPatient::new("Joan", "Clarke")).unwrap();
    let invoice = repo
        .create_invoice(&NewInvoice {
            patient: billed,
            invoice_number: "INV-0042".to_string(),
            total_cents: 8_000,
            status: InvoiceStatus::Issued,
        })
        .unwrap();
    let own_payment = repo
        .record_payment(&NewPayment {
            patient: billed,
            invoice,
            amount_cents: 3_000,
            method: PaymentMethod::Card,
        })
        .unwrap();
    let foreign_payment = repo
        .record_payment(&NewPayment {
            patient: payer,
            invoice,
            amount_cents: 5_000,
            method: PaymentMethod::Cash,
        })
        .unwrap();
    let store = SqliteRecordStore::try_new(&conn).unwrap();

    let err = executor()
        .cascade_delete(&store, "patients", billed)
        .unwrap_err();

    assert!(matches!(
        &err,
        CascadeError::DeleteFailure { record, .. } if *record == RecordRef::new("invoices", invoice)
    ));
    assert!(patient_exists(&store, billed));
    assert!(store.exists(&RecordRef::new("invoices", invoice)).unwrap());
    assert!(store.exists(&RecordRef::new("payments", own_payment)).unwrap());
    assert!(store.exists(&RecordRef::new("payments", foreign_payment)).unwrap());
}

#[test]
fn clinical_collections_and_plan_items_are_purged() {
    let conn = open_db_in_memory().unwrap();
    let seeded = seed_p1(&conn);
    let bystander = seed_p1(&conn);
    let plan = Uuid::new_v4().to_string();
    let patient = seeded.patient.to_string();
    conn.execute_batch(&format!(
        "INSERT INTO patient_insurance (id, patient, provider, policy_number, coverage_type)
         VALUES ('{ins}', '{patient}', 'Delta', 'P-1', 'primary');
         INSERT INTO treatments (id, patient, tooth_number, treatment_date)
         VALUES ('{treatment}', '{patient}', '14', 0);
         INSERT INTO treatment_plans (id, patient, title, status)
         VALUES ('{plan}', '{patient}', 'Full restoration', 'accepted');
         INSERT INTO treatment_plan_items (id, treatment_plan, priority, status, sequence_number)
         VALUES ('{item_a}', '{plan}', 'high', 'pending', 1),
                ('{item_b}', '{plan}', 'low', 'scheduled', 2);
         INSERT INTO prescriptions (id, patient, medication_name, dosage, frequency, duration, prescribed_date, status)
         VALUES ('{rx}', '{patient}', 'amoxicillin', '500mg', 'tid', '7d', 0, 'active');
         INSERT INTO dental_chart (id, patient, tooth_number, status)
         VALUES ('{chart}', '{patient}', '14', 'filled');",
        ins = Uuid::new_v4(),
        treatment = Uuid::new_v4(),
        item_a = Uuid::new_v4(),
        item_b = Uuid::new_v4(),
        rx = Uuid::new_v4(),
        chart = Uuid::new_v4(),
    ))
    .unwrap();
    let store = SqliteRecordStore::try_new(&conn).unwrap();

    let report = executor()
        .cascade_delete(&store, "patients", seeded.patient)
        .unwrap();

    for collection in [
        "patient_insurance",
        "treatments",
        "treatment_plans",
        "prescriptions",
        "dental_chart",
    ] {
        assert_eq!(report.removed_from(collection), 1, "{collection}");
        assert_eq!(count(&store, collection, "patient", seeded.patient), 0);
    }
    assert_eq!(report.removed_from("treatment_plan_items"), 2);
    assert_eq!(report.total_removed(), 10);
    let plan_id = Uuid::parse_str(&plan).unwrap();
    assert_eq!(count(&store, "treatment_plan_items", "treatment_plan", plan_id), 0);
    assert!(patient_exists(&store, bystander.patient));
}
