//! Clinic repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Create and read patients and the records that reference them.
//! - Keep SQL for clinic tables inside the persistence boundary.
//!
//! # Invariants
//! - Write paths validate requests before SQL mutations.
//! - Enum fields persist as snake_case text; unknown text on read is
//!   `RepoError::InvalidData`, never a silent default.
//! - Referential integrity is left to SQLite foreign keys.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::clinic::collections::{
    APPOINTMENTS, INSURANCE_CLAIMS, INVOICES, INVOICE_ITEMS, PATIENTS, PATIENT_TRANSFERS,
    PAYMENTS, TREATMENT_RECORDS,
};
use crate::model::clinic::{
    Appointment, AppointmentKind, AppointmentStatus, ClaimStatus, Gender, InvoiceStatus,
    NewAppointment, NewInsuranceClaim, NewInvoice, NewInvoiceItem, NewPatient,
    NewPatientTransfer, NewPayment, NewTreatmentRecord, Patient, PatientStatus, PaymentMethod,
};
use crate::model::record::{RecordId, RecordRef};
use rusqlite::{params, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const REQUIRED_TABLES: [&str; 8] = [
    PATIENTS,
    APPOINTMENTS,
    PATIENT_TRANSFERS,
    TREATMENT_RECORDS,
    INSURANCE_CLAIMS,
    INVOICES,
    INVOICE_ITEMS,
    PAYMENTS,
];

const PATIENT_SELECT_SQL: &str = "SELECT
    id,
    first_name,
    last_name,
    date_of_birth,
    gender,
    email,
    phone,
    status,
    notes,
    created_at,
    updated_at
FROM patients";

const APPOINTMENT_SELECT_SQL: &str = "SELECT
    id,
    patient,
    start_time,
    duration_minutes,
    status,
    kind,
    room,
    notes
FROM appointments";

pub type RepoResult<T> = Result<T, RepoError>;

/// Error for clinic persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// Request rejected before reaching SQL.
    Validation(String),
    Db(DbError),
    NotFound(RecordRef),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(message) => write!(f, "invalid clinic record: {message}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(record) => write!(f, "record not found: {record}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "clinic repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::InvalidData(message) => write!(f, "invalid persisted clinic data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for clinic records.
pub trait ClinicRepository {
    fn create_patient(&self, patient: &NewPatient) -> RepoResult<RecordId>;
    fn get_patient(&self, id: RecordId) -> RepoResult<Option<Patient>>;
    fn update_patient_status(&self, id: RecordId, status: PatientStatus) -> RepoResult<()>;
    fn create_appointment(&self, appointment: &NewAppointment) -> RepoResult<RecordId>;
    fn create_treatment_record(&self, record: &NewTreatmentRecord) -> RepoResult<RecordId>;
    fn create_patient_transfer(&self, transfer: &NewPatientTransfer) -> RepoResult<RecordId>;
    fn create_insurance_claim(&self, claim: &NewInsuranceClaim) -> RepoResult<RecordId>;
    fn create_invoice(&self, invoice: &NewInvoice) -> RepoResult<RecordId>;
    fn add_invoice_item(&self, item: &NewInvoiceItem) -> RepoResult<RecordId>;
    fn record_payment(&self, payment: &NewPayment) -> RepoResult<RecordId>;
    /// Appointments of one patient ordered by start time, then id.
    fn list_appointments_for_patient(&self, patient: RecordId) -> RepoResult<Vec<Appointment>>;
}

/// SQLite-backed clinic repository.
pub struct SqliteClinicRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteClinicRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_clinic_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl ClinicRepository for SqliteClinicRepository<'_> {
    fn create_patient(&self, patient: &NewPatient) -> RepoResult<RecordId> {
        require_text("first_name", &patient.first_name)?;
        require_text("last_name", &patient.last_name)?;

        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO patients (
                id,
                first_name,
                last_name,
                date_of_birth,
                gender,
                email,
                phone,
                notes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                id.to_string(),
                patient.first_name.trim(),
                patient.last_name.trim(),
                patient.date_of_birth.as_deref(),
                patient.gender.map(gender_to_db),
                patient.email.as_deref(),
                patient.phone.as_deref(),
                patient.notes.as_deref(),
            ],
        )?;
        Ok(id)
    }

    fn get_patient(&self, id: RecordId) -> RepoResult<Option<Patient>> {
        let sql = format!("{PATIENT_SELECT_SQL} WHERE id = ?1;");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_patient_row(row)?)),
            None => Ok(None),
        }
    }

    fn update_patient_status(&self, id: RecordId, status: PatientStatus) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE patients
             SET
                status = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id.to_string(), patient_status_to_db(status)],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(RecordRef::new(PATIENTS, id)));
        }
        Ok(())
    }

    fn create_appointment(&self, appointment: &NewAppointment) -> RepoResult<RecordId> {
        if appointment.duration_minutes == 0 {
            return Err(RepoError::Validation(
                "duration_minutes must be at least 1".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO appointments (
                id,
                patient,
                start_time,
                duration_minutes,
                status,
                kind,
                room,
                notes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                id.to_string(),
                appointment.patient.to_string(),
                appointment.start_time,
                appointment.duration_minutes,
                appointment_status_to_db(appointment.status),
                appointment_kind_to_db(appointment.kind),
                appointment.room.as_deref(),
                appointment.notes.as_deref(),
            ],
        )?;
        Ok(id)
    }

    fn create_treatment_record(&self, record: &NewTreatmentRecord) -> RepoResult<RecordId> {
        require_text("procedure_name", &record.procedure_name)?;
        if let Some(tooth) = record.tooth_number {
            if !(1..=32).contains(&tooth) {
                return Err(RepoError::Validation(format!(
                    "tooth_number must be within 1..=32, got {tooth}"
                )));
            }
        }

        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO treatment_records (
                id,
                patient,
                procedure_name,
                tooth_number,
                notes,
                performed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                id.to_string(),
                record.patient.to_string(),
                record.procedure_name.trim(),
                record.tooth_number,
                record.notes.as_deref(),
                record.performed_at,
            ],
        )?;
        Ok(id)
    }

    fn create_patient_transfer(&self, transfer: &NewPatientTransfer) -> RepoResult<RecordId> {
        require_text("from_clinic", &transfer.from_clinic)?;
        require_text("to_clinic", &transfer.to_clinic)?;

        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO patient_transfers (
                id,
                patient,
                from_clinic,
                to_clinic,
                reason,
                transferred_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                id.to_string(),
                transfer.patient.to_string(),
                transfer.from_clinic.trim(),
                transfer.to_clinic.trim(),
                transfer.reason.as_deref(),
                transfer.transferred_at,
            ],
        )?;
        Ok(id)
    }

    fn create_insurance_claim(&self, claim: &NewInsuranceClaim) -> RepoResult<RecordId> {
        require_text("claim_number", &claim.claim_number)?;
        require_non_negative("claimed_amount_cents", claim.claimed_amount_cents)?;

        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO insurance_claims (
                id,
                patient,
                claim_number,
                claimed_amount_cents,
                status
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                id.to_string(),
                claim.patient.to_string(),
                claim.claim_number.trim(),
                claim.claimed_amount_cents,
                claim_status_to_db(claim.status),
            ],
        )?;
        Ok(id)
    }

    fn create_invoice(&self, invoice: &NewInvoice) -> RepoResult<RecordId> {
        require_text("invoice_number", &invoice.invoice_number)?;
        require_non_negative("total_cents", invoice.total_cents)?;

        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO invoices (
                id,
                patient,
                invoice_number,
                total_cents,
                status
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                id.to_string(),
                invoice.patient.to_string(),
                invoice.invoice_number.trim(),
                invoice.total_cents,
                invoice_status_to_db(invoice.status),
            ],
        )?;
        Ok(id)
    }

    fn add_invoice_item(&self, item: &NewInvoiceItem) -> RepoResult<RecordId> {
        require_text("description", &item.description)?;
        if item.quantity == 0 {
            return Err(RepoError::Validation(
                "quantity must be at least 1".to_string(),
            ));
        }
        require_non_negative("unit_price_cents", item.unit_price_cents)?;

        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO invoice_items (
                id,
                invoice,
                description,
                quantity,
                unit_price_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                id.to_string(),
                item.invoice.to_string(),
                item.description.trim(),
                item.quantity,
                item.unit_price_cents,
            ],
        )?;
        Ok(id)
    }

    fn record_payment(&self, payment: &NewPayment) -> RepoResult<RecordId> {
        if payment.amount_cents <= 0 {
            return Err(RepoError::Validation(format!(
                "amount_cents must be positive, got {}",
                payment.amount_cents
            )));
        }

        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO payments (
                id,
                patient,
                invoice,
                amount_cents,
                method
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                id.to_string(),
                payment.patient.to_string(),
                payment.invoice.to_string(),
                payment.amount_cents,
                payment_method_to_db(payment.method),
            ],
        )?;
        Ok(id)
    }

    fn list_appointments_for_patient(&self, patient: RecordId) -> RepoResult<Vec<Appointment>> {
        let sql = format!("{APPOINTMENT_SELECT_SQL} WHERE patient = ?1 ORDER BY start_time ASC, id ASC;");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([patient.to_string()])?;
        let mut appointments = Vec::new();
        while let Some(row) = rows.next()? {
            appointments.push(parse_appointment_row(row)?);
        }
        Ok(appointments)
    }
}

fn ensure_clinic_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in REQUIRED_TABLES {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table'
              AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn parse_patient_row(row: &Row<'_>) -> RepoResult<Patient> {
    let gender = match row.get::<_, Option<String>>("gender")? {
        Some(text) => Some(parse_gender(&text).ok_or_else(|| {
            RepoError::InvalidData(format!("invalid gender `{text}` in patients.gender"))
        })?),
        None => None,
    };
    let status_text: String = row.get("status")?;
    let status = parse_patient_status(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid status `{status_text}` in patients.status"))
    })?;

    Ok(Patient {
        id: parse_id(PATIENTS, &row.get::<_, String>("id")?)?,
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
        date_of_birth: row.get("date_of_birth")?,
        gender,
        email: row.get("email")?,
        phone: row.get("phone")?,
        status,
        notes: row.get("notes")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_appointment_row(row: &Row<'_>) -> RepoResult<Appointment> {
    let status_text: String = row.get("status")?;
    let status = parse_appointment_status(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid status `{status_text}` in appointments.status"
        ))
    })?;
    let kind_text: String = row.get("kind")?;
    let kind = parse_appointment_kind(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid kind `{kind_text}` in appointments.kind"))
    })?;
    let duration: i64 = row.get("duration_minutes")?;
    let duration_minutes = u32::try_from(duration).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid duration `{duration}` in appointments.duration_minutes"
        ))
    })?;

    Ok(Appointment {
        id: parse_id(APPOINTMENTS, &row.get::<_, String>("id")?)?,
        patient: parse_id(APPOINTMENTS, &row.get::<_, String>("patient")?)?,
        start_time: row.get("start_time")?,
        duration_minutes,
        status,
        kind,
        room: row.get("room")?,
        notes: row.get("notes")?,
    })
}

fn parse_id(table: &str, value: &str) -> RepoResult<RecordId> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {table}")))
}

fn require_text(field: &str, value: &str) -> RepoResult<()> {
    if value.trim().is_empty() {
        return Err(RepoError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn require_non_negative(field: &str, value: i64) -> RepoResult<()> {
    if value < 0 {
        return Err(RepoError::Validation(format!(
            "{field} cannot be negative, got {value}"
        )));
    }
    Ok(())
}

fn gender_to_db(gender: Gender) -> &'static str {
    match gender {
        Gender::Male => "male",
        Gender::Female => "female",
        Gender::Other => "other",
        Gender::PreferNotToSay => "prefer_not_to_say",
    }
}

fn parse_gender(value: &str) -> Option<Gender> {
    match value {
        "male" => Some(Gender::Male),
        "female" => Some(Gender::Female),
        "other" => Some(Gender::Other),
        "prefer_not_to_say" => Some(Gender::PreferNotToSay),
        _ => None,
    }
}

fn patient_status_to_db(status: PatientStatus) -> &'static str {
    match status {
        PatientStatus::Active => "active",
        PatientStatus::Inactive => "inactive",
        PatientStatus::Archived => "archived",
    }
}

fn parse_patient_status(value: &str) -> Option<PatientStatus> {
    match value {
        "active" => Some(PatientStatus::Active),
        "inactive" => Some(PatientStatus::Inactive),
        "archived" => Some(PatientStatus::Archived),
        _ => None,
    }
}

fn appointment_status_to_db(status: AppointmentStatus) -> &'static str {
    match status {
        AppointmentStatus::Scheduled => "scheduled",
        AppointmentStatus::Confirmed => "confirmed",
        AppointmentStatus::Completed => "completed",
        AppointmentStatus::Cancelled => "cancelled",
        AppointmentStatus::NoShow => "no_show",
    }
}

fn parse_appointment_status(value: &str) -> Option<AppointmentStatus> {
    match value {
        "scheduled" => Some(AppointmentStatus::Scheduled),
        "confirmed" => Some(AppointmentStatus::Confirmed),
        "completed" => Some(AppointmentStatus::Completed),
        "cancelled" => Some(AppointmentStatus::Cancelled),
        "no_show" => Some(AppointmentStatus::NoShow),
        _ => None,
    }
}

fn appointment_kind_to_db(kind: AppointmentKind) -> &'static str {
    match kind {
        AppointmentKind::Checkup => "checkup",
        AppointmentKind::Cleaning => "cleaning",
        AppointmentKind::Filling => "filling",
        AppointmentKind::Extraction => "extraction",
        AppointmentKind::RootCanal => "root_canal",
        AppointmentKind::Crown => "crown",
        AppointmentKind::Consultation => "consultation",
        AppointmentKind::Emergency => "emergency",
        AppointmentKind::Other => "other",
    }
}

fn parse_appointment_kind(value: &str) -> Option<AppointmentKind> {
    match value {
        "checkup" => Some(AppointmentKind::Checkup),
        "cleaning" => Some(AppointmentKind::Cleaning),
        "filling" => Some(AppointmentKind::Filling),
        "extraction" => Some(AppointmentKind::Extraction),
        "root_canal" => Some(AppointmentKind::RootCanal),
        "crown" => Some(AppointmentKind::Crown),
        "consultation" => Some(AppointmentKind::Consultation),
        "emergency" => Some(AppointmentKind::Emergency),
        "other" => Some(AppointmentKind::Other),
        _ => None,
    }
}

fn claim_status_to_db(status: ClaimStatus) -> &'static str {
    match status {
        ClaimStatus::Draft => "draft",
        ClaimStatus::Submitted => "submitted",
        ClaimStatus::Approved => "approved",
        ClaimStatus::Denied => "denied",
        ClaimStatus::Paid => "paid",
    }
}

fn invoice_status_to_db(status: InvoiceStatus) -> &'static str {
    match status {
        InvoiceStatus::Draft => "draft",
        InvoiceStatus::Issued => "issued",
        InvoiceStatus::Paid => "paid",
        InvoiceStatus::Void => "void",
    }
}

fn payment_method_to_db(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Cash => "cash",
        PaymentMethod::Card => "card",
        PaymentMethod::Insurance => "insurance",
        PaymentMethod::Transfer => "transfer",
    }
}
