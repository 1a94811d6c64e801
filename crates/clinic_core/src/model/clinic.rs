//! Clinic records: patients and the collections that reference them.
//!
//! # Responsibility
//! - Name the clinic collections and their foreign-key fields.
//! - Define write requests (`New*`) and read models for clinic records.
//!
//! # Invariants
//! - Enum values serialize as snake_case, matching the persisted text.
//! - Monetary amounts are integer cents.

use crate::model::record::RecordId;
use serde::{Deserialize, Serialize};

/// Collection names in the clinic schema.
pub mod collections {
    pub const PATIENTS: &str = "patients";
    pub const APPOINTMENTS: &str = "appointments";
    pub const PATIENT_TRANSFERS: &str = "patient_transfers";
    pub const TREATMENT_RECORDS: &str = "treatment_records";
    pub const INSURANCE_CLAIMS: &str = "insurance_claims";
    pub const INVOICES: &str = "invoices";
    pub const INVOICE_ITEMS: &str = "invoice_items";
    pub const PAYMENTS: &str = "payments";
    pub const PATIENT_INSURANCE: &str = "patient_insurance";
    pub const TREATMENTS: &str = "treatments";
    pub const TREATMENT_PLANS: &str = "treatment_plans";
    pub const TREATMENT_PLAN_ITEMS: &str = "treatment_plan_items";
    pub const PRESCRIPTIONS: &str = "prescriptions";
    pub const DENTAL_CHART: &str = "dental_chart";

    /// Foreign-key field pointing at `patients.id`.
    pub const PATIENT_FIELD: &str = "patient";
    /// Foreign-key field pointing at `invoices.id`.
    pub const INVOICE_FIELD: &str = "invoice";
    /// Foreign-key field pointing at `treatment_plans.id`.
    pub const TREATMENT_PLAN_FIELD: &str = "treatment_plan";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
    PreferNotToSay,
}

/// Patient lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientStatus {
    #[default]
    Active,
    Inactive,
    Archived,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentKind {
    Checkup,
    Cleaning,
    Filling,
    Extraction,
    RootCanal,
    Crown,
    Consultation,
    Emergency,
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    #[default]
    Draft,
    Submitted,
    Approved,
    Denied,
    Paid,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Issued,
    Paid,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Insurance,
    Transfer,
}

/// Patient read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: RecordId,
    pub first_name: String,
    pub last_name: String,
    /// ISO-8601 date (`YYYY-MM-DD`).
    pub date_of_birth: Option<String>,
    pub gender: Option<Gender>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: PatientStatus,
    pub notes: Option<String>,
    /// Epoch ms.
    pub created_at: i64,
    /// Epoch ms.
    pub updated_at: i64,
}

/// Request to register a patient.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPatient {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<String>,
    pub gender: Option<Gender>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

impl NewPatient {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            ..Self::default()
        }
    }
}

/// Appointment read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: RecordId,
    pub patient: RecordId,
    /// Epoch ms.
    pub start_time: i64,
    pub duration_minutes: u32,
    pub status: AppointmentStatus,
    #[serde(rename = "type")]
    pub kind: AppointmentKind,
    pub room: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAppointment {
    pub patient: RecordId,
    pub start_time: i64,
    pub duration_minutes: u32,
    pub status: AppointmentStatus,
    pub kind: AppointmentKind,
    pub room: Option<String>,
    pub notes: Option<String>,
}

impl NewAppointment {
    /// Scheduled appointment without room or notes.
    pub fn scheduled(
        patient: RecordId,
        start_time: i64,
        duration_minutes: u32,
        kind: AppointmentKind,
    ) -> Self {
        Self {
            patient,
            start_time,
            duration_minutes,
            status: AppointmentStatus::Scheduled,
            kind,
            room: None,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTreatmentRecord {
    pub patient: RecordId,
    pub procedure_name: String,
    /// Universal numbering, 1..=32.
    pub tooth_number: Option<u8>,
    pub notes: Option<String>,
    pub performed_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPatientTransfer {
    pub patient: RecordId,
    pub from_clinic: String,
    pub to_clinic: String,
    pub reason: Option<String>,
    pub transferred_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInsuranceClaim {
    pub patient: RecordId,
    pub claim_number: String,
    pub claimed_amount_cents: i64,
    pub status: ClaimStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvoice {
    pub patient: RecordId,
    pub invoice_number: String,
    pub total_cents: i64,
    pub status: InvoiceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvoiceItem {
    pub invoice: RecordId,
    pub description: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub patient: RecordId,
    pub invoice: RecordId,
    pub amount_cents: i64,
    pub method: PaymentMethod,
}
