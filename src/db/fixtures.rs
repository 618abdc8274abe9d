//! Shared builders for store-backed tests.

use chrono::{DateTime, NaiveDate, TimeZone, Utc, Weekday};
use uuid::Uuid;

use super::SqliteStore;
use crate::models::enums::*;
use crate::models::{Frequency, LogPayload, Patient, Protocol, ProtocolLogEntry};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// 18:00 UTC on the given day (late morning in Los Angeles).
pub fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 18, 0, 0).unwrap()
}

pub fn seed_patient(store: &SqliteStore, email: Option<&str>) -> Patient {
    let patient = Patient {
        id: Uuid::new_v4(),
        name: "Dana Whitfield".into(),
        first_name: Some("Dana".into()),
        email: email.map(Into::into),
    };
    store.insert_patient(&patient).unwrap();
    patient
}

pub fn weight_loss_protocol(patient: &Patient, created_at: DateTime<Utc>) -> Protocol {
    Protocol {
        id: Uuid::new_v4(),
        patient_id: patient.id,
        category: ProgramCategory::WeightLoss,
        medication: "Semaglutide".into(),
        selected_dose: Some("0.25mg".into()),
        frequency: Frequency::Weekly,
        delivery: DeliveryMethod::TakeHome,
        start_date: Some(created_at.date_naive()),
        end_date: None,
        total_sessions: Some(4),
        sessions_used: 0,
        scheduled_days: Vec::new(),
        status: ProtocolStatus::Active,
        last_visit_date: None,
        next_expected_date: None,
        drip_start_date: None,
        created_at,
    }
}

pub fn in_clinic_protocol(patient: &Patient, frequency: Frequency, days: &[Weekday]) -> Protocol {
    Protocol {
        category: ProgramCategory::Injection,
        medication: "NAD+".into(),
        frequency,
        delivery: DeliveryMethod::InClinic,
        total_sessions: Some(8),
        scheduled_days: days.to_vec(),
        ..weight_loss_protocol(patient, ts(2026, 3, 1))
    }
}

pub fn drip_log(protocol: &Protocol, step_number: u8, log_date: NaiveDate) -> ProtocolLogEntry {
    ProtocolLogEntry::new(
        protocol.id,
        protocol.patient_id,
        log_date,
        LogPayload::DripEmail {
            step_number,
            subject: format!("step {step_number}"),
        },
    )
}
