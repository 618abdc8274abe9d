use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{date_to_sql, is_unique_violation, parse_date, parse_timestamp, parse_uuid, timestamp_to_sql};
use crate::db::DatabaseError;
use crate::models::enums::LogKind;
use crate::models::{LogPayload, ProtocolLogEntry};

struct LogRow {
    id: String,
    protocol_id: String,
    patient_id: String,
    log_type: String,
    log_date: String,
    weight: Option<f64>,
    dose: Option<String>,
    step_number: Option<u8>,
    subject: Option<String>,
    reason: Option<String>,
    notes: Option<String>,
    created_at: String,
}

fn log_from_row(row: LogRow) -> Result<ProtocolLogEntry, DatabaseError> {
    let payload = match LogKind::from_str(&row.log_type)? {
        LogKind::Visit => LogPayload::Visit,
        LogKind::Injection => LogPayload::Injection {
            weight: row.weight,
            dose: row.dose,
        },
        LogKind::DripEmail => LogPayload::DripEmail {
            step_number: row
                .step_number
                .ok_or_else(|| DatabaseError::corrupt("protocol_logs.step_number", "NULL"))?,
            subject: row.subject.unwrap_or_default(),
        },
        LogKind::Missed => LogPayload::Missed { reason: row.reason },
        LogKind::Note => LogPayload::Note,
    };

    Ok(ProtocolLogEntry {
        id: parse_uuid("protocol_logs.id", &row.id)?,
        protocol_id: parse_uuid("protocol_logs.protocol_id", &row.protocol_id)?,
        patient_id: parse_uuid("protocol_logs.patient_id", &row.patient_id)?,
        log_date: parse_date("protocol_logs.log_date", &row.log_date)?,
        payload,
        note: row.notes,
        created_at: parse_timestamp("protocol_logs.created_at", &row.created_at)?,
    })
}

/// Append a log entry. A second `drip_email` row for the same
/// `(protocol_id, step_number)` fails with `DuplicateStep`.
pub fn insert_log(conn: &Connection, entry: &ProtocolLogEntry) -> Result<(), DatabaseError> {
    let (weight, dose, step_number, subject, reason) = match &entry.payload {
        LogPayload::Injection { weight, dose } => (*weight, dose.as_deref(), None, None, None),
        LogPayload::DripEmail { step_number, subject } => {
            (None, None, Some(*step_number), Some(subject.as_str()), None)
        }
        LogPayload::Missed { reason } => (None, None, None, None, reason.as_deref()),
        LogPayload::Visit | LogPayload::Note => (None, None, None, None, None),
    };

    let result = conn.execute(
        "INSERT INTO protocol_logs (id, protocol_id, patient_id, log_type, log_date, weight, dose,
         step_number, subject, reason, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            entry.id.to_string(),
            entry.protocol_id.to_string(),
            entry.patient_id.to_string(),
            entry.kind().as_str(),
            date_to_sql(entry.log_date),
            weight,
            dose,
            step_number,
            subject,
            reason,
            entry.note,
            timestamp_to_sql(entry.created_at),
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => match step_number {
            Some(step_number) => Err(DatabaseError::DuplicateStep {
                protocol_id: entry.protocol_id,
                step_number,
            }),
            None => Err(DatabaseError::ConstraintViolation(e.to_string())),
        },
        Err(e) => Err(e.into()),
    }
}

/// Logs for a protocol, oldest first, optionally restricted to one kind.
pub fn get_logs(
    conn: &Connection,
    protocol_id: &Uuid,
    kind: Option<LogKind>,
) -> Result<Vec<ProtocolLogEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, protocol_id, patient_id, log_type, log_date, weight, dose, step_number,
         subject, reason, notes, created_at
         FROM protocol_logs
         WHERE protocol_id = ?1 AND (?2 IS NULL OR log_type = ?2)
         ORDER BY log_date ASC, created_at ASC",
    )?;

    let rows = stmt.query_map(
        params![protocol_id.to_string(), kind.map(|k| k.as_str())],
        |row| {
            Ok(LogRow {
                id: row.get(0)?,
                protocol_id: row.get(1)?,
                patient_id: row.get(2)?,
                log_type: row.get(3)?,
                log_date: row.get(4)?,
                weight: row.get(5)?,
                dose: row.get(6)?,
                step_number: row.get(7)?,
                subject: row.get(8)?,
                reason: row.get(9)?,
                notes: row.get(10)?,
                created_at: row.get(11)?,
            })
        },
    )?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(log_from_row(row?)?);
    }
    Ok(entries)
}

pub fn count_logs(conn: &Connection, protocol_id: &Uuid, kind: LogKind) -> Result<u32, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM protocol_logs WHERE protocol_id = ?1 AND log_type = ?2",
        params![protocol_id.to_string(), kind.as_str()],
        |row| row.get::<_, u32>(0),
    )?;
    Ok(count)
}

/// Count across every protocol belonging to a patient.
pub fn count_patient_logs(conn: &Connection, patient_id: &Uuid, kind: LogKind) -> Result<u32, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM protocol_logs WHERE patient_id = ?1 AND log_type = ?2",
        params![patient_id.to_string(), kind.as_str()],
        |row| row.get::<_, u32>(0),
    )?;
    Ok(count)
}

/// Count with `from <= log_date <= to`.
pub fn count_logs_between(
    conn: &Connection,
    protocol_id: &Uuid,
    kind: LogKind,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<u32, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM protocol_logs
         WHERE protocol_id = ?1 AND log_type = ?2 AND log_date BETWEEN ?3 AND ?4",
        params![protocol_id.to_string(), kind.as_str(), date_to_sql(from), date_to_sql(to)],
        |row| row.get::<_, u32>(0),
    )?;
    Ok(count)
}

/// Most recent log date of a kind for a protocol.
pub fn latest_log_date(
    conn: &Connection,
    protocol_id: &Uuid,
    kind: LogKind,
) -> Result<Option<NaiveDate>, DatabaseError> {
    let raw: Option<String> = conn.query_row(
        "SELECT MAX(log_date) FROM protocol_logs WHERE protocol_id = ?1 AND log_type = ?2",
        params![protocol_id.to_string(), kind.as_str()],
        |row| row.get(0),
    )?;
    raw.map(|s| parse_date("protocol_logs.log_date", &s)).transpose()
}
