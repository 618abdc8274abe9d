use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{
    date_to_sql, is_check_violation, parse_opt_date, parse_timestamp, parse_uuid, timestamp_to_sql,
};
use crate::clock::{parse_weekday, weekday_name};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::{DripCandidate, Frequency, Patient, Protocol, ProtocolUpdate};

const PROTOCOL_COLUMNS: &str = "p.id, p.patient_id, p.category, p.medication, p.selected_dose,
     p.frequency, p.delivery_method, p.start_date, p.end_date, p.total_sessions, p.sessions_used,
     p.scheduled_days, p.status, p.last_visit_date, p.next_expected_date, p.drip_start_date,
     p.created_at";

/// Raw column values, converted to a `Protocol` outside the rusqlite closure
/// so that parse failures surface as `DatabaseError`.
struct ProtocolRow {
    id: String,
    patient_id: String,
    category: String,
    medication: String,
    selected_dose: Option<String>,
    frequency: String,
    delivery_method: String,
    start_date: Option<String>,
    end_date: Option<String>,
    total_sessions: Option<u32>,
    sessions_used: u32,
    scheduled_days: String,
    status: String,
    last_visit_date: Option<String>,
    next_expected_date: Option<String>,
    drip_start_date: Option<String>,
    created_at: String,
}

fn read_protocol_row(row: &Row<'_>) -> rusqlite::Result<ProtocolRow> {
    Ok(ProtocolRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        category: row.get(2)?,
        medication: row.get(3)?,
        selected_dose: row.get(4)?,
        frequency: row.get(5)?,
        delivery_method: row.get(6)?,
        start_date: row.get(7)?,
        end_date: row.get(8)?,
        total_sessions: row.get(9)?,
        sessions_used: row.get(10)?,
        scheduled_days: row.get(11)?,
        status: row.get(12)?,
        last_visit_date: row.get(13)?,
        next_expected_date: row.get(14)?,
        drip_start_date: row.get(15)?,
        created_at: row.get(16)?,
    })
}

fn protocol_from_row(row: ProtocolRow) -> Result<Protocol, DatabaseError> {
    let scheduled_days = serde_json::from_str::<Vec<String>>(&row.scheduled_days)
        .ok()
        .and_then(|names| names.iter().map(|n| parse_weekday(n)).collect::<Option<Vec<_>>>())
        .ok_or_else(|| DatabaseError::corrupt("protocols.scheduled_days", row.scheduled_days.clone()))?;

    Ok(Protocol {
        id: parse_uuid("protocols.id", &row.id)?,
        patient_id: parse_uuid("protocols.patient_id", &row.patient_id)?,
        category: ProgramCategory::from_str(&row.category)?,
        medication: row.medication,
        selected_dose: row.selected_dose,
        frequency: Frequency::parse(&row.frequency),
        delivery: DeliveryMethod::from_str(&row.delivery_method)?,
        start_date: parse_opt_date("protocols.start_date", row.start_date)?,
        end_date: parse_opt_date("protocols.end_date", row.end_date)?,
        total_sessions: row.total_sessions,
        sessions_used: row.sessions_used,
        scheduled_days,
        status: ProtocolStatus::from_str(&row.status)?,
        last_visit_date: parse_opt_date("protocols.last_visit_date", row.last_visit_date)?,
        next_expected_date: parse_opt_date("protocols.next_expected_date", row.next_expected_date)?,
        drip_start_date: parse_opt_date("protocols.drip_start_date", row.drip_start_date)?,
        created_at: parse_timestamp("protocols.created_at", &row.created_at)?,
    })
}

fn scheduled_days_json(protocol: &Protocol) -> Result<String, DatabaseError> {
    let names: Vec<&str> = protocol.scheduled_days.iter().map(|d| weekday_name(*d)).collect();
    serde_json::to_string(&names).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

pub fn insert_protocol(conn: &Connection, protocol: &Protocol) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO protocols (id, patient_id, category, medication, selected_dose, frequency,
         delivery_method, start_date, end_date, total_sessions, sessions_used, scheduled_days,
         status, last_visit_date, next_expected_date, drip_start_date, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            protocol.id.to_string(),
            protocol.patient_id.to_string(),
            protocol.category.as_str(),
            protocol.medication,
            protocol.selected_dose,
            protocol.frequency.as_str(),
            protocol.delivery.as_str(),
            protocol.start_date.map(date_to_sql),
            protocol.end_date.map(date_to_sql),
            protocol.total_sessions,
            protocol.sessions_used,
            scheduled_days_json(protocol)?,
            protocol.status.as_str(),
            protocol.last_visit_date.map(date_to_sql),
            protocol.next_expected_date.map(date_to_sql),
            protocol.drip_start_date.map(date_to_sql),
            timestamp_to_sql(protocol.created_at),
        ],
    )
    .map_err(map_check_violation)?;
    Ok(())
}

pub fn get_protocol(conn: &Connection, id: &Uuid) -> Result<Option<Protocol>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {PROTOCOL_COLUMNS} FROM protocols p WHERE p.id = ?1"),
            params![id.to_string()],
            read_protocol_row,
        )
        .optional()?;
    row.map(protocol_from_row).transpose()
}

/// Apply the non-empty fields of `update`. `drip_start_date` is only written
/// while the stored value is NULL. Returns the number of rows touched.
pub fn update_protocol(
    conn: &Connection,
    id: &Uuid,
    update: &ProtocolUpdate,
) -> Result<usize, DatabaseError> {
    let changed = conn
        .execute(
            "UPDATE protocols SET
                status = COALESCE(?2, status),
                end_date = COALESCE(?3, end_date),
                total_sessions = COALESCE(?4, total_sessions),
                sessions_used = COALESCE(?5, sessions_used),
                last_visit_date = COALESCE(?6, last_visit_date),
                next_expected_date = COALESCE(?7, next_expected_date),
                drip_start_date = COALESCE(drip_start_date, ?8)
             WHERE id = ?1",
            params![
                id.to_string(),
                update.status.map(|s| s.as_str()),
                update.end_date.map(date_to_sql),
                update.total_sessions,
                update.sessions_used,
                update.last_visit_date.map(date_to_sql),
                update.next_expected_date.map(date_to_sql),
                update.drip_start_date.map(date_to_sql),
            ],
        )
        .map_err(map_check_violation)?;
    Ok(changed)
}

/// Active weight-loss protocols with a patient email that were created at or
/// after `created_since`, or whose drip sequence is started but unfinished.
pub fn get_drip_candidates(
    conn: &Connection,
    created_since: DateTime<Utc>,
    sequence_len: u8,
) -> Result<Vec<DripCandidate>, DatabaseError> {
    let sql = format!(
        "WITH sent AS (
             SELECT protocol_id, COUNT(*) AS n FROM protocol_logs
             WHERE log_type = 'drip_email' GROUP BY protocol_id
         )
         SELECT {PROTOCOL_COLUMNS}, pt.id, pt.name, pt.first_name, pt.email
         FROM protocols p
         JOIN patients pt ON pt.id = p.patient_id
         LEFT JOIN sent s ON s.protocol_id = p.id
         WHERE p.category = 'weight_loss'
           AND p.status = 'active'
           AND pt.email IS NOT NULL AND TRIM(pt.email) <> ''
           AND (p.created_at >= ?1 OR (COALESCE(s.n, 0) > 0 AND COALESCE(s.n, 0) < ?2))
         ORDER BY p.created_at ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![timestamp_to_sql(created_since), sequence_len], |row| {
        let protocol = read_protocol_row(row)?;
        let patient = (
            row.get::<_, String>(17)?,
            row.get::<_, String>(18)?,
            row.get::<_, Option<String>>(19)?,
            row.get::<_, Option<String>>(20)?,
        );
        Ok((protocol, patient))
    })?;

    let mut candidates = Vec::new();
    for row in rows {
        let (protocol_row, (patient_id, name, first_name, email)) = row?;
        let protocol_id = protocol_row.id.clone();
        let candidate = protocol_from_row(protocol_row).and_then(|protocol| {
            Ok(DripCandidate {
                protocol,
                patient: Patient {
                    id: parse_uuid("patients.id", &patient_id)?,
                    name,
                    first_name,
                    email,
                },
            })
        });
        // One unreadable row must not hold back every other protocol.
        match candidate {
            Ok(candidate) => candidates.push(candidate),
            Err(e) => tracing::error!(
                protocol_id = %protocol_id,
                error = %e,
                "Skipping unreadable drip candidate"
            ),
        }
    }
    Ok(candidates)
}

fn map_check_violation(err: rusqlite::Error) -> DatabaseError {
    if is_check_violation(&err) {
        DatabaseError::ConstraintViolation(err.to_string())
    } else {
        DatabaseError::Sqlite(err)
    }
}
