use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::Patient;

pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, name, first_name, email) VALUES (?1, ?2, ?3, ?4)",
        params![
            patient.id.to_string(),
            patient.name,
            patient.first_name,
            patient.email,
        ],
    )?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, name, first_name, email FROM patients WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            },
        )
        .optional()?;

    row.map(|(id, name, first_name, email)| {
        Ok(Patient {
            id: parse_uuid("patients.id", &id)?,
            name,
            first_name,
            email,
        })
    })
    .transpose()
}
