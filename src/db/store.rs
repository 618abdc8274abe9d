//! SQLite-backed implementation of the storage collaborators.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::repository;
use super::sqlite::{open_database, open_memory_database};
use super::traits::{EligibilityQuery, LogStore, ProtocolStore};
use super::DatabaseError;
use crate::models::enums::LogKind;
use crate::models::{
    DripCandidate, Patient, Protocol, ProtocolLogEntry, ProtocolUpdate, DRIP_SEQUENCE_LEN,
};

/// One serialized connection shared by the API and the background tick.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(open_database(path)?))
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(open_memory_database()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }

    /// Raw connection access for tests that need to plant rows the typed
    /// API refuses to write.
    #[cfg(test)]
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> T) -> T {
        let conn = self.conn.lock().unwrap();
        f(&conn)
    }

    pub fn insert_patient(&self, patient: &Patient) -> Result<(), DatabaseError> {
        let conn = self.conn()?;
        repository::insert_patient(&conn, patient)
    }

    pub fn insert_protocol(&self, protocol: &Protocol) -> Result<(), DatabaseError> {
        let conn = self.conn()?;
        repository::insert_protocol(&conn, protocol)
    }

    /// Liveness probe for the health endpoint.
    pub fn ping(&self) -> Result<(), DatabaseError> {
        self.conn()?.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}

impl LogStore for SqliteStore {
    fn append_log(&self, entry: &ProtocolLogEntry) -> Result<(), DatabaseError> {
        let conn = self.conn()?;
        repository::insert_log(&conn, entry)
    }

    fn query_logs(
        &self,
        protocol_id: &Uuid,
        kind: Option<LogKind>,
    ) -> Result<Vec<ProtocolLogEntry>, DatabaseError> {
        let conn = self.conn()?;
        repository::get_logs(&conn, protocol_id, kind)
    }

    fn count_logs(&self, protocol_id: &Uuid, kind: LogKind) -> Result<u32, DatabaseError> {
        let conn = self.conn()?;
        repository::count_logs(&conn, protocol_id, kind)
    }

    fn count_patient_logs(&self, patient_id: &Uuid, kind: LogKind) -> Result<u32, DatabaseError> {
        let conn = self.conn()?;
        repository::count_patient_logs(&conn, patient_id, kind)
    }

    fn count_logs_between(
        &self,
        protocol_id: &Uuid,
        kind: LogKind,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<u32, DatabaseError> {
        let conn = self.conn()?;
        repository::count_logs_between(&conn, protocol_id, kind, from, to)
    }

    fn latest_log_date(&self, protocol_id: &Uuid, kind: LogKind) -> Result<Option<NaiveDate>, DatabaseError> {
        let conn = self.conn()?;
        repository::latest_log_date(&conn, protocol_id, kind)
    }
}

impl ProtocolStore for SqliteStore {
    fn get_protocol(&self, id: &Uuid) -> Result<Protocol, DatabaseError> {
        let conn = self.conn()?;
        repository::get_protocol(&conn, id)?
            .ok_or_else(|| DatabaseError::not_found("protocol", id))
    }

    fn get_patient(&self, id: &Uuid) -> Result<Patient, DatabaseError> {
        let conn = self.conn()?;
        repository::get_patient(&conn, id)?
            .ok_or_else(|| DatabaseError::not_found("patient", id))
    }

    fn update_protocol(&self, id: &Uuid, update: &ProtocolUpdate) -> Result<Protocol, DatabaseError> {
        let conn = self.conn()?;
        if repository::update_protocol(&conn, id, update)? == 0 {
            return Err(DatabaseError::not_found("protocol", id));
        }
        repository::get_protocol(&conn, id)?.ok_or_else(|| DatabaseError::not_found("protocol", id))
    }

    fn log_and_update(
        &self,
        entry: &ProtocolLogEntry,
        update: &ProtocolUpdate,
    ) -> Result<Protocol, DatabaseError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        repository::insert_log(&tx, entry)?;
        if !update.is_empty() && repository::update_protocol(&tx, &entry.protocol_id, update)? == 0 {
            return Err(DatabaseError::not_found("protocol", &entry.protocol_id));
        }
        let protocol = repository::get_protocol(&tx, &entry.protocol_id)?
            .ok_or_else(|| DatabaseError::not_found("protocol", &entry.protocol_id))?;
        tx.commit()?;
        Ok(protocol)
    }
}

impl EligibilityQuery for SqliteStore {
    fn drip_candidates(&self, created_since: DateTime<Utc>) -> Result<Vec<DripCandidate>, DatabaseError> {
        let conn = self.conn()?;
        repository::get_drip_candidates(&conn, created_since, DRIP_SEQUENCE_LEN)
    }
}
