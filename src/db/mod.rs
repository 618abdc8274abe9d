pub mod repository;
pub mod sqlite;
pub mod store;
pub mod traits;

#[cfg(test)]
pub(crate) mod fixtures;

pub use repository::*;
pub use sqlite::*;
pub use store::SqliteStore;
pub use traits::{EligibilityQuery, LogStore, ProtocolStore};

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Drip step {step_number} already recorded for protocol {protocol_id}")]
    DuplicateStep { protocol_id: Uuid, step_number: u8 },

    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("Corrupt value in {field}: {value}")]
    Corrupt { field: String, value: String },

    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl DatabaseError {
    pub(crate) fn not_found(entity_type: &str, id: &Uuid) -> Self {
        Self::NotFound {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
        }
    }

    pub(crate) fn corrupt(field: &str, value: impl Into<String>) -> Self {
        Self::Corrupt {
            field: field.to_string(),
            value: value.into(),
        }
    }
}
