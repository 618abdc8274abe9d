use thiserror::Error;

use super::sender::SendError;
use super::types::StartRejection;
use crate::db::DatabaseError;

/// Retryable failures of the sequencer's collaborators.
#[derive(Error, Debug)]
pub enum DripError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] SendError),

    #[error("Dispatch timed out after {0}ms")]
    DispatchTimeout(u128),
}

/// Outcome of a manual start that did not send.
#[derive(Error, Debug)]
pub enum StartError {
    #[error("Sequence start rejected: {}", .0.as_str())]
    Rejected(StartRejection),

    #[error(transparent)]
    Drip(#[from] DripError),
}

impl From<DatabaseError> for StartError {
    fn from(e: DatabaseError) -> Self {
        Self::Drip(DripError::Database(e))
    }
}
