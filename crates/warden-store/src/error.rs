//! Store error taxonomy.

use thiserror::Error;

/// Errors surfaced by the ledger.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Queue item {id} already claimed by {assigned_to}")]
    AlreadyClaimed { id: String, assigned_to: String },

    #[error("{entity} {id} is in state '{state}'")]
    InvalidState {
        entity: &'static str,
        id: String,
        state: String,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}
