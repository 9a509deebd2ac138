//! Engine error taxonomy.
//!
//! Classification trouble is never an error at this level: for
//! syntactically valid input the workflows always return a decision, at
//! worst an escalation. These variants cover what callers can actually act
//! on.

use thiserror::Error;
use warden_store::StoreError;

#[derive(Error, Debug)]
pub enum WardenError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} {id} is in state '{state}'")]
    InvalidState {
        entity: &'static str,
        id: String,
        state: String,
    },

    #[error("Queue item {id} already claimed by {assigned_to}")]
    AlreadyClaimed { id: String, assigned_to: String },

    #[error("Persistence failure: {0}")]
    Persistence(StoreError),

    #[error("Policy error: {0}")]
    Policy(#[from] warden_core::PolicyError),
}

impl From<StoreError> for WardenError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::AlreadyClaimed { id, assigned_to } => {
                Self::AlreadyClaimed { id, assigned_to }
            }
            StoreError::InvalidState { entity, id, state } => {
                Self::InvalidState { entity, id, state }
            }
            StoreError::Validation(msg) => Self::Validation(msg),
            other => Self::Persistence(other),
        }
    }
}
