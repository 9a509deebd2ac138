//! # warden-store
//!
//! Persistence for the warden decision engine: the SQLite case ledger and
//! the in-memory evidence similarity indexes.
//!
//! The ledger treats entity mutation and audit logging as one unit; every
//! write path commits both in a single transaction. The evidence indexes
//! are process-local and rebuilt from the ledger on startup by the runtime.

pub mod error;
pub mod evidence;
pub mod id;
pub mod ledger;

pub use error::StoreError;
pub use evidence::{Embedder, EvidenceFilter, EvidenceIndex, HashEmbedder};
pub use id::new_id;
pub use ledger::{DecisionRecord, Ledger, ReviewOutcome, Statistics};
