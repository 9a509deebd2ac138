//! Workflow state machines: moderation and appeals.
//!
//! Each workflow is a linear pipeline of steps over the engine's
//! collaborators. Steps that talk to the outside world (classifier,
//! notifier, action executor) are absorbing: their failures downgrade the
//! outcome (escalation, skipped side effect) instead of failing the run.

pub mod appeals;
pub mod moderation;

pub use appeals::{AppealOutcome, AppealRequest};
pub use moderation::{ModerationOutcome, ModerationRequest};

/// Longest content accepted for moderation, in characters.
pub const MAX_CONTENT_CHARS: usize = 10_000;
