//! # warden-core
//!
//! Deterministic moderation decision logic.
//!
//! This crate answers, without performing any I/O:
//! - Given a classification, what happens to the content?
//! - Given four appeal factor scores, does the original decision stand?
//! - What does an unusable machine reply degrade to?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same classification + history + policy always
//!    produces the same verdict
//! 2. **No LLM calls**: The external reasoning capability lives behind a
//!    gateway in the runtime crate; everything here is rule-based
//! 3. **Escalate-biased**: Unparseable replies never become automatic
//!    approvals or rejections
//! 4. **Policy-driven**: All thresholds, weights, and action mappings come
//!    from a validated [`PolicyConfig`], never from code constants scattered
//!    through the workflows
//!
//! ## Example
//!
//! ```rust,ignore
//! use warden_core::{decide, parse_classification, PolicyConfig, UserHistory};
//!
//! let policy = PolicyConfig::from_yaml_file("policy.yaml")?;
//! let classification = parse_classification(&reply_text);
//! let verdict = decide(&policy, &classification, &UserHistory::default());
//! ```

pub mod policy;
pub mod reply;
pub mod types;

// Re-export main types at crate root
pub use policy::{
    decide, decide_appeal, queue_priority, risk_score, weighted_appeal_score, AppealThresholds,
    AppealWeights, ConfidenceThresholds, DecisionRule, PolicyConfig, PolicyError, SeverityWeights,
    Verdict,
};
pub use reply::{parse_appeal_scores, parse_classification};
pub use types::{
    Appeal, AppealDecision, AppealScores, AuditEvent, Case, ClassificationResult, ContentType,
    Decision, EvidenceMatch, MetricSnapshot, ParseEnumError, PolicyAction, QueuePriority,
    QueueStatus, ReviewQueueItem, Severity, UserHistory, UserViolation, ViolationType,
};
