//! Domain types shared across the engine.
//!
//! These mirror the persisted data model: cases, appeals, audit events,
//! per-user violation history, review queue items, and metric snapshots.
//! All enums serialize as lowercase snake_case strings, which is also how
//! the ledger stores them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when parsing an enum from its text form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind}: '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Implements `as_str`, `Display`, `FromStr`, and serde for a text-backed enum.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

text_enum!(ContentType, "content type", {
    Profile => "profile",
    Message => "message",
    Photo => "photo",
    Bio => "bio",
});

text_enum!(Decision, "decision", {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
    Escalated => "escalated",
});

text_enum!(ViolationType, "violation type", {
    Harassment => "harassment",
    Scams => "scams",
    FakeProfile => "fake_profile",
    Inappropriate => "inappropriate",
    AgeVerification => "age_verification",
});

text_enum!(Severity, "severity", {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

text_enum!(PolicyAction, "policy action", {
    Warning => "warning",
    TemporaryBan => "temporary_ban",
    PermanentBan => "permanent_ban",
    FlagForReview => "flag_for_review",
});

text_enum!(QueuePriority, "queue priority", {
    Low => "low",
    Medium => "medium",
    High => "high",
    Urgent => "urgent",
});

text_enum!(QueueStatus, "queue status", {
    Pending => "pending",
    InReview => "in_review",
    Completed => "completed",
});

text_enum!(AppealDecision, "appeal decision", {
    Pending => "pending",
    Upheld => "upheld",
    Overturned => "overturned",
    Escalated => "escalated",
});

/// One unit of adjudicated content.
///
/// `content`, `user_id`, and `created_at` are immutable after creation;
/// the decision fields may be rewritten by the workflow, a moderator, or an
/// appeal resolution, each time paired with an audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub id: String,
    pub content_type: ContentType,
    pub content: String,
    pub user_id: String,
    pub risk_score: Option<f64>,
    pub decision: Decision,
    pub reasoning: String,
    pub confidence: Option<f64>,
    pub violation_type: Option<ViolationType>,
    pub severity: Option<Severity>,
    pub reviewed_by: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A contest of exactly one case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appeal {
    pub id: String,
    pub case_id: String,
    pub user_explanation: String,
    pub new_evidence: Option<String>,
    pub appeal_decision: AppealDecision,
    pub appeal_reasoning: Option<String>,
    pub appeal_confidence: Option<f64>,
    pub resolved_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Immutable audit fact. Write-once; the append-only stream is the source
/// of truth for ordering when reconciling concurrent actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub case_id: Option<String>,
    pub appeal_id: Option<String>,
    pub action: String,
    pub actor: String,
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// Denormalized per-user history row, inserted when a decision implies a
/// confirmed violation. Insert-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserViolation {
    pub id: String,
    pub user_id: String,
    pub case_id: String,
    pub violation_type: ViolationType,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
}

/// An item awaiting human review. Exactly one of `case_id` / `appeal_id`
/// is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewQueueItem {
    pub id: String,
    pub case_id: Option<String>,
    pub appeal_id: Option<String>,
    pub priority: QueuePriority,
    pub assigned_to: Option<String>,
    pub status: QueueStatus,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Write-only derived metric fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub id: String,
    pub metric_name: String,
    pub metric_value: f64,
    pub metric_metadata: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate of a user's prior adjudications, used for history weighting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserHistory {
    pub user_id: String,
    pub total_cases: u32,
    /// Count of confirmed violations (rejected cases / upheld escalations).
    pub confirmed_violations: u32,
    /// Most recent cases, newest first (bounded).
    pub recent_cases: Vec<Case>,
}

/// Structured result of the classification step.
///
/// This is the full contract with the external reasoning capability: the
/// gateway guarantees `confidence` is in [0,1] and that an undecidable reply
/// was replaced by [`ClassificationResult::fail_safe`], which the policy
/// bands route to escalation rather than any automatic action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub violated: bool,
    pub violation_type: Option<ViolationType>,
    pub severity: Option<Severity>,
    pub confidence: f64,
    pub reasoning: String,
}

impl ClassificationResult {
    /// The lowest-trust outcome for machine output that could not be parsed.
    ///
    /// Deliberately not a clean approval: confidence 0.5 sits below every
    /// auto-approve threshold, so downstream routing escalates to a human.
    pub fn fail_safe(detail: impl Into<String>) -> Self {
        Self {
            violated: false,
            violation_type: None,
            severity: Some(Severity::Medium),
            confidence: 0.5,
            reasoning: format!(
                "Classifier reply could not be parsed; escalating for human review. {}",
                detail.into()
            ),
        }
    }
}

/// Per-factor scores for an appeal evaluation, each in [0,1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppealScores {
    pub new_evidence: f64,
    pub policy_misinterpretation: f64,
    pub user_explanation: f64,
    pub user_history: f64,
    pub reasoning: String,
}

impl AppealScores {
    /// Fail-safe scores for an unparseable evaluator reply: every factor at
    /// 0.5 lands the weighted total in the escalation band.
    pub fn fail_safe(detail: impl Into<String>) -> Self {
        Self {
            new_evidence: 0.5,
            policy_misinterpretation: 0.5,
            user_explanation: 0.5,
            user_history: 0.5,
            reasoning: format!(
                "Appeal evaluation reply could not be parsed; escalating for human review. {}",
                detail.into()
            ),
        }
    }
}

/// A neighbor returned from an evidence index search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceMatch {
    pub id: String,
    pub case_id: String,
    pub text: String,
    /// Similarity in (0,1], higher is closer.
    pub similarity: f64,
    pub decision: Option<Decision>,
    pub violation_type: Option<ViolationType>,
    pub severity: Option<Severity>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_round_trip() {
        for v in [
            ViolationType::Harassment,
            ViolationType::Scams,
            ViolationType::FakeProfile,
            ViolationType::Inappropriate,
            ViolationType::AgeVerification,
        ] {
            assert_eq!(v.as_str().parse::<ViolationType>().unwrap(), v);
        }
        assert_eq!("FAKE_PROFILE".parse::<ViolationType>().unwrap(), ViolationType::FakeProfile);
    }

    #[test]
    fn test_unknown_enum_value() {
        let err = "gibberish".parse::<Decision>().unwrap_err();
        assert_eq!(err.kind, "decision");
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&ViolationType::FakeProfile).unwrap();
        assert_eq!(json, "\"fake_profile\"");
        let json = serde_json::to_string(&QueueStatus::InReview).unwrap();
        assert_eq!(json, "\"in_review\"");
    }

    #[test]
    fn test_fail_safe_is_escalation_biased() {
        let result = ClassificationResult::fail_safe("empty reply");
        assert!(!result.violated);
        assert!(result.violation_type.is_none());
        assert_eq!(result.confidence, 0.5);
        assert!(result.reasoning.contains("could not be parsed"));
    }
}
