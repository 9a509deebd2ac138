//! Declarative moderation policy: thresholds, severity weights, and the
//! category x severity action table.
//!
//! Policy is configuration data, loaded from YAML and validated before use.
//! The resolver in [`resolver`] is a pure function of this config; swapping
//! policy never touches the workflow state machines.

mod resolver;

pub use resolver::{decide, decide_appeal, queue_priority, risk_score, weighted_appeal_score, DecisionRule, Verdict};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::types::{PolicyAction, Severity, ViolationType};

/// Errors that can occur when loading or validating policy config.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Failed to read policy file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Policy validation failed: {0}")]
    ValidationError(String),
}

/// Confidence thresholds driving automatic routing. All comparisons are
/// inclusive (>=) at the stated bound.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    /// Clean content at or above this confidence is approved.
    pub auto_approve: f64,
    /// A detected violation at or above this confidence is rejected.
    pub auto_reject: f64,
    /// Lower bound of the band; a violation below auto_reject escalates
    /// whether it clears this bound or not.
    pub escalate: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            auto_approve: 0.85,
            auto_reject: 0.90,
            escalate: 0.70,
        }
    }
}

/// Multipliers applied to confidence when deriving the risk score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SeverityWeights {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            low: 0.3,
            medium: 0.6,
            high: 0.8,
            critical: 1.0,
        }
    }
}

impl SeverityWeights {
    pub fn weight(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Low => self.low,
            Severity::Medium => self.medium,
            Severity::High => self.high,
            Severity::Critical => self.critical,
        }
    }
}

/// Thresholds for the appeal decision.
///
/// Overturn is strict: a weighted score exactly at `overturn` resolves to
/// escalation, never to overturn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AppealThresholds {
    pub overturn: f64,
    pub uphold_below: f64,
}

impl Default for AppealThresholds {
    fn default() -> Self {
        Self {
            overturn: 0.70,
            uphold_below: 0.40,
        }
    }
}

/// Fixed weights for the four appeal evaluation factors. Must sum to 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AppealWeights {
    pub new_evidence: f64,
    pub policy_misinterpretation: f64,
    pub user_explanation: f64,
    pub user_history: f64,
}

impl Default for AppealWeights {
    fn default() -> Self {
        Self {
            new_evidence: 0.40,
            policy_misinterpretation: 0.30,
            user_explanation: 0.20,
            user_history: 0.10,
        }
    }
}

/// The full declarative policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub thresholds: ConfidenceThresholds,
    pub severity_weights: SeverityWeights,

    /// Categories that always require human review regardless of confidence.
    pub mandatory_review: Vec<ViolationType>,

    /// Prior confirmed violations at which a critical-severity finding is
    /// escalated to a senior queue instead of acted on automatically.
    pub repeat_offender_threshold: u32,

    /// Category x severity action table. Missing entries resolve to
    /// flag_for_review.
    pub actions: BTreeMap<ViolationType, BTreeMap<Severity, PolicyAction>>,

    pub appeal_thresholds: AppealThresholds,
    pub appeal_weights: AppealWeights,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            thresholds: ConfidenceThresholds::default(),
            severity_weights: SeverityWeights::default(),
            mandatory_review: vec![ViolationType::AgeVerification],
            repeat_offender_threshold: 3,
            actions: default_action_table(),
            appeal_thresholds: AppealThresholds::default(),
            appeal_weights: AppealWeights::default(),
        }
    }
}

fn default_action_table() -> BTreeMap<ViolationType, BTreeMap<Severity, PolicyAction>> {
    use PolicyAction::*;
    use Severity::*;
    use ViolationType::*;

    let mut table = BTreeMap::new();
    table.insert(
        Harassment,
        BTreeMap::from([(Low, Warning), (Medium, TemporaryBan), (High, PermanentBan), (Critical, PermanentBan)]),
    );
    table.insert(
        Scams,
        BTreeMap::from([(Low, FlagForReview), (Medium, TemporaryBan), (High, PermanentBan), (Critical, PermanentBan)]),
    );
    table.insert(
        FakeProfile,
        BTreeMap::from([(Low, Warning), (Medium, FlagForReview), (High, PermanentBan), (Critical, PermanentBan)]),
    );
    table.insert(
        Inappropriate,
        BTreeMap::from([(Low, Warning), (Medium, Warning), (High, TemporaryBan), (Critical, PermanentBan)]),
    );
    // Age verification is in the mandatory-review set; its table entries
    // only apply after a human confirms.
    table.insert(
        AgeVerification,
        BTreeMap::from([(Low, FlagForReview), (Medium, FlagForReview), (High, FlagForReview), (Critical, FlagForReview)]),
    );
    table
}

impl PolicyConfig {
    /// Parse policy config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, PolicyError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load policy config from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Check numeric invariants the resolver relies on.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let t = &self.thresholds;
        for (name, value) in [
            ("auto_approve", t.auto_approve),
            ("auto_reject", t.auto_reject),
            ("escalate", t.escalate),
            ("appeal overturn", self.appeal_thresholds.overturn),
            ("appeal uphold_below", self.appeal_thresholds.uphold_below),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PolicyError::ValidationError(format!(
                    "threshold '{}' must be in [0,1], got {}",
                    name, value
                )));
            }
        }

        if t.escalate > t.auto_reject {
            return Err(PolicyError::ValidationError(format!(
                "escalate threshold ({}) must not exceed auto_reject ({})",
                t.escalate, t.auto_reject
            )));
        }

        if self.appeal_thresholds.uphold_below > self.appeal_thresholds.overturn {
            return Err(PolicyError::ValidationError(
                "appeal uphold_below must not exceed overturn threshold".to_string(),
            ));
        }

        let w = &self.appeal_weights;
        let sum = w.new_evidence + w.policy_misinterpretation + w.user_explanation + w.user_history;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(PolicyError::ValidationError(format!(
                "appeal factor weights must sum to 1.0, got {}",
                sum
            )));
        }

        Ok(())
    }

    /// Look up the configured action for a confirmed violation.
    ///
    /// Missing table entries resolve to flag_for_review: a violation is
    /// never a silent no-op.
    pub fn action_for(&self, violation_type: ViolationType, severity: Severity) -> PolicyAction {
        self.actions
            .get(&violation_type)
            .and_then(|row| row.get(&severity))
            .copied()
            .unwrap_or(PolicyAction::FlagForReview)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        PolicyConfig::default().validate().unwrap();
    }

    #[test]
    fn test_from_yaml_overrides_defaults() {
        let config = PolicyConfig::from_yaml(
            r#"
thresholds:
  auto_approve: 0.80
  auto_reject: 0.95
  escalate: 0.60
repeat_offender_threshold: 5
"#,
        )
        .unwrap();

        assert_eq!(config.thresholds.auto_approve, 0.80);
        assert_eq!(config.thresholds.auto_reject, 0.95);
        assert_eq!(config.repeat_offender_threshold, 5);
        // Untouched sections keep their defaults
        assert_eq!(config.severity_weights.critical, 1.0);
        assert_eq!(config.appeal_weights.new_evidence, 0.40);
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let result = PolicyConfig::from_yaml(
            r#"
thresholds:
  auto_approve: 1.5
  auto_reject: 0.9
  escalate: 0.7
"#,
        );
        assert!(matches!(result, Err(PolicyError::ValidationError(_))));
    }

    #[test]
    fn test_bad_weight_sum_rejected() {
        let result = PolicyConfig::from_yaml(
            r#"
appeal_weights:
  new_evidence: 0.5
  policy_misinterpretation: 0.5
  user_explanation: 0.5
  user_history: 0.5
"#,
        );
        assert!(matches!(result, Err(PolicyError::ValidationError(_))));
    }

    #[test]
    fn test_missing_action_table_entry_flags_for_review() {
        let mut config = PolicyConfig::default();
        config.actions.clear();
        assert_eq!(
            config.action_for(ViolationType::Scams, Severity::High),
            PolicyAction::FlagForReview
        );
    }

    #[test]
    fn test_action_table_lookup() {
        let config = PolicyConfig::default();
        assert_eq!(
            config.action_for(ViolationType::Harassment, Severity::Critical),
            PolicyAction::PermanentBan
        );
        assert_eq!(
            config.action_for(ViolationType::Inappropriate, Severity::Low),
            PolicyAction::Warning
        );
    }
}
