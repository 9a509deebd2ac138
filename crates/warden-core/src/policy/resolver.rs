//! Deterministic decision resolution.
//!
//! Given a classification result, the user's history, and the active policy,
//! [`decide`] walks an ordered rule list and returns a [`Verdict`]. The rules
//! are evaluated in precedence order:
//!
//! 1. mandatory-review category override
//! 2. repeat-offender override
//! 3. confidence threshold bands
//!
//! The same module owns the appeal side: [`weighted_appeal_score`] combines
//! the four factor scores and [`decide_appeal`] maps the total onto an
//! appeal outcome.

use serde::{Deserialize, Serialize};

use super::PolicyConfig;
use crate::types::{
    AppealDecision, AppealScores, ClassificationResult, Decision, PolicyAction, QueuePriority,
    Severity, UserHistory,
};

/// Which rule produced the verdict. Recorded in audit details so a reviewer
/// can see why routing happened without replaying the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    MandatoryReview,
    RepeatOffender,
    AutoApprove,
    AutoReject,
    UncertaintyEscalation,
}

/// The resolved outcome for one classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub decision: Decision,
    /// Enforcement action, present only on rejection.
    pub action: Option<PolicyAction>,
    /// Review queue priority, present only on escalation.
    pub queue_priority: Option<QueuePriority>,
    pub rule: DecisionRule,
}

/// Derived risk score: confidence scaled by severity weight, capped at 1.0.
/// Clean content scores exactly 0.0.
pub fn risk_score(config: &PolicyConfig, classification: &ClassificationResult) -> f64 {
    if !classification.violated {
        return 0.0;
    }
    let severity = classification.severity.unwrap_or(Severity::Medium);
    let weight = config.severity_weights.weight(severity);
    (classification.confidence * weight).min(1.0)
}

/// Queue priority for an escalated violation, keyed on severity.
pub fn queue_priority(severity: Severity) -> QueuePriority {
    match severity {
        Severity::Low => QueuePriority::Low,
        Severity::Medium => QueuePriority::Medium,
        Severity::High => QueuePriority::High,
        Severity::Critical => QueuePriority::Urgent,
    }
}

/// Resolve a classification into a verdict under the active policy.
pub fn decide(
    config: &PolicyConfig,
    classification: &ClassificationResult,
    history: &UserHistory,
) -> Verdict {
    // Rule 1: mandatory-review categories never resolve automatically,
    // regardless of confidence.
    if classification.violated {
        if let Some(violation_type) = classification.violation_type {
            if config.mandatory_review.contains(&violation_type) {
                return Verdict {
                    decision: Decision::Escalated,
                    action: None,
                    queue_priority: Some(QueuePriority::Urgent),
                    rule: DecisionRule::MandatoryReview,
                };
            }
        }
    }

    // Rule 2: critical findings against known repeat offenders go to a
    // senior queue instead of automatic enforcement.
    if classification.violated
        && classification.severity == Some(Severity::Critical)
        && history.confirmed_violations >= config.repeat_offender_threshold
    {
        return Verdict {
            decision: Decision::Escalated,
            action: None,
            queue_priority: Some(QueuePriority::Urgent),
            rule: DecisionRule::RepeatOffender,
        };
    }

    // Rule 3: threshold bands. Both bounds are inclusive.
    let confidence = classification.confidence;
    if !classification.violated && confidence >= config.thresholds.auto_approve {
        return Verdict {
            decision: Decision::Approved,
            action: None,
            queue_priority: None,
            rule: DecisionRule::AutoApprove,
        };
    }

    if classification.violated && confidence >= config.thresholds.auto_reject {
        let severity = classification.severity.unwrap_or(Severity::Medium);
        let action = classification
            .violation_type
            .map(|vt| config.action_for(vt, severity))
            .unwrap_or(PolicyAction::FlagForReview);
        return Verdict {
            decision: Decision::Rejected,
            action: Some(action),
            queue_priority: None,
            rule: DecisionRule::AutoReject,
        };
    }

    // Everything else is uncertain and goes to a human. Violations inherit
    // their severity's priority; uncertain clean content gets medium.
    let priority = if classification.violated {
        queue_priority(classification.severity.unwrap_or(Severity::Medium))
    } else {
        QueuePriority::Medium
    };
    Verdict {
        decision: Decision::Escalated,
        action: None,
        queue_priority: Some(priority),
        rule: DecisionRule::UncertaintyEscalation,
    }
}

/// Weighted sum of the four appeal factors. Each factor is clamped to [0,1]
/// before weighting, so the total is also in [0,1] for unit-sum weights.
pub fn weighted_appeal_score(config: &PolicyConfig, scores: &AppealScores) -> f64 {
    let w = &config.appeal_weights;
    let clamp = |v: f64| v.clamp(0.0, 1.0);
    clamp(scores.new_evidence) * w.new_evidence
        + clamp(scores.policy_misinterpretation) * w.policy_misinterpretation
        + clamp(scores.user_explanation) * w.user_explanation
        + clamp(scores.user_history) * w.user_history
}

/// Map a weighted appeal score onto an outcome.
///
/// Overturn requires strictly exceeding the threshold; a score exactly at
/// the bound escalates. Uphold is strict below. The middle band escalates.
pub fn decide_appeal(config: &PolicyConfig, weighted_score: f64) -> AppealDecision {
    let t = &config.appeal_thresholds;
    if weighted_score > t.overturn {
        AppealDecision::Overturned
    } else if weighted_score < t.uphold_below {
        AppealDecision::Upheld
    } else {
        AppealDecision::Escalated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ViolationType;
    use proptest::prelude::*;

    fn violation(
        violation_type: ViolationType,
        severity: Severity,
        confidence: f64,
    ) -> ClassificationResult {
        ClassificationResult {
            violated: true,
            violation_type: Some(violation_type),
            severity: Some(severity),
            confidence,
            reasoning: "test".to_string(),
        }
    }

    fn clean(confidence: f64) -> ClassificationResult {
        ClassificationResult {
            violated: false,
            violation_type: None,
            severity: None,
            confidence,
            reasoning: "test".to_string(),
        }
    }

    fn history_with(confirmed: u32) -> UserHistory {
        UserHistory {
            user_id: "user_1".to_string(),
            total_cases: confirmed,
            confirmed_violations: confirmed,
            recent_cases: Vec::new(),
        }
    }

    #[test]
    fn test_clean_high_confidence_approves() {
        let config = PolicyConfig::default();
        let verdict = decide(&config, &clean(0.95), &history_with(0));
        assert_eq!(verdict.decision, Decision::Approved);
        assert_eq!(verdict.rule, DecisionRule::AutoApprove);
        assert!(verdict.action.is_none());
        assert!(verdict.queue_priority.is_none());
    }

    #[test]
    fn test_threshold_bounds_are_inclusive() {
        let config = PolicyConfig::default();

        let verdict = decide(&config, &clean(0.85), &history_with(0));
        assert_eq!(verdict.decision, Decision::Approved);

        let verdict = decide(
            &config,
            &violation(ViolationType::Scams, Severity::High, 0.90),
            &history_with(0),
        );
        assert_eq!(verdict.decision, Decision::Rejected);
    }

    #[test]
    fn test_confident_violation_rejects_with_action() {
        let config = PolicyConfig::default();
        let verdict = decide(
            &config,
            &violation(ViolationType::Harassment, Severity::High, 0.95),
            &history_with(0),
        );
        assert_eq!(verdict.decision, Decision::Rejected);
        assert_eq!(verdict.action, Some(PolicyAction::PermanentBan));
        assert_eq!(verdict.rule, DecisionRule::AutoReject);
    }

    #[test]
    fn test_uncertain_violation_escalates_by_severity() {
        let config = PolicyConfig::default();
        let verdict = decide(
            &config,
            &violation(ViolationType::Harassment, Severity::High, 0.75),
            &history_with(0),
        );
        assert_eq!(verdict.decision, Decision::Escalated);
        assert_eq!(verdict.queue_priority, Some(QueuePriority::High));
        assert_eq!(verdict.rule, DecisionRule::UncertaintyEscalation);
    }

    #[test]
    fn test_uncertain_clean_content_escalates_medium() {
        let config = PolicyConfig::default();
        let verdict = decide(&config, &clean(0.60), &history_with(0));
        assert_eq!(verdict.decision, Decision::Escalated);
        assert_eq!(verdict.queue_priority, Some(QueuePriority::Medium));
    }

    #[test]
    fn test_mandatory_review_overrides_confidence() {
        let config = PolicyConfig::default();
        let verdict = decide(
            &config,
            &violation(ViolationType::AgeVerification, Severity::Low, 0.99),
            &history_with(0),
        );
        assert_eq!(verdict.decision, Decision::Escalated);
        assert_eq!(verdict.queue_priority, Some(QueuePriority::Urgent));
        assert_eq!(verdict.rule, DecisionRule::MandatoryReview);
        assert!(verdict.action.is_none());
    }

    #[test]
    fn test_repeat_offender_critical_escalates() {
        let config = PolicyConfig::default();
        let verdict = decide(
            &config,
            &violation(ViolationType::Scams, Severity::Critical, 0.99),
            &history_with(3),
        );
        assert_eq!(verdict.decision, Decision::Escalated);
        assert_eq!(verdict.rule, DecisionRule::RepeatOffender);

        // Below the threshold the same finding auto-rejects.
        let verdict = decide(
            &config,
            &violation(ViolationType::Scams, Severity::Critical, 0.99),
            &history_with(2),
        );
        assert_eq!(verdict.decision, Decision::Rejected);
    }

    #[test]
    fn test_fail_safe_result_always_escalates() {
        let config = PolicyConfig::default();
        let verdict = decide(
            &config,
            &ClassificationResult::fail_safe("garbled"),
            &history_with(0),
        );
        assert_eq!(verdict.decision, Decision::Escalated);
    }

    #[test]
    fn test_risk_score() {
        let config = PolicyConfig::default();
        assert_eq!(risk_score(&config, &clean(0.99)), 0.0);

        let r = risk_score(
            &config,
            &violation(ViolationType::Harassment, Severity::High, 0.9),
        );
        assert!((r - 0.72).abs() < 1e-9);

        let r = risk_score(
            &config,
            &violation(ViolationType::Scams, Severity::Critical, 1.0),
        );
        assert_eq!(r, 1.0);
    }

    #[test]
    fn test_appeal_overturn_is_strict() {
        let config = PolicyConfig::default();
        assert_eq!(decide_appeal(&config, 0.70), AppealDecision::Escalated);
        assert_eq!(decide_appeal(&config, 0.701), AppealDecision::Overturned);
        assert_eq!(decide_appeal(&config, 0.40), AppealDecision::Escalated);
        assert_eq!(decide_appeal(&config, 0.399), AppealDecision::Upheld);
    }

    #[test]
    fn test_weighted_appeal_score_clamps_factors() {
        let config = PolicyConfig::default();
        let scores = AppealScores {
            new_evidence: 2.0,
            policy_misinterpretation: -1.0,
            user_explanation: 1.0,
            user_history: 1.0,
            reasoning: String::new(),
        };
        let total = weighted_appeal_score(&config, &scores);
        // 1.0*0.4 + 0.0*0.3 + 1.0*0.2 + 1.0*0.1
        assert!((total - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_fail_safe_appeal_scores_escalate() {
        let config = PolicyConfig::default();
        let total = weighted_appeal_score(&config, &AppealScores::fail_safe("garbled"));
        assert_eq!(decide_appeal(&config, total), AppealDecision::Escalated);
    }

    proptest! {
        #[test]
        fn prop_risk_score_in_unit_interval(
            confidence in 0.0f64..=1.0,
            severity_idx in 0usize..4,
        ) {
            let severity = [Severity::Low, Severity::Medium, Severity::High, Severity::Critical][severity_idx];
            let config = PolicyConfig::default();
            let r = risk_score(&config, &violation(ViolationType::Scams, severity, confidence));
            prop_assert!((0.0..=1.0).contains(&r));
        }

        #[test]
        fn prop_rejection_always_carries_action(
            confidence in 0.0f64..=1.0,
            confirmed in 0u32..10,
        ) {
            let config = PolicyConfig::default();
            let verdict = decide(
                &config,
                &violation(ViolationType::Harassment, Severity::Medium, confidence),
                &history_with(confirmed),
            );
            if verdict.decision == Decision::Rejected {
                prop_assert!(verdict.action.is_some());
            }
            if verdict.decision == Decision::Escalated {
                prop_assert!(verdict.queue_priority.is_some());
                prop_assert!(verdict.action.is_none());
            }
        }

        #[test]
        fn prop_violation_never_approves(confidence in 0.0f64..=1.0) {
            let config = PolicyConfig::default();
            let verdict = decide(
                &config,
                &violation(ViolationType::Inappropriate, Severity::Low, confidence),
                &history_with(0),
            );
            prop_assert_ne!(verdict.decision, Decision::Approved);
        }

        #[test]
        fn prop_weighted_score_in_unit_interval(
            a in -1.0f64..=2.0,
            b in -1.0f64..=2.0,
            c in -1.0f64..=2.0,
            d in -1.0f64..=2.0,
        ) {
            let config = PolicyConfig::default();
            let scores = AppealScores {
                new_evidence: a,
                policy_misinterpretation: b,
                user_explanation: c,
                user_history: d,
                reasoning: String::new(),
            };
            let total = weighted_appeal_score(&config, &scores);
            prop_assert!((0.0..=1.0 + 1e-9).contains(&total));
        }
    }
}
