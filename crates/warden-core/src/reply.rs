//! Tolerant parsing of classifier and appeal-evaluator replies.
//!
//! Replies use a line-oriented label format:
//!
//! ```text
//! VIOLATION: yes
//! TYPE: harassment
//! SEVERITY: high
//! CONFIDENCE: 0.92
//! REASONING: Targeted threats against another user.
//! ```
//!
//! Parsing never fails. Field-level problems fall back field-wise; a reply
//! with no usable verdict at all is replaced by the fail-safe result, which
//! downstream routing escalates to a human. Nothing in here can turn a
//! garbled reply into an automatic approval or rejection.

use lazy_static::lazy_static;
use regex::Regex;

use crate::types::{AppealScores, ClassificationResult, Severity, ViolationType};

lazy_static! {
    static ref VIOLATION_RE: Regex = Regex::new(r"(?im)^\s*VIOLATION\s*:\s*(\S+)").unwrap();
    static ref TYPE_RE: Regex = Regex::new(r"(?im)^\s*TYPE\s*:\s*(\S+)").unwrap();
    static ref SEVERITY_RE: Regex = Regex::new(r"(?im)^\s*SEVERITY\s*:\s*(\S+)").unwrap();
    static ref CONFIDENCE_RE: Regex = Regex::new(r"(?im)^\s*CONFIDENCE\s*:\s*(\S+)").unwrap();
    static ref REASONING_RE: Regex = Regex::new(r"(?ims)^\s*REASONING\s*:\s*(.+)$").unwrap();
    static ref NEW_EVIDENCE_RE: Regex =
        Regex::new(r"(?im)^\s*NEW_EVIDENCE_SCORE\s*:\s*(\S+)").unwrap();
    static ref POLICY_RE: Regex = Regex::new(r"(?im)^\s*POLICY_SCORE\s*:\s*(\S+)").unwrap();
    static ref EXPLANATION_RE: Regex =
        Regex::new(r"(?im)^\s*EXPLANATION_SCORE\s*:\s*(\S+)").unwrap();
    static ref HISTORY_RE: Regex = Regex::new(r"(?im)^\s*HISTORY_SCORE\s*:\s*(\S+)").unwrap();
}

fn capture<'a>(re: &Regex, reply: &'a str) -> Option<&'a str> {
    re.captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn parse_score(re: &Regex, reply: &str, fallback: f64) -> f64 {
    capture(re, reply)
        .and_then(|s| s.trim_end_matches(',').parse::<f64>().ok())
        .map(|v| v.clamp(0.0, 1.0))
        .unwrap_or(fallback)
}

/// Parse a moderation classifier reply.
pub fn parse_classification(reply: &str) -> ClassificationResult {
    let Some(violation_raw) = capture(&VIOLATION_RE, reply) else {
        return ClassificationResult::fail_safe("Missing VIOLATION field.");
    };

    let violated = match violation_raw.trim_end_matches(',').to_lowercase().as_str() {
        "yes" | "true" => true,
        "no" | "false" => false,
        other => {
            return ClassificationResult::fail_safe(format!(
                "Unrecognized VIOLATION value '{}'.",
                other
            ));
        }
    };

    let confidence = parse_score(&CONFIDENCE_RE, reply, 0.5);
    let reasoning = capture(&REASONING_RE, reply)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "No reasoning provided.".to_string());

    if !violated {
        return ClassificationResult {
            violated: false,
            violation_type: None,
            severity: None,
            confidence,
            reasoning,
        };
    }

    // A claimed violation with no identifiable category cannot drive policy
    // lookup, so the whole reply degrades to the fail-safe result.
    let Some(violation_type) = capture(&TYPE_RE, reply)
        .and_then(|s| s.trim_end_matches(',').parse::<ViolationType>().ok())
    else {
        return ClassificationResult::fail_safe("VIOLATION is yes but TYPE is unusable.");
    };

    let severity = capture(&SEVERITY_RE, reply)
        .and_then(|s| s.trim_end_matches(',').parse::<Severity>().ok())
        .unwrap_or(Severity::Medium);

    ClassificationResult {
        violated: true,
        violation_type: Some(violation_type),
        severity: Some(severity),
        confidence,
        reasoning,
    }
}

/// Parse an appeal evaluation reply into per-factor scores.
///
/// Individual missing factors score 0.0 (absence of support for the appeal);
/// a reply with no score lines at all gets the fail-safe scores, which the
/// weighted thresholds route to escalation.
pub fn parse_appeal_scores(reply: &str) -> AppealScores {
    let any_present = [&*NEW_EVIDENCE_RE, &*POLICY_RE, &*EXPLANATION_RE, &*HISTORY_RE]
        .iter()
        .any(|re| re.is_match(reply));
    if !any_present {
        return AppealScores::fail_safe("No factor scores found in reply.");
    }

    let reasoning = capture(&REASONING_RE, reply)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "No reasoning provided.".to_string());

    AppealScores {
        new_evidence: parse_score(&NEW_EVIDENCE_RE, reply, 0.0),
        policy_misinterpretation: parse_score(&POLICY_RE, reply, 0.0),
        user_explanation: parse_score(&EXPLANATION_RE, reply, 0.0),
        user_history: parse_score(&HISTORY_RE, reply, 0.0),
        reasoning,
    }
}
