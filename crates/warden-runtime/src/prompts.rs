//! Prompt construction for the classifier gateway.
//!
//! Prompts are built deterministically from the case material so the same
//! input always produces the same request. Replies are expected in the
//! line-oriented label format parsed by `warden_core::reply`.

use warden_core::types::{Case, ContentType, EvidenceMatch, UserHistory};

pub const MODERATION_SYSTEM_PROMPT: &str = "\
You are a content moderation classifier for a dating platform. Review the \
submitted content and decide whether it violates policy.

Violation categories: harassment, scams, fake_profile, inappropriate, \
age_verification.
Severity levels: low, medium, high, critical.

Respond with exactly these lines and nothing else:
VIOLATION: yes or no
TYPE: <category, only when VIOLATION is yes>
SEVERITY: <severity, only when VIOLATION is yes>
CONFIDENCE: <0.0 to 1.0>
REASONING: <one or two sentences>";

pub const APPEAL_SYSTEM_PROMPT: &str = "\
You are reviewing a user's appeal of a moderation decision on a dating \
platform. Score each factor from 0.0 (no support for the appeal) to 1.0 \
(strong support for the appeal).

Respond with exactly these lines and nothing else:
NEW_EVIDENCE_SCORE: <0.0 to 1.0>
POLICY_SCORE: <0.0 to 1.0, how likely the policy was misapplied>
EXPLANATION_SCORE: <0.0 to 1.0, credibility of the user's explanation>
HISTORY_SCORE: <0.0 to 1.0, how favorable the user's history is>
REASONING: <one or two sentences>";

/// Build the user message for a moderation classification.
pub fn build_moderation_prompt(
    content: &str,
    content_type: ContentType,
    similar_violations: &[EvidenceMatch],
    similar_cases: &[EvidenceMatch],
    history: &UserHistory,
) -> String {
    let mut prompt = format!(
        "Content type: {content_type}\nContent to review:\n{content}\n"
    );

    if !similar_violations.is_empty() {
        prompt.push_str("\nSimilar confirmed violations:\n");
        for m in similar_violations {
            prompt.push_str(&format!(
                "- [{}, similarity {:.2}] {}\n",
                m.violation_type.map(|v| v.as_str()).unwrap_or("unknown"),
                m.similarity,
                truncate(&m.text, 200),
            ));
        }
    }

    if !similar_cases.is_empty() {
        prompt.push_str("\nSimilar past cases:\n");
        for m in similar_cases {
            prompt.push_str(&format!(
                "- [{}, similarity {:.2}] {}\n",
                m.decision.map(|d| d.as_str()).unwrap_or("unknown"),
                m.similarity,
                truncate(&m.text, 200),
            ));
        }
    }

    prompt.push_str(&format!(
        "\nUser history: {} total cases, {} confirmed violations.\n",
        history.total_cases, history.confirmed_violations
    ));

    prompt
}

/// Build the user message for an appeal evaluation.
pub fn build_appeal_prompt(
    case: &Case,
    user_explanation: &str,
    new_evidence: Option<&str>,
    history: &UserHistory,
    precedents: &[EvidenceMatch],
) -> String {
    let mut prompt = format!(
        "Original decision: {} ({})\nOriginal reasoning: {}\nContent:\n{}\n\n\
         User's explanation:\n{}\n",
        case.decision,
        case.violation_type.map(|v| v.as_str()).unwrap_or("no violation recorded"),
        case.reasoning,
        truncate(&case.content, 500),
        user_explanation,
    );

    match new_evidence {
        Some(evidence) => prompt.push_str(&format!("\nNew evidence provided:\n{evidence}\n")),
        None => prompt.push_str("\nNo new evidence was provided.\n"),
    }

    if !precedents.is_empty() {
        prompt.push_str("\nPrecedent cases:\n");
        for m in precedents {
            prompt.push_str(&format!(
                "- [{}, similarity {:.2}] {}\n",
                m.decision.map(|d| d.as_str()).unwrap_or("unknown"),
                m.similarity,
                truncate(&m.text, 200),
            ));
        }
    }

    prompt.push_str(&format!(
        "\nUser history: {} total cases, {} confirmed violations.\n",
        history.total_cases, history.confirmed_violations
    ));

    prompt
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moderation_prompt_includes_history() {
        let history = UserHistory {
            user_id: "user_1".to_string(),
            total_cases: 4,
            confirmed_violations: 2,
            recent_cases: Vec::new(),
        };
        let prompt = build_moderation_prompt("hello", ContentType::Message, &[], &[], &history);
        assert!(prompt.contains("Content type: message"));
        assert!(prompt.contains("4 total cases, 2 confirmed violations"));
        assert!(!prompt.contains("Similar confirmed violations"));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let history = UserHistory::default();
        let a = build_moderation_prompt("same input", ContentType::Bio, &[], &[], &history);
        let b = build_moderation_prompt("same input", ContentType::Bio, &[], &[], &history);
        assert_eq!(a, b);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo wörld", 5), "héllo...");
        assert_eq!(truncate("short", 10), "short");
    }
}
