//! The moderation workflow: intake, risk assessment, decision, action,
//! notification.

use chrono::Utc;
use std::time::Instant;
use tracing::info;

use warden_core::policy::{self, DecisionRule};
use warden_core::types::{Case, ContentType, Decision, PolicyAction};
use warden_store::{new_id, DecisionRecord};

use crate::collaborators::{best_effort, notification_message};
use crate::engine::Engine;
use crate::error::WardenError;
use crate::workflow::MAX_CONTENT_CHARS;

/// One unit of content to adjudicate.
#[derive(Debug, Clone)]
pub struct ModerationRequest {
    pub content_type: ContentType,
    pub content: String,
    pub user_id: String,
    /// Caller-supplied id makes the run idempotent: retrying after a
    /// reported failure reuses the same case.
    pub case_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl ModerationRequest {
    pub fn new(
        content_type: ContentType,
        content: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            content_type,
            content: content.into(),
            user_id: user_id.into(),
            case_id: None,
            metadata: None,
        }
    }

    fn validate(&self) -> Result<(), WardenError> {
        if self.content.trim().is_empty() {
            return Err(WardenError::Validation("content must not be empty".to_string()));
        }
        if self.content.chars().count() > MAX_CONTENT_CHARS {
            return Err(WardenError::Validation(format!(
                "content exceeds {MAX_CONTENT_CHARS} characters"
            )));
        }
        if self.user_id.trim().is_empty() {
            return Err(WardenError::Validation("user_id must not be empty".to_string()));
        }
        Ok(())
    }
}

/// The adjudicated result handed back to the caller.
#[derive(Debug, Clone)]
pub struct ModerationOutcome {
    pub case: Case,
    pub rule: DecisionRule,
    pub action: Option<PolicyAction>,
    pub queue_item_id: Option<String>,
    pub processing_time_ms: u64,
}

pub(crate) async fn run(
    engine: &Engine,
    request: ModerationRequest,
) -> Result<ModerationOutcome, WardenError> {
    let started = Instant::now();

    // intake: nothing is persisted for invalid input
    request.validate()?;
    let policy_config = engine.policy();
    let case_id = request.case_id.clone().unwrap_or_else(|| new_id("case"));

    let now = Utc::now();
    let pending = Case {
        id: case_id.clone(),
        content_type: request.content_type,
        content: request.content.clone(),
        user_id: request.user_id.clone(),
        risk_score: None,
        decision: Decision::Pending,
        reasoning: String::new(),
        confidence: None,
        violation_type: None,
        severity: None,
        reviewed_by: "ai_agent".to_string(),
        metadata: request.metadata.clone().unwrap_or_else(|| serde_json::json!({})),
        created_at: now,
        updated_at: now,
    };
    engine.ledger.create_case(&pending).await?;

    // risk assessment
    let similar_violations = engine.evidence.search_violations(&request.content, 3);
    let similar_cases = engine.evidence.search_cases(&request.content, 3);
    let history = engine.ledger.user_history(&request.user_id, 5).await?;

    let classification = engine
        .gateway
        .classify(
            &request.content,
            request.content_type,
            &similar_violations,
            &similar_cases,
            &history,
        )
        .await;

    // decision
    let risk = policy::risk_score(&policy_config, &classification);
    let verdict = policy::decide(&policy_config, &classification, &history);

    let queue_item_id = engine
        .ledger
        .record_decision(&DecisionRecord {
            case_id: case_id.clone(),
            decision: verdict.decision,
            reasoning: classification.reasoning.clone(),
            confidence: Some(classification.confidence),
            risk_score: Some(risk),
            violation_type: classification.violation_type,
            severity: classification.severity,
            reviewed_by: "ai_agent".to_string(),
            queue_priority: verdict.queue_priority,
            record_violation: verdict.decision == Decision::Rejected,
            audit_details: Some(serde_json::json!({
                "rule": verdict.rule,
                "action": verdict.action,
            })),
        })
        .await?;

    let case = engine.ledger.get_case(&case_id).await?.ok_or_else(|| {
        WardenError::NotFound {
            entity: "case",
            id: case_id.clone(),
        }
    })?;

    // decided cases become retrievable precedent immediately
    engine.evidence.add_case(&case);
    if case.decision == Decision::Rejected && case.violation_type.is_some() {
        engine.evidence.add_violation(&case);
    }

    // action: best-effort, never rolls back the decision
    if let Some(action) = verdict.action {
        best_effort("enforcement action", &case_id, engine.actions.execute(&case, action)).await;
    }

    // notification: fire-and-forget
    best_effort(
        "user notification",
        &case_id,
        engine
            .notifier
            .notify_decision(&case, notification_message(case.decision)),
    )
    .await;

    let processing_time_ms = started.elapsed().as_millis() as u64;
    best_effort(
        "latency metric",
        &case_id,
        async {
            engine
                .ledger
                .record_metric(
                    "decision_latency_ms",
                    processing_time_ms as f64,
                    Some(serde_json::json!({ "case_id": case_id })),
                )
                .await
                .map_err(|e| e.to_string())
        },
    )
    .await;

    info!(
        case_id = %case_id,
        decision = %case.decision,
        risk_score = risk,
        elapsed_ms = processing_time_ms,
        "moderation complete"
    );

    Ok(ModerationOutcome {
        case,
        rule: verdict.rule,
        action: verdict.action,
        queue_item_id,
        processing_time_ms,
    })
}
