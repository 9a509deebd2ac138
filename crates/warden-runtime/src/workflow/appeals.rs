//! The appeals workflow: intake, context retrieval, evaluation, decision,
//! resolution.

use chrono::Utc;
use std::time::Instant;
use tracing::info;

use warden_core::policy;
use warden_core::types::{Appeal, AppealDecision, AppealScores, Decision};
use warden_store::new_id;

use crate::collaborators::best_effort;
use crate::engine::Engine;
use crate::error::WardenError;

/// A user's contest of a decided case.
#[derive(Debug, Clone)]
pub struct AppealRequest {
    pub case_id: String,
    pub user_explanation: String,
    pub new_evidence: Option<String>,
}

impl AppealRequest {
    fn validate(&self) -> Result<(), WardenError> {
        if self.case_id.trim().is_empty() {
            return Err(WardenError::Validation("case_id must not be empty".to_string()));
        }
        if self.user_explanation.trim().is_empty() {
            return Err(WardenError::Validation(
                "an appeal requires an explanation".to_string(),
            ));
        }
        Ok(())
    }
}

/// The resolved appeal handed back to the caller.
#[derive(Debug, Clone)]
pub struct AppealOutcome {
    pub appeal_id: String,
    pub case_id: String,
    pub decision: AppealDecision,
    pub weighted_score: f64,
    pub scores: AppealScores,
    /// The review item enqueued at filing time for moderator visibility.
    pub queue_item_id: String,
    pub processing_time_ms: u64,
}

pub(crate) async fn run(engine: &Engine, request: AppealRequest) -> Result<AppealOutcome, WardenError> {
    let started = Instant::now();

    // intake: the case must exist and have been decided
    request.validate()?;
    let policy_config = engine.policy();
    let case = engine
        .ledger
        .get_case(&request.case_id)
        .await?
        .ok_or_else(|| WardenError::NotFound {
            entity: "case",
            id: request.case_id.clone(),
        })?;
    if case.decision == Decision::Pending {
        return Err(WardenError::InvalidState {
            entity: "case",
            id: case.id.clone(),
            state: case.decision.as_str().to_string(),
        });
    }

    let appeal_id = new_id("appeal");
    let appeal = Appeal {
        id: appeal_id.clone(),
        case_id: case.id.clone(),
        user_explanation: request.user_explanation.clone(),
        new_evidence: request.new_evidence.clone(),
        appeal_decision: AppealDecision::Pending,
        appeal_reasoning: None,
        appeal_confidence: None,
        resolved_by: None,
        created_at: Utc::now(),
        resolved_at: None,
    };
    let queue_item_id = engine.ledger.create_appeal(&appeal).await?;

    // context retrieval
    let history = engine.ledger.user_history(&case.user_id, 5).await?;
    let precedent_query = match &request.new_evidence {
        Some(evidence) => format!("{} {}", request.user_explanation, evidence),
        None => request.user_explanation.clone(),
    };
    let precedents = engine.evidence.search_cases(&precedent_query, 3);

    // evaluation
    let scores = engine
        .gateway
        .evaluate_appeal(
            &case,
            &request.user_explanation,
            request.new_evidence.as_deref(),
            &history,
            &precedents,
        )
        .await;

    // decision + resolution
    let weighted_score = policy::weighted_appeal_score(&policy_config, &scores);
    let decision = policy::decide_appeal(&policy_config, weighted_score);

    engine
        .ledger
        .resolve_appeal(&appeal_id, decision, &scores.reasoning, Some(weighted_score), "ai_agent")
        .await?;

    best_effort(
        "appeal notification",
        &case.id,
        engine
            .notifier
            .notify_decision(&case, appeal_message(decision)),
    )
    .await;

    let processing_time_ms = started.elapsed().as_millis() as u64;
    best_effort(
        "appeal metric",
        &case.id,
        async {
            engine
                .ledger
                .record_metric(
                    "appeal_weighted_score",
                    weighted_score,
                    Some(serde_json::json!({
                        "appeal_id": appeal_id,
                        "decision": decision.as_str(),
                    })),
                )
                .await
                .map_err(|e| e.to_string())
        },
    )
    .await;

    info!(
        appeal_id = %appeal_id,
        case_id = %case.id,
        decision = %decision,
        weighted_score,
        "appeal resolved"
    );

    Ok(AppealOutcome {
        appeal_id,
        case_id: case.id,
        decision,
        weighted_score,
        scores,
        queue_item_id,
        processing_time_ms,
    })
}

fn appeal_message(decision: AppealDecision) -> &'static str {
    match decision {
        AppealDecision::Overturned => {
            "Your appeal was successful. The original decision has been reversed."
        }
        AppealDecision::Upheld => {
            "Your appeal has been reviewed and the original decision stands."
        }
        AppealDecision::Escalated => {
            "Your appeal is being reviewed by our moderation team. You will be notified of the outcome."
        }
        AppealDecision::Pending => "Your appeal has been received.",
    }
}
