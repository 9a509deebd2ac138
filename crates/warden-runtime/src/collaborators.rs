//! Collaborator traits for side effects: user notification and enforcement
//! action execution.
//!
//! Both are best-effort. The workflows log failures at warn level and keep
//! going; a decision is never rolled back because a notification bounced.
//! The default implementations record what would have happened in the audit
//! log, which is also how offline runs and tests observe side effects.

use async_trait::async_trait;
use tracing::warn;

use warden_core::types::{Case, Decision, PolicyAction};
use warden_store::Ledger;

/// Delivers decision notifications to users.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_decision(&self, case: &Case, message: &str) -> Result<(), String>;
}

/// Applies enforcement actions (bans, warnings) to user accounts.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, case: &Case, action: PolicyAction) -> Result<(), String>;
}

/// The message a user sees for a decision.
pub fn notification_message(decision: Decision) -> &'static str {
    match decision {
        Decision::Approved => "Your content has been reviewed and approved.",
        Decision::Rejected => {
            "Your content was found to violate our community guidelines and has been removed. \
             You may appeal this decision."
        }
        Decision::Escalated => {
            "Your content is under review by our moderation team. You will be notified of the outcome."
        }
        Decision::Pending => "Your content is being reviewed.",
    }
}

/// Default notifier: records the notification as an audit event instead of
/// delivering it anywhere.
pub struct AuditNotifier {
    ledger: Ledger,
}

impl AuditNotifier {
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Notifier for AuditNotifier {
    async fn notify_decision(&self, case: &Case, message: &str) -> Result<(), String> {
        self.ledger
            .append_audit_event(
                Some(&case.id),
                None,
                "user_notification",
                "system",
                Some(serde_json::json!({
                    "user_id": case.user_id,
                    "message": message,
                })),
            )
            .await
            .map_err(|e| e.to_string())
    }
}

/// Default executor: records the action as an audit event. Wiring a real
/// account-management backend replaces this implementation.
pub struct AuditActionExecutor {
    ledger: Ledger,
}

impl AuditActionExecutor {
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl ActionExecutor for AuditActionExecutor {
    async fn execute(&self, case: &Case, action: PolicyAction) -> Result<(), String> {
        self.ledger
            .append_audit_event(
                Some(&case.id),
                None,
                "action_executed",
                "system",
                Some(serde_json::json!({
                    "user_id": case.user_id,
                    "action": action.as_str(),
                })),
            )
            .await
            .map_err(|e| e.to_string())
    }
}

/// Run a best-effort side effect, logging instead of propagating failure.
pub(crate) async fn best_effort<F>(what: &'static str, case_id: &str, fut: F)
where
    F: std::future::Future<Output = Result<(), String>>,
{
    if let Err(err) = fut.await {
        warn!(case_id = %case_id, error = %err, "{what} failed, continuing");
    }
}
