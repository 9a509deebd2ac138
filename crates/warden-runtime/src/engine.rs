//! The engine: owns the ledger, evidence indexes, classifier gateway,
//! collaborators, and the active policy, and exposes the workflow entry
//! points.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

use warden_core::types::{AuditEvent, Case, QueueStatus, ReviewQueueItem};
use warden_core::PolicyConfig;
use warden_store::{EvidenceIndex, Ledger, ReviewOutcome, Statistics};

use crate::collaborators::{ActionExecutor, AuditActionExecutor, AuditNotifier, Notifier};
use crate::error::WardenError;
use crate::gateway::ClassifierGateway;
use crate::providers::{CompletionConfig, LlmProvider};
use crate::workflow::{self, AppealOutcome, AppealRequest, ModerationOutcome, ModerationRequest};

pub struct Engine {
    pub(crate) ledger: Ledger,
    pub(crate) evidence: Arc<EvidenceIndex>,
    pub(crate) gateway: ClassifierGateway,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) actions: Arc<dyn ActionExecutor>,
    policy: RwLock<Arc<PolicyConfig>>,
}

impl Engine {
    pub fn builder(ledger: Ledger, provider: Arc<dyn LlmProvider>) -> EngineBuilder {
        EngineBuilder::new(ledger, provider)
    }

    /// Snapshot of the active policy. Workflow runs take one snapshot at
    /// start; a concurrent policy swap affects only later runs.
    pub fn policy(&self) -> Arc<PolicyConfig> {
        self.policy.read().clone()
    }

    /// Swap in a new policy after validation.
    pub fn update_policy(&self, config: PolicyConfig) -> Result<(), WardenError> {
        config.validate()?;
        *self.policy.write() = Arc::new(config);
        info!("policy updated");
        Ok(())
    }

    /// Load recently decided cases into the evidence indexes. Returns how
    /// many cases were indexed.
    pub async fn warm_evidence(&self, limit: u32) -> Result<usize, WardenError> {
        let cases = self.ledger.decided_cases(limit).await?;
        let count = cases.len();
        for case in &cases {
            self.evidence.add_case(case);
            if case.violation_type.is_some()
                && case.decision == warden_core::types::Decision::Rejected
            {
                self.evidence.add_violation(case);
            }
        }
        info!(indexed = count, "evidence indexes warmed");
        Ok(count)
    }

    /// Run the moderation workflow for one unit of content.
    pub async fn moderate(&self, request: ModerationRequest) -> Result<ModerationOutcome, WardenError> {
        workflow::moderation::run(self, request).await
    }

    /// File and resolve an appeal against a decided case.
    pub async fn appeal(&self, request: AppealRequest) -> Result<AppealOutcome, WardenError> {
        workflow::appeals::run(self, request).await
    }

    /// Claim a review queue item for a moderator.
    pub async fn claim(&self, item_id: &str, moderator_id: &str) -> Result<ReviewQueueItem, WardenError> {
        Ok(self.ledger.claim(item_id, moderator_id).await?)
    }

    /// Complete a claimed item with a moderator's verdict.
    pub async fn submit_review(
        &self,
        item_id: &str,
        moderator_id: &str,
        reasoning: &str,
        outcome: &ReviewOutcome,
    ) -> Result<(), WardenError> {
        self.ledger
            .submit_decision(item_id, moderator_id, reasoning, outcome)
            .await?;
        Ok(())
    }

    pub async fn queue(
        &self,
        status: Option<QueueStatus>,
        limit: u32,
    ) -> Result<Vec<ReviewQueueItem>, WardenError> {
        Ok(self.ledger.list_queue(status, limit).await?)
    }

    pub async fn get_case(&self, case_id: &str) -> Result<Option<Case>, WardenError> {
        Ok(self.ledger.get_case(case_id).await?)
    }

    pub async fn audit_trail(&self, case_id: &str) -> Result<Vec<AuditEvent>, WardenError> {
        Ok(self.ledger.audit_trail(case_id).await?)
    }

    pub async fn statistics(&self) -> Result<Statistics, WardenError> {
        Ok(self.ledger.statistics().await?)
    }
}

pub struct EngineBuilder {
    ledger: Ledger,
    provider: Arc<dyn LlmProvider>,
    policy: PolicyConfig,
    completion: CompletionConfig,
    retry: Option<backon::ExponentialBuilder>,
    evidence: Option<Arc<EvidenceIndex>>,
    notifier: Option<Arc<dyn Notifier>>,
    actions: Option<Arc<dyn ActionExecutor>>,
}

impl EngineBuilder {
    pub fn new(ledger: Ledger, provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            ledger,
            provider,
            policy: PolicyConfig::default(),
            completion: CompletionConfig::default(),
            retry: None,
            evidence: None,
            notifier: None,
            actions: None,
        }
    }

    pub fn policy(mut self, policy: PolicyConfig) -> Self {
        self.policy = policy;
        self
    }

    pub fn completion_config(mut self, config: CompletionConfig) -> Self {
        self.completion = config;
        self
    }

    pub fn retry(mut self, retry: backon::ExponentialBuilder) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn evidence(mut self, index: Arc<EvidenceIndex>) -> Self {
        self.evidence = Some(index);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn actions(mut self, actions: Arc<dyn ActionExecutor>) -> Self {
        self.actions = Some(actions);
        self
    }

    pub fn build(self) -> Result<Engine, WardenError> {
        self.policy.validate()?;

        let mut gateway = ClassifierGateway::new(self.provider).with_config(self.completion);
        if let Some(retry) = self.retry {
            gateway = gateway.with_retry(retry);
        }

        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(AuditNotifier::new(self.ledger.clone())));
        let actions = self
            .actions
            .unwrap_or_else(|| Arc::new(AuditActionExecutor::new(self.ledger.clone())));

        Ok(Engine {
            ledger: self.ledger,
            evidence: self
                .evidence
                .unwrap_or_else(|| Arc::new(EvidenceIndex::with_default_embedder())),
            gateway,
            notifier,
            actions,
            policy: RwLock::new(Arc::new(self.policy)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ScriptedProvider;
    use backon::ExponentialBuilder;
    use std::time::Duration;
    use warden_core::types::{AppealDecision, ContentType, Decision, QueuePriority, Severity, ViolationType};

    async fn engine_with(provider: ScriptedProvider) -> Engine {
        let ledger = Ledger::connect("sqlite::memory:").await.unwrap();
        ledger.init().await.unwrap();
        Engine::builder(ledger, Arc::new(provider))
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(1))
                    .with_max_times(2),
            )
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_confident_violation_rejected_with_audit_and_notification() {
        let engine = engine_with(ScriptedProvider::always(
            "VIOLATION: yes\nTYPE: scams\nSEVERITY: high\nCONFIDENCE: 0.95\nREASONING: Gift card lure.",
        ))
        .await;

        let outcome = engine
            .moderate(ModerationRequest::new(
                ContentType::Message,
                "send me gift cards to prove your love",
                "user_1",
            ))
            .await
            .unwrap();

        assert_eq!(outcome.case.decision, Decision::Rejected);
        assert_eq!(outcome.case.violation_type, Some(ViolationType::Scams));
        assert!(outcome.action.is_some());
        assert!(outcome.queue_item_id.is_none());
        assert!((outcome.case.risk_score.unwrap() - 0.76).abs() < 1e-9);

        let trail = engine.audit_trail(&outcome.case.id).await.unwrap();
        let actions: Vec<_> = trail.iter().map(|e| e.action.as_str()).collect();
        assert!(actions.contains(&"case_created"));
        assert!(actions.contains(&"decision_made"));
        assert!(actions.contains(&"action_executed"));
        assert!(actions.contains(&"user_notification"));

        // the rejection is now precedent for the next run
        let history = engine.ledger.user_history("user_1", 5).await.unwrap();
        assert_eq!(history.confirmed_violations, 1);
    }

    #[tokio::test]
    async fn test_clean_content_approved() {
        let engine = engine_with(ScriptedProvider::always(
            "VIOLATION: no\nCONFIDENCE: 0.96\nREASONING: Friendly chat.",
        ))
        .await;

        let outcome = engine
            .moderate(ModerationRequest::new(ContentType::Message, "hi, nice profile!", "user_2"))
            .await
            .unwrap();

        assert_eq!(outcome.case.decision, Decision::Approved);
        assert_eq!(outcome.case.risk_score, Some(0.0));
        assert!(outcome.action.is_none());
        assert!(outcome.queue_item_id.is_none());
    }

    #[tokio::test]
    async fn test_provider_failure_escalates_instead_of_erroring() {
        let engine = engine_with(ScriptedProvider::failing("provider down")).await;

        let outcome = engine
            .moderate(ModerationRequest::new(ContentType::Photo, "some photo caption", "user_3"))
            .await
            .unwrap();

        assert_eq!(outcome.case.decision, Decision::Escalated);
        let queue_id = outcome.queue_item_id.unwrap();
        let item = engine.ledger.get_queue_item(&queue_id).await.unwrap().unwrap();
        assert_eq!(item.priority, QueuePriority::Medium);
    }

    #[tokio::test]
    async fn test_invalid_input_rejected_before_persistence() {
        let engine = engine_with(ScriptedProvider::always("irrelevant")).await;

        let err = engine
            .moderate(ModerationRequest::new(ContentType::Message, "   ", "user_4"))
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::Validation(_)));

        let stats = engine.statistics().await.unwrap();
        assert_eq!(stats.total_cases, 0);
    }

    #[tokio::test]
    async fn test_idempotent_retry_reuses_case() {
        let engine = engine_with(ScriptedProvider::always(
            "VIOLATION: no\nCONFIDENCE: 0.9\nREASONING: Fine.",
        ))
        .await;

        let mut request = ModerationRequest::new(ContentType::Bio, "I like hiking", "user_5");
        request.case_id = Some("case_retry".to_string());

        engine.moderate(request.clone()).await.unwrap();
        engine.moderate(request).await.unwrap();

        let stats = engine.statistics().await.unwrap();
        assert_eq!(stats.total_cases, 1);

        let trail = engine.audit_trail("case_retry").await.unwrap();
        let created = trail.iter().filter(|e| e.action == "case_created").count();
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn test_idempotent_retry_keeps_single_violation() {
        let engine = engine_with(ScriptedProvider::always(
            "VIOLATION: yes\nTYPE: scams\nSEVERITY: high\nCONFIDENCE: 0.95\nREASONING: Deposit scam.",
        ))
        .await;

        let mut request =
            ModerationRequest::new(ContentType::Message, "wire me the deposit first", "user_14");
        request.case_id = Some("case_retry_reject".to_string());

        engine.moderate(request.clone()).await.unwrap();
        let replayed = engine.moderate(request).await.unwrap();
        assert_eq!(replayed.case.decision, Decision::Rejected);

        // one case, one violation: the retry must not push the user toward
        // the repeat-offender threshold
        let history = engine.ledger.user_history("user_14", 5).await.unwrap();
        assert_eq!(history.total_cases, 1);
        assert_eq!(history.confirmed_violations, 1);

        let trail = engine.audit_trail("case_retry_reject").await.unwrap();
        let decisions = trail.iter().filter(|e| e.action == "decision_made").count();
        assert_eq!(decisions, 1);
    }

    #[tokio::test]
    async fn test_mandatory_review_category_escalates_urgent() {
        let engine = engine_with(ScriptedProvider::always(
            "VIOLATION: yes\nTYPE: age_verification\nSEVERITY: high\nCONFIDENCE: 0.99\nREASONING: Age claim in doubt.",
        ))
        .await;

        let outcome = engine
            .moderate(ModerationRequest::new(ContentType::Profile, "profile text", "user_6"))
            .await
            .unwrap();

        assert_eq!(outcome.case.decision, Decision::Escalated);
        let item = engine
            .ledger
            .get_queue_item(&outcome.queue_item_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.priority, QueuePriority::Urgent);
    }

    #[tokio::test]
    async fn test_appeal_overturn_end_to_end() {
        let engine = engine_with(
            ScriptedProvider::new([
                "VIOLATION: yes\nTYPE: harassment\nSEVERITY: medium\nCONFIDENCE: 0.92\nREASONING: Insult.",
                "NEW_EVIDENCE_SCORE: 0.9\nPOLICY_SCORE: 0.8\nEXPLANATION_SCORE: 0.8\nHISTORY_SCORE: 0.7\nREASONING: Context shows banter between friends.",
            ]),
        )
        .await;

        let moderated = engine
            .moderate(ModerationRequest::new(ContentType::Message, "you absolute muppet", "user_7"))
            .await
            .unwrap();
        assert_eq!(moderated.case.decision, Decision::Rejected);

        let outcome = engine
            .appeal(AppealRequest {
                case_id: moderated.case.id.clone(),
                user_explanation: "we are old friends, this is banter".to_string(),
                new_evidence: Some("screenshot of the full conversation".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(outcome.decision, AppealDecision::Overturned);
        assert!(outcome.weighted_score > 0.7);

        let case = engine.get_case(&moderated.case.id).await.unwrap().unwrap();
        assert_eq!(case.decision, Decision::Approved);
    }

    #[tokio::test]
    async fn test_appeal_on_pending_case_is_invalid_state() {
        let engine = engine_with(ScriptedProvider::always("x")).await;
        let ledger = engine.ledger.clone();

        // hand-create a pending case
        let now = chrono::Utc::now();
        ledger
            .create_case(&Case {
                id: "case_pending".to_string(),
                content_type: ContentType::Message,
                content: "x".to_string(),
                user_id: "user_8".to_string(),
                risk_score: None,
                decision: Decision::Pending,
                reasoning: String::new(),
                confidence: None,
                violation_type: None,
                severity: None,
                reviewed_by: "ai_agent".to_string(),
                metadata: serde_json::json!({}),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        let err = engine
            .appeal(AppealRequest {
                case_id: "case_pending".to_string(),
                user_explanation: "why?".to_string(),
                new_evidence: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_unparseable_appeal_reply_escalates() {
        let engine = engine_with(
            ScriptedProvider::new([
                "VIOLATION: yes\nTYPE: scams\nSEVERITY: high\nCONFIDENCE: 0.95\nREASONING: Scam.",
                "I cannot evaluate this appeal.",
            ]),
        )
        .await;

        let moderated = engine
            .moderate(ModerationRequest::new(ContentType::Message, "wire me money", "user_9"))
            .await
            .unwrap();

        let outcome = engine
            .appeal(AppealRequest {
                case_id: moderated.case.id,
                user_explanation: "this is a misunderstanding".to_string(),
                new_evidence: None,
            })
            .await
            .unwrap();

        // all-0.5 fail-safe scores land in the escalation band
        assert_eq!(outcome.decision, AppealDecision::Escalated);
        assert!((outcome.weighted_score - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_human_review_round_trip() {
        let engine = engine_with(ScriptedProvider::always(
            "VIOLATION: yes\nTYPE: harassment\nSEVERITY: high\nCONFIDENCE: 0.75\nREASONING: Possibly hostile.",
        ))
        .await;

        let outcome = engine
            .moderate(ModerationRequest::new(ContentType::Message, "watch your back", "user_10"))
            .await
            .unwrap();
        assert_eq!(outcome.case.decision, Decision::Escalated);
        let queue_id = outcome.queue_item_id.unwrap();

        engine.claim(&queue_id, "mod_carol").await.unwrap();
        engine
            .submit_review(
                &queue_id,
                "mod_carol",
                "clear threat in context",
                &ReviewOutcome::Case {
                    decision: Decision::Rejected,
                    action: Some(warden_core::types::PolicyAction::TemporaryBan),
                },
            )
            .await
            .unwrap();

        let case = engine.get_case(&outcome.case.id).await.unwrap().unwrap();
        assert_eq!(case.decision, Decision::Rejected);
        assert_eq!(case.reviewed_by, "mod_carol");

        let pending = engine.queue(Some(QueueStatus::Pending), 10).await.unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_policy_hot_swap_changes_routing() {
        let engine = engine_with(ScriptedProvider::always(
            "VIOLATION: no\nCONFIDENCE: 0.86\nREASONING: Fine.",
        ))
        .await;

        let outcome = engine
            .moderate(ModerationRequest::new(ContentType::Message, "hello", "user_11"))
            .await
            .unwrap();
        assert_eq!(outcome.case.decision, Decision::Approved);

        let mut strict = PolicyConfig::default();
        strict.thresholds.auto_approve = 0.95;
        engine.update_policy(strict).unwrap();

        let outcome = engine
            .moderate(ModerationRequest::new(ContentType::Message, "hello again", "user_11"))
            .await
            .unwrap();
        assert_eq!(outcome.case.decision, Decision::Escalated);
    }

    #[tokio::test]
    async fn test_warm_evidence_indexes_decided_cases() {
        let engine = engine_with(ScriptedProvider::always(
            "VIOLATION: yes\nTYPE: scams\nSEVERITY: critical\nCONFIDENCE: 0.97\nREASONING: Crypto scam.",
        ))
        .await;

        engine
            .moderate(ModerationRequest::new(ContentType::Message, "double your crypto today", "user_12"))
            .await
            .unwrap();

        // fresh index, as after a restart
        let fresh = Engine::builder(engine.ledger.clone(), Arc::new(ScriptedProvider::always("x")))
            .build()
            .unwrap();
        let indexed = fresh.warm_evidence(100).await.unwrap();
        assert_eq!(indexed, 1);
        assert_eq!(fresh.evidence.search_violations("crypto", 5).len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_severity_falls_back_to_medium() {
        let engine = engine_with(ScriptedProvider::always(
            "VIOLATION: yes\nTYPE: inappropriate\nSEVERITY: catastrophic\nCONFIDENCE: 0.95\nREASONING: Bad.",
        ))
        .await;

        let outcome = engine
            .moderate(ModerationRequest::new(ContentType::Message, "something", "user_13"))
            .await
            .unwrap();

        assert_eq!(outcome.case.severity, Some(Severity::Medium));
        assert_eq!(outcome.case.decision, Decision::Rejected);
    }
}
