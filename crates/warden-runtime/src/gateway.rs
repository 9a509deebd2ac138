//! The classifier gateway: the single boundary between workflows and the
//! external reasoning capability.
//!
//! The gateway builds prompts, applies a per-attempt timeout, retries with
//! exponential backoff, and parses replies tolerantly. It never surfaces a
//! provider failure to the workflow: when the reply cannot be obtained or
//! understood, the escalate-biased fail-safe result comes back instead, and
//! routing sends the case to a human.

use backon::{ExponentialBuilder, Retryable};
use std::sync::Arc;
use tracing::warn;

use warden_core::reply::{parse_appeal_scores, parse_classification};
use warden_core::types::{
    AppealScores, Case, ClassificationResult, ContentType, EvidenceMatch, UserHistory,
};

use crate::prompts;
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider, ProviderError};

pub struct ClassifierGateway {
    provider: Arc<dyn LlmProvider>,
    config: CompletionConfig,
    retry: ExponentialBuilder,
}

impl ClassifierGateway {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            config: CompletionConfig::default(),
            // 3 attempts total
            retry: ExponentialBuilder::default().with_max_times(2),
        }
    }

    pub fn with_config(mut self, config: CompletionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_retry(mut self, retry: ExponentialBuilder) -> Self {
        self.retry = retry;
        self
    }

    /// Classify content. Infallible: provider or parse trouble degrades to
    /// the fail-safe result.
    pub async fn classify(
        &self,
        content: &str,
        content_type: ContentType,
        similar_violations: &[EvidenceMatch],
        similar_cases: &[EvidenceMatch],
        history: &UserHistory,
    ) -> ClassificationResult {
        let messages = vec![
            ChatMessage::system(prompts::MODERATION_SYSTEM_PROMPT),
            ChatMessage::user(prompts::build_moderation_prompt(
                content,
                content_type,
                similar_violations,
                similar_cases,
                history,
            )),
        ];

        match self.complete_with_retry(messages).await {
            Ok(reply) => parse_classification(&reply),
            Err(err) => {
                warn!(provider = self.provider.name(), error = %err, "classification failed, using fail-safe");
                ClassificationResult::fail_safe(format!("Provider error: {err}"))
            }
        }
    }

    /// Score an appeal. Infallible in the same way as [`classify`].
    ///
    /// [`classify`]: Self::classify
    pub async fn evaluate_appeal(
        &self,
        case: &Case,
        user_explanation: &str,
        new_evidence: Option<&str>,
        history: &UserHistory,
        precedents: &[EvidenceMatch],
    ) -> AppealScores {
        let messages = vec![
            ChatMessage::system(prompts::APPEAL_SYSTEM_PROMPT),
            ChatMessage::user(prompts::build_appeal_prompt(
                case,
                user_explanation,
                new_evidence,
                history,
                precedents,
            )),
        ];

        match self.complete_with_retry(messages).await {
            Ok(reply) => parse_appeal_scores(&reply),
            Err(err) => {
                warn!(provider = self.provider.name(), error = %err, "appeal evaluation failed, using fail-safe");
                AppealScores::fail_safe(format!("Provider error: {err}"))
            }
        }
    }

    async fn complete_with_retry(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<String, ProviderError> {
        let attempt = || {
            let messages = messages.clone();
            async move {
                let fut = self.provider.complete(messages, &self.config);
                match tokio::time::timeout(self.config.timeout, fut).await {
                    Ok(result) => result.map(|r| r.content),
                    Err(_) => Err(ProviderError::Timeout(self.config.timeout)),
                }
            }
        };

        attempt
            .retry(self.retry)
            .notify(|err: &ProviderError, dur| {
                warn!(error = %err, backoff = ?dur, "provider attempt failed, retrying");
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ScriptedProvider;
    use std::time::Duration;

    fn fast_retry() -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(1))
            .with_max_times(2)
    }

    fn gateway(provider: ScriptedProvider) -> (Arc<ScriptedProvider>, ClassifierGateway) {
        let provider = Arc::new(provider);
        let gateway =
            ClassifierGateway::new(provider.clone() as Arc<dyn LlmProvider>).with_retry(fast_retry());
        (provider, gateway)
    }

    #[tokio::test]
    async fn test_classify_parses_reply() {
        let (_, gateway) = gateway(ScriptedProvider::always(
            "VIOLATION: yes\nTYPE: scams\nSEVERITY: high\nCONFIDENCE: 0.93\nREASONING: Payment lure.",
        ));

        let result = gateway
            .classify("send gift cards", ContentType::Message, &[], &[], &UserHistory::default())
            .await;

        assert!(result.violated);
        assert_eq!(result.confidence, 0.93);
    }

    #[tokio::test]
    async fn test_classify_retries_then_recovers() {
        let (provider, gateway) = gateway(
            ScriptedProvider::failing("transient")
                .then_reply("VIOLATION: no\nCONFIDENCE: 0.9\nREASONING: Fine."),
        );

        let result = gateway
            .classify("hello", ContentType::Message, &[], &[], &UserHistory::default())
            .await;

        assert!(!result.violated);
        assert_eq!(result.confidence, 0.9);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_safe() {
        let (provider, gateway) = gateway(ScriptedProvider::failing("down"));

        let result = gateway
            .classify("hello", ContentType::Message, &[], &[], &UserHistory::default())
            .await;

        assert_eq!(result.confidence, 0.5);
        assert!(!result.violated);
        assert!(result.reasoning.contains("could not be parsed") || result.reasoning.contains("Provider error"));
        // 1 initial + 2 retries
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_appeal_evaluation_fail_safe_on_garbage() {
        let (_, gateway) = gateway(ScriptedProvider::always("I refuse to answer in the format."));
        let case = sample_case();

        let scores = gateway
            .evaluate_appeal(&case, "it was a joke", None, &UserHistory::default(), &[])
            .await;

        assert_eq!(scores.new_evidence, 0.5);
        assert_eq!(scores.user_history, 0.5);
    }

    fn sample_case() -> Case {
        use chrono::Utc;
        use warden_core::types::Decision;
        let now = Utc::now();
        Case {
            id: "case_1".to_string(),
            content_type: ContentType::Message,
            content: "content".to_string(),
            user_id: "user_1".to_string(),
            risk_score: Some(0.9),
            decision: Decision::Rejected,
            reasoning: "scam".to_string(),
            confidence: Some(0.95),
            violation_type: None,
            severity: None,
            reviewed_by: "ai_agent".to_string(),
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }
}
