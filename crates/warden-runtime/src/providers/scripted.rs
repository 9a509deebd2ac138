//! Deterministic provider for tests and offline runs.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use super::{ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError};

/// Replays a fixed sequence of replies (or errors), one per `complete` call.
///
/// When the script runs out, the last entry repeats. Also records every
/// prompt it receives so tests can assert on prompt construction.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, String>>>,
    last: Mutex<Option<Result<String, String>>>,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedProvider {
    pub fn new(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            last: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A provider that always replies with the same text.
    pub fn always(reply: impl Into<String>) -> Self {
        Self::new([reply.into()])
    }

    /// A provider whose every call fails.
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            script: Mutex::new(VecDeque::from([Err(message)])),
            last: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Push an error response onto the script.
    pub fn then_error(self, message: impl Into<String>) -> Self {
        self.script.lock().push_back(Err(message.into()));
        self
    }

    /// Push a successful reply onto the script.
    pub fn then_reply(self, reply: impl Into<String>) -> Self {
        self.script.lock().push_back(Ok(reply.into()));
        self
    }

    /// Prompts received so far.
    pub fn recorded_prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        self.prompts.lock().push(messages);

        let entry = {
            let mut script = self.script.lock();
            match script.pop_front() {
                Some(entry) => {
                    *self.last.lock() = Some(entry.clone());
                    entry
                }
                None => self
                    .last
                    .lock()
                    .clone()
                    .unwrap_or(Err("script exhausted".to_string())),
            }
        };

        match entry {
            Ok(content) => Ok(CompletionResponse {
                content,
                model: config.model.clone(),
                stop_reason: Some("stop".to_string()),
            }),
            Err(message) => Err(ProviderError::HttpError(message)),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_replays_in_order_then_repeats() {
        let provider = ScriptedProvider::new(["first", "second"]);
        let config = CompletionConfig::default();

        let a = provider.complete(vec![ChatMessage::user("x")], &config).await.unwrap();
        let b = provider.complete(vec![ChatMessage::user("y")], &config).await.unwrap();
        let c = provider.complete(vec![ChatMessage::user("z")], &config).await.unwrap();

        assert_eq!(a.content, "first");
        assert_eq!(b.content, "second");
        assert_eq!(c.content, "second");
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_failing_provider_errors() {
        let provider = ScriptedProvider::failing("boom");
        let err = provider
            .complete(vec![ChatMessage::user("x")], &CompletionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::HttpError(_)));
    }

    #[tokio::test]
    async fn test_error_then_recovery() {
        let provider = ScriptedProvider::failing("boom").then_reply("ok now");
        let config = CompletionConfig::default();

        assert!(provider.complete(vec![ChatMessage::user("a")], &config).await.is_err());
        let reply = provider.complete(vec![ChatMessage::user("b")], &config).await.unwrap();
        assert_eq!(reply.content, "ok now");
    }
}
