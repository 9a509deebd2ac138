//! # warden-runtime
//!
//! Async orchestration for the warden decision engine: the classifier
//! gateway, the moderation and appeals workflows, the human-review
//! boundary, and the [`Engine`] that ties them to the ledger and evidence
//! indexes.
//!
//! ## Key Guarantees
//!
//! 1. **Always decides**: for syntactically valid input the moderation
//!    workflow returns a decision even when the classifier is down, at
//!    worst an escalation to a human
//! 2. **One seam for LLMs**: providers are only reached through the
//!    [`ClassifierGateway`]
//! 3. **Side effects never block decisions**: notification and enforcement
//!    are best-effort and audited
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use warden_runtime::{Engine, ModerationRequest};
//! use warden_runtime::providers::OpenAiProvider;
//! use warden_store::Ledger;
//!
//! let ledger = Ledger::connect("sqlite:warden.db").await?;
//! ledger.init().await?;
//! let engine = Engine::builder(ledger, Arc::new(OpenAiProvider::from_env()?)).build()?;
//! engine.warm_evidence(500).await?;
//!
//! let outcome = engine
//!     .moderate(ModerationRequest::new(ContentType::Message, text, user_id))
//!     .await?;
//! ```

pub mod collaborators;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod prompts;
pub mod providers;
pub mod workflow;

pub use collaborators::{ActionExecutor, AuditActionExecutor, AuditNotifier, Notifier};
pub use engine::{Engine, EngineBuilder};
pub use error::WardenError;
pub use gateway::ClassifierGateway;
pub use providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    ScriptedProvider,
};
pub use workflow::{AppealOutcome, AppealRequest, ModerationOutcome, ModerationRequest};
