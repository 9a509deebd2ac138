//! `warden` command line: database init, one-shot moderation, appeals,
//! review queue operations, and statistics.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use warden_core::types::{AppealDecision, ContentType, Decision, QueueStatus};
use warden_core::PolicyConfig;
use warden_runtime::providers::OpenAiProvider;
use warden_runtime::{AppealRequest, Engine, ModerationRequest};
use warden_store::{Ledger, ReviewOutcome};

#[derive(Parser)]
#[command(name = "warden", version, about = "Trust & safety moderation decision engine")]
struct Cli {
    /// SQLite database URL
    #[arg(long, global = true, default_value = "sqlite:warden.db")]
    db: String,

    /// Policy configuration YAML; defaults apply when omitted
    #[arg(long, global = true)]
    policy: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database schema
    Init,

    /// Moderate one unit of content
    Moderate {
        #[arg(long)]
        content_type: ContentType,
        #[arg(long)]
        user: String,
        /// Content text; reads stdin when omitted
        #[arg(long)]
        content: Option<String>,
        /// Reuse a case id for idempotent retries
        #[arg(long)]
        case_id: Option<String>,
    },

    /// File an appeal against a decided case
    Appeal {
        #[arg(long)]
        case_id: String,
        #[arg(long)]
        explanation: String,
        #[arg(long)]
        evidence: Option<String>,
    },

    /// Review queue operations
    #[command(subcommand)]
    Queue(QueueCommand),

    /// Show the audit trail for a case
    Audit {
        #[arg(long)]
        case_id: String,
    },

    /// Aggregate statistics
    Stats,
}

#[derive(Subcommand)]
enum QueueCommand {
    /// List open queue items
    List {
        #[arg(long)]
        status: Option<QueueStatus>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    /// Claim an item for review
    Claim {
        #[arg(long)]
        item: String,
        #[arg(long)]
        moderator: String,
    },

    /// Submit a verdict for a claimed item
    Submit {
        #[arg(long)]
        item: String,
        #[arg(long)]
        moderator: String,
        #[arg(long)]
        reasoning: String,
        /// Case verdict (approved|rejected), for case items
        #[arg(long)]
        decision: Option<Decision>,
        /// Appeal verdict (upheld|overturned), for appeal items
        #[arg(long)]
        appeal_decision: Option<AppealDecision>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    let ledger = Ledger::connect(&cli.db)
        .await
        .with_context(|| format!("failed to open database '{}'", cli.db))?;

    if let Command::Init = cli.command {
        ledger.init().await?;
        println!("database initialized at {}", cli.db);
        return Ok(());
    }

    let policy = match &cli.policy {
        Some(path) => {
            PolicyConfig::from_yaml_file(path).with_context(|| format!("failed to load policy '{path}'"))?
        }
        None => PolicyConfig::default(),
    };

    match cli.command {
        Command::Init => unreachable!(),

        Command::Moderate { content_type, user, content, case_id } => {
            let content = match content {
                Some(text) => text,
                None => std::io::read_to_string(std::io::stdin())?,
            };
            let engine = build_engine(ledger, policy)?;
            engine.warm_evidence(500).await?;

            let mut request = ModerationRequest::new(content_type, content, user);
            request.case_id = case_id;
            let outcome = engine.moderate(request).await?;

            println!("case:       {}", outcome.case.id);
            println!("decision:   {}", outcome.case.decision);
            if let Some(risk) = outcome.case.risk_score {
                println!("risk score: {risk:.2}");
            }
            if let Some(vt) = outcome.case.violation_type {
                println!("violation:  {vt}");
            }
            if let Some(action) = outcome.action {
                println!("action:     {action}");
            }
            if let Some(queue_id) = outcome.queue_item_id {
                println!("queued:     {queue_id}");
            }
            println!("reasoning:  {}", outcome.case.reasoning);
        }

        Command::Appeal { case_id, explanation, evidence } => {
            let engine = build_engine(ledger, policy)?;
            engine.warm_evidence(500).await?;

            let outcome = engine
                .appeal(AppealRequest {
                    case_id,
                    user_explanation: explanation,
                    new_evidence: evidence,
                })
                .await?;

            println!("appeal:   {}", outcome.appeal_id);
            println!("decision: {}", outcome.decision);
            println!("score:    {:.2}", outcome.weighted_score);
            println!("queued:   {}", outcome.queue_item_id);
        }

        Command::Queue(queue) => match queue {
            QueueCommand::List { status, limit } => {
                let items = ledger.list_queue(status, limit).await?;
                if items.is_empty() {
                    println!("queue is empty");
                }
                for item in items {
                    let subject = item
                        .case_id
                        .as_deref()
                        .or(item.appeal_id.as_deref())
                        .unwrap_or("?");
                    println!(
                        "{}  {:8}  {:10}  {}  {}",
                        item.id,
                        item.priority.as_str(),
                        item.status.as_str(),
                        subject,
                        item.assigned_to.as_deref().unwrap_or("-"),
                    );
                }
            }
            QueueCommand::Claim { item, moderator } => {
                let claimed = ledger.claim(&item, &moderator).await?;
                let subject = claimed
                    .case_id
                    .as_deref()
                    .or(claimed.appeal_id.as_deref())
                    .unwrap_or("?");
                println!("claimed {} ({subject}) for {moderator}", claimed.id);
            }
            QueueCommand::Submit { item, moderator, reasoning, decision, appeal_decision } => {
                let outcome = match (decision, appeal_decision) {
                    (Some(decision), None) => ReviewOutcome::Case { decision, action: None },
                    (None, Some(decision)) => ReviewOutcome::Appeal { decision },
                    _ => bail!("provide exactly one of --decision or --appeal-decision"),
                };
                ledger.submit_decision(&item, &moderator, &reasoning, &outcome).await?;
                println!("completed {item}");
            }
        },

        Command::Audit { case_id } => {
            let events = ledger.audit_trail(&case_id).await?;
            if events.is_empty() {
                println!("no audit events for {case_id}");
            }
            for event in events {
                println!(
                    "{}  {:18}  {:12}  {}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    event.action,
                    event.actor,
                    event.details.map(|d| d.to_string()).unwrap_or_default(),
                );
            }
        }

        Command::Stats => {
            let stats = ledger.statistics().await?;
            println!("total cases:     {}", stats.total_cases);
            println!("  approved:      {}", stats.approved);
            println!("  rejected:      {}", stats.rejected);
            println!("  escalated:     {}", stats.escalated);
            println!("  pending:       {}", stats.pending);
            println!("last 24h:        {}", stats.cases_last_24h);
            println!("pending appeals: {}", stats.pending_appeals);
            println!("queue depth:     {}", stats.queue_depth);
        }
    }

    Ok(())
}

fn build_engine(ledger: Ledger, policy: PolicyConfig) -> Result<Engine> {
    let provider = OpenAiProvider::from_env()
        .context("OPENAI_API_KEY is required for moderation and appeals")?;
    Ok(Engine::builder(ledger, Arc::new(provider)).policy(policy).build()?)
}
