//! The case ledger: SQLite-backed source of truth for cases, appeals, the
//! review queue, per-user violation history, the append-only audit log, and
//! metric snapshots.
//!
//! Every write the engine treats as one logical step runs in one sqlx
//! transaction here, always paired with its audit event. Entity mutation
//! without an audit event is not offered by this API.

use chrono::{Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use tracing::debug;

use warden_core::types::{
    Appeal, AppealDecision, AuditEvent, Case, ContentType, Decision, MetricSnapshot, PolicyAction,
    QueuePriority, QueueStatus, ReviewQueueItem, Severity, UserHistory, ViolationType,
};

use crate::error::StoreError;
use crate::id::new_id;

const SCHEMA: &str = include_str!("schema.sql");

const CASE_COLUMNS: &str = "id, content_type, content, user_id, risk_score, decision, reasoning, \
    confidence, violation_type, severity, reviewed_by, metadata, created_at, updated_at";

const APPEAL_COLUMNS: &str = "id, case_id, user_explanation, new_evidence, appeal_decision, \
    appeal_reasoning, appeal_confidence, resolved_by, created_at, resolved_at";

const QUEUE_COLUMNS: &str = "id, case_id, appeal_id, priority, assigned_to, status, created_at, \
    assigned_at, completed_at";

const AUDIT_COLUMNS: &str = "id, case_id, appeal_id, action, actor, details, timestamp";

/// Everything the decision step persists for one case, atomically.
#[derive(Debug, Clone)]
pub struct DecisionRecord {
    pub case_id: String,
    pub decision: Decision,
    pub reasoning: String,
    pub confidence: Option<f64>,
    pub risk_score: Option<f64>,
    pub violation_type: Option<ViolationType>,
    pub severity: Option<Severity>,
    pub reviewed_by: String,
    /// Present on escalation: a pending review item is enqueued.
    pub queue_priority: Option<QueuePriority>,
    /// True when the decision confirms a violation for history purposes.
    pub record_violation: bool,
    /// Extra structured context for the audit event (fired rule, action).
    pub audit_details: Option<serde_json::Value>,
}

/// A moderator's verdict on a claimed queue item.
#[derive(Debug, Clone)]
pub enum ReviewOutcome {
    /// For case items: the final case decision and optional enforcement
    /// action to note in the audit trail.
    Case {
        decision: Decision,
        action: Option<PolicyAction>,
    },
    /// For appeal items: uphold or overturn.
    Appeal { decision: AppealDecision },
}

/// Aggregate counters exposed to operators.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Statistics {
    pub total_cases: i64,
    pub approved: i64,
    pub rejected: i64,
    pub escalated: i64,
    pub pending: i64,
    pub cases_last_24h: i64,
    pub pending_appeals: i64,
    pub queue_depth: i64,
}

/// Handle over the SQLite pool. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Ledger {
    pool: SqlitePool,
}

impl Ledger {
    /// Open (creating if needed) the database at `url`, e.g.
    /// `sqlite:warden.db` or `sqlite::memory:`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply the embedded schema. Safe to call repeatedly.
    pub async fn init(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        debug!("ledger schema applied");
        Ok(())
    }

    // --- cases ---

    /// Insert a new pending case together with its `case_created` audit
    /// event. Idempotent per case id: replaying the same id is a no-op and
    /// produces no duplicate audit event.
    pub async fn create_case(&self, case: &Case) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO cases
                (id, content_type, content, user_id, risk_score, decision, reasoning,
                 confidence, violation_type, severity, reviewed_by, metadata,
                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&case.id)
        .bind(case.content_type.as_str())
        .bind(&case.content)
        .bind(&case.user_id)
        .bind(case.risk_score)
        .bind(case.decision.as_str())
        .bind(&case.reasoning)
        .bind(case.confidence)
        .bind(case.violation_type.map(|v| v.as_str()))
        .bind(case.severity.map(|s| s.as_str()))
        .bind(&case.reviewed_by)
        .bind(case.metadata.to_string())
        .bind(case.created_at)
        .bind(case.updated_at)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if inserted {
            append_audit(
                &mut tx,
                Some(&case.id),
                None,
                "case_created",
                "system",
                Some(serde_json::json!({
                    "content_type": case.content_type.as_str(),
                    "user_id": case.user_id,
                })),
            )
            .await?;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn get_case(&self, case_id: &str) -> Result<Option<Case>, StoreError> {
        let query = format!("SELECT {CASE_COLUMNS} FROM cases WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(case_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| case_from_row(&r)).transpose()
    }

    /// Persist the outcome of the decision step: case mutation, audit event,
    /// and the conditional queue item / violation row, in one transaction.
    ///
    /// Returns the queue item id when one was created. Idempotent per case:
    /// replaying the write against an already-decided case (a retried run
    /// with the same case id) mutates nothing and returns the still-open
    /// queue item, if any.
    pub async fn record_decision(
        &self,
        record: &DecisionRecord,
    ) -> Result<Option<String>, StoreError> {
        // severity travels with violation_type or not at all
        let violation_type = record.violation_type;
        let severity = violation_type.and(record.severity);

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let case_row = fetch_case_tx(&mut tx, &record.case_id).await?;
        let Some(case) = case_row else {
            return Err(StoreError::NotFound {
                entity: "case",
                id: record.case_id.clone(),
            });
        };

        // replay of a committed decision: no second audit event, queue item,
        // or violation row
        if case.decision != Decision::Pending {
            let existing: Option<String> = sqlx::query_scalar(
                "SELECT id FROM review_queue WHERE case_id = ? AND status != 'completed' LIMIT 1",
            )
            .bind(&record.case_id)
            .fetch_optional(&mut *tx)
            .await?;
            tx.commit().await?;
            return Ok(existing);
        }

        sqlx::query(
            "UPDATE cases SET decision = ?, reasoning = ?, confidence = ?, risk_score = ?,
                violation_type = ?, severity = ?, reviewed_by = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(record.decision.as_str())
        .bind(&record.reasoning)
        .bind(record.confidence)
        .bind(record.risk_score)
        .bind(violation_type.map(|v| v.as_str()))
        .bind(severity.map(|s| s.as_str()))
        .bind(&record.reviewed_by)
        .bind(now)
        .bind(&record.case_id)
        .execute(&mut *tx)
        .await?;

        append_audit(
            &mut tx,
            Some(&record.case_id),
            None,
            "decision_made",
            &record.reviewed_by,
            Some(serde_json::json!({
                "previous_decision": case.decision.as_str(),
                "decision": record.decision.as_str(),
                "confidence": record.confidence,
                "risk_score": record.risk_score,
                "extra": record.audit_details,
            })),
        )
        .await?;

        let mut queue_id = None;
        if let Some(priority) = record.queue_priority {
            let id = new_id("queue");
            sqlx::query(
                "INSERT INTO review_queue (id, case_id, priority, status, created_at)
                 VALUES (?, ?, ?, 'pending', ?)",
            )
            .bind(&id)
            .bind(&record.case_id)
            .bind(priority.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;
            queue_id = Some(id);
        }

        if record.record_violation {
            if let (Some(vt), Some(sev)) = (violation_type, severity) {
                sqlx::query(
                    "INSERT OR IGNORE INTO user_violations
                        (id, user_id, case_id, violation_type, severity, created_at)
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(new_id("violation"))
                .bind(&case.user_id)
                .bind(&record.case_id)
                .bind(vt.as_str())
                .bind(sev.as_str())
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(queue_id)
    }

    /// Most recently decided cases, newest first. Used to warm the evidence
    /// indexes at startup.
    pub async fn decided_cases(&self, limit: u32) -> Result<Vec<Case>, StoreError> {
        let query = format!(
            "SELECT {CASE_COLUMNS} FROM cases WHERE decision != 'pending'
             ORDER BY updated_at DESC LIMIT ?"
        );
        let rows = sqlx::query(&query)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(case_from_row).collect()
    }

    /// Prior adjudications for a user: totals plus the most recent cases,
    /// newest first.
    pub async fn user_history(
        &self,
        user_id: &str,
        recent_limit: u32,
    ) -> Result<UserHistory, StoreError> {
        let total_cases: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cases WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        let confirmed_violations: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM user_violations WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        let query = format!(
            "SELECT {CASE_COLUMNS} FROM cases WHERE user_id = ?
             ORDER BY created_at DESC LIMIT ?"
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(recent_limit as i64)
            .fetch_all(&self.pool)
            .await?;
        let recent_cases = rows
            .iter()
            .map(case_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(UserHistory {
            user_id: user_id.to_string(),
            total_cases: total_cases as u32,
            confirmed_violations: confirmed_violations as u32,
            recent_cases,
        })
    }

    // --- appeals ---

    /// Insert a new pending appeal, its `appeal_filed` audit event, and a
    /// medium-priority review item so a human sees every contested case.
    pub async fn create_appeal(&self, appeal: &Appeal) -> Result<String, StoreError> {
        let mut tx = self.pool.begin().await?;

        if fetch_case_tx(&mut tx, &appeal.case_id).await?.is_none() {
            return Err(StoreError::NotFound {
                entity: "case",
                id: appeal.case_id.clone(),
            });
        }

        sqlx::query(
            "INSERT INTO appeals
                (id, case_id, user_explanation, new_evidence, appeal_decision, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&appeal.id)
        .bind(&appeal.case_id)
        .bind(&appeal.user_explanation)
        .bind(&appeal.new_evidence)
        .bind(appeal.appeal_decision.as_str())
        .bind(appeal.created_at)
        .execute(&mut *tx)
        .await?;

        append_audit(
            &mut tx,
            Some(&appeal.case_id),
            Some(&appeal.id),
            "appeal_filed",
            "user",
            Some(serde_json::json!({ "has_new_evidence": appeal.new_evidence.is_some() })),
        )
        .await?;

        let queue_id = new_id("queue");
        sqlx::query(
            "INSERT INTO review_queue (id, appeal_id, priority, status, created_at)
             VALUES (?, ?, 'medium', 'pending', ?)",
        )
        .bind(&queue_id)
        .bind(&appeal.id)
        .bind(appeal.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(queue_id)
    }

    pub async fn get_appeal(&self, appeal_id: &str) -> Result<Option<Appeal>, StoreError> {
        let query = format!("SELECT {APPEAL_COLUMNS} FROM appeals WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(appeal_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| appeal_from_row(&r)).transpose()
    }

    /// Resolve an appeal. On overturn the case flips to approved in the same
    /// transaction, with the old and new decisions captured in the audit
    /// event. On escalation an urgent review item is enqueued.
    pub async fn resolve_appeal(
        &self,
        appeal_id: &str,
        decision: AppealDecision,
        reasoning: &str,
        confidence: Option<f64>,
        resolved_by: &str,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let query = format!("SELECT {APPEAL_COLUMNS} FROM appeals WHERE id = ?");
        let Some(row) = sqlx::query(&query)
            .bind(appeal_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Err(StoreError::NotFound {
                entity: "appeal",
                id: appeal_id.to_string(),
            });
        };
        let appeal = appeal_from_row(&row)?;

        if appeal.appeal_decision != AppealDecision::Pending {
            return Err(StoreError::InvalidState {
                entity: "appeal",
                id: appeal_id.to_string(),
                state: appeal.appeal_decision.as_str().to_string(),
            });
        }

        sqlx::query(
            "UPDATE appeals SET appeal_decision = ?, appeal_reasoning = ?,
                appeal_confidence = ?, resolved_by = ?, resolved_at = ?
             WHERE id = ?",
        )
        .bind(decision.as_str())
        .bind(reasoning)
        .bind(confidence)
        .bind(resolved_by)
        .bind(now)
        .bind(appeal_id)
        .execute(&mut *tx)
        .await?;

        let mut details = serde_json::json!({
            "appeal_decision": decision.as_str(),
            "confidence": confidence,
        });

        if decision == AppealDecision::Overturned {
            let case = fetch_case_tx(&mut tx, &appeal.case_id).await?.ok_or_else(|| {
                StoreError::NotFound {
                    entity: "case",
                    id: appeal.case_id.clone(),
                }
            })?;
            sqlx::query(
                "UPDATE cases SET decision = 'approved', reasoning = ?, reviewed_by = ?,
                    updated_at = ?
                 WHERE id = ?",
            )
            .bind(format!("Overturned on appeal: {reasoning}"))
            .bind(resolved_by)
            .bind(now)
            .bind(&appeal.case_id)
            .execute(&mut *tx)
            .await?;
            details["previous_case_decision"] =
                serde_json::Value::String(case.decision.as_str().to_string());
            details["new_case_decision"] = serde_json::Value::String("approved".to_string());
        }

        if decision == AppealDecision::Escalated {
            sqlx::query(
                "INSERT INTO review_queue (id, appeal_id, priority, status, created_at)
                 VALUES (?, ?, 'urgent', 'pending', ?)",
            )
            .bind(new_id("queue"))
            .bind(appeal_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        append_audit(
            &mut tx,
            Some(&appeal.case_id),
            Some(appeal_id),
            "appeal_resolved",
            resolved_by,
            Some(details),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    // --- review queue ---

    pub async fn get_queue_item(&self, item_id: &str) -> Result<Option<ReviewQueueItem>, StoreError> {
        let query = format!("SELECT {QUEUE_COLUMNS} FROM review_queue WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| queue_item_from_row(&r)).transpose()
    }

    /// Pending and in-review items, most urgent first, oldest first within a
    /// priority.
    pub async fn list_queue(
        &self,
        status: Option<QueueStatus>,
        limit: u32,
    ) -> Result<Vec<ReviewQueueItem>, StoreError> {
        let order = "ORDER BY CASE priority
                WHEN 'urgent' THEN 0 WHEN 'high' THEN 1 WHEN 'medium' THEN 2 ELSE 3 END,
             created_at ASC
             LIMIT ?";
        let rows = match status {
            Some(status) => {
                let query = format!(
                    "SELECT {QUEUE_COLUMNS} FROM review_queue WHERE status = ? {order}"
                );
                sqlx::query(&query)
                    .bind(status.as_str())
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let query = format!(
                    "SELECT {QUEUE_COLUMNS} FROM review_queue WHERE status != 'completed' {order}"
                );
                sqlx::query(&query)
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(queue_item_from_row).collect()
    }

    /// Claim a pending item for a moderator.
    ///
    /// Compare-and-set on `status = 'pending'`, so two concurrent claims
    /// cannot both win. Re-claiming an item already held by the same
    /// moderator is an idempotent no-op.
    pub async fn claim(&self, item_id: &str, moderator_id: &str) -> Result<ReviewQueueItem, StoreError> {
        let now = Utc::now();
        let updated = sqlx::query(
            "UPDATE review_queue SET status = 'in_review', assigned_to = ?, assigned_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(moderator_id)
        .bind(now)
        .bind(item_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let item = self.get_queue_item(item_id).await?.ok_or_else(|| StoreError::NotFound {
            entity: "review queue item",
            id: item_id.to_string(),
        })?;

        if updated > 0 {
            append_claim_audit(&self.pool, &item, moderator_id).await?;
            return Ok(item);
        }

        match item.status {
            QueueStatus::InReview if item.assigned_to.as_deref() == Some(moderator_id) => Ok(item),
            QueueStatus::InReview => Err(StoreError::AlreadyClaimed {
                id: item_id.to_string(),
                assigned_to: item.assigned_to.unwrap_or_default(),
            }),
            _ => Err(StoreError::InvalidState {
                entity: "review queue item",
                id: item_id.to_string(),
                state: item.status.as_str().to_string(),
            }),
        }
    }

    /// Complete a claimed item with the moderator's verdict. Queue
    /// completion, the case/appeal mutation, and the audit event commit
    /// together or not at all. Verdicts must be terminal: approved/rejected
    /// for cases, upheld/overturned for appeals.
    pub async fn submit_decision(
        &self,
        item_id: &str,
        moderator_id: &str,
        reasoning: &str,
        outcome: &ReviewOutcome,
    ) -> Result<(), StoreError> {
        if reasoning.trim().is_empty() {
            return Err(StoreError::Validation(
                "review decision requires non-empty reasoning".to_string(),
            ));
        }
        match outcome {
            ReviewOutcome::Case { decision, .. }
                if !matches!(decision, Decision::Approved | Decision::Rejected) =>
            {
                return Err(StoreError::Validation(format!(
                    "case review verdict must be approved or rejected, got '{decision}'"
                )));
            }
            ReviewOutcome::Appeal { decision }
                if !matches!(decision, AppealDecision::Upheld | AppealDecision::Overturned) =>
            {
                return Err(StoreError::Validation(format!(
                    "appeal review verdict must be upheld or overturned, got '{decision}'"
                )));
            }
            _ => {}
        }

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let query = format!("SELECT {QUEUE_COLUMNS} FROM review_queue WHERE id = ?");
        let Some(row) = sqlx::query(&query)
            .bind(item_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Err(StoreError::NotFound {
                entity: "review queue item",
                id: item_id.to_string(),
            });
        };
        let item = queue_item_from_row(&row)?;

        if item.status != QueueStatus::InReview {
            return Err(StoreError::InvalidState {
                entity: "review queue item",
                id: item_id.to_string(),
                state: item.status.as_str().to_string(),
            });
        }
        if item.assigned_to.as_deref() != Some(moderator_id) {
            return Err(StoreError::AlreadyClaimed {
                id: item_id.to_string(),
                assigned_to: item.assigned_to.unwrap_or_default(),
            });
        }

        sqlx::query(
            "UPDATE review_queue SET status = 'completed', completed_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(item_id)
        .execute(&mut *tx)
        .await?;

        match (outcome, &item.case_id, &item.appeal_id) {
            (ReviewOutcome::Case { decision, action }, Some(case_id), _) => {
                let case = fetch_case_tx(&mut tx, case_id).await?.ok_or_else(|| {
                    StoreError::NotFound {
                        entity: "case",
                        id: case_id.clone(),
                    }
                })?;
                sqlx::query(
                    "UPDATE cases SET decision = ?, reasoning = ?, reviewed_by = ?, updated_at = ?
                     WHERE id = ?",
                )
                .bind(decision.as_str())
                .bind(format!("Human review: {reasoning}"))
                .bind(moderator_id)
                .bind(now)
                .bind(case_id)
                .execute(&mut *tx)
                .await?;

                if *decision == Decision::Rejected {
                    if let (Some(vt), Some(sev)) = (case.violation_type, case.severity) {
                        sqlx::query(
                            "INSERT OR IGNORE INTO user_violations
                                (id, user_id, case_id, violation_type, severity, created_at)
                             VALUES (?, ?, ?, ?, ?, ?)",
                        )
                        .bind(new_id("violation"))
                        .bind(&case.user_id)
                        .bind(case_id)
                        .bind(vt.as_str())
                        .bind(sev.as_str())
                        .bind(now)
                        .execute(&mut *tx)
                        .await?;
                    }
                }

                append_audit(
                    &mut tx,
                    Some(case_id),
                    None,
                    "human_decision",
                    moderator_id,
                    Some(serde_json::json!({
                        "previous_decision": case.decision.as_str(),
                        "decision": decision.as_str(),
                        "action": action.map(|a| a.as_str()),
                        "queue_item": item_id,
                    })),
                )
                .await?;
            }
            (ReviewOutcome::Appeal { decision }, _, Some(appeal_id)) => {
                let query = format!("SELECT {APPEAL_COLUMNS} FROM appeals WHERE id = ?");
                let Some(row) = sqlx::query(&query)
                    .bind(appeal_id)
                    .fetch_optional(&mut *tx)
                    .await?
                else {
                    return Err(StoreError::NotFound {
                        entity: "appeal",
                        id: appeal_id.clone(),
                    });
                };
                let appeal = appeal_from_row(&row)?;

                sqlx::query(
                    "UPDATE appeals SET appeal_decision = ?, appeal_reasoning = ?,
                        resolved_by = ?, resolved_at = ?
                     WHERE id = ?",
                )
                .bind(decision.as_str())
                .bind(reasoning)
                .bind(moderator_id)
                .bind(now)
                .bind(appeal_id)
                .execute(&mut *tx)
                .await?;

                let mut details = serde_json::json!({
                    "appeal_decision": decision.as_str(),
                    "queue_item": item_id,
                });

                if *decision == AppealDecision::Overturned {
                    let case = fetch_case_tx(&mut tx, &appeal.case_id).await?.ok_or_else(|| {
                        StoreError::NotFound {
                            entity: "case",
                            id: appeal.case_id.clone(),
                        }
                    })?;
                    sqlx::query(
                        "UPDATE cases SET decision = 'approved', reasoning = ?, reviewed_by = ?,
                            updated_at = ?
                         WHERE id = ?",
                    )
                    .bind(format!("Overturned on appeal (human review): {reasoning}"))
                    .bind(moderator_id)
                    .bind(now)
                    .bind(&appeal.case_id)
                    .execute(&mut *tx)
                    .await?;
                    details["previous_case_decision"] =
                        serde_json::Value::String(case.decision.as_str().to_string());
                    details["new_case_decision"] =
                        serde_json::Value::String("approved".to_string());
                }

                append_audit(
                    &mut tx,
                    Some(&appeal.case_id),
                    Some(appeal_id),
                    "human_decision",
                    moderator_id,
                    Some(details),
                )
                .await?;
            }
            _ => {
                return Err(StoreError::Validation(
                    "review outcome kind does not match the queue item".to_string(),
                ));
            }
        }

        tx.commit().await?;
        Ok(())
    }

    // --- audit ---

    /// Append a standalone audit event outside any entity transaction, e.g.
    /// for enforcement actions and notifications.
    pub async fn append_audit_event(
        &self,
        case_id: Option<&str>,
        appeal_id: Option<&str>,
        action: &str,
        actor: &str,
        details: Option<serde_json::Value>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        append_audit(&mut tx, case_id, appeal_id, action, actor, details).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Full audit trail for a case, oldest first.
    pub async fn audit_trail(&self, case_id: &str) -> Result<Vec<AuditEvent>, StoreError> {
        let query = format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log WHERE case_id = ? ORDER BY timestamp ASC, id ASC"
        );
        let rows = sqlx::query(&query)
            .bind(case_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(audit_from_row).collect()
    }

    // --- metrics / statistics ---

    pub async fn record_metric(
        &self,
        name: &str,
        value: f64,
        metadata: Option<serde_json::Value>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO metrics_snapshot (id, metric_name, metric_value, metric_metadata, timestamp)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(new_id("metric"))
        .bind(name)
        .bind(value)
        .bind(metadata.map(|m| m.to_string()))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn recent_metrics(
        &self,
        name: &str,
        limit: u32,
    ) -> Result<Vec<MetricSnapshot>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, metric_name, metric_value, metric_metadata, timestamp
             FROM metrics_snapshot WHERE metric_name = ?
             ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(name)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(metric_from_row).collect()
    }

    pub async fn statistics(&self) -> Result<Statistics, StoreError> {
        let mut stats = Statistics::default();
        let rows = sqlx::query("SELECT decision, COUNT(*) AS n FROM cases GROUP BY decision")
            .fetch_all(&self.pool)
            .await?;
        for row in &rows {
            let decision: String = row.try_get("decision")?;
            let n: i64 = row.try_get("n")?;
            stats.total_cases += n;
            match decision.as_str() {
                "approved" => stats.approved = n,
                "rejected" => stats.rejected = n,
                "escalated" => stats.escalated = n,
                "pending" => stats.pending = n,
                _ => {}
            }
        }

        let cutoff = Utc::now() - Duration::hours(24);
        stats.cases_last_24h =
            sqlx::query_scalar("SELECT COUNT(*) FROM cases WHERE created_at >= ?")
                .bind(cutoff)
                .fetch_one(&self.pool)
                .await?;
        stats.pending_appeals =
            sqlx::query_scalar("SELECT COUNT(*) FROM appeals WHERE appeal_decision = 'pending'")
                .fetch_one(&self.pool)
                .await?;
        stats.queue_depth = sqlx::query_scalar(
            "SELECT COUNT(*) FROM review_queue WHERE status != 'completed'",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }
}

async fn fetch_case_tx(
    tx: &mut Transaction<'_, Sqlite>,
    case_id: &str,
) -> Result<Option<Case>, StoreError> {
    let query = format!("SELECT {CASE_COLUMNS} FROM cases WHERE id = ?");
    let row = sqlx::query(&query)
        .bind(case_id)
        .fetch_optional(&mut **tx)
        .await?;
    row.map(|r| case_from_row(&r)).transpose()
}

async fn append_audit(
    tx: &mut Transaction<'_, Sqlite>,
    case_id: Option<&str>,
    appeal_id: Option<&str>,
    action: &str,
    actor: &str,
    details: Option<serde_json::Value>,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO audit_log (id, case_id, appeal_id, action, actor, details, timestamp)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(new_id("audit"))
    .bind(case_id)
    .bind(appeal_id)
    .bind(action)
    .bind(actor)
    .bind(details.map(|d| d.to_string()))
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn append_claim_audit(
    pool: &SqlitePool,
    item: &ReviewQueueItem,
    moderator_id: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO audit_log (id, case_id, appeal_id, action, actor, details, timestamp)
         VALUES (?, ?, ?, 'review_claimed', ?, ?, ?)",
    )
    .bind(new_id("audit"))
    .bind(&item.case_id)
    .bind(&item.appeal_id)
    .bind(moderator_id)
    .bind(serde_json::json!({ "queue_item": item.id }).to_string())
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

// --- row mapping ---

fn parse_enum<T: FromStr>(value: Option<String>, column: &str) -> Result<Option<T>, StoreError>
where
    T::Err: std::fmt::Display,
{
    value
        .map(|s| {
            s.parse::<T>()
                .map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
        })
        .transpose()
}

fn required_enum<T: FromStr>(value: String, column: &str) -> Result<T, StoreError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}

fn case_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Case, StoreError> {
    let metadata: String = row.try_get("metadata")?;
    Ok(Case {
        id: row.try_get("id")?,
        content_type: required_enum::<ContentType>(row.try_get("content_type")?, "content_type")?,
        content: row.try_get("content")?,
        user_id: row.try_get("user_id")?,
        risk_score: row.try_get("risk_score")?,
        decision: required_enum::<Decision>(row.try_get("decision")?, "decision")?,
        reasoning: row.try_get("reasoning")?,
        confidence: row.try_get("confidence")?,
        violation_type: parse_enum::<ViolationType>(row.try_get("violation_type")?, "violation_type")?,
        severity: parse_enum::<Severity>(row.try_get("severity")?, "severity")?,
        reviewed_by: row.try_get("reviewed_by")?,
        metadata: serde_json::from_str(&metadata)
            .map_err(|e| StoreError::Corrupt(format!("metadata: {e}")))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn appeal_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Appeal, StoreError> {
    Ok(Appeal {
        id: row.try_get("id")?,
        case_id: row.try_get("case_id")?,
        user_explanation: row.try_get("user_explanation")?,
        new_evidence: row.try_get("new_evidence")?,
        appeal_decision: required_enum::<AppealDecision>(
            row.try_get("appeal_decision")?,
            "appeal_decision",
        )?,
        appeal_reasoning: row.try_get("appeal_reasoning")?,
        appeal_confidence: row.try_get("appeal_confidence")?,
        resolved_by: row.try_get("resolved_by")?,
        created_at: row.try_get("created_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}

fn queue_item_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ReviewQueueItem, StoreError> {
    Ok(ReviewQueueItem {
        id: row.try_get("id")?,
        case_id: row.try_get("case_id")?,
        appeal_id: row.try_get("appeal_id")?,
        priority: required_enum::<QueuePriority>(row.try_get("priority")?, "priority")?,
        assigned_to: row.try_get("assigned_to")?,
        status: required_enum::<QueueStatus>(row.try_get("status")?, "status")?,
        created_at: row.try_get("created_at")?,
        assigned_at: row.try_get("assigned_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn audit_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEvent, StoreError> {
    let details: Option<String> = row.try_get("details")?;
    Ok(AuditEvent {
        id: row.try_get("id")?,
        case_id: row.try_get("case_id")?,
        appeal_id: row.try_get("appeal_id")?,
        action: row.try_get("action")?,
        actor: row.try_get("actor")?,
        details: details
            .map(|d| serde_json::from_str(&d))
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("details: {e}")))?,
        timestamp: row.try_get("timestamp")?,
    })
}

fn metric_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<MetricSnapshot, StoreError> {
    let metadata: Option<String> = row.try_get("metric_metadata")?;
    Ok(MetricSnapshot {
        id: row.try_get("id")?,
        metric_name: row.try_get("metric_name")?,
        metric_value: row.try_get("metric_value")?,
        metric_metadata: metadata
            .map(|m| serde_json::from_str(&m))
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("metric_metadata: {e}")))?,
        timestamp: row.try_get("timestamp")?,
    })
}
