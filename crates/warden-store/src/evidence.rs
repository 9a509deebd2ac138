//! In-memory evidence indexes for similarity retrieval.
//!
//! Two collections back the risk-assessment and appeal-context steps:
//! confirmed violations (what known-bad content looks like) and adjudicated
//! cases (precedent, regardless of outcome). The [`Embedder`] trait is the
//! seam for a real embedding backend; the default [`HashEmbedder`] is a
//! deterministic feature-hashing model good enough for retrieval over
//! short moderation texts and exact enough for tests.

use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use warden_core::types::{Case, EvidenceMatch};

/// Turns text into a fixed-length vector. Implementations must be pure:
/// the same text always embeds to the same vector.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Feature-hashing bag-of-words embedder. No model weights, no I/O.
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % self.dims;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

struct Entry {
    case_id: String,
    text: String,
    vector: Vec<f32>,
    snapshot: Case,
}

/// Optional metadata filter applied before ranking.
#[derive(Debug, Clone, Default)]
pub struct EvidenceFilter {
    pub violation_type: Option<warden_core::types::ViolationType>,
    pub decision: Option<warden_core::types::Decision>,
}

impl EvidenceFilter {
    fn matches(&self, case: &Case) -> bool {
        if let Some(vt) = self.violation_type {
            if case.violation_type != Some(vt) {
                return false;
            }
        }
        if let Some(decision) = self.decision {
            if case.decision != decision {
                return false;
            }
        }
        true
    }
}

/// The two similarity collections, safe to share across workflow tasks.
pub struct EvidenceIndex {
    embedder: Arc<dyn Embedder>,
    violations: RwLock<Vec<Entry>>,
    cases: RwLock<Vec<Entry>>,
}

impl EvidenceIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            violations: RwLock::new(Vec::new()),
            cases: RwLock::new(Vec::new()),
        }
    }

    pub fn with_default_embedder() -> Self {
        Self::new(Arc::new(HashEmbedder::default()))
    }

    /// Add a confirmed violation to the violation collection.
    pub fn add_violation(&self, case: &Case) {
        self.violations.write().push(self.entry_for(case));
    }

    /// Add an adjudicated case to the precedent collection.
    pub fn add_case(&self, case: &Case) {
        self.cases.write().push(self.entry_for(case));
    }

    /// Nearest confirmed violations to `text`.
    pub fn search_violations(&self, text: &str, k: usize) -> Vec<EvidenceMatch> {
        self.search(&self.violations, text, k, &EvidenceFilter::default())
    }

    /// Nearest precedent cases to `text`.
    pub fn search_cases(&self, text: &str, k: usize) -> Vec<EvidenceMatch> {
        self.search(&self.cases, text, k, &EvidenceFilter::default())
    }

    /// Nearest precedent cases matching a metadata filter.
    pub fn search_cases_filtered(
        &self,
        text: &str,
        k: usize,
        filter: &EvidenceFilter,
    ) -> Vec<EvidenceMatch> {
        self.search(&self.cases, text, k, filter)
    }

    fn entry_for(&self, case: &Case) -> Entry {
        Entry {
            case_id: case.id.clone(),
            text: case.content.clone(),
            vector: self.embedder.embed(&case.content),
            snapshot: case.clone(),
        }
    }

    fn search(
        &self,
        collection: &RwLock<Vec<Entry>>,
        text: &str,
        k: usize,
        filter: &EvidenceFilter,
    ) -> Vec<EvidenceMatch> {
        let query = self.embedder.embed(text);
        let entries = collection.read();
        let mut scored: Vec<EvidenceMatch> = entries
            .iter()
            .filter(|e| filter.matches(&e.snapshot))
            .map(|e| {
                // cosine distance mapped into (0, 1], higher is closer
                let distance = 1.0 - cosine(&query, &e.vector);
                EvidenceMatch {
                    id: format!("evidence_{}", e.case_id),
                    case_id: e.case_id.clone(),
                    text: e.text.clone(),
                    similarity: 1.0 / (1.0 + distance as f64),
                    decision: Some(e.snapshot.decision),
                    violation_type: e.snapshot.violation_type,
                    severity: e.snapshot.severity,
                }
            })
            .collect();
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        scored
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use warden_core::types::{ContentType, Decision, Severity, ViolationType};

    fn case(id: &str, content: &str, decision: Decision, vt: Option<ViolationType>) -> Case {
        let now = Utc::now();
        Case {
            id: id.to_string(),
            content_type: ContentType::Message,
            content: content.to_string(),
            user_id: "user_1".to_string(),
            risk_score: None,
            decision,
            reasoning: String::new(),
            confidence: None,
            violation_type: vt,
            severity: vt.map(|_| Severity::Medium),
            reviewed_by: "ai_agent".to_string(),
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_embedding_is_deterministic_and_normalized() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("send me money via gift cards");
        let b = embedder.embed("send me money via gift cards");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_similar_text_ranks_higher() {
        let index = EvidenceIndex::with_default_embedder();
        index.add_violation(&case(
            "case_scam",
            "send me money via gift cards right now",
            Decision::Rejected,
            Some(ViolationType::Scams),
        ));
        index.add_violation(&case(
            "case_other",
            "lovely weather for a walk in the park",
            Decision::Rejected,
            Some(ViolationType::Harassment),
        ));

        let matches = index.search_violations("can you send me money in gift cards", 2);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].case_id, "case_scam");
        assert!(matches[0].similarity > matches[1].similarity);
        assert!(matches[0].similarity <= 1.0);
    }

    #[test]
    fn test_filter_restricts_results() {
        let index = EvidenceIndex::with_default_embedder();
        index.add_case(&case("case_a", "you are a terrible person", Decision::Rejected, Some(ViolationType::Harassment)));
        index.add_case(&case("case_b", "you are a wonderful person", Decision::Approved, None));

        let filter = EvidenceFilter {
            decision: Some(Decision::Approved),
            ..Default::default()
        };
        let matches = index.search_cases_filtered("you are a person", 5, &filter);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].case_id, "case_b");
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let index = EvidenceIndex::with_default_embedder();
        assert!(index.search_cases("anything", 3).is_empty());
    }
}
