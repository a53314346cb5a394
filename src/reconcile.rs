//! Reconstruct label assignments from per-cluster aggregate statistics.
//!
//! Each `(label, magnitude)` record expands into `magnitude` copies of
//! `label`; the three expansions are then cut to a common length and
//! compared position by position. Nothing ties position `k` in one method to
//! position `k` in another, so results from this path are approximate. The
//! returned [`AlignmentSummary`] says so, and callers should prefer per-item
//! labels whenever upstream data has them.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AgreementError, Result};
use crate::labels::{LabelAssignment, Method};

/// Upper bound on the reconciled length; larger inputs are refused.
pub const MAX_EXPANDED_POINTS: u64 = 10_000_000;

/// Size of one aggregate: a point count or a weight to be scaled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Magnitude {
    Count(u64),
    /// Converted with `trunc(weight * scale)`.
    Weight(f64),
}

impl Magnitude {
    pub fn to_count(self, scale: f64) -> Result<u64> {
        match self {
            Magnitude::Count(n) => Ok(n),
            Magnitude::Weight(w) => {
                let scaled = w * scale;
                if !scaled.is_finite() || scaled < 0.0 {
                    return Err(AgreementError::input_shape(format!(
                        "weight {w} cannot be converted to a point count"
                    )));
                }
                Ok(scaled.trunc() as u64)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRecord {
    pub label: i64,
    #[serde(flatten)]
    pub magnitude: Magnitude,
}

impl AggregateRecord {
    pub fn count(label: i64, count: u64) -> Self {
        Self {
            label,
            magnitude: Magnitude::Count(count),
        }
    }

    pub fn weight(label: i64, weight: f64) -> Self {
        Self {
            label,
            magnitude: Magnitude::Weight(weight),
        }
    }
}

/// Aggregate records for all three methods.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateSources {
    #[serde(default)]
    pub cluster: Vec<AggregateRecord>,
    #[serde(default)]
    pub topic: Vec<AggregateRecord>,
    #[serde(default)]
    pub embedding: Vec<AggregateRecord>,
}

impl AggregateSources {
    fn records(&self, method: Method) -> &[AggregateRecord] {
        match method {
            Method::Cluster => &self.cluster,
            Method::Topic => &self.topic,
            Method::Embedding => &self.embedding,
        }
    }
}

/// How the compared points were lined up across methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentMode {
    /// True per-item labels; position `k` is the same point everywhere.
    PerItem,
    /// Independently expanded aggregates cut to a common length.
    PositionalTruncation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLengths {
    pub cluster: u64,
    pub topic: u64,
    pub embedding: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentSummary {
    pub mode: AlignmentMode,
    pub common_length: usize,
    /// Expanded length per method before truncation (per-item: all equal).
    pub source_lengths: SourceLengths,
}

impl AlignmentSummary {
    pub fn per_item(points: usize) -> Self {
        let n = points as u64;
        Self {
            mode: AlignmentMode::PerItem,
            common_length: points,
            source_lengths: SourceLengths {
                cluster: n,
                topic: n,
                embedding: n,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciledAssignments {
    pub cluster: LabelAssignment,
    pub topic: LabelAssignment,
    pub embedding: LabelAssignment,
    pub alignment: AlignmentSummary,
}

/// Expand one method's records into a label sequence, stopping at `limit`.
pub fn expand(records: &[AggregateRecord], scale: f64, limit: u64) -> Result<Vec<i64>> {
    let mut labels = Vec::new();
    let mut remaining = limit;
    for record in records {
        if remaining == 0 {
            break;
        }
        let n = record.magnitude.to_count(scale)?.min(remaining);
        labels.extend(std::iter::repeat(record.label).take(n as usize));
        remaining -= n;
    }
    Ok(labels)
}

fn total_magnitude(records: &[AggregateRecord], scale: f64) -> Result<u64> {
    records.iter().try_fold(0u64, |acc, r| {
        Ok(acc.saturating_add(r.magnitude.to_count(scale)?))
    })
}

#[derive(Debug, Clone, Copy)]
pub struct AssignmentReconciler {
    weight_scale: f64,
}

impl Default for AssignmentReconciler {
    fn default() -> Self {
        Self { weight_scale: 100.0 }
    }
}

impl AssignmentReconciler {
    pub fn new(weight_scale: f64) -> Self {
        Self { weight_scale }
    }

    pub fn reconcile(&self, sources: &AggregateSources) -> Result<ReconciledAssignments> {
        let mut totals = [0u64; 3];
        for (slot, method) in totals.iter_mut().zip(Method::ALL) {
            let total = total_magnitude(sources.records(method), self.weight_scale)?;
            if total == 0 {
                return Err(AgreementError::input_shape(format!(
                    "insufficient data: {method} aggregates expand to zero points"
                )));
            }
            *slot = total;
        }

        let common = totals.iter().copied().min().unwrap_or(0);
        if common == 0 {
            return Err(AgreementError::input_shape(
                "insufficient data: no common length across methods",
            ));
        }
        if common > MAX_EXPANDED_POINTS {
            return Err(AgreementError::input_shape(format!(
                "reconciled length {common} exceeds the limit of {MAX_EXPANDED_POINTS} points"
            )));
        }

        let build = |method: Method| -> Result<LabelAssignment> {
            let labels = expand(sources.records(method), self.weight_scale, common)?;
            LabelAssignment::for_method(method, labels)
        };
        let cluster = build(Method::Cluster)?;
        let topic = build(Method::Topic)?;
        let embedding = build(Method::Embedding)?;

        let source_lengths = SourceLengths {
            cluster: totals[0],
            topic: totals[1],
            embedding: totals[2],
        };
        if totals.iter().any(|&t| t != common) {
            warn!(
                common_length = common,
                cluster = totals[0],
                topic = totals[1],
                embedding = totals[2],
                "aggregate inputs truncated to a common length; positional pairing does not preserve point identity"
            );
        } else {
            debug!(common_length = common, "aggregate inputs expanded");
        }

        Ok(ReconciledAssignments {
            cluster,
            topic,
            embedding,
            alignment: AlignmentSummary {
                mode: AlignmentMode::PositionalTruncation,
                common_length: common as usize,
                source_lengths,
            },
        })
    }
}

// =============================================================================
// Upstream "concept results" document
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConceptResults {
    #[serde(default)]
    pub llm: Option<LlmConcepts>,
    #[serde(default)]
    pub lda: Option<LdaTopics>,
    #[serde(default)]
    pub embeddings: Vec<EmbeddingCluster>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmConcepts {
    #[serde(default)]
    pub clusters: Vec<LlmCluster>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmCluster {
    pub id: i64,
    #[serde(default)]
    pub frequency: Vec<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LdaTopics {
    #[serde(default)]
    pub topics: Vec<LdaTopic>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LdaTopic {
    pub topic_id: i64,
    #[serde(default)]
    pub weights: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingCluster {
    pub cluster_id: i64,
    pub size: u64,
}

impl ConceptResults {
    /// Concept clusters weigh by summed concept frequency, topics by summed
    /// word weight, embedding clusters by size.
    pub fn to_aggregates(&self) -> AggregateSources {
        let cluster = self
            .llm
            .iter()
            .flat_map(|llm| &llm.clusters)
            .map(|c| {
                let total = c.frequency.iter().fold(0u64, |acc, &f| acc.saturating_add(f));
                AggregateRecord::count(c.id, total)
            })
            .collect();
        let topic = self
            .lda
            .iter()
            .flat_map(|lda| &lda.topics)
            .map(|t| AggregateRecord::weight(t.topic_id, t.weights.iter().sum()))
            .collect();
        let embedding = self
            .embeddings
            .iter()
            .map(|e| AggregateRecord::count(e.cluster_id, e.size))
            .collect();
        AggregateSources {
            cluster,
            topic,
            embedding,
        }
    }
}
