//! Three-way pairwise agreement: cluster↔topic, cluster↔embedding,
//! topic↔embedding, assembled into one report.
//!
//! A failure in any pair fails the whole run; the three scores are only
//! meaningful together.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::{AgreementConfig, IndexPolicy};
use crate::contingency::{ConfusionMatrixBuilder, ContingencyTable};
use crate::error::{AgreementError, ErrorKind, Result};
use crate::labels::{LabelAssignment, Method, MethodPair};
use crate::reconcile::AlignmentSummary;
use crate::request::{AgreementRequest, LabelSource};
use crate::scoring::{AgreementResult, AgreementScorer};

// =============================================================================
// Aligned input
// =============================================================================

/// Three assignments over the same ordered points, plus pass-through extras.
#[derive(Debug, Clone)]
pub struct AlignedAssignments {
    cluster: LabelAssignment,
    topic: LabelAssignment,
    embedding: LabelAssignment,
    coordinates: Option<Vec<[f64; 2]>>,
    groups: Option<Vec<String>>,
    alignment: AlignmentSummary,
    dropped_rows: usize,
    tabular: bool,
}

impl AlignedAssignments {
    pub fn new(
        cluster: LabelAssignment,
        topic: LabelAssignment,
        embedding: LabelAssignment,
        alignment: AlignmentSummary,
    ) -> Result<Self> {
        let n = cluster.len();
        if topic.len() != n || embedding.len() != n {
            return Err(AgreementError::input_shape(format!(
                "label sources are not aligned: cluster={}, topic={}, embedding={}",
                n,
                topic.len(),
                embedding.len()
            )));
        }
        Ok(Self {
            cluster,
            topic,
            embedding,
            coordinates: None,
            groups: None,
            alignment,
            dropped_rows: 0,
            tabular: false,
        })
    }

    pub fn with_coordinates(mut self, coordinates: Vec<[f64; 2]>) -> Result<Self> {
        if coordinates.len() != self.len() {
            return Err(AgreementError::input_shape(format!(
                "coordinates cover {} points but labels cover {}",
                coordinates.len(),
                self.len()
            )));
        }
        self.coordinates = Some(coordinates);
        Ok(self)
    }

    pub fn with_groups(mut self, groups: Vec<String>) -> Result<Self> {
        if groups.len() != self.len() {
            return Err(AgreementError::input_shape(format!(
                "groups cover {} points but labels cover {}",
                groups.len(),
                self.len()
            )));
        }
        self.groups = Some(groups);
        Ok(self)
    }

    /// Mark the input as coming from a per-item table (sparse indexing under `Auto`).
    pub fn tabular(mut self) -> Self {
        self.tabular = true;
        self
    }

    pub fn with_dropped_rows(mut self, dropped: usize) -> Self {
        self.dropped_rows = dropped;
        self
    }

    pub fn get(&self, method: Method) -> &LabelAssignment {
        match method {
            Method::Cluster => &self.cluster,
            Method::Topic => &self.topic,
            Method::Embedding => &self.embedding,
        }
    }

    pub fn len(&self) -> usize {
        self.cluster.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cluster.is_empty()
    }

    pub fn alignment(&self) -> &AlignmentSummary {
        &self.alignment
    }

    fn labels_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for method in Method::ALL {
            hasher.update(method.as_str().as_bytes());
            for label in self.get(method).labels() {
                hasher.update(&label.to_le_bytes());
            }
        }
        hasher.finalize().to_hex().to_string()
    }
}

// =============================================================================
// Report
// =============================================================================

/// Non-finite floats are written as `null` and read back as NaN.
mod finite_or_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgreementScores {
    #[serde(with = "finite_or_null")]
    pub cluster_topic: f64,
    #[serde(with = "finite_or_null")]
    pub cluster_embedding: f64,
    #[serde(with = "finite_or_null")]
    pub topic_embedding: f64,
}

impl AgreementScores {
    pub fn get(&self, pair: MethodPair) -> f64 {
        match pair {
            MethodPair::ClusterTopic => self.cluster_topic,
            MethodPair::ClusterEmbedding => self.cluster_embedding,
            MethodPair::TopicEmbedding => self.topic_embedding,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationPoint {
    #[serde(with = "finite_or_null")]
    pub pca_one: f64,
    #[serde(with = "finite_or_null")]
    pub pca_two: f64,
    pub cluster_topic_agree: bool,
    pub cluster_embedding_agree: bool,
    pub topic_embedding_agree: bool,
}

/// Share of a group's points that agree, per pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupAgreement {
    pub points: usize,
    #[serde(with = "finite_or_null")]
    pub cluster_topic: f64,
    #[serde(with = "finite_or_null")]
    pub cluster_embedding: f64,
    #[serde(with = "finite_or_null")]
    pub topic_embedding: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMeta {
    pub points: usize,
    pub dropped_rows: usize,
    pub index_policy: IndexPolicy,
    pub alignment: AlignmentSummary,
    /// blake3 over the three compared label sequences.
    pub labels_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgreementReport {
    pub agreement_scores: AgreementScores,
    pub cluster_topic_mapping: BTreeMap<i64, i64>,
    pub cluster_pca_mapping: BTreeMap<i64, i64>,
    pub topic_pca_mapping: BTreeMap<i64, i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualization_data: Option<Vec<VisualizationPoint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contingency_tables: Option<BTreeMap<MethodPair, ContingencyTable>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_agreement: Option<BTreeMap<String, GroupAgreement>>,
    pub meta: ReportMeta,
}

// =============================================================================
// Orchestrator
// =============================================================================

struct PairOutcome {
    pair: MethodPair,
    result: AgreementResult,
    table: Option<ContingencyTable>,
}

#[derive(Debug, Clone, Default)]
pub struct PairwiseAgreementOrchestrator {
    config: AgreementConfig,
}

impl PairwiseAgreementOrchestrator {
    pub fn new(config: AgreementConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, aligned: &AlignedAssignments) -> Result<AgreementReport> {
        self.config.validate()?;
        for method in Method::ALL {
            let distinct = aligned.get(method).distinct_non_noise();
            if distinct < self.config.min_distinct_labels {
                return Err(AgreementError::degenerate(format!(
                    "{method} has {distinct} distinct non-noise label(s); at least {} are required for agreement to be defined",
                    self.config.min_distinct_labels
                )));
            }
        }

        let policy = self.config.index_policy.resolve(aligned.tabular);
        let scorer = AgreementScorer::new(
            ConfusionMatrixBuilder::new(policy).with_max_axis_labels(self.config.max_axis_labels),
        );

        let outcomes: Vec<PairOutcome> = if self.config.parallel {
            MethodPair::ALL
                .par_iter()
                .map(|&pair| self.score_pair(&scorer, pair, aligned))
                .collect::<Result<Vec<_>>>()?
        } else {
            MethodPair::ALL
                .iter()
                .map(|&pair| self.score_pair(&scorer, pair, aligned))
                .collect::<Result<Vec<_>>>()?
        };

        let mut results: BTreeMap<MethodPair, AgreementResult> = BTreeMap::new();
        let mut tables: BTreeMap<MethodPair, ContingencyTable> = BTreeMap::new();
        for outcome in outcomes {
            if let Some(table) = outcome.table {
                tables.insert(outcome.pair, table);
            }
            results.insert(outcome.pair, outcome.result);
        }
        let result = |pair: MethodPair| -> Result<&AgreementResult> {
            results
                .get(&pair)
                .ok_or_else(|| AgreementError::internal(format!("missing result for {pair}")))
        };
        let ct = result(MethodPair::ClusterTopic)?;
        let ce = result(MethodPair::ClusterEmbedding)?;
        let te = result(MethodPair::TopicEmbedding)?;

        let flags = agreement_flags(aligned, ct, ce, te);

        let visualization_data = match (&aligned.coordinates, self.config.include_visualization) {
            (Some(coords), true) => Some(
                coords
                    .iter()
                    .zip(&flags)
                    .map(|(&[x, y], &[a, b, c])| VisualizationPoint {
                        pca_one: x,
                        pca_two: y,
                        cluster_topic_agree: a,
                        cluster_embedding_agree: b,
                        topic_embedding_agree: c,
                    })
                    .collect(),
            ),
            _ => None,
        };

        let group_agreement = match (&aligned.groups, self.config.include_group_breakdown) {
            (Some(groups), true) => Some(group_breakdown(groups, &flags)),
            _ => None,
        };

        let report = AgreementReport {
            agreement_scores: AgreementScores {
                cluster_topic: ct.score,
                cluster_embedding: ce.score,
                topic_embedding: te.score,
            },
            cluster_topic_mapping: ct.mapping.clone(),
            cluster_pca_mapping: ce.mapping.clone(),
            topic_pca_mapping: te.mapping.clone(),
            visualization_data,
            contingency_tables: self.config.include_contingency_tables.then_some(tables),
            group_agreement,
            meta: ReportMeta {
                points: aligned.len(),
                dropped_rows: aligned.dropped_rows,
                index_policy: policy,
                alignment: aligned.alignment.clone(),
                labels_hash: aligned.labels_hash(),
            },
        };

        info!(
            points = report.meta.points,
            cluster_topic = report.agreement_scores.cluster_topic,
            cluster_embedding = report.agreement_scores.cluster_embedding,
            topic_embedding = report.agreement_scores.topic_embedding,
            "pairwise agreement computed"
        );
        Ok(report)
    }

    fn score_pair(
        &self,
        scorer: &AgreementScorer,
        pair: MethodPair,
        aligned: &AlignedAssignments,
    ) -> Result<PairOutcome> {
        let (ma, mb) = pair.methods();
        let scored = scorer
            .score(aligned.get(ma), aligned.get(mb))
            .map_err(|err| {
                if err.kind() != ErrorKind::Internal {
                    return err;
                }
                error!(
                    pair = %pair,
                    points = aligned.len(),
                    row_labels = aligned.get(ma).distinct().len(),
                    col_labels = aligned.get(mb).distinct().len(),
                    error = %err,
                    "pairwise agreement computation failed"
                );
                AgreementError::internal(format!("agreement computation failed for {pair}"))
            })?;

        let table = self
            .config
            .include_contingency_tables
            .then(|| scored.matrix.to_table());
        Ok(PairOutcome {
            pair,
            result: scored.result,
            table,
        })
    }
}

fn agreement_flags(
    aligned: &AlignedAssignments,
    ct: &AgreementResult,
    ce: &AgreementResult,
    te: &AgreementResult,
) -> Vec<[bool; 3]> {
    let c = aligned.cluster.labels();
    let t = aligned.topic.labels();
    let e = aligned.embedding.labels();
    (0..aligned.len())
        .map(|i| [ct.maps(c[i], t[i]), ce.maps(c[i], e[i]), te.maps(t[i], e[i])])
        .collect()
}

fn group_breakdown(groups: &[String], flags: &[[bool; 3]]) -> BTreeMap<String, GroupAgreement> {
    let mut tallies: BTreeMap<&str, (usize, [usize; 3])> = BTreeMap::new();
    for (group, point) in groups.iter().zip(flags) {
        let entry = tallies.entry(group.as_str()).or_default();
        entry.0 += 1;
        for (slot, &agree) in entry.1.iter_mut().zip(point) {
            *slot += usize::from(agree);
        }
    }
    tallies
        .into_iter()
        .map(|(group, (points, hits))| {
            let share = |h: usize| h as f64 / points as f64;
            (
                group.to_string(),
                GroupAgreement {
                    points,
                    cluster_topic: share(hits[0]),
                    cluster_embedding: share(hits[1]),
                    topic_embedding: share(hits[2]),
                },
            )
        })
        .collect()
}

/// Validate, align and score a label source under `config`.
pub fn score_source(source: LabelSource, config: &AgreementConfig) -> Result<AgreementReport> {
    config.validate()?;
    let aligned = source.into_aligned(config)?;
    PairwiseAgreementOrchestrator::new(config.clone()).run(&aligned)
}

/// Score a full request, using its embedded config or the defaults.
pub fn score_request(request: AgreementRequest) -> Result<AgreementReport> {
    let (source, config) = request.into_parts()?;
    score_source(source, &config.unwrap_or_default())
}
