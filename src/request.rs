//! Request document: exactly one label source plus optional configuration.

use serde::Deserialize;

use crate::config::AgreementConfig;
use crate::error::{AgreementError, Result};
use crate::labels::{LabelAssignment, Method};
use crate::orchestrator::AlignedAssignments;
use crate::reconcile::{AggregateSources, AlignmentSummary, AssignmentReconciler, ConceptResults};
use crate::records::{RawRow, RecordValidator};

/// Plain per-point label arrays sharing one point ordering.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PerPointLabels {
    pub cluster: Vec<i64>,
    pub topic: Vec<i64>,
    pub embedding: Vec<i64>,
    /// Optional 2-D projection per point, passed through to visualization.
    #[serde(default)]
    pub coordinates: Option<Vec<[f64; 2]>>,
    /// Optional group tag per point.
    #[serde(default)]
    pub groups: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgreementRequest {
    #[serde(default)]
    pub labels: Option<PerPointLabels>,
    #[serde(default)]
    pub rows: Option<Vec<RawRow>>,
    #[serde(default)]
    pub aggregates: Option<AggregateSources>,
    #[serde(default, rename = "conceptResults", alias = "concept_results")]
    pub concept_results: Option<ConceptResults>,
    #[serde(default)]
    pub config: Option<AgreementConfig>,
}

#[derive(Debug, Clone)]
pub enum LabelSource {
    PerPoint(PerPointLabels),
    Rows(Vec<RawRow>),
    Aggregates(AggregateSources),
}

impl AgreementRequest {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Split into the single label source and any embedded config.
    pub fn into_parts(self) -> Result<(LabelSource, Option<AgreementConfig>)> {
        let mut sources = Vec::new();
        if let Some(labels) = self.labels {
            sources.push(LabelSource::PerPoint(labels));
        }
        if let Some(rows) = self.rows {
            sources.push(LabelSource::Rows(rows));
        }
        if let Some(aggregates) = self.aggregates {
            sources.push(LabelSource::Aggregates(aggregates));
        }
        if let Some(results) = self.concept_results {
            sources.push(LabelSource::Aggregates(results.to_aggregates()));
        }

        match sources.len() {
            0 => Err(AgreementError::input_shape(
                "request has no label source: expected one of labels, rows, aggregates, conceptResults",
            )),
            1 => Ok((sources.remove(0), self.config)),
            n => Err(AgreementError::input_shape(format!(
                "request has {n} label sources; provide exactly one"
            ))),
        }
    }
}

impl LabelSource {
    /// Turn any source into three positionally aligned assignments.
    pub fn into_aligned(self, config: &AgreementConfig) -> Result<AlignedAssignments> {
        match self {
            LabelSource::PerPoint(labels) => {
                let n = labels.cluster.len();
                let mut aligned = AlignedAssignments::new(
                    LabelAssignment::for_method(Method::Cluster, labels.cluster)?,
                    LabelAssignment::for_method(Method::Topic, labels.topic)?,
                    LabelAssignment::for_method(Method::Embedding, labels.embedding)?,
                    AlignmentSummary::per_item(n),
                )?;
                if let Some(coords) = labels.coordinates {
                    aligned = aligned.with_coordinates(coords)?;
                }
                if let Some(groups) = labels.groups {
                    aligned = aligned.with_groups(groups)?;
                }
                Ok(aligned)
            }
            LabelSource::Rows(rows) => {
                let table = RecordValidator::new(&config.columns, &config.categories)
                    .with_coordinate_fill(config.coordinate_fill)
                    .require_coordinates(config.include_visualization)
                    .validate(&rows)?;
                let mut aligned = AlignedAssignments::new(
                    table.assignment(Method::Cluster)?,
                    table.assignment(Method::Topic)?,
                    table.assignment(Method::Embedding)?,
                    AlignmentSummary::per_item(table.rows.len()),
                )?
                .tabular()
                .with_dropped_rows(table.rejections.len())
                .with_coordinates(table.coordinates())?;
                if let Some(groups) = table.groups() {
                    aligned = aligned.with_groups(groups)?;
                }
                Ok(aligned)
            }
            LabelSource::Aggregates(sources) => {
                let reconciled = AssignmentReconciler::new(config.weight_scale).reconcile(&sources)?;
                AlignedAssignments::new(
                    reconciled.cluster,
                    reconciled.topic,
                    reconciled.embedding,
                    reconciled.alignment,
                )
            }
        }
    }
}
