//! Run configuration for the agreement engine.
//!
//! Everything tunable lives here and is passed in explicitly: embedded in the
//! request document, loaded from a JSON file, or overridden by CLI flags.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AgreementError, Result};

/// How confusion-matrix rows/columns are indexed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexPolicy {
    /// Sparse for per-item table input, dense otherwise.
    #[default]
    Auto,
    /// Contiguous range `[0, max]`, plus a noise row/column when `-1` occurs.
    Dense,
    /// Distinct observed values in ascending order.
    Sparse,
}

impl IndexPolicy {
    /// Resolve `Auto` given whether the input came from a per-item table.
    pub fn resolve(self, tabular: bool) -> IndexPolicy {
        match self {
            IndexPolicy::Auto if tabular => IndexPolicy::Sparse,
            IndexPolicy::Auto => IndexPolicy::Dense,
            other => other,
        }
    }
}

/// Field names used to read per-item rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    pub cluster: String,
    pub topic: String,
    pub embedding: String,
    pub x: String,
    pub y: String,
    /// Optional demographic group column; absent from every row means "no groups".
    pub group: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            cluster: "concept_cluster".to_string(),
            topic: "Dominant_Topic".to_string(),
            embedding: "cluster".to_string(),
            x: "pca_one".to_string(),
            y: "pca_two".to_string(),
            group: "Race".to_string(),
        }
    }
}

/// Explicit policy for the categorical group field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryPolicy {
    pub allowed: Vec<String>,
    /// Value substituted for unrecognized categories. `None` rejects the row instead.
    pub fallback: Option<String>,
}

impl Default for CategoryPolicy {
    fn default() -> Self {
        Self {
            allowed: ["Asian", "Black", "Hispanic", "White"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            fallback: Some("Unknown".to_string()),
        }
    }
}

impl CategoryPolicy {
    /// Accept a raw category, apply the fallback, or reject with `None`.
    pub fn classify(&self, raw: Option<&str>) -> Option<String> {
        match raw.map(str::trim) {
            Some(value) if self.allowed.iter().any(|a| a == value) => Some(value.to_string()),
            _ => self.fallback.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgreementConfig {
    pub index_policy: IndexPolicy,
    /// Cap on one axis of a confusion matrix: distinct labels under sparse
    /// indexing, extent (max label + 1) under dense.
    #[serde(alias = "max_dense_extent")]
    pub max_axis_labels: usize,
    /// Factor applied to topic weights before truncating to a count.
    pub weight_scale: f64,
    /// Methods with fewer distinct non-noise labels than this are rejected.
    pub min_distinct_labels: usize,
    pub include_visualization: bool,
    pub include_contingency_tables: bool,
    pub include_group_breakdown: bool,
    /// Value written for missing `x`/`y` coordinates on per-item rows.
    pub coordinate_fill: f64,
    /// Score the three pairs concurrently.
    pub parallel: bool,
    pub columns: ColumnConfig,
    pub categories: CategoryPolicy,
}

impl Default for AgreementConfig {
    fn default() -> Self {
        Self {
            index_policy: IndexPolicy::Auto,
            max_axis_labels: 4096,
            weight_scale: 100.0,
            min_distinct_labels: 2,
            include_visualization: true,
            include_contingency_tables: false,
            include_group_breakdown: true,
            coordinate_fill: 0.0,
            parallel: true,
            columns: ColumnConfig::default(),
            categories: CategoryPolicy::default(),
        }
    }
}

impl AgreementConfig {
    pub fn from_path(path: impl AsRef<Path>) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let raw = std::fs::read_to_string(path)?;
        let cfg: AgreementConfig = serde_json::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.weight_scale.is_finite() || self.weight_scale <= 0.0 {
            return Err(AgreementError::input_shape(format!(
                "weight_scale must be a positive finite number, got {}",
                self.weight_scale
            )));
        }
        if self.max_axis_labels == 0 {
            return Err(AgreementError::input_shape("max_axis_labels must be >= 1"));
        }
        if self.categories.allowed.is_empty() && self.categories.fallback.is_none() {
            return Err(AgreementError::input_shape(
                "category policy accepts nothing: add allowed values or a fallback",
            ));
        }
        Ok(())
    }
}
