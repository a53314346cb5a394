//! Strict validation of loosely-shaped per-item rows.
//!
//! Upstream tables arrive as JSON objects with optional keys. Each row either
//! becomes a [`ValidatedRow`] or is dropped with a recorded reason; labels are
//! never imputed. Coordinates are the one exception: missing values take the
//! configured fill.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::{CategoryPolicy, ColumnConfig};
use crate::error::{AgreementError, Result};
use crate::labels::{LabelAssignment, Method, NOISE_LABEL};

pub type RawRow = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRow {
    pub cluster: i64,
    pub topic: i64,
    pub embedding: i64,
    pub x: f64,
    pub y: f64,
    pub group: Option<String>,
}

/// A row that was dropped, by its position in the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowRejection {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ValidatedTable {
    pub rows: Vec<ValidatedRow>,
    pub rejections: Vec<RowRejection>,
    pub has_groups: bool,
}

impl ValidatedTable {
    pub fn assignment(&self, method: Method) -> Result<LabelAssignment> {
        let labels = self
            .rows
            .iter()
            .map(|r| match method {
                Method::Cluster => r.cluster,
                Method::Topic => r.topic,
                Method::Embedding => r.embedding,
            })
            .collect();
        LabelAssignment::for_method(method, labels)
    }

    pub fn coordinates(&self) -> Vec<[f64; 2]> {
        self.rows.iter().map(|r| [r.x, r.y]).collect()
    }

    pub fn groups(&self) -> Option<Vec<String>> {
        if !self.has_groups {
            return None;
        }
        self.rows.iter().map(|r| r.group.clone()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct RecordValidator<'a> {
    columns: &'a ColumnConfig,
    categories: &'a CategoryPolicy,
    coordinate_fill: f64,
    require_coordinates: bool,
}

impl<'a> RecordValidator<'a> {
    pub fn new(columns: &'a ColumnConfig, categories: &'a CategoryPolicy) -> Self {
        Self {
            columns,
            categories,
            coordinate_fill: 0.0,
            require_coordinates: true,
        }
    }

    pub fn with_coordinate_fill(mut self, fill: f64) -> Self {
        self.coordinate_fill = fill;
        self
    }

    pub fn require_coordinates(mut self, required: bool) -> Self {
        self.require_coordinates = required;
        self
    }

    pub fn validate(&self, rows: &[RawRow]) -> Result<ValidatedTable> {
        if rows.is_empty() {
            return Err(AgreementError::input_shape("per-item table has no rows"));
        }

        let present: BTreeSet<&str> = rows
            .iter()
            .flat_map(|row| row.keys().map(String::as_str))
            .collect();
        let mut required = vec![
            &self.columns.cluster,
            &self.columns.topic,
            &self.columns.embedding,
        ];
        if self.require_coordinates {
            required.push(&self.columns.x);
            required.push(&self.columns.y);
        }
        let missing: Vec<String> = required
            .into_iter()
            .filter(|name| !present.contains(name.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(AgreementError::schema(missing));
        }
        let has_groups = present.contains(self.columns.group.as_str());

        let mut kept = Vec::with_capacity(rows.len());
        let mut rejections = Vec::new();
        for (index, row) in rows.iter().enumerate() {
            match self.validate_row(row, has_groups) {
                Ok(valid) => kept.push(valid),
                Err(reason) => {
                    debug!(index, %reason, "dropping row");
                    rejections.push(RowRejection { index, reason });
                }
            }
        }

        info!(
            kept = kept.len(),
            dropped = rejections.len(),
            "validated per-item rows"
        );
        if kept.is_empty() {
            return Err(AgreementError::degenerate(format!(
                "no complete rows remain after dropping {} incomplete row(s)",
                rejections.len()
            )));
        }

        Ok(ValidatedTable {
            rows: kept,
            rejections,
            has_groups,
        })
    }

    fn validate_row(&self, row: &RawRow, has_groups: bool) -> std::result::Result<ValidatedRow, String> {
        let cluster = parse_label(row, &self.columns.cluster)?;
        let topic = parse_label(row, &self.columns.topic)?;
        let embedding = parse_label(row, &self.columns.embedding)?;
        let x = parse_coordinate(row.get(&self.columns.x)).unwrap_or(self.coordinate_fill);
        let y = parse_coordinate(row.get(&self.columns.y)).unwrap_or(self.coordinate_fill);

        let group = if has_groups {
            let raw = row.get(&self.columns.group).and_then(Value::as_str);
            match self.categories.classify(raw) {
                Some(g) => Some(g),
                None => {
                    return Err(format!(
                        "unrecognized {} value {:?}",
                        self.columns.group,
                        raw.unwrap_or("")
                    ))
                }
            }
        } else {
            None
        };

        Ok(ValidatedRow {
            cluster,
            topic,
            embedding,
            x,
            y,
            group,
        })
    }
}

fn parse_label(row: &RawRow, column: &str) -> std::result::Result<i64, String> {
    let label = match row.get(column) {
        None | Some(Value::Null) => return Err(format!("missing {column}")),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(v) => v,
            None => n
                .as_f64()
                .and_then(integral)
                .ok_or_else(|| format!("{column} is not an integer: {n}"))?,
        },
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Err(format!("missing {column}"));
            }
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
                .ok_or_else(|| format!("{column} is not an integer: {s:?}"))?
        }
        Some(other) => return Err(format!("{column} has unsupported value {other}")),
    };
    if label < NOISE_LABEL {
        return Err(format!("{column} has invalid label {label}"));
    }
    Ok(label)
}

fn integral(v: f64) -> Option<i64> {
    (v.is_finite() && v.fract() == 0.0 && v.abs() < 9.0e15).then_some(v as i64)
}

fn parse_coordinate(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
