//! Error taxonomy for the agreement engine.
//!
//! Lower layers (`contingency`, `matching`) carry their own error enums; the
//! orchestrator folds those into [`AgreementError::InternalComputation`] so a
//! caller only ever sees one of the kinds below.

use serde::Serialize;
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, AgreementError>;

/// Stable tag for each error kind, emitted in failure documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputShape,
    Schema,
    DegenerateData,
    Internal,
    InvalidJson,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InputShape => "input_shape",
            ErrorKind::Schema => "schema",
            ErrorKind::DegenerateData => "degenerate_data",
            ErrorKind::Internal => "internal",
            ErrorKind::InvalidJson => "invalid_json",
        }
    }
}

#[derive(Debug, Error)]
pub enum AgreementError {
    /// A label source is empty or cannot yield any comparable points.
    #[error("input shape error: {message}")]
    InputShape { message: String },

    /// Required per-point fields are absent from a tabular input.
    #[error("schema error: missing required field(s): {}", missing.join(", "))]
    Schema { missing: Vec<String> },

    /// Data is present but agreement is undefined for it.
    #[error("degenerate data: {message}")]
    DegenerateData { message: String },

    /// Unexpected failure while building matrices or solving the assignment.
    #[error("internal computation error: {message}")]
    InternalComputation { message: String },

    /// The request document could not be decoded.
    #[error("invalid JSON input: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AgreementError {
    pub fn input_shape(message: impl Into<String>) -> Self {
        Self::InputShape {
            message: message.into(),
        }
    }

    pub fn schema(missing: Vec<String>) -> Self {
        Self::Schema { missing }
    }

    pub fn degenerate(message: impl Into<String>) -> Self {
        Self::DegenerateData {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalComputation {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InputShape { .. } => ErrorKind::InputShape,
            Self::Schema { .. } => ErrorKind::Schema,
            Self::DegenerateData { .. } => ErrorKind::DegenerateData,
            Self::InternalComputation { .. } => ErrorKind::Internal,
            Self::Serialization(_) => ErrorKind::InvalidJson,
        }
    }
}

/// JSON-shaped failure document written instead of a report.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDocument {
    pub error: String,
    pub kind: String,
    /// Source chain, outermost first. Only populated in diagnostic mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain: Option<Vec<String>>,
}

impl ErrorDocument {
    /// Build a failure document from any error, tagging it with `kind`.
    pub fn from_error(
        err: &(dyn std::error::Error + 'static),
        kind: &str,
        diagnostics: bool,
    ) -> Self {
        let chain = diagnostics.then(|| {
            let mut out = vec![err.to_string()];
            let mut source = err.source();
            while let Some(inner) = source {
                out.push(inner.to_string());
                source = inner.source();
            }
            out
        });
        Self {
            error: err.to_string(),
            kind: kind.to_string(),
            chain,
        }
    }
}
