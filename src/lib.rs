#![forbid(unsafe_code)]

//! # partition-agreement
//!
//! Measures how much three independent partitions of the same items agree:
//! concept clusters from free-text grouping, dominant topics from topic
//! modeling, and clusters in an embedding space.
//!
//! Label ids from different methods are arbitrary, so raw co-occurrence is
//! meaningless. For each pair of methods the engine builds a confusion matrix,
//! solves the maximum-weight one-to-one label matching (Hungarian algorithm),
//! and reports the fraction of points that land on a matched cell together
//! with the resolved label mapping. Noise (`-1`) always maps to noise.
//!
//! Inputs come in three shapes: plain per-point label arrays, loosely typed
//! per-item rows that need validation, or per-method aggregate counts that are
//! expanded and positionally aligned. See [`request::AgreementRequest`].

pub mod config;
pub mod contingency;
pub mod error;
pub mod evaluation;
pub mod labels;
pub mod matching;
pub mod orchestrator;
pub mod reconcile;
pub mod records;
pub mod request;
pub mod scoring;

pub use config::{AgreementConfig, CategoryPolicy, ColumnConfig, IndexPolicy};
pub use contingency::{ConfusionMatrix, ConfusionMatrixBuilder, ContingencyError, ContingencyTable};
pub use error::{AgreementError, ErrorDocument, ErrorKind, Result};
pub use labels::{LabelAssignment, Method, MethodPair, NOISE_LABEL};
pub use matching::{linear_sum_assignment, MatchingError, OptimalMatcher, OptimalMatching};
pub use orchestrator::{
    score_request, score_source, AgreementReport, AgreementScores, AlignedAssignments,
    PairwiseAgreementOrchestrator,
};
pub use reconcile::{
    AggregateRecord, AggregateSources, AlignmentMode, AlignmentSummary, AssignmentReconciler,
    ConceptResults, Magnitude,
};
pub use records::{RecordValidator, RowRejection, ValidatedTable};
pub use request::{AgreementRequest, LabelSource, PerPointLabels};
pub use scoring::{AgreementResult, AgreementScorer};
