//! Agreement score and label mapping for one pair of assignments.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::contingency::{ConfusionMatrix, ConfusionMatrixBuilder, ContingencyError};
use crate::error::{AgreementError, Result};
use crate::labels::{LabelAssignment, NOISE_LABEL};
use crate::matching::{MatchingError, OptimalMatcher, OptimalMatching};

/// Score plus the resolved method-A → method-B label mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgreementResult {
    /// Matched points over all points, in `[0, 1]`.
    pub score: f64,
    pub matched: u64,
    pub total: u64,
    /// Partial, injective; contains `-1 -> -1` whenever method A has noise.
    pub mapping: BTreeMap<i64, i64>,
}

impl AgreementResult {
    /// Whether a point labelled `a` by method A and `b` by method B agrees
    /// under the mapping. Unmapped labels never agree.
    pub fn maps(&self, a: i64, b: i64) -> bool {
        self.mapping.get(&a) == Some(&b)
    }
}

/// A scored pair together with the matrix it was derived from.
#[derive(Debug, Clone)]
pub struct ScoredPair {
    /// Full matrix, noise row/column included.
    pub matrix: ConfusionMatrix,
    /// Matching over the noise-free core; indices refer to `matrix.without_noise()`.
    pub matching: OptimalMatching,
    pub result: AgreementResult,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AgreementScorer {
    builder: ConfusionMatrixBuilder,
    matcher: OptimalMatcher,
}

impl AgreementScorer {
    pub fn new(builder: ConfusionMatrixBuilder) -> Self {
        Self {
            builder,
            matcher: OptimalMatcher,
        }
    }

    /// Build the confusion matrix, solve the matching over non-noise labels,
    /// and score it.
    pub fn score(&self, a: &LabelAssignment, b: &LabelAssignment) -> Result<ScoredPair> {
        if a.is_empty() || b.is_empty() {
            return Err(AgreementError::input_shape("empty labels"));
        }
        let matrix = self.builder.build(a, b)?;
        let core = matrix.without_noise();
        let matching = self.matcher.solve(&core)?;
        let result = Self::from_matching(&matrix, &core, &matching);
        debug!(
            rows = core.rows(),
            cols = core.cols(),
            matched = result.matched,
            noise_matched = matrix.noise_cell(),
            total = result.total,
            "scored label pair"
        );
        Ok(ScoredPair {
            matrix,
            matching,
            result,
        })
    }

    /// Turn a matching over `core` (the noise-free part of `matrix`) into an
    /// [`AgreementResult`]. Noise pairs only with noise: the `(-1, -1)` cell
    /// counts as matched, every other noise cell as disagreement.
    pub fn from_matching(
        matrix: &ConfusionMatrix,
        core: &ConfusionMatrix,
        matching: &OptimalMatching,
    ) -> AgreementResult {
        let mut mapping: BTreeMap<i64, i64> = matching
            .pairs()
            .iter()
            .map(|&(r, c)| (core.row_labels()[r], core.col_labels()[c]))
            .collect();
        if matrix.row_labels().first() == Some(&NOISE_LABEL) {
            mapping.insert(NOISE_LABEL, NOISE_LABEL);
        }

        let matched = matching.matched() + matrix.noise_cell();
        let total = matrix.total();
        let score = if total == 0 {
            f64::NAN
        } else {
            matched as f64 / total as f64
        };

        AgreementResult {
            score,
            matched,
            total,
            mapping,
        }
    }
}

impl From<ContingencyError> for AgreementError {
    fn from(err: ContingencyError) -> Self {
        match err {
            ContingencyError::DenseExtentTooLarge { .. }
            | ContingencyError::TooManyLabels { .. } => AgreementError::input_shape(err.to_string()),
            other => AgreementError::internal(other.to_string()),
        }
    }
}

impl From<MatchingError> for AgreementError {
    fn from(err: MatchingError) -> Self {
        AgreementError::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexPolicy;

    fn la(labels: &[i64]) -> LabelAssignment {
        LabelAssignment::new(labels.to_vec()).unwrap()
    }

    fn dense() -> AgreementScorer {
        AgreementScorer::new(ConfusionMatrixBuilder::new(IndexPolicy::Dense))
    }

    #[test]
    fn swapped_ids_still_agree_fully() {
        let scored = dense().score(&la(&[0, 0, 1, 1]), &la(&[1, 1, 0, 0])).unwrap();
        assert_eq!(scored.result.score, 1.0);
        assert_eq!(scored.result.mapping, BTreeMap::from([(0, 1), (1, 0)]));
    }

    #[test]
    fn identical_inputs_map_to_identity() {
        let labels = [2, 0, 1, 2, 1, 0];
        let scored = dense().score(&la(&labels), &la(&labels)).unwrap();
        assert_eq!(scored.result.score, 1.0);
        assert_eq!(
            scored.result.mapping,
            BTreeMap::from([(0, 0), (1, 1), (2, 2)])
        );
    }

    #[test]
    fn noise_label_is_forced_through() {
        let scored = dense()
            .score(&la(&[0, 0, 1, 1, -1]), &la(&[0, 1, 1, 1, -1]))
            .unwrap();
        assert_eq!(scored.result.mapping.get(&-1), Some(&-1));
        assert_eq!(scored.result.mapping.get(&0), Some(&0));
        assert_eq!(scored.result.mapping.get(&1), Some(&1));
        assert_eq!(scored.result.matched, 4);
        assert!((scored.result.score - 0.8).abs() < 1e-12);
    }

    #[test]
    fn noise_never_matches_a_real_label() {
        // A's 0 lines up with B's noise and A's noise with B's 1: nothing agrees.
        let scored = AgreementScorer::new(ConfusionMatrixBuilder::new(IndexPolicy::Sparse))
            .score(&la(&[0, 0, 0, -1, -1]), &la(&[-1, -1, -1, 1, 1]))
            .unwrap();
        assert_eq!(scored.result.matched, 0);
        assert_eq!(scored.result.score, 0.0);
        assert_eq!(scored.result.mapping.get(&-1), Some(&-1));
        assert_eq!(scored.result.mapping.get(&0), Some(&1));
        let targets: Vec<_> = scored.result.mapping.values().collect();
        assert_eq!(targets, vec![&-1, &1]);
    }

    #[test]
    fn unassigned_points_agree_only_with_unassigned() {
        let a = [0, 0, 1, 1, -1, -1, -1, -1];
        let b = [0, 0, 1, 1, 2, 2, 2, 2];
        for policy in [IndexPolicy::Dense, IndexPolicy::Sparse] {
            let scored = AgreementScorer::new(ConfusionMatrixBuilder::new(policy))
                .score(&la(&a), &la(&b))
                .unwrap();
            let result = &scored.result;
            assert_eq!(result.matched, 4);
            assert_eq!(result.score, 0.5);
            assert_eq!(result.mapping, BTreeMap::from([(-1, -1), (0, 0), (1, 1)]));
            let agreeing = a.iter().zip(&b).filter(|(&x, &y)| result.maps(x, y)).count();
            assert_eq!(agreeing as u64, result.matched);
        }
    }

    #[test]
    fn shared_noise_counts_as_agreement() {
        let scored = dense()
            .score(&la(&[0, 1, -1, -1]), &la(&[1, 0, -1, 0]))
            .unwrap();
        assert_eq!(scored.result.matched, 3);
        assert!(scored.result.maps(-1, -1));
        assert!(!scored.result.maps(-1, 0));
    }

    #[test]
    fn sparse_label_cap_is_input_shape() {
        let scorer = AgreementScorer::new(
            ConfusionMatrixBuilder::new(IndexPolicy::Sparse).with_max_axis_labels(2),
        );
        let err = scorer.score(&la(&[5, 6, 7]), &la(&[0, 0, 1])).unwrap_err();
        assert!(matches!(err, AgreementError::InputShape { .. }));
    }

    #[test]
    fn rectangular_leaves_extra_topic_unmapped() {
        // 2 clusters vs 3 topics; topic 2 is the weakest column.
        let a = la(&[0, 0, 0, 1, 1, 1, 1]);
        let b = la(&[0, 0, 2, 1, 1, 1, 2]);
        let scored = dense().score(&a, &b).unwrap();
        assert_eq!(scored.matching.len(), 2);
        assert_eq!(scored.result.mapping.len(), 2);
        assert!(!scored.result.mapping.values().any(|&v| v == 2));
        assert_eq!(scored.result.matched, 5);
    }

    #[test]
    fn sparse_mapping_uses_original_label_values() {
        let scored = AgreementScorer::new(ConfusionMatrixBuilder::new(IndexPolicy::Sparse))
            .score(&la(&[10, 10, 40]), &la(&[7, 7, 3]))
            .unwrap();
        assert_eq!(scored.result.mapping, BTreeMap::from([(10, 7), (40, 3)]));
        assert!(scored.result.maps(10, 7));
        assert!(!scored.result.maps(40, 7));
    }

    #[test]
    fn dense_extent_errors_are_input_shape() {
        let scorer = AgreementScorer::new(
            ConfusionMatrixBuilder::new(IndexPolicy::Dense).with_max_axis_labels(4),
        );
        let err = scorer.score(&la(&[0, 9]), &la(&[0, 1])).unwrap_err();
        assert!(matches!(err, AgreementError::InputShape { .. }));
    }

    #[test]
    fn length_mismatch_is_internal() {
        let err = dense().score(&la(&[0, 1]), &la(&[0])).unwrap_err();
        assert!(matches!(err, AgreementError::InternalComputation { .. }));
    }
}
