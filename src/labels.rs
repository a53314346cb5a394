//! Per-method label sequences and the method/pair vocabulary.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AgreementError, Result};

/// Reserved label meaning "no cluster assigned".
pub const NOISE_LABEL: i64 = -1;

/// The three partitioning methods being compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Concept grouping of free-text responses.
    Cluster,
    /// Dominant topic from topic modeling.
    Topic,
    /// Embedding-space clustering.
    Embedding,
}

impl Method {
    pub const ALL: [Method; 3] = [Method::Cluster, Method::Topic, Method::Embedding];

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Cluster => "cluster",
            Method::Topic => "topic",
            Method::Embedding => "embedding",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the three unordered method pairs; the first method is the row side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodPair {
    ClusterTopic,
    ClusterEmbedding,
    TopicEmbedding,
}

impl MethodPair {
    pub const ALL: [MethodPair; 3] = [
        MethodPair::ClusterTopic,
        MethodPair::ClusterEmbedding,
        MethodPair::TopicEmbedding,
    ];

    pub fn methods(self) -> (Method, Method) {
        match self {
            MethodPair::ClusterTopic => (Method::Cluster, Method::Topic),
            MethodPair::ClusterEmbedding => (Method::Cluster, Method::Embedding),
            MethodPair::TopicEmbedding => (Method::Topic, Method::Embedding),
        }
    }

    /// Key used in `agreement_scores` and `contingency_tables`.
    pub fn key(self) -> &'static str {
        match self {
            MethodPair::ClusterTopic => "cluster_topic",
            MethodPair::ClusterEmbedding => "cluster_embedding",
            MethodPair::TopicEmbedding => "topic_embedding",
        }
    }
}

impl fmt::Display for MethodPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Ordered per-point labels produced by one method.
///
/// Non-empty, and every label is either non-negative or [`NOISE_LABEL`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LabelAssignment {
    labels: Vec<i64>,
}

impl LabelAssignment {
    pub fn new(labels: Vec<i64>) -> Result<Self> {
        if labels.is_empty() {
            return Err(AgreementError::input_shape("empty labels"));
        }
        if let Some(bad) = labels.iter().find(|&&l| l < NOISE_LABEL) {
            return Err(AgreementError::input_shape(format!(
                "invalid label {bad}: labels must be >= 0 or the noise label {NOISE_LABEL}"
            )));
        }
        Ok(Self { labels })
    }

    /// Validate labels for a named method so errors say which source was bad.
    pub fn for_method(method: Method, labels: Vec<i64>) -> Result<Self> {
        Self::new(labels).map_err(|err| match err {
            AgreementError::InputShape { message } => {
                AgreementError::input_shape(format!("{method} labels: {message}"))
            }
            other => other,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[i64] {
        &self.labels
    }

    /// Distinct labels in ascending order (noise first when present).
    pub fn distinct(&self) -> BTreeSet<i64> {
        self.labels.iter().copied().collect()
    }

    pub fn distinct_non_noise(&self) -> usize {
        self.distinct().range(0..).count()
    }

    pub fn contains_noise(&self) -> bool {
        self.labels.contains(&NOISE_LABEL)
    }

    /// Largest non-noise label, if any.
    pub fn max_label(&self) -> Option<i64> {
        self.labels.iter().copied().filter(|&l| l >= 0).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_sub_noise_labels() {
        assert!(matches!(
            LabelAssignment::new(vec![]),
            Err(AgreementError::InputShape { .. })
        ));
        assert!(LabelAssignment::new(vec![0, -2]).is_err());
        assert!(LabelAssignment::new(vec![0, -1, 3]).is_ok());
    }

    #[test]
    fn method_name_prefixes_shape_errors() {
        let err = LabelAssignment::for_method(Method::Topic, vec![]).unwrap_err();
        assert!(err.to_string().contains("topic labels"));
    }

    #[test]
    fn distinct_and_noise_helpers() {
        let a = LabelAssignment::new(vec![2, 0, -1, 2, 5]).unwrap();
        assert_eq!(a.distinct().into_iter().collect::<Vec<_>>(), vec![-1, 0, 2, 5]);
        assert_eq!(a.distinct_non_noise(), 3);
        assert!(a.contains_noise());
        assert_eq!(a.max_label(), Some(5));

        let only_noise = LabelAssignment::new(vec![-1, -1]).unwrap();
        assert_eq!(only_noise.max_label(), None);
        assert_eq!(only_noise.distinct_non_noise(), 0);
    }

    #[test]
    fn pair_keys_match_report_fields() {
        let keys: Vec<_> = MethodPair::ALL.iter().map(|p| p.key()).collect();
        assert_eq!(keys, ["cluster_topic", "cluster_embedding", "topic_embedding"]);
        assert_eq!(
            MethodPair::TopicEmbedding.methods(),
            (Method::Topic, Method::Embedding)
        );
    }
}
