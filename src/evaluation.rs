//! Offline evaluation harness for the agreement engine.
//!
//! Generates three noisy, independently relabelled views of a known ground
//! truth partition and scores them with the real orchestrator. A greedy
//! largest-cell-first matching serves as the baseline the optimal matching
//! must never lose to.

use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::info;

use crate::config::{AgreementConfig, IndexPolicy};
use crate::contingency::{ConfusionMatrix, ConfusionMatrixBuilder};
use crate::error::Result;
use crate::labels::{LabelAssignment, Method, MethodPair, NOISE_LABEL};
use crate::orchestrator::{AgreementScores, AlignedAssignments, PairwiseAgreementOrchestrator};
use crate::reconcile::AlignmentSummary;

// =============================================================================
// Synthetic case definitions
// =============================================================================

#[derive(Debug, Clone)]
pub struct SyntheticCase {
    pub name: &'static str,
    pub points: usize,
    pub classes: usize,
    /// Probability a point's label is replaced by a uniformly random class.
    pub corruption: f64,
    /// Probability a point is marked as noise (`-1`).
    pub noise_rate: f64,
    /// Topic view splits ground-truth class 0 across two labels.
    pub split_topic: bool,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub case_name: String,
    pub points: usize,
    pub scores: AgreementScores,
    pub greedy_scores: AgreementScores,
    /// Holds for every pair when the assignment solver is correct.
    pub optimal_at_least_greedy: bool,
    pub latency_ms: u128,
}

// =============================================================================
// Public API
// =============================================================================

pub fn synthetic_cases() -> Vec<SyntheticCase> {
    vec![
        SyntheticCase {
            name: "permuted_identity_200",
            points: 200,
            classes: 4,
            corruption: 0.0,
            noise_rate: 0.0,
            split_topic: false,
            seed: 42,
        },
        SyntheticCase {
            name: "noisy_relabel_500",
            points: 500,
            classes: 5,
            corruption: 0.2,
            noise_rate: 0.0,
            split_topic: false,
            seed: 43,
        },
        SyntheticCase {
            name: "rectangular_split_300",
            points: 300,
            classes: 3,
            corruption: 0.05,
            noise_rate: 0.0,
            split_topic: true,
            seed: 44,
        },
        SyntheticCase {
            name: "noise_heavy_400",
            points: 400,
            classes: 4,
            corruption: 0.1,
            noise_rate: 0.3,
            split_topic: false,
            seed: 45,
        },
        SyntheticCase {
            name: "high_cardinality_2000",
            points: 2000,
            classes: 60,
            corruption: 0.1,
            noise_rate: 0.02,
            split_topic: false,
            seed: 46,
        },
    ]
}

pub fn run_synthetic_suite(filter: Option<&str>) -> Result<Vec<EvaluationResult>> {
    let cases = synthetic_cases();
    let selected: Vec<SyntheticCase> = match filter {
        Some(name) => cases.into_iter().filter(|c| c.name == name).collect(),
        None => cases,
    };

    selected.iter().map(run_synthetic_case).collect()
}

pub fn run_synthetic_case(case: &SyntheticCase) -> Result<EvaluationResult> {
    let aligned = generate(case)?;
    let start_time = Instant::now();
    let report = PairwiseAgreementOrchestrator::new(AgreementConfig::default()).run(&aligned)?;
    let latency_ms = start_time.elapsed().as_millis();

    let builder = ConfusionMatrixBuilder::new(IndexPolicy::Sparse);
    let mut greedy = [0.0; 3];
    for (slot, pair) in greedy.iter_mut().zip(MethodPair::ALL) {
        let (ma, mb) = pair.methods();
        let matrix = builder.build(aligned.get(ma), aligned.get(mb))?;
        *slot = greedy_score(&matrix);
    }
    let greedy_scores = AgreementScores {
        cluster_topic: greedy[0],
        cluster_embedding: greedy[1],
        topic_embedding: greedy[2],
    };
    let optimal_at_least_greedy = MethodPair::ALL
        .iter()
        .all(|&pair| report.agreement_scores.get(pair) + 1e-12 >= greedy_scores.get(pair));

    info!(
        case = case.name,
        cluster_topic = report.agreement_scores.cluster_topic,
        optimal_at_least_greedy,
        "synthetic case scored"
    );

    Ok(EvaluationResult {
        case_name: case.name.to_string(),
        points: aligned.len(),
        scores: report.agreement_scores,
        greedy_scores,
        optimal_at_least_greedy,
        latency_ms,
    })
}

// =============================================================================
// Generation
// =============================================================================

fn generate(case: &SyntheticCase) -> Result<AlignedAssignments> {
    let mut rng = StdRng::seed_from_u64(case.seed);
    let mut truth: Vec<usize> = (0..case.points).map(|i| i % case.classes).collect();
    truth.shuffle(&mut rng);

    let mut view = |method: Method| -> Result<LabelAssignment> {
        let mut ids: Vec<i64> = (0..case.classes as i64).collect();
        ids.shuffle(&mut rng);
        let labels = truth
            .iter()
            .map(|&t| {
                if rng.gen::<f64>() < case.noise_rate {
                    return NOISE_LABEL;
                }
                let class = if rng.gen::<f64>() < case.corruption {
                    rng.gen_range(0..case.classes)
                } else {
                    t
                };
                if case.split_topic && method == Method::Topic && class == 0 && rng.gen_bool(0.5) {
                    case.classes as i64
                } else {
                    ids[class]
                }
            })
            .collect();
        LabelAssignment::for_method(method, labels)
    };

    let cluster = view(Method::Cluster)?;
    let topic = view(Method::Topic)?;
    let embedding = view(Method::Embedding)?;
    AlignedAssignments::new(cluster, topic, embedding, AlignmentSummary::per_item(case.points))
}

/// Largest-cell-first one-to-one matching, as a baseline. Noise pairs only
/// with noise, as in the optimal score.
fn greedy_score(full: &ConfusionMatrix) -> f64 {
    let matrix = full.without_noise();
    let mut cells: Vec<(u64, usize, usize)> = (0..matrix.rows())
        .flat_map(|r| (0..matrix.cols()).map(move |c| (r, c)))
        .map(|(r, c)| (matrix.get(r, c), r, c))
        .filter(|&(count, _, _)| count > 0)
        .collect();
    cells.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    let mut row_used = vec![false; matrix.rows()];
    let mut col_used = vec![false; matrix.cols()];
    let mut matched = full.noise_cell();
    for (count, r, c) in cells {
        if row_used[r] || col_used[c] {
            continue;
        }
        row_used[r] = true;
        col_used[c] = true;
        matched += count;
    }

    let total = full.total();
    if total == 0 {
        f64::NAN
    } else {
        matched as f64 / total as f64
    }
}
