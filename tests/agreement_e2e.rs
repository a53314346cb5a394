use partition_agreement::{
    score_request, AgreementError, AgreementRequest, AlignmentMode, ErrorDocument, IndexPolicy,
    MethodPair,
};
use serde_json::json;

fn request(value: serde_json::Value) -> AgreementRequest {
    serde_json::from_value(value).unwrap()
}

#[test]
fn noise_scenario_scores_point_eight() {
    let report = score_request(request(json!({
        "labels": {
            "cluster": [0, 0, 1, 1, -1],
            "topic": [0, 1, 1, 1, -1],
            "embedding": [0, 0, 1, 1, -1]
        }
    })))
    .unwrap();

    assert!((report.agreement_scores.cluster_topic - 0.8).abs() < 1e-12);
    assert_eq!(report.agreement_scores.cluster_embedding, 1.0);
    assert_eq!(report.cluster_topic_mapping.get(&-1), Some(&-1));
    assert_eq!(report.cluster_pca_mapping.get(&-1), Some(&-1));
    assert_eq!(report.meta.alignment.mode, AlignmentMode::PerItem);
    assert_eq!(report.meta.dropped_rows, 0);
    assert_eq!(report.meta.labels_hash.len(), 64);
}

#[test]
fn embedded_config_is_honored() {
    let report = score_request(request(json!({
        "labels": {
            "cluster": [3, 3, 7, 7],
            "topic": [1, 1, 0, 0],
            "embedding": [0, 1, 1, 0]
        },
        "config": {
            "index_policy": "sparse",
            "include_contingency_tables": true,
            "parallel": false
        }
    })))
    .unwrap();

    assert_eq!(report.meta.index_policy, IndexPolicy::Sparse);
    let tables = report.contingency_tables.unwrap();
    assert_eq!(tables[&MethodPair::ClusterTopic].row_labels, vec![3, 7]);
    assert_eq!(report.cluster_topic_mapping.get(&3), Some(&1));
    assert_eq!(report.agreement_scores.cluster_embedding, 0.5);
}

#[test]
fn rows_drop_incomplete_and_break_down_groups() {
    let report = score_request(request(json!({
        "rows": [
            {"concept_cluster": 0, "Dominant_Topic": 1, "cluster": 0, "pca_one": 1.0, "pca_two": 2.0, "Race": "Black"},
            {"concept_cluster": 0, "Dominant_Topic": 1, "cluster": 0, "pca_one": 1.5, "pca_two": 2.5, "Race": "Hispanic"},
            {"concept_cluster": 1, "Dominant_Topic": 0, "cluster": 1, "pca_one": 3.0, "pca_two": 4.0, "Race": "Black"},
            {"concept_cluster": 1, "Dominant_Topic": 0, "cluster": "", "pca_one": 3.0, "pca_two": 4.0, "Race": "Black"},
            {"concept_cluster": 1, "Dominant_Topic": 0, "cluster": 1, "pca_one": 3.0, "Race": "Klingon"}
        ]
    })))
    .unwrap();

    assert_eq!(report.meta.points, 4);
    assert_eq!(report.meta.dropped_rows, 1);
    assert_eq!(report.meta.index_policy, IndexPolicy::Sparse);
    assert_eq!(report.agreement_scores.cluster_topic, 1.0);

    let points = report.visualization_data.unwrap();
    assert_eq!(points.len(), 4);
    assert_eq!(points[3].pca_two, 0.0);
    assert!(points.iter().all(|p| p.cluster_topic_agree));

    let groups = report.group_agreement.unwrap();
    assert_eq!(groups["Black"].points, 2);
    assert_eq!(groups["Unknown"].points, 1);
    assert!(!groups.contains_key("Klingon"));
}

#[test]
fn missing_columns_are_all_reported() {
    let err = score_request(request(json!({
        "rows": [{"concept_cluster": 0}]
    })))
    .unwrap_err();
    match err {
        AgreementError::Schema { missing } => {
            assert_eq!(missing, vec!["Dominant_Topic", "cluster", "pca_one", "pca_two"]);
        }
        other => panic!("expected schema error, got {other:?}"),
    }
}

#[test]
fn coordinates_not_required_without_visualization() {
    let report = score_request(request(json!({
        "rows": [
            {"concept_cluster": 0, "Dominant_Topic": 0, "cluster": 0},
            {"concept_cluster": 1, "Dominant_Topic": 1, "cluster": 1}
        ],
        "config": {"include_visualization": false}
    })))
    .unwrap();
    assert!(report.visualization_data.is_none());
    assert_eq!(report.agreement_scores.topic_embedding, 1.0);
}

#[test]
fn concept_results_are_positionally_aligned() {
    let report = score_request(request(json!({
        "conceptResults": {
            "llm": {"clusters": [
                {"id": 0, "frequency": [2, 1]},
                {"id": 1, "frequency": [2]}
            ]},
            "lda": {"topics": [
                {"topic_id": 0, "weights": [0.02]},
                {"topic_id": 1, "weights": [0.02, 0.02]}
            ]},
            "embeddings": [
                {"cluster_id": 0, "size": 4},
                {"cluster_id": 1, "size": 6}
            ]
        }
    })))
    .unwrap();

    // cluster [0,0,0,1,1], topic [0,0,1,1,1,1] -> 5, embedding 10 -> 5.
    assert_eq!(report.meta.points, 5);
    assert_eq!(report.meta.alignment.mode, AlignmentMode::PositionalTruncation);
    assert_eq!(report.meta.alignment.source_lengths.topic, 6);
    assert!((report.agreement_scores.cluster_topic - 0.8).abs() < 1e-12);
    assert!(report.visualization_data.is_none());
}

#[test]
fn single_label_method_is_degenerate() {
    let err = score_request(request(json!({
        "aggregates": {
            "cluster": [{"label": 0, "count": 2}, {"label": 1, "count": 2}],
            "topic": [{"label": 0, "count": 2}, {"label": 1, "count": 2}],
            "embedding": [{"label": 4, "count": 4}]
        }
    })))
    .unwrap_err();
    assert!(matches!(err, AgreementError::DegenerateData { .. }));
}

#[test]
fn zero_weight_aggregates_are_input_shape() {
    let err = score_request(request(json!({
        "aggregates": {
            "cluster": [{"label": 0, "count": 2}],
            "topic": [{"label": 0, "weight": 0.001}],
            "embedding": [{"label": 0, "count": 2}]
        }
    })))
    .unwrap_err();
    assert!(matches!(err, AgreementError::InputShape { .. }));
}

#[test]
fn huge_dense_labels_are_rejected_not_allocated() {
    let err = score_request(request(json!({
        "labels": {
            "cluster": [0, 1_000_000],
            "topic": [0, 1],
            "embedding": [1, 0]
        }
    })))
    .unwrap_err();
    assert!(matches!(err, AgreementError::InputShape { .. }));

    let report = score_request(request(json!({
        "labels": {
            "cluster": [0, 1_000_000],
            "topic": [0, 1],
            "embedding": [1, 0]
        },
        "config": {"index_policy": "sparse"}
    })))
    .unwrap();
    assert_eq!(report.cluster_topic_mapping.get(&1_000_000), Some(&1));
}

#[test]
fn unassigned_points_do_not_pair_with_a_topic() {
    let report = score_request(request(json!({
        "labels": {
            "cluster": [0, 0, 1, 1, -1, -1, -1, -1],
            "topic": [0, 0, 1, 1, 2, 2, 2, 2],
            "embedding": [0, 0, 1, 1, 2, 2, 2, 2],
            "coordinates": [[0.0, 0.0], [0.1, 0.1], [0.2, 0.2], [0.3, 0.3],
                            [0.4, 0.4], [0.5, 0.5], [0.6, 0.6], [0.7, 0.7]]
        }
    })))
    .unwrap();

    assert_eq!(report.agreement_scores.cluster_topic, 0.5);
    assert_eq!(report.agreement_scores.topic_embedding, 1.0);
    assert_eq!(report.cluster_topic_mapping.get(&-1), Some(&-1));
    assert!(!report.cluster_topic_mapping.values().any(|&t| t == 2));

    let points = report.visualization_data.unwrap();
    let agreeing = points.iter().filter(|p| p.cluster_topic_agree).count();
    assert_eq!(agreeing as f64 / points.len() as f64, 0.5);
}

#[test]
fn too_many_sparse_labels_are_input_shape() {
    let rows: Vec<_> = (0..5)
        .map(|i| json!({"concept_cluster": i * 100, "Dominant_Topic": i % 2, "cluster": i % 2}))
        .collect();
    let err = score_request(request(json!({
        "rows": rows,
        "config": {"max_axis_labels": 3, "include_visualization": false}
    })))
    .unwrap_err();
    assert!(matches!(err, AgreementError::InputShape { .. }));
}

#[test]
fn invalid_config_is_checked_before_aggregates_expand() {
    let err = score_request(request(json!({
        "aggregates": {
            "cluster": [{"label": 0, "count": 2}, {"label": 1, "count": 2}],
            "topic": [{"label": 0, "weight": 0.02}, {"label": 1, "weight": 0.02}],
            "embedding": [{"label": 0, "count": 2}, {"label": 1, "count": 2}]
        },
        "config": {"weight_scale": 0.0}
    })))
    .unwrap_err();
    match err {
        AgreementError::InputShape { message } => assert!(message.contains("weight_scale")),
        other => panic!("expected input_shape, got {other:?}"),
    }
}

#[test]
fn invalid_config_is_rejected() {
    let err = score_request(request(json!({
        "labels": {"cluster": [0, 1], "topic": [0, 1], "embedding": [0, 1]},
        "config": {"weight_scale": 0.0}
    })))
    .unwrap_err();
    assert!(matches!(err, AgreementError::InputShape { .. }));
}

#[test]
fn failure_document_carries_kind_and_optional_chain() {
    let err = score_request(request(json!({}))).unwrap_err();
    let doc = ErrorDocument::from_error(&err, err.kind().as_str(), false);
    let v = serde_json::to_value(&doc).unwrap();
    assert_eq!(v["kind"], "input_shape");
    assert!(v.get("chain").is_none());

    let doc = ErrorDocument::from_error(&err, err.kind().as_str(), true);
    assert_eq!(doc.chain.unwrap().len(), 1);
}
