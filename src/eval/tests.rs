use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::json;

use super::*;
use crate::document::Node;
use crate::pipeline::{AttemptOutcome, AttemptRecord, RunResult};
use crate::schema::CanonicalSchema;
use crate::semantic::TextSimilarity;

struct ExactSimilarity;

impl TextSimilarity for ExactSimilarity {
    fn name(&self) -> &str {
        "exact"
    }

    fn similarity(&self, left: &str, right: &str) -> f64 {
        if left == right { 1.0 } else { 0.0 }
    }
}

fn doc(value: serde_json::Value) -> Node {
    Node::from(value)
}

fn attempt(index: u32, outcome: AttemptOutcome, millis: u64) -> AttemptRecord {
    AttemptRecord {
        attempt_index: index,
        outcome,
        elapsed: Duration::from_millis(millis),
        raw_response_excerpt: String::new(),
    }
}

fn succeeded_run(sample_index: usize, document: Node, failures: u32, millis: u64) -> RunResult {
    let mut attempts = (0..failures)
        .map(|index| attempt(index, AttemptOutcome::ParseFailure("bad".to_string()), millis))
        .collect::<Vec<_>>();
    attempts.push(attempt(failures, AttemptOutcome::Success, millis));
    RunResult::new(sample_index, Some(document), attempts)
}

fn failed_run(sample_index: usize, attempts: u32, millis: u64) -> RunResult {
    RunResult::new(
        sample_index,
        None,
        (0..attempts)
            .map(|index| attempt(index, AttemptOutcome::ParseFailure("bad".to_string()), millis))
            .collect(),
    )
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn normalization_collapses_empty_spellings() {
    assert_eq!(normalize_text("  Fever "), "fever");
    assert_eq!(normalize_text("None"), EMPTY_MARKER);
    assert_eq!(normalize_text("   "), EMPTY_MARKER);
    assert_eq!(normalize_text("NULL"), EMPTY_MARKER);
}

#[test]
fn flatten_routes_record_arrays_away_from_field_paths() {
    let flat = flatten(&doc(json!({
        "visit motivation": " Chest Pain ",
        "patient information": {"age": 54, "sex": "None", "travels": []},
        "symptoms": [{"name of symptom": "pain"}],
        "allergies": ["Penicillin", null, "latex"],
        "discharge": {}
    })));

    let expected = [
        ("visit motivation", "chest pain"),
        ("patient information.age", "54"),
        ("patient information.sex", ""),
        ("patient information.travels", ""),
        ("allergies.0", "penicillin"),
        ("allergies.1", ""),
        ("allergies.2", "latex"),
        ("discharge", ""),
    ]
    .into_iter()
    .map(|(path, value)| (path.to_string(), value.to_string()))
    .collect::<FlatDocument>();
    assert_eq!(flat, expected);
}

#[test]
fn extract_records_tolerates_loose_sections() {
    let document = doc(json!({
        "symptoms": [{"a": 1}, {"b": 2}],
        "treatments": "aspirin",
        "surgeries": null
    }));
    assert_eq!(extract_records(&document, "symptoms").len(), 2);
    assert_eq!(
        extract_records(&document, "treatments"),
        vec![&Node::text("aspirin")]
    );
    assert!(extract_records(&document, "surgeries").is_empty());
    assert!(extract_records(&document, "admission").is_empty());
}

#[test]
fn signature_is_sorted_normalized_and_skips_empty_fields() {
    let record = doc(json!({
        "Time": "Two Days",
        "name of symptom": " Fever ",
        "location": null,
        "details": "none"
    }));
    assert_eq!(signature(&record), "name of symptom:fever|time:two days");

    let reordered = doc(json!({"name of symptom": "fever", "time": "two days"}));
    assert_eq!(signature(&record), signature(&reordered));

    assert_eq!(signature(&Node::text("  Cough ")), "cough");
    assert_eq!(signature(&doc(json!({"a": null, "b": ""}))), EMPTY_MARKER);
    assert_eq!(
        signature(&doc(json!({"dose": {"amount": "5 mg"}, "tags": ["a", null]}))),
        "dose:{amount:5 mg}|tags:[a]"
    );
}

#[test]
fn mismatched_value_is_one_false_negative_and_no_false_positive() {
    let prediction = flatten(&doc(json!({"discharge": {"referral": "cardiology"}})));
    let reference = flatten(&doc(json!({"discharge": {"referral": "neurology"}})));

    let counts = score_fields(&prediction, &reference);
    assert_eq!(
        counts,
        PrfCounts {
            true_positives: 0,
            false_positives: 0,
            false_negatives: 1,
        }
    );
    assert_eq!(counts.precision(), 0.0);
    assert_eq!(counts.recall(), 0.0);
    assert_eq!(counts.f1(), 0.0);
}

#[test]
fn field_scores_count_extra_and_missing_paths() {
    let prediction = flatten(&doc(json!({"a": "1", "b": "2", "c": "3", "e": "5"})));
    let reference = flatten(&doc(json!({"a": "1", "b": "2", "d": "4"})));

    let forward = score_fields(&prediction, &reference);
    assert_eq!(forward.true_positives, 2);
    assert_eq!(forward.false_positives, 2);
    assert_eq!(forward.false_negatives, 1);
    assert_close(forward.precision(), 0.5);
    assert_close(forward.recall(), 2.0 / 3.0);

    let backward = score_fields(&reference, &prediction);
    assert_eq!(backward.true_positives, forward.true_positives);
    assert_close(backward.precision(), forward.recall());
    assert_close(backward.recall(), forward.precision());
    assert_close(backward.f1(), forward.f1());
    assert_close(forward.f1(), 4.0 / 7.0);
}

#[test]
fn empty_inputs_score_zero_instead_of_dividing_by_zero() {
    let counts = score_fields(&FlatDocument::new(), &FlatDocument::new());
    assert_eq!(counts, PrfCounts::default());
    assert_eq!(counts.f1(), 0.0);
}

#[test]
fn renamed_symptom_field_falls_below_default_threshold() {
    let reference = doc(json!({"symptoms": [{"name of symptom": "fever"}]}));
    let prediction = doc(json!({"symptoms": [{"symptom": "fever"}]}));

    let ratio = similarity_ratio("symptom:fever", "name of symptom:fever");
    assert_close(ratio, 13.0 / 21.0);
    assert_close(similarity_ratio("name of symptom:fever", "symptom:fever"), ratio);

    let strict = score_section(&prediction, &reference, "symptoms", DEFAULT_MATCH_THRESHOLD);
    assert!(strict.matched.is_empty());
    assert_eq!(strict.unmatched_predicted, vec![0]);
    assert_eq!(strict.unmatched_reference, vec![0]);
    let counts = strict.counts();
    assert_eq!(counts.precision(), 0.0);
    assert_eq!(counts.recall(), 0.0);
    assert_eq!(counts.f1(), 0.0);

    let lenient = score_section(&prediction, &reference, "symptoms", 0.6);
    assert_eq!(lenient.matched.len(), 1);
    assert_close(lenient.matched[0].similarity, 13.0 / 21.0);
    assert_eq!(lenient.counts().f1(), 1.0);
}

#[test]
fn matcher_prefers_globally_best_pair_over_first_found() {
    let predicted = vec!["fever high".to_string(), "fever".to_string()];
    let reference = vec!["fever".to_string()];

    let result = match_signatures(&predicted, &reference, 0.4);
    assert_eq!(
        result.matched,
        vec![MatchedPair {
            predicted: 1,
            reference: 0,
            similarity: 1.0,
        }]
    );
    assert_eq!(result.unmatched_predicted, vec![0]);
    assert!(result.unmatched_reference.is_empty());
}

#[test]
fn matcher_breaks_ties_by_lowest_indices_and_is_deterministic() {
    let predicted = vec!["cough".to_string(), "cough".to_string()];
    let reference = vec!["cough".to_string(), "cough".to_string(), "cough".to_string()];

    let first = match_signatures(&predicted, &reference, 0.7);
    let pairs = first
        .matched
        .iter()
        .map(|pair| (pair.predicted, pair.reference))
        .collect::<Vec<_>>();
    assert_eq!(pairs, vec![(0, 0), (1, 1)]);
    assert_eq!(first.unmatched_reference, vec![2]);

    let second = match_signatures(&predicted, &reference, 0.7);
    assert_eq!(first, second);
}

#[test]
fn matcher_tolerates_reordering() {
    let prediction = doc(json!({"treatments": [
        {"name": "aspirin", "dosage": "81 mg"},
        {"name": "metoprolol", "dosage": "25 mg"}
    ]}));
    let reference = doc(json!({"treatments": [
        {"dosage": "25 mg", "name": "Metoprolol"},
        {"dosage": "81 mg", "name": "Aspirin", "frequency": null}
    ]}));

    let result = score_section(&prediction, &reference, "treatments", 0.9);
    let pairs = result
        .matched
        .iter()
        .map(|pair| (pair.predicted, pair.reference))
        .collect::<Vec<_>>();
    assert_eq!(pairs.len(), 2);
    assert!(pairs.contains(&(0, 1)));
    assert!(pairs.contains(&(1, 0)));
}

#[test]
fn populated_checks_follow_container_rules() {
    assert!(!is_populated(&doc(json!(null))));
    assert!(!is_populated(&doc(json!(" none "))));
    assert!(is_populated(&doc(json!("fever"))));
    assert!(!is_populated(&doc(json!({"age": null, "sex": ""}))));
    assert!(is_populated(&doc(json!({"age": null, "sex": "F"}))));
    assert!(!is_populated(&doc(json!([{"name": null}]))));
    assert!(is_populated(&doc(json!([{"name": null}, {"name": "x"}]))));
}

#[test]
fn coverage_rates_hit_exact_bounds() {
    let sections = ["visit motivation", "discharge"];
    let mut tally = CoverageTally::default();
    for index in 0..4 {
        tally.observe(
            &doc(json!({"visit motivation": format!("reason {index}"), "discharge": null})),
            sections,
        );
    }

    let rates = tally.rates();
    assert_eq!(rates["visit motivation"], 1.0);
    assert_eq!(rates["discharge"], 0.0);
    assert_eq!(tally.samples(), 4);
}

#[test]
fn coverage_tallies_merge_in_any_order() {
    let sections = ["symptoms"];
    let mut left = CoverageTally::default();
    left.observe(&doc(json!({"symptoms": [{"a": "b"}]})), sections);
    let mut right = CoverageTally::default();
    right.observe(&doc(json!({"symptoms": []})), sections);
    right.observe(&doc(json!({})), sections);

    let forward = left.clone().merge(right.clone());
    let backward = right.merge(left);
    assert_eq!(forward, backward);
    assert_close(forward.rates()["symptoms"], 1.0 / 3.0);
}

#[test]
fn reliability_counts_failed_runs_and_retries() {
    let runs = vec![
        succeeded_run(0, doc(json!({})), 0, 1_000),
        succeeded_run(1, doc(json!({})), 2, 500),
        failed_run(2, 11, 100),
    ];

    let report = ReliabilityTally::from_runs(&runs).report();
    assert_eq!(report.total, 3);
    assert_eq!(report.failed, 1);
    assert_close(report.success_rate, 2.0 / 3.0);
    assert_close(report.avg_retries, (0.0 + 2.0 + 10.0) / 3.0);
    assert_close(report.avg_time, (1.0 + 1.5 + 1.1) / 3.0);

    let reversed = ReliabilityTally::from_runs(runs.iter().rev()).report();
    assert_eq!(reversed, report);
}

#[test]
fn reliability_of_empty_batch_is_zero() {
    let report = ReliabilityTally::default().report();
    assert_eq!(report.total, 0);
    assert_eq!(report.success_rate, 0.0);
}

#[test]
fn threshold_outside_unit_interval_is_rejected() {
    assert!(EvaluationConfig::new(1.5).is_err());
    assert!(EvaluationConfig::new(-0.1).is_err());
    assert!(EvaluationConfig::new(0.0).is_ok());
}

fn clinical_reference() -> Node {
    doc(json!({
        "visit motivation": "Fever",
        "admission": null,
        "patient information": {"age": "34", "sex": "Male"},
        "patient medical history": {"smoking status": "never"},
        "surgeries": [],
        "symptoms": [{"name of symptom": "fever", "time": "3 days"}],
        "medical examinations": [],
        "diagnosis tests": [],
        "treatments": [{"name": "paracetamol"}],
        "discharge": null
    }))
}

#[test]
fn batch_evaluation_excludes_failed_runs_from_quality_scores() {
    let schema = CanonicalSchema::clinical_summary();
    let similarity = ExactSimilarity;
    let evaluator = Evaluator::new(&schema, EvaluationConfig::default(), &similarity);

    let references = (0..2)
        .map(|index| (index, clinical_reference()))
        .collect::<BTreeMap<usize, Node>>();
    let runs = vec![
        succeeded_run(0, clinical_reference(), 1, 200),
        failed_run(1, 11, 100),
    ];

    let report = evaluator
        .evaluate_batch(&runs, &references)
        .expect("batch should evaluate");

    assert_eq!(report.samples_total, 2);
    assert_eq!(report.samples_scored, 1);
    assert_eq!(report.field_precision, 1.0);
    assert_eq!(report.field_recall, 1.0);
    assert_eq!(report.field_f1, 1.0);
    assert_eq!(report.field_counts.false_positives, 0);
    assert_eq!(report.semantic_similarity, 1.0);
    assert_eq!(report.semantic_scorer, "exact");

    let symptoms = &report.entity_metrics["symptoms"];
    assert_eq!(symptoms.f1, 1.0);
    assert_eq!(symptoms.counts.true_positives, 1);
    let surgeries = &report.entity_metrics["surgeries"];
    assert_eq!(surgeries.counts, PrfCounts::default());

    assert_eq!(report.coverage["visit motivation"], 1.0);
    assert_eq!(report.coverage["surgeries"], 0.0);
    assert_eq!(report.coverage["admission"], 0.0);
    assert_eq!(report.reference_coverage["treatments"], 1.0);

    assert_eq!(report.reliability.failed, 1);
    assert_close(report.reliability.success_rate, 0.5);
    assert_close(report.reliability.avg_retries, (1.0 + 10.0) / 2.0);
}

#[test]
fn batch_evaluation_is_independent_of_run_order() {
    let schema = CanonicalSchema::clinical_summary();
    let similarity = ExactSimilarity;
    let evaluator = Evaluator::new(&schema, EvaluationConfig::default(), &similarity);

    let predictions = [
        clinical_reference(),
        doc(json!({"visit motivation": "cough", "symptoms": [{"symptom": "cough"}]})),
        doc(json!({"visit motivation": "fever", "treatments": []})),
    ];
    let references = (0..3)
        .map(|index| (index, clinical_reference()))
        .collect::<BTreeMap<usize, Node>>();
    let runs = predictions
        .iter()
        .enumerate()
        .map(|(index, prediction)| succeeded_run(index, prediction.clone(), 0, 10))
        .collect::<Vec<_>>();
    let reversed = runs.iter().rev().cloned().collect::<Vec<_>>();

    let forward = evaluator.evaluate_batch(&runs, &references).expect("evaluate");
    let backward = evaluator
        .evaluate_batch(&reversed, &references)
        .expect("evaluate");
    assert_eq!(forward, backward);
}

#[test]
fn batch_evaluation_rejects_unknown_or_duplicate_samples() {
    let schema = CanonicalSchema::clinical_summary();
    let similarity = ExactSimilarity;
    let evaluator = Evaluator::new(&schema, EvaluationConfig::default(), &similarity);
    let references = BTreeMap::from([(0, clinical_reference())]);

    let unknown = vec![succeeded_run(4, clinical_reference(), 0, 1)];
    assert!(evaluator.evaluate_batch(&unknown, &references).is_err());

    let duplicated = vec![
        succeeded_run(0, clinical_reference(), 0, 1),
        failed_run(0, 1, 1),
    ];
    assert!(evaluator.evaluate_batch(&duplicated, &references).is_err());
}

#[test]
fn semantic_similarity_skips_empty_paths_and_scores_zero_without_pairs() {
    let schema = CanonicalSchema::clinical_summary();
    let similarity = ExactSimilarity;
    let evaluator = Evaluator::new(&schema, EvaluationConfig::default(), &similarity);

    let prediction = flatten(&doc(json!({"a": "fever", "b": "x", "c": null})));
    let reference = flatten(&doc(json!({"a": "fever", "b": "y", "c": "z"})));
    assert_close(evaluator.semantic_similarity(&prediction, &reference), 0.5);

    let empty = flatten(&doc(json!({"a": null})));
    assert_eq!(evaluator.semantic_similarity(&empty, &reference), 0.0);
}

#[test]
fn field_scores_ignore_record_sections_in_every_shape() {
    let schema = CanonicalSchema::clinical_summary();
    let reference = doc(json!({
        "visit motivation": "fever",
        "symptoms": [{"name of symptom": "fever"}],
        "admission": null
    }));
    let prediction = doc(json!({
        "visit motivation": "fever",
        "symptoms": [],
        "admission": {"reason": "chest pain"}
    }));

    let predicted_flat = flatten_fields(&prediction, &schema);
    let reference_flat = flatten_fields(&reference, &schema);
    assert_eq!(
        predicted_flat.keys().collect::<Vec<_>>(),
        vec!["visit motivation"]
    );
    assert_eq!(reference_flat.keys().collect::<Vec<_>>(), vec!["visit motivation"]);

    let counts = score_fields(&predicted_flat, &reference_flat);
    assert_eq!(
        counts,
        PrfCounts {
            true_positives: 1,
            false_positives: 0,
            false_negatives: 0,
        }
    );

    let reversed = score_fields(&reference_flat, &predicted_flat);
    assert_eq!(reversed.false_negatives, 0);
    assert_eq!(reversed.false_positives, 0);
}

#[test]
fn all_empty_records_take_no_part_in_matching() {
    let prediction = doc(json!({"symptoms": [
        {"name of symptom": null, "time": ""},
        {"name of symptom": "cough"}
    ]}));
    let reference = doc(json!({"symptoms": [
        {"name of symptom": "none"},
        {"name of symptom": null},
        {"name of symptom": "cough"}
    ]}));

    let result = score_section(&prediction, &reference, "symptoms", 0.7);
    assert_eq!(
        result.matched,
        vec![MatchedPair {
            predicted: 1,
            reference: 2,
            similarity: 1.0,
        }]
    );
    assert!(result.unmatched_predicted.is_empty());
    assert!(result.unmatched_reference.is_empty());

    let template = CanonicalSchema::clinical_summary().template();
    let empty = score_section(&template, &template, "symptoms", 0.7);
    assert_eq!(empty.counts(), PrfCounts::default());
}
