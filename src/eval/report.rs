use std::collections::{BTreeMap, HashSet};

use anyhow::{Result, bail};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::coverage::CoverageTally;
use super::entity::score_section;
use super::field::score_fields;
use super::flatten::{EMPTY_MARKER, FlatDocument, flatten_fields};
use super::reliability::{ReliabilityReport, ReliabilityTally};
use super::{DEFAULT_MATCH_THRESHOLD, PrfCounts};
use crate::document::Node;
use crate::pipeline::RunResult;
use crate::schema::CanonicalSchema;
use crate::semantic::TextSimilarity;

#[derive(Debug, Clone, Copy)]
pub struct EvaluationConfig {
    /// Minimum record similarity for an entity match.
    pub threshold: f64,
}

impl EvaluationConfig {
    pub fn new(threshold: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            bail!("match threshold must lie in [0, 1], got {threshold}");
        }
        Ok(Self { threshold })
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    #[serde(flatten)]
    pub counts: PrfCounts,
}

impl From<PrfCounts> for EntityMetrics {
    fn from(counts: PrfCounts) -> Self {
        Self {
            precision: counts.precision(),
            recall: counts.recall(),
            f1: counts.f1(),
            counts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub samples_total: usize,
    pub samples_scored: usize,
    pub match_threshold: f64,
    pub field_precision: f64,
    pub field_recall: f64,
    pub field_f1: f64,
    pub field_counts: PrfCounts,
    pub entity_metrics: BTreeMap<String, EntityMetrics>,
    pub semantic_scorer: String,
    pub semantic_similarity: f64,
    pub coverage: BTreeMap<String, f64>,
    pub reference_coverage: BTreeMap<String, f64>,
    pub reliability: ReliabilityReport,
}

/// Scores of one prediction against its reference.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleScores {
    pub field: PrfCounts,
    pub entities: BTreeMap<String, PrfCounts>,
    pub semantic_similarity: f64,
}

pub struct Evaluator<'a> {
    schema: &'a CanonicalSchema,
    config: EvaluationConfig,
    similarity: &'a dyn TextSimilarity,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        schema: &'a CanonicalSchema,
        config: EvaluationConfig,
        similarity: &'a dyn TextSimilarity,
    ) -> Self {
        Self {
            schema,
            config,
            similarity,
        }
    }

    pub fn score_sample(&self, prediction: &Node, reference: &Node) -> SampleScores {
        let predicted_flat = flatten_fields(prediction, self.schema);
        let reference_flat = flatten_fields(reference, self.schema);

        let entities = self
            .schema
            .record_sections()
            .map(|section| {
                let result =
                    score_section(prediction, reference, section.name, self.config.threshold);
                (section.name.to_string(), result.counts())
            })
            .collect::<BTreeMap<String, PrfCounts>>();

        SampleScores {
            field: score_fields(&predicted_flat, &reference_flat),
            entities,
            semantic_similarity: self.semantic_similarity(&predicted_flat, &reference_flat),
        }
    }

    /// Mean similarity over paths where both documents hold non-empty text.
    pub fn semantic_similarity(&self, prediction: &FlatDocument, reference: &FlatDocument) -> f64 {
        let scores = reference
            .iter()
            .filter(|(_, expected)| expected.as_str() != EMPTY_MARKER)
            .filter_map(|(path, expected)| {
                prediction
                    .get(path)
                    .filter(|actual| actual.as_str() != EMPTY_MARKER)
                    .map(|actual| self.similarity.similarity(actual, expected))
            })
            .collect::<Vec<f64>>();

        if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        }
    }

    /// Scores a batch of runs against references keyed by sample index.
    ///
    /// Failed runs count only toward reliability. Every run must have a
    /// reference, and a sample may appear once.
    pub fn evaluate_batch(
        &self,
        runs: &[RunResult],
        references: &BTreeMap<usize, Node>,
    ) -> Result<EvaluationReport> {
        let mut seen = HashSet::<usize>::with_capacity(runs.len());
        for run in runs {
            if !seen.insert(run.sample_index()) {
                bail!("sample {} appears more than once", run.sample_index());
            }
            if !references.contains_key(&run.sample_index()) {
                bail!("no reference document for sample {}", run.sample_index());
            }
        }

        let mut scored = runs
            .par_iter()
            .filter_map(|run| {
                let prediction = run.final_document()?;
                let reference = references.get(&run.sample_index())?;
                Some((run.sample_index(), prediction, reference))
            })
            .map(|(sample_index, prediction, reference)| {
                (
                    sample_index,
                    prediction,
                    reference,
                    self.score_sample(prediction, reference),
                )
            })
            .collect::<Vec<_>>();
        // Sum in sample order so float totals do not depend on run order.
        scored.sort_by_key(|(sample_index, ..)| *sample_index);

        let sections = self.schema.section_names().collect::<Vec<&str>>();
        let mut coverage = CoverageTally::default();
        let mut reference_coverage = CoverageTally::default();
        let mut field_counts = PrfCounts::default();
        let mut entity_counts = self
            .schema
            .record_sections()
            .map(|section| (section.name.to_string(), PrfCounts::default()))
            .collect::<BTreeMap<String, PrfCounts>>();
        let (mut precision_sum, mut recall_sum, mut f1_sum, mut semantic_sum) =
            (0.0_f64, 0.0_f64, 0.0_f64, 0.0_f64);

        for (_, prediction, reference, scores) in &scored {
            coverage.observe(prediction, sections.iter().copied());
            reference_coverage.observe(reference, sections.iter().copied());
            field_counts = field_counts.merge(scores.field);
            precision_sum += scores.field.precision();
            recall_sum += scores.field.recall();
            f1_sum += scores.field.f1();
            semantic_sum += scores.semantic_similarity;
            for (section, counts) in &scores.entities {
                let total = entity_counts.entry(section.clone()).or_default();
                *total = total.merge(*counts);
            }
        }

        let mean = |sum: f64| {
            if scored.is_empty() {
                0.0
            } else {
                sum / scored.len() as f64
            }
        };

        Ok(EvaluationReport {
            samples_total: runs.len(),
            samples_scored: scored.len(),
            match_threshold: self.config.threshold,
            field_precision: mean(precision_sum),
            field_recall: mean(recall_sum),
            field_f1: mean(f1_sum),
            field_counts,
            entity_metrics: entity_counts
                .into_iter()
                .map(|(section, counts)| (section, EntityMetrics::from(counts)))
                .collect(),
            semantic_scorer: self.similarity.name().to_string(),
            semantic_similarity: mean(semantic_sum),
            coverage: coverage.rates(),
            reference_coverage: reference_coverage.rates(),
            reliability: ReliabilityTally::from_runs(runs).report(),
        })
    }
}
