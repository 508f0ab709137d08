use serde::{Deserialize, Serialize};

mod coverage;
mod entity;
mod field;
mod flatten;
mod reliability;
mod report;
#[cfg(test)]
mod tests;

pub use coverage::{CoverageTally, is_populated};
pub use entity::{MatchResult, MatchedPair, match_signatures, score_section, similarity_ratio};
pub use field::score_fields;
pub use flatten::{
    EMPTY_MARKER, FlatDocument, extract_records, flatten, flatten_fields, normalize_text, signature,
};
pub use reliability::{ReliabilityReport, ReliabilityTally};
pub use report::{EntityMetrics, EvaluationConfig, EvaluationReport, Evaluator, SampleScores};

pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.7;

/// True/false positive counts with the derived precision, recall and F1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrfCounts {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl PrfCounts {
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1(&self) -> f64 {
        let precision = self.precision();
        let recall = self.recall();
        if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        }
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            true_positives: self.true_positives + other.true_positives,
            false_positives: self.false_positives + other.false_positives,
            false_negatives: self.false_negatives + other.false_negatives,
        }
    }
}

pub fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
