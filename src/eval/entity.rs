use serde::Serialize;

use super::PrfCounts;
use super::flatten::{EMPTY_MARKER, extract_records, signature};
use crate::document::Node;

/// Normalized Levenshtein similarity: symmetric and in `[0, 1]`.
pub fn similarity_ratio(left: &str, right: &str) -> f64 {
    strsim::normalized_levenshtein(left, right)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedPair {
    pub predicted: usize,
    pub reference: usize,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MatchResult {
    pub matched: Vec<MatchedPair>,
    pub unmatched_predicted: Vec<usize>,
    pub unmatched_reference: Vec<usize>,
}

impl MatchResult {
    pub fn counts(&self) -> PrfCounts {
        PrfCounts {
            true_positives: self.matched.len(),
            false_positives: self.unmatched_predicted.len(),
            false_negatives: self.unmatched_reference.len(),
        }
    }
}

/// Greedy global matching: repeatedly takes the most similar unmatched pair
/// at or above `threshold`. Ties go to the lowest predicted index, then the
/// lowest reference index.
pub fn match_signatures(predicted: &[String], reference: &[String], threshold: f64) -> MatchResult {
    let mut candidates = Vec::<MatchedPair>::new();
    for (predicted_index, left) in predicted.iter().enumerate() {
        for (reference_index, right) in reference.iter().enumerate() {
            let similarity = similarity_ratio(left, right);
            if similarity >= threshold {
                candidates.push(MatchedPair {
                    predicted: predicted_index,
                    reference: reference_index,
                    similarity,
                });
            }
        }
    }

    candidates.sort_by(|left, right| {
        right
            .similarity
            .total_cmp(&left.similarity)
            .then(left.predicted.cmp(&right.predicted))
            .then(left.reference.cmp(&right.reference))
    });

    let mut predicted_used = vec![false; predicted.len()];
    let mut reference_used = vec![false; reference.len()];
    let mut matched = Vec::<MatchedPair>::new();
    for candidate in candidates {
        if predicted_used[candidate.predicted] || reference_used[candidate.reference] {
            continue;
        }
        predicted_used[candidate.predicted] = true;
        reference_used[candidate.reference] = true;
        matched.push(candidate);
    }

    MatchResult {
        matched,
        unmatched_predicted: unused_indices(&predicted_used),
        unmatched_reference: unused_indices(&reference_used),
    }
}

fn unused_indices(used: &[bool]) -> Vec<usize> {
    used.iter()
        .enumerate()
        .filter(|(_, used)| !**used)
        .map(|(index, _)| index)
        .collect()
}

/// Matches the records of one section of two documents.
///
/// Records with an empty signature (every field null or blank) carry no
/// entity and take no part in matching, so they count as neither a hit nor a
/// miss. Indices in the result refer to the section's original positions.
pub fn score_section(
    prediction: &Node,
    reference: &Node,
    section: &str,
    threshold: f64,
) -> MatchResult {
    let (predicted_positions, predicted) = populated_signatures(prediction, section);
    let (reference_positions, expected) = populated_signatures(reference, section);

    let result = match_signatures(&predicted, &expected, threshold);
    MatchResult {
        matched: result
            .matched
            .into_iter()
            .map(|pair| MatchedPair {
                predicted: predicted_positions[pair.predicted],
                reference: reference_positions[pair.reference],
                similarity: pair.similarity,
            })
            .collect(),
        unmatched_predicted: result
            .unmatched_predicted
            .into_iter()
            .map(|index| predicted_positions[index])
            .collect(),
        unmatched_reference: result
            .unmatched_reference
            .into_iter()
            .map(|index| reference_positions[index])
            .collect(),
    }
}

fn populated_signatures(document: &Node, section: &str) -> (Vec<usize>, Vec<String>) {
    extract_records(document, section)
        .into_iter()
        .map(signature)
        .enumerate()
        .filter(|(_, rendered)| rendered != EMPTY_MARKER)
        .unzip()
}
