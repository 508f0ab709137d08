use super::PrfCounts;
use super::flatten::FlatDocument;

/// Strict path-identity scoring of two flattened documents.
///
/// A reference path whose predicted value differs is one false negative and
/// never also a false positive.
pub fn score_fields(prediction: &FlatDocument, reference: &FlatDocument) -> PrfCounts {
    let mut counts = PrfCounts::default();

    for (path, expected) in reference {
        match prediction.get(path) {
            Some(actual) if actual == expected => counts.true_positives += 1,
            Some(_) | None => counts.false_negatives += 1,
        }
    }

    counts.false_positives = prediction
        .keys()
        .filter(|path| !reference.contains_key(*path))
        .count();

    counts
}
