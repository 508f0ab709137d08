use std::collections::BTreeMap;

use super::flatten::{EMPTY_MARKER, normalize_scalar, signature};
use super::ratio;
use crate::document::Node;

/// Whether a section value carries any non-empty content.
pub fn is_populated(value: &Node) -> bool {
    match value {
        Node::Scalar(scalar) => normalize_scalar(scalar) != EMPTY_MARKER,
        Node::Mapping(entries) => entries.values().any(is_populated),
        Node::Sequence(items) => items.iter().any(|item| signature(item) != EMPTY_MARKER),
    }
}

/// Populated-section counts over a batch. Tallies merge in any order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageTally {
    samples: usize,
    populated: BTreeMap<String, usize>,
}

impl CoverageTally {
    pub fn observe<'a>(&mut self, document: &Node, sections: impl IntoIterator<Item = &'a str>) {
        self.samples += 1;
        for section in sections {
            let count = self.populated.entry(section.to_string()).or_default();
            if document.get(section).is_some_and(is_populated) {
                *count += 1;
            }
        }
    }

    pub fn merge(mut self, other: Self) -> Self {
        self.samples += other.samples;
        for (section, count) in other.populated {
            *self.populated.entry(section).or_default() += count;
        }
        self
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn rates(&self) -> BTreeMap<String, f64> {
        self.populated
            .iter()
            .map(|(section, count)| (section.clone(), ratio(*count, self.samples)))
            .collect()
    }
}
