use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A leaf value of a decoded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

/// A decoded document tree.
///
/// Every codec decodes into this shape and every evaluator walks it, so the
/// pipeline and the scorers never look at format-specific values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Scalar(Scalar),
    Sequence(Vec<Node>),
    Mapping(BTreeMap<String, Node>),
}

impl Node {
    pub fn null() -> Self {
        Self::Scalar(Scalar::Null)
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Scalar(Scalar::Text(value.into()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Scalar(Scalar::Null))
    }

    pub fn as_mapping(&self) -> Option<&BTreeMap<String, Node>> {
        match self {
            Self::Mapping(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_mapping().and_then(|entries| entries.get(key))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Scalar(Scalar::Null) => "null",
            Self::Scalar(_) => "scalar",
            Self::Sequence(_) => "sequence",
            Self::Mapping(_) => "mapping",
        }
    }

    /// Two documents are structurally equivalent when they hold the same
    /// keys, the same sequence lengths and numerically equal leaves.
    pub fn structurally_equivalent(&self, other: &Node) -> bool {
        match (self, other) {
            (Self::Scalar(Scalar::Number(left)), Self::Scalar(Scalar::Number(right))) => {
                left.as_f64() == right.as_f64()
            }
            (Self::Scalar(left), Self::Scalar(right)) => left == right,
            (Self::Sequence(left), Self::Sequence(right)) => {
                left.len() == right.len()
                    && left
                        .iter()
                        .zip(right)
                        .all(|(left, right)| left.structurally_equivalent(right))
            }
            (Self::Mapping(left), Self::Mapping(right)) => {
                left.len() == right.len()
                    && left.iter().all(|(key, value)| {
                        right
                            .get(key)
                            .is_some_and(|other| value.structurally_equivalent(other))
                    })
            }
            _ => false,
        }
    }
}

impl From<serde_json::Value> for Node {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::null(),
            serde_json::Value::Bool(flag) => Self::Scalar(Scalar::Bool(flag)),
            serde_json::Value::Number(number) => Self::Scalar(Scalar::Number(number)),
            serde_json::Value::String(text) => Self::text(text),
            serde_json::Value::Array(items) => {
                Self::Sequence(items.into_iter().map(Node::from).collect())
            }
            serde_json::Value::Object(entries) => Self::Mapping(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Node::from(value)))
                    .collect(),
            ),
        }
    }
}
