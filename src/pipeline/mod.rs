use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::document::Node;

mod batch;
mod extractor;
mod model_client;
mod prompt;

pub use batch::{NoteInput, run_batch};
pub use extractor::Extractor;
pub use model_client::{CommandModel, GenerationRequest, ModelClient, ModelError};
pub use prompt::PromptParts;

pub const DEFAULT_MAX_RETRIES: u32 = 10;
pub const DEFAULT_EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Retries after the first attempt; a run makes at most `max_retries + 1`
    /// attempts.
    pub max_retries: u32,
    pub excerpt_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
        }
    }
}

/// Result of decoding and validating one response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Success(Node),
    ParseFailure(String),
    ValidationFailure(String),
}

/// How a single attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    TransportFailure(String),
    ParseFailure(String),
    ValidationFailure(String),
    Cancelled,
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// The text fed back to the model as corrective context.
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            Self::Success => None,
            Self::TransportFailure(detail) => Some(format!("transport error: {detail}")),
            Self::ParseFailure(detail) => Some(format!("parse error: {detail}")),
            Self::ValidationFailure(detail) => Some(format!("validation error: {detail}")),
            Self::Cancelled => Some("cancelled".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt_index: u32,
    pub outcome: AttemptOutcome,
    #[serde(rename = "elapsed_seconds", with = "duration_seconds")]
    pub elapsed: Duration,
    pub raw_response_excerpt: String,
}

/// Terminal result of one extraction run. Only the extractor builds these;
/// loaded copies are checked with [`RunResult::check_invariants`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    sample_index: usize,
    succeeded: bool,
    final_document: Option<Node>,
    attempts: Vec<AttemptRecord>,
}

impl RunResult {
    pub(crate) fn new(
        sample_index: usize,
        final_document: Option<Node>,
        attempts: Vec<AttemptRecord>,
    ) -> Self {
        Self {
            sample_index,
            succeeded: final_document.is_some(),
            final_document,
            attempts,
        }
    }

    pub fn sample_index(&self) -> usize {
        self.sample_index
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn final_document(&self) -> Option<&Node> {
        self.final_document.as_ref()
    }

    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    pub fn retries(&self) -> usize {
        self.attempts.len().saturating_sub(1)
    }

    pub fn total_elapsed(&self) -> Duration {
        self.attempts.iter().map(|attempt| attempt.elapsed).sum()
    }

    pub fn check_invariants(&self, max_retries: Option<u32>) -> Result<(), String> {
        if self.attempts.is_empty() {
            return Err(format!("sample {} has no attempts", self.sample_index));
        }
        for (position, attempt) in self.attempts.iter().enumerate() {
            if attempt.attempt_index as usize != position {
                return Err(format!(
                    "sample {} attempt {} has index {}",
                    self.sample_index, position, attempt.attempt_index
                ));
            }
        }
        if let Some((last, earlier)) = self.attempts.split_last() {
            if earlier.iter().any(|attempt| attempt.outcome.is_success()) {
                return Err(format!(
                    "sample {} has attempts after a success",
                    self.sample_index
                ));
            }
            if last.outcome.is_success() != self.succeeded
                || self.succeeded != self.final_document.is_some()
            {
                return Err(format!(
                    "sample {} outcome does not match its final document",
                    self.sample_index
                ));
            }
        }
        if let Some(max_retries) = max_retries
            && self.attempts.len() > max_retries as usize + 1
        {
            return Err(format!(
                "sample {} made {} attempts with max_retries={}",
                self.sample_index,
                self.attempts.len(),
                max_retries
            ));
        }
        Ok(())
    }
}

mod duration_seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let seconds = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(seconds).map_err(serde::de::Error::custom)
    }
}
