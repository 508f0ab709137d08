use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::{debug, info, warn};

use super::{
    AttemptOutcome, AttemptRecord, GenerationRequest, ModelClient, ModelError, ParseOutcome,
    PipelineConfig, PromptParts, RunResult,
};
use crate::codec::{Codec, ResponseCleaner};
use crate::document::Node;
use crate::schema::CanonicalSchema;

/// Drives the request/parse/validate/retry loop for single notes.
///
/// Shared read-only across worker threads; each call to [`Extractor::run`]
/// owns its own attempt history.
pub struct Extractor {
    codec: Arc<dyn Codec>,
    schema: Arc<CanonicalSchema>,
    model: Arc<dyn ModelClient>,
    cleaner: ResponseCleaner,
    prompt: PromptParts,
    config: PipelineConfig,
}

enum State {
    Requesting,
    Parsing { raw: String },
    Validating { raw: String, document: Node },
    Retrying { raw: String, outcome: AttemptOutcome },
    Succeeded(Node),
    Failed,
}

struct RunContext<'a> {
    sample_index: usize,
    note_prompt: String,
    attempts: Vec<AttemptRecord>,
    failures: Vec<String>,
    corrective_context: Option<String>,
    attempt_started: Instant,
    extractor: &'a Extractor,
}

impl Extractor {
    pub fn new(
        codec: Arc<dyn Codec>,
        schema: Arc<CanonicalSchema>,
        model: Arc<dyn ModelClient>,
        config: PipelineConfig,
    ) -> Result<Self> {
        let prompt = PromptParts::build(&schema, codec.as_ref())?;
        Ok(Self {
            codec,
            schema,
            model,
            cleaner: ResponseCleaner::new()?,
            prompt,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, sample_index: usize, note_text: &str) -> RunResult {
        let mut context = RunContext {
            sample_index,
            note_prompt: PromptParts::note_prompt(note_text),
            attempts: Vec::new(),
            failures: Vec::new(),
            corrective_context: None,
            attempt_started: Instant::now(),
            extractor: self,
        };

        info!(
            sample = sample_index,
            format = %self.codec.format(),
            "starting extraction"
        );

        let mut state = State::Requesting;
        loop {
            state = match state {
                State::Requesting => context.request(),
                State::Parsing { raw } => context.parse(raw),
                State::Validating { raw, document } => context.validate(raw, document),
                State::Retrying { raw, outcome } => context.retry(raw, outcome),
                State::Succeeded(document) => {
                    return RunResult::new(sample_index, Some(document), context.attempts);
                }
                State::Failed => {
                    warn!(
                        sample = sample_index,
                        attempts = context.attempts.len(),
                        "extraction failed"
                    );
                    return RunResult::new(sample_index, None, context.attempts);
                }
            };
        }
    }
}

impl RunContext<'_> {
    fn next_index(&self) -> u32 {
        self.attempts.len() as u32
    }

    fn request(&mut self) -> State {
        self.attempt_started = Instant::now();
        let extractor = self.extractor;
        let request = GenerationRequest {
            prompt: &self.note_prompt,
            format_instructions: &extractor.prompt.format_instructions,
            corrective_context: self.corrective_context.as_deref(),
        };

        match extractor.model.generate(&request) {
            Ok(raw) => {
                if self.attempts.is_empty() {
                    debug!(sample = self.sample_index, chars = raw.len(), "received response");
                } else {
                    debug!(
                        sample = self.sample_index,
                        attempt = self.next_index(),
                        preview = %excerpt(&raw, 200).replace('\n', "\\n"),
                        "received retry response"
                    );
                }
                State::Parsing { raw }
            }
            Err(ModelError::Cancelled) => {
                self.record(AttemptOutcome::Cancelled, "");
                State::Failed
            }
            Err(ModelError::Transport(detail)) => State::Retrying {
                raw: String::new(),
                outcome: AttemptOutcome::TransportFailure(detail),
            },
        }
    }

    fn parse(&mut self, raw: String) -> State {
        let cleaned = self.extractor.cleaner.clean(&raw);
        match self.extractor.codec.decode(cleaned) {
            Ok(document) => State::Validating { raw, document },
            Err(err) => self.conclude(raw, ParseOutcome::ParseFailure(err.to_string())),
        }
    }

    fn validate(&mut self, raw: String, document: Node) -> State {
        let extractor = self.extractor;
        let outcome = match extractor
            .codec
            .structural_validate(&extractor.schema, &document)
        {
            Ok(()) => ParseOutcome::Success(document),
            Err(failure) => ParseOutcome::ValidationFailure(failure.to_string()),
        };
        self.conclude(raw, outcome)
    }

    fn conclude(&mut self, raw: String, outcome: ParseOutcome) -> State {
        match outcome {
            ParseOutcome::Success(document) => {
                let elapsed_secs = self.attempt_started.elapsed().as_secs_f64();
                self.record(AttemptOutcome::Success, &raw);
                info!(
                    sample = self.sample_index,
                    attempt = self.attempts.len(),
                    elapsed_secs,
                    "extraction succeeded"
                );
                State::Succeeded(document)
            }
            ParseOutcome::ParseFailure(detail) => State::Retrying {
                raw,
                outcome: AttemptOutcome::ParseFailure(detail),
            },
            ParseOutcome::ValidationFailure(detail) => State::Retrying {
                raw,
                outcome: AttemptOutcome::ValidationFailure(detail),
            },
        }
    }

    fn retry(&mut self, raw: String, outcome: AttemptOutcome) -> State {
        let reason = outcome.failure_reason().unwrap_or_default();
        warn!(
            sample = self.sample_index,
            attempt = self.next_index(),
            reason = %reason,
            "attempt failed"
        );
        self.record(outcome, &raw);
        self.failures.push(reason);

        if self.attempts.len() > self.extractor.config.max_retries as usize {
            return State::Failed;
        }

        self.corrective_context = Some(
            self.extractor
                .prompt
                .corrective_context(&self.failures, &raw),
        );
        State::Requesting
    }

    fn record(&mut self, outcome: AttemptOutcome, raw: &str) {
        let record = AttemptRecord {
            attempt_index: self.next_index(),
            outcome,
            elapsed: self.attempt_started.elapsed(),
            raw_response_excerpt: excerpt(raw, self.extractor.config.excerpt_chars),
        };
        self.attempts.push(record);
    }
}

fn excerpt(raw: &str, max_chars: usize) -> String {
    raw.chars().take(max_chars).collect()
}
