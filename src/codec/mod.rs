use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::Node;
use crate::schema::{CanonicalSchema, SlotPolicy, ValidationFailure};

mod json;
mod toon;
mod yaml;

pub use json::JsonCodec;
pub use toon::ToonCodec;
pub use yaml::YamlCodec;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json,
    Yaml,
    Toon,
}

impl Format {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toon => "toon",
        }
    }

    pub fn label(self) -> String {
        self.as_str().to_ascii_uppercase()
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("{format} syntax error: {detail}")]
    Syntax { format: Format, detail: String },
    #[error("{format} encoding failed: {detail}")]
    Encode { format: Format, detail: String },
    #[error("external codec '{program}' failed: {detail}")]
    Process { program: String, detail: String },
    #[error("external codec '{program}' is unavailable: {detail}")]
    Unavailable { program: String, detail: String },
}

/// Contract every serialization format satisfies.
///
/// `decode` must reject malformed input rather than coerce it; codecs backed
/// by an external process report process failures as `CodecError` values.
pub trait Codec: Send + Sync {
    fn format(&self) -> Format;

    fn encode(&self, document: &Node) -> Result<String, CodecError>;

    fn decode(&self, text: &str) -> Result<Node, CodecError>;

    fn structural_validate(
        &self,
        schema: &CanonicalSchema,
        document: &Node,
    ) -> Result<(), ValidationFailure> {
        schema.validate(document, SlotPolicy::Required)
    }

    fn check_available(&self) -> Result<(), CodecError> {
        Ok(())
    }
}

/// Read-only lookup from format to codec, shared across concurrent runs.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: HashMap<Format, Arc<dyn Codec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(toon_command: &str) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(JsonCodec));
        registry.register(Arc::new(YamlCodec));
        registry.register(Arc::new(ToonCodec::from_command_line(toon_command)?));
        Ok(registry)
    }

    pub fn register(&mut self, codec: Arc<dyn Codec>) {
        self.codecs.insert(codec.format(), codec);
    }

    pub fn get(&self, format: Format) -> Result<Arc<dyn Codec>> {
        self.codecs
            .get(&format)
            .cloned()
            .ok_or_else(|| anyhow!("no codec registered for format {format}"))
    }

    /// Looks up a codec and fails when its external dependency is missing.
    pub fn get_available(&self, format: Format) -> Result<Arc<dyn Codec>> {
        let codec = self.get(format)?;
        codec
            .check_available()
            .with_context(|| format!("codec for {format} failed its startup check"))?;
        Ok(codec)
    }
}

/// Encodes and decodes `document`, failing unless the result is structurally
/// equivalent. Used as a startup probe for codecs backed by other programs.
pub fn verify_round_trip(codec: &dyn Codec, document: &Node) -> Result<()> {
    let format = codec.format();
    let encoded = codec
        .encode(document)
        .with_context(|| format!("{format} codec could not encode the probe document"))?;
    let decoded = codec
        .decode(&encoded)
        .with_context(|| format!("{format} codec could not decode its own output"))?;
    if !decoded.structurally_equivalent(document) {
        bail!("{format} codec round trip changed the probe document");
    }
    Ok(())
}

/// Unwraps markdown code fences models like to put around structured output.
#[derive(Debug, Clone)]
pub struct ResponseCleaner {
    fence: Regex,
}

impl ResponseCleaner {
    pub fn new() -> Result<Self> {
        Ok(Self {
            fence: Regex::new(r"(?s)\A```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```\z")
                .context("failed to compile code fence pattern")?,
        })
    }

    pub fn clean<'a>(&self, raw: &'a str) -> &'a str {
        let trimmed = raw.trim();
        match self.fence.captures(trimmed).and_then(|captures| captures.get(1)) {
            Some(body) => body.as_str().trim_end(),
            None => trimmed,
        }
    }
}
