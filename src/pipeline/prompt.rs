use anyhow::{Context, Result};

use crate::codec::{Codec, Format, JsonCodec};
use crate::schema::CanonicalSchema;

const PREAMBLE: &str = "You are a clinical information extraction system. Given a clinical note, \
produce a structured summary strictly following the provided target format and schema. Do not \
include any explanatory text or prose outside the serialized structure. If information is \
missing, leave the field null/empty but preserve the field.";

/// Fixed request text for one format, built once per batch.
#[derive(Debug, Clone)]
pub struct PromptParts {
    pub format: Format,
    pub format_instructions: String,
}

impl PromptParts {
    pub fn build(schema: &CanonicalSchema, codec: &dyn Codec) -> Result<Self> {
        let format = codec.format();
        let template = schema.template();
        // TOON templates are shown as JSON to keep the prompt short.
        let rendered = match format {
            Format::Toon => JsonCodec.encode(&template),
            _ => codec.encode(&template),
        }
        .with_context(|| format!("failed to render {format} schema template"))?;

        let label = format.label();
        let format_instructions = format!(
            "{PREAMBLE}\n\n\
             TARGET FORMAT: {label}\n\
             SCHEMA TEMPLATE:\n```\n{rendered}\n```\n\n\
             RULES:\n\
             - Output must be valid {label} and parse without errors.\n\
             - Preserve all top-level sections from the template; do not drop keys.\n\
             - Use empty strings or nulls if information is unavailable.\n\
             - Do not add commentary or extra keys.\n\n\
             RESPONSE: Only the {label} structure."
        );

        Ok(Self {
            format,
            format_instructions,
        })
    }

    pub fn note_prompt(note_text: &str) -> String {
        format!("INPUT CLINICAL NOTE:\n```\n{}\n```", note_text.trim())
    }

    /// Corrective context listing every failure so far and the last output.
    pub fn corrective_context(&self, failures: &[String], previous_output: &str) -> String {
        let mut context = String::from("PREVIOUS ATTEMPTS FAILED WITH ERRORS:\n");
        for (index, failure) in failures.iter().enumerate() {
            context.push_str(&format!("{}. {failure}\n", index + 1));
        }
        if !previous_output.trim().is_empty() {
            context.push_str(&format!("\nPREVIOUS OUTPUT:\n{previous_output}\n"));
        }
        context.push_str(&format!(
            "\nPlease correct the errors and provide a valid {} response.",
            self.format.label()
        ));
        context
    }
}
