use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::document::Node;
use crate::schema::{CanonicalSchema, SlotPolicy};

/// One dataset row: the clinical note and its reference summary.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub index: usize,
    pub note_text: String,
    pub reference: Node,
}

#[derive(Debug, Deserialize)]
struct DatasetRow {
    full_note: Option<String>,
    note: Option<String>,
    summary: Option<serde_json::Value>,
}

/// Loads a JSONL dataset. Sample indices follow the order of non-blank lines.
pub fn load_jsonl(path: &Path, schema: &CanonicalSchema, limit: Option<usize>) -> Result<Vec<Sample>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open dataset: {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut samples = Vec::new();
    for (line_index, line) in reader.lines().enumerate() {
        if limit.is_some_and(|limit| samples.len() >= limit) {
            break;
        }
        let line_number = line_index + 1;
        let line = line.with_context(|| {
            format!("failed to read dataset line {line_number}: {}", path.display())
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let row: DatasetRow = serde_json::from_str(&line).with_context(|| {
            format!("invalid JSON on dataset line {line_number}: {}", path.display())
        })?;
        let sample = parse_row(row, samples.len(), schema)
            .with_context(|| format!("dataset line {line_number}: {}", path.display()))?;
        samples.push(sample);
    }

    Ok(samples)
}

fn parse_row(row: DatasetRow, index: usize, schema: &CanonicalSchema) -> Result<Sample> {
    let Some(note_text) = row.full_note.or(row.note) else {
        bail!("row has neither `full_note` nor `note`");
    };
    let summary = match row.summary {
        Some(serde_json::Value::String(encoded)) => serde_json::from_str(&encoded)
            .context("`summary` string is not valid JSON")?,
        Some(value) => value,
        None => bail!("row has no `summary`"),
    };

    let reference = Node::from(summary);
    schema
        .validate(&reference, SlotPolicy::AllowMissing)
        .context("reference summary does not match the canonical schema")?;

    Ok(Sample {
        index,
        note_text,
        reference,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::*;

    fn write_dataset(lines: &[String]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        for line in lines {
            writeln!(file, "{line}").expect("write line");
        }
        file
    }

    #[test]
    fn loads_object_and_string_summaries() {
        let encoded = json!({"visit motivation": "cough"}).to_string();
        let file = write_dataset(&[
            json!({"full_note": "note one", "summary": {"visit motivation": "fever"}}).to_string(),
            String::new(),
            json!({"note": "note two", "summary": encoded}).to_string(),
        ]);

        let samples = load_jsonl(file.path(), &CanonicalSchema::clinical_summary(), None)
            .expect("dataset should load");
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].index, 0);
        assert_eq!(samples[0].note_text, "note one");
        assert_eq!(
            samples[0].reference.get("visit motivation"),
            Some(&Node::text("fever"))
        );
        assert_eq!(samples[1].index, 1);
        assert_eq!(samples[1].note_text, "note two");
        assert_eq!(
            samples[1].reference.get("visit motivation"),
            Some(&Node::text("cough"))
        );
    }

    #[test]
    fn limit_stops_early() {
        let row = json!({"full_note": "n", "summary": {}}).to_string();
        let file = write_dataset(&[row.clone(), row.clone(), row]);
        let samples = load_jsonl(file.path(), &CanonicalSchema::clinical_summary(), Some(2))
            .expect("dataset should load");
        assert_eq!(samples.len(), 2);
    }

    #[test]
    fn malformed_reference_reports_line_number() {
        let file = write_dataset(&[
            json!({"full_note": "n", "summary": {}}).to_string(),
            json!({"full_note": "n", "summary": {"symptoms": "not a list"}}).to_string(),
        ]);
        let err = load_jsonl(file.path(), &CanonicalSchema::clinical_summary(), None)
            .expect_err("wrong shape should be rejected");
        let message = format!("{err:#}");
        assert!(message.contains("dataset line 2"), "{message}");
        assert!(message.contains("symptoms"), "{message}");
    }

    #[test]
    fn missing_note_is_rejected() {
        let file = write_dataset(&[json!({"summary": {}}).to_string()]);
        assert!(load_jsonl(file.path(), &CanonicalSchema::clinical_summary(), None).is_err());
    }
}
