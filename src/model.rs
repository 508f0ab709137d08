use serde::{Deserialize, Serialize};

use crate::codec::Format;
use crate::eval::EvaluationReport;
use crate::pipeline::RunResult;

pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetRef {
    pub path: String,
    pub sha256: String,
    pub sample_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub attempts: usize,
    pub retries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub format: Format,
    pub started_at: String,
    pub updated_at: String,
    pub dataset: DatasetRef,
    pub model_command: String,
    pub max_retries: u32,
    pub workers: usize,
    pub counts: ExtractionCounts,
    pub runs: Vec<RunResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub run_manifest_path: String,
    pub run_id: String,
    pub format: Format,
    pub dataset: DatasetRef,
    pub report: EvaluationReport,
    pub warnings: Vec<String>,
}
