use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::codec::Format;
use crate::eval::DEFAULT_MATCH_THRESHOLD;
use crate::pipeline::DEFAULT_MAX_RETRIES;
use crate::semantic::DEFAULT_EMBEDDING_DIM;

#[derive(Parser, Debug)]
#[command(
    name = "clinsum",
    version,
    about = "Clinical summary extraction and evaluation across serialization formats"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the extraction pipeline over a dataset and write a run manifest.
    Extract(ExtractArgs),
    /// Score a run manifest against the dataset's reference summaries.
    Evaluate(EvaluateArgs),
    /// Print the empty canonical template in a target format.
    Template(TemplateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[arg(long)]
    pub dataset: PathBuf,

    #[arg(long, value_enum)]
    pub format: Format,

    /// Command that reads a prompt on stdin and answers on stdout.
    #[arg(long, env = "CLINSUM_MODEL_COMMAND")]
    pub model_command: String,

    #[arg(long)]
    pub model_timeout_secs: Option<u64>,

    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    #[arg(long)]
    pub limit: Option<usize>,

    #[arg(long, default_value = "outputs")]
    pub outputs_dir: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, env = "CLINSUM_TOON_COMMAND", default_value = "toon")]
    pub toon_command: String,
}

#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    #[arg(long)]
    pub dataset: PathBuf,

    #[arg(long)]
    pub run_manifest: PathBuf,

    #[arg(long, default_value_t = DEFAULT_MATCH_THRESHOLD)]
    pub threshold: f64,

    #[arg(long, default_value_t = DEFAULT_EMBEDDING_DIM)]
    pub embedding_dim: usize,

    #[arg(long)]
    pub report_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct TemplateArgs {
    #[arg(long, value_enum, default_value_t = Format::Json)]
    pub format: Format,

    #[arg(long, env = "CLINSUM_TOON_COMMAND", default_value = "toon")]
    pub toon_command: String,
}
