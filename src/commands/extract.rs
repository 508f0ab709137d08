use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::ExtractArgs;
use crate::codec::{CodecRegistry, verify_round_trip};
use crate::dataset::load_jsonl;
use crate::eval::ReliabilityTally;
use crate::model::{DatasetRef, ExtractionCounts, ExtractionRunManifest, MANIFEST_VERSION};
use crate::pipeline::{CommandModel, Extractor, NoteInput, PipelineConfig, RunResult, run_batch};
use crate::schema::CanonicalSchema;
use crate::util::{now_utc_string, sha256_file, utc_compact_string, write_json_pretty};

pub fn run(args: ExtractArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        args.outputs_dir
            .join(args.format.as_str())
            .join(format!("run_{}.json", utc_compact_string(started_ts)))
    });

    info!(
        run_id = %run_id,
        format = %args.format,
        dataset = %args.dataset.display(),
        "starting extraction run"
    );

    let registry = CodecRegistry::with_defaults(&args.toon_command)?;
    let codec = registry.get_available(args.format)?;
    let model = CommandModel::from_command_line(
        &args.model_command,
        args.model_timeout_secs.map(Duration::from_secs),
    )?;

    let schema = Arc::new(CanonicalSchema::clinical_summary());
    verify_round_trip(codec.as_ref(), &schema.template())?;

    let dataset_sha256 = sha256_file(&args.dataset)?;
    let samples = load_jsonl(&args.dataset, &schema, args.limit)?;
    if samples.is_empty() {
        bail!("dataset contains no samples: {}", args.dataset.display());
    }

    let config = PipelineConfig {
        max_retries: args.max_retries,
        ..PipelineConfig::default()
    };
    let extractor = Extractor::new(codec, schema, Arc::new(model.clone()), config)?;

    let notes = samples
        .iter()
        .map(|sample| NoteInput {
            sample_index: sample.index,
            note_text: &sample.note_text,
        })
        .collect::<Vec<_>>();
    let runs = run_batch(&extractor, &notes, args.workers)?;

    let tally = log_run_summary(&runs);

    let manifest = ExtractionRunManifest {
        manifest_version: MANIFEST_VERSION,
        run_id,
        format: args.format,
        started_at,
        updated_at: now_utc_string(),
        dataset: DatasetRef {
            path: args.dataset.display().to_string(),
            sha256: dataset_sha256,
            sample_count: samples.len(),
        },
        model_command: model.describe(),
        max_retries: args.max_retries,
        workers: args.workers,
        counts: ExtractionCounts {
            succeeded: tally.succeeded,
            failed: tally.failed(),
            attempts: tally.attempts,
            retries: tally.retries,
        },
        runs,
    };

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote extraction run manifest");

    Ok(())
}

fn log_run_summary(runs: &[RunResult]) -> ReliabilityTally {
    for run in runs {
        let tally = ReliabilityTally::from_run(run);
        if run.succeeded() {
            info!(
                sample = run.sample_index(),
                attempts = tally.attempts,
                elapsed_seconds = tally.elapsed.as_secs_f64(),
                "sample succeeded"
            );
        } else {
            let last_reason = run
                .attempts()
                .last()
                .and_then(|attempt| attempt.outcome.failure_reason())
                .unwrap_or_default();
            warn!(
                sample = run.sample_index(),
                attempts = tally.attempts,
                elapsed_seconds = tally.elapsed.as_secs_f64(),
                last_reason = %last_reason,
                "sample failed"
            );
        }
    }

    let tally = ReliabilityTally::from_runs(runs);
    let report = tally.report();
    info!(
        total = report.total,
        succeeded = tally.succeeded,
        failed = report.failed,
        attempts = tally.attempts,
        retries = tally.retries,
        avg_time_seconds = report.avg_time,
        "extraction batch completed"
    );
    tally
}

