use std::collections::BTreeMap;

use anyhow::{Result, anyhow, bail};
use tracing::{info, warn};

use crate::cli::EvaluateArgs;
use crate::dataset::load_jsonl;
use crate::document::Node;
use crate::eval::{EvaluationConfig, EvaluationReport, Evaluator};
use crate::model::{DatasetRef, EvaluationManifest, ExtractionRunManifest, MANIFEST_VERSION};
use crate::schema::CanonicalSchema;
use crate::semantic::LocalHashEmbedding;
use crate::util::{now_utc_string, read_json, sha256_file, write_json_pretty};

pub fn run(args: EvaluateArgs) -> Result<()> {
    let config = EvaluationConfig::new(args.threshold)?;
    if args.embedding_dim == 0 {
        bail!("embedding dimension must be positive");
    }

    let manifest: ExtractionRunManifest = read_json(&args.run_manifest)?;
    for run in &manifest.runs {
        run.check_invariants(Some(manifest.max_retries)).map_err(|reason| {
            anyhow!("invalid run manifest {}: {reason}", args.run_manifest.display())
        })?;
    }

    let mut warnings = Vec::<String>::new();
    let dataset_sha256 = sha256_file(&args.dataset)?;
    if dataset_sha256 != manifest.dataset.sha256 {
        let warning = format!(
            "dataset {} does not match the hash recorded by run {}",
            args.dataset.display(),
            manifest.run_id
        );
        warn!("{warning}");
        warnings.push(warning);
    }

    let schema = CanonicalSchema::clinical_summary();
    let samples = load_jsonl(&args.dataset, &schema, None)?;
    let references = samples
        .into_iter()
        .map(|sample| (sample.index, sample.reference))
        .collect::<BTreeMap<usize, Node>>();

    info!(
        run_id = %manifest.run_id,
        format = %manifest.format,
        runs = manifest.runs.len(),
        threshold = config.threshold,
        "starting evaluation"
    );

    let similarity = LocalHashEmbedding::new(args.embedding_dim);
    let evaluator = Evaluator::new(&schema, config, &similarity);
    let report = evaluator.evaluate_batch(&manifest.runs, &references)?;
    log_report(&report);

    let report_path = args.report_path.clone().unwrap_or_else(|| {
        args.run_manifest
            .with_file_name(format!("evaluation_{}.json", manifest.run_id))
    });
    let evaluation = EvaluationManifest {
        manifest_version: MANIFEST_VERSION,
        generated_at: now_utc_string(),
        run_manifest_path: args.run_manifest.display().to_string(),
        run_id: manifest.run_id,
        format: manifest.format,
        dataset: DatasetRef {
            path: args.dataset.display().to_string(),
            sha256: dataset_sha256,
            sample_count: references.len(),
        },
        report,
        warnings,
    };
    write_json_pretty(&report_path, &evaluation)?;
    info!(path = %report_path.display(), "wrote evaluation report");

    Ok(())
}

fn log_report(report: &EvaluationReport) {
    info!(
        scored = report.samples_scored,
        total = report.samples_total,
        precision = report.field_precision,
        recall = report.field_recall,
        f1 = report.field_f1,
        semantic = report.semantic_similarity,
        "field metrics"
    );
    for (section, metrics) in &report.entity_metrics {
        info!(
            section = %section,
            precision = metrics.precision,
            recall = metrics.recall,
            f1 = metrics.f1,
            "entity metrics"
        );
    }
    info!(
        success_rate = report.reliability.success_rate,
        avg_retries = report.reliability.avg_retries,
        avg_time_seconds = report.reliability.avg_time,
        failed = report.reliability.failed,
        "reliability"
    );
}
