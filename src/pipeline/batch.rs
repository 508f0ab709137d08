use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::info;

use super::{Extractor, RunResult};

/// A note queued for extraction.
#[derive(Debug, Clone, Copy)]
pub struct NoteInput<'a> {
    pub sample_index: usize,
    pub note_text: &'a str,
}

/// Runs every note on a bounded worker pool. Runs are independent; the
/// returned results follow input order.
pub fn run_batch(
    extractor: &Extractor,
    notes: &[NoteInput<'_>],
    workers: usize,
) -> Result<Vec<RunResult>> {
    let workers = workers.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|index| format!("extract-worker-{index}"))
        .build()
        .context("failed to build extraction worker pool")?;

    info!(
        notes = notes.len(),
        workers,
        max_retries = extractor.config().max_retries,
        "starting extraction batch"
    );

    let results = pool.install(|| {
        notes
            .par_iter()
            .map(|note| extractor.run(note.sample_index, note.note_text))
            .collect::<Vec<RunResult>>()
    });

    Ok(results)
}
