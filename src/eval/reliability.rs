use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::RunResult;

/// Operational counters folded over run results.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReliabilityTally {
    pub runs: usize,
    pub succeeded: usize,
    pub attempts: usize,
    pub retries: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityReport {
    pub total: usize,
    pub success_rate: f64,
    pub avg_retries: f64,
    pub avg_time: f64,
    pub failed: usize,
}

impl ReliabilityTally {
    pub fn from_runs<'a>(runs: impl IntoIterator<Item = &'a RunResult>) -> Self {
        runs.into_iter()
            .map(Self::from_run)
            .fold(Self::default(), Self::merge)
    }

    pub fn from_run(run: &RunResult) -> Self {
        Self {
            runs: 1,
            succeeded: usize::from(run.succeeded()),
            attempts: run.attempts().len(),
            retries: run.retries(),
            elapsed: run.total_elapsed(),
        }
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            runs: self.runs + other.runs,
            succeeded: self.succeeded + other.succeeded,
            attempts: self.attempts + other.attempts,
            retries: self.retries + other.retries,
            elapsed: self.elapsed + other.elapsed,
        }
    }

    pub fn failed(&self) -> usize {
        self.runs - self.succeeded
    }

    pub fn report(&self) -> ReliabilityReport {
        if self.runs == 0 {
            return ReliabilityReport {
                total: 0,
                success_rate: 0.0,
                avg_retries: 0.0,
                avg_time: 0.0,
                failed: 0,
            };
        }
        let runs = self.runs as f64;
        ReliabilityReport {
            total: self.runs,
            success_rate: self.succeeded as f64 / runs,
            avg_retries: self.retries as f64 / runs,
            avg_time: self.elapsed.as_secs_f64() / runs,
            failed: self.failed(),
        }
    }
}
