//! Bounded-parallel execution of a command batch.
//!
//! The planner hands over every per-locale command at once together with a
//! concurrency bound. The dispatcher owns the worker pool, attempts every
//! command, waits for all of them and reports one aggregate outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, error, info};

use crate::error::{DeployError, Result};
use crate::shell::{run_command, CommandSpec};

/// Commands to run with at most `concurrency` in flight (0 = dispatcher default)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBatch {
    pub commands: Vec<CommandSpec>,
    pub concurrency: usize,
}

/// Outcome of one command
#[derive(Debug)]
pub enum CommandStatus {
    Success,
    Failed(DeployError),
    /// Not started because of SIGINT
    Cancelled,
}

/// Result of one command in the batch
#[derive(Debug)]
pub struct CommandResult {
    pub command: CommandSpec,
    pub status: CommandStatus,
    pub duration: Duration,
}

/// Every command's result once the whole batch finished successfully
#[derive(Debug)]
pub struct DispatchReport {
    pub results: Vec<CommandResult>,
    /// Worker threads actually used
    pub threads: usize,
    pub duration: Duration,
}

/// Runs a batch; any failed command fails the whole batch
pub trait Dispatcher {
    fn dispatch(&self, batch: &CommandBatch) -> Result<DispatchReport>;
}

/// Concurrency used when the batch asks for the default (0)
pub fn effective_concurrency(requested: usize) -> usize {
    if requested == 0 {
        num_cpus::get().max(1)
    } else {
        requested
    }
}

/// [`Dispatcher`] running child processes on a rayon pool
pub struct ParallelDispatcher {
    shutdown: Arc<AtomicBool>,
    timeout: Option<Duration>,
    progress: bool,
}

impl ParallelDispatcher {
    pub fn new(shutdown: Arc<AtomicBool>) -> Self {
        Self {
            shutdown,
            timeout: None,
            progress: false,
        }
    }

    /// Kill and fail any command running longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Show a progress bar while the batch runs
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    fn progress_bar(&self, total: usize) -> Option<ProgressBar> {
        if !self.progress {
            return None;
        }
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Some(pb)
    }

    fn run_one(&self, command: &CommandSpec) -> CommandResult {
        let start = Instant::now();
        if self.shutdown.load(Ordering::Relaxed) {
            return CommandResult {
                command: command.clone(),
                status: CommandStatus::Cancelled,
                duration: start.elapsed(),
            };
        }

        let status = match run_command(command, self.timeout) {
            Ok(output) => {
                if !output.is_empty() {
                    debug!(command = %command, "{}", output);
                }
                CommandStatus::Success
            }
            Err(e) => {
                error!(command = %command, "{}", e);
                CommandStatus::Failed(e)
            }
        };

        CommandResult {
            command: command.clone(),
            status,
            duration: start.elapsed(),
        }
    }
}

impl Dispatcher for ParallelDispatcher {
    fn dispatch(&self, batch: &CommandBatch) -> Result<DispatchReport> {
        let threads = effective_concurrency(batch.concurrency);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| DeployError::WorkerPool {
                message: e.to_string(),
            })?;

        info!(
            commands = batch.commands.len(),
            threads, "dispatching static content commands"
        );
        let start = Instant::now();
        let progress = self.progress_bar(batch.commands.len());

        let results: Vec<CommandResult> = pool.install(|| {
            batch
                .commands
                .par_iter()
                .map(|command| {
                    let result = self.run_one(command);
                    if let Some(ref pb) = progress {
                        pb.inc(1);
                    }
                    result
                })
                .collect()
        });

        if let Some(pb) = progress {
            pb.finish_with_message("Complete");
        }

        let report = DispatchReport {
            results,
            threads,
            duration: start.elapsed(),
        };
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(DeployError::Cancelled);
        }
        collect_results(report)
    }
}

/// Turn a finished batch into one outcome: Ok only if every command succeeded
pub fn collect_results(report: DispatchReport) -> Result<DispatchReport> {
    let total = report.results.len();
    let failures: Vec<String> = report
        .results
        .iter()
        .filter_map(|r| match &r.status {
            CommandStatus::Success => None,
            CommandStatus::Failed(e) => Some(format!("{}", e)),
            CommandStatus::Cancelled => Some(format!("`{}` cancelled", r.command)),
        })
        .collect();

    if failures.is_empty() {
        Ok(report)
    } else {
        Err(DeployError::DispatchFailed {
            failed: failures.len(),
            total,
            details: failures.join("; "),
        })
    }
}
