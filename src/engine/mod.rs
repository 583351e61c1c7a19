mod guard;
mod launcher;
mod normalize;
mod progress;
mod running;

use guard::RunGuard;
pub use launcher::{LaunchError, LaunchOutcome, ProcessLauncher, SystemLauncher};
pub use normalize::normalize_path;
pub use progress::{ChannelSink, ProgressLog, ProgressSink};

use crate::model::{
    LaunchBundle, LaunchStep, ProgressMode, SequenceResult, StepOutcome, StepReport,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RunError {
    #[error("a launch sequence is already running")]
    AlreadyRunning,
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Skip steps whose program already appears in the process list.
    pub skip_if_running: bool,
    /// Countdown granularity. One second outside of tests.
    pub tick: Duration,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            skip_if_running: false,
            tick: Duration::from_secs(1),
        }
    }
}

/// Runs launch bundles one step at a time. One runner admits one run at a time; a second
/// concurrent call is rejected rather than queued.
pub struct SequenceRunner {
    launcher: Arc<dyn ProcessLauncher>,
    guard: RunGuard,
    opts: RunnerOptions,
}

enum Countdown {
    Elapsed,
    Cancelled,
}

enum Attempt {
    Launched,
    AlreadyRunning,
    Failed(LaunchError),
}

impl SequenceRunner {
    pub fn new(launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self {
            launcher,
            guard: RunGuard::new(),
            opts: RunnerOptions::default(),
        }
    }

    pub fn with_options(mut self, opts: RunnerOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_held()
    }

    pub async fn run(
        &self,
        bundle: &LaunchBundle,
        sink: &dyn ProgressSink,
    ) -> Result<SequenceResult, RunError> {
        self.run_with_cancel(bundle, sink, CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), but the inter-step countdown stops early when `cancel`
    /// fires. Steps not yet started are then recorded as skipped.
    pub async fn run_with_cancel(
        &self,
        bundle: &LaunchBundle,
        sink: &dyn ProgressSink,
        cancel: CancellationToken,
    ) -> Result<SequenceResult, RunError> {
        let Some(_permit) = self.guard.try_permit() else {
            tracing::info!(bundle = %bundle.name, "rejected: another sequence is running");
            return Err(RunError::AlreadyRunning);
        };

        let started = Instant::now();
        let started_at = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "now".into());
        let total = bundle.steps.len();
        tracing::info!(bundle = %bundle.name, total, "sequence start");

        let mut reports = Vec::with_capacity(total);
        let mut cancelled = false;

        for (i, step) in bundle.steps.iter().enumerate() {
            let index = i + 1;
            if cancelled {
                reports.push(report(index, step, StepOutcome::Skipped {
                    reason: "cancelled".into(),
                }));
                continue;
            }

            sink.notify(
                &format!(
                    "Launching {index}/{total}: {} ({})...",
                    step.path, step.window_mode
                ),
                ProgressMode::Append,
            );
            let outcome = self.launch_step(index, step, sink).await;
            reports.push(report(index, step, outcome));

            if index < total && step.delay > 0.0 {
                if let Countdown::Cancelled = self.countdown(step.delay, sink, &cancel).await {
                    tracing::info!(bundle = %bundle.name, after_step = index, "sequence cancelled");
                    cancelled = true;
                }
            }
        }

        sink.notify(
            if cancelled { "Cancelled." } else { "Done." },
            ProgressMode::Append,
        );

        let count = |f: fn(&StepOutcome) -> bool| reports.iter().filter(|r| f(&r.outcome)).count();
        let result = SequenceResult {
            bundle: bundle.name.clone(),
            total,
            succeeded: count(|o| matches!(o, StepOutcome::Launched)),
            failed: count(|o| matches!(o, StepOutcome::Failed { .. })),
            skipped: count(|o| matches!(o, StepOutcome::Skipped { .. })),
            cancelled,
            started_at,
            elapsed_ms: started.elapsed().as_millis() as u64,
            steps: reports,
        };
        tracing::info!(
            bundle = %result.bundle,
            succeeded = result.succeeded,
            failed = result.failed,
            skipped = result.skipped,
            "sequence done"
        );
        Ok(result)
    }

    async fn launch_step(
        &self,
        index: usize,
        step: &LaunchStep,
        sink: &dyn ProgressSink,
    ) -> StepOutcome {
        let path = match normalize_path(&step.path) {
            Ok(p) => p,
            Err(e) => return self.fail(index, step, e, sink),
        };

        let launcher = self.launcher.clone();
        let mode = step.window_mode;
        let skip_if_running = self.opts.skip_if_running;
        let target = path.clone();
        // The process scan can block too, so it shares the launch's blocking task.
        let attempt = tokio::task::spawn_blocking(move || {
            if skip_if_running && launcher.is_running(&target) {
                return Attempt::AlreadyRunning;
            }
            match launcher.launch(&target, mode) {
                Ok(()) => Attempt::Launched,
                Err(e) => Attempt::Failed(e),
            }
        })
        .await
        .unwrap_or_else(|join_err| Attempt::Failed(LaunchError::Panicked(join_err.to_string())));

        match attempt {
            Attempt::Launched => {
                tracing::info!(step = index, path = %path, mode = %mode, "launched");
                sink.notify(&format!("✓ Launched {}", step.path), ProgressMode::Append);
                StepOutcome::Launched
            }
            Attempt::AlreadyRunning => {
                tracing::info!(step = index, path = %path, "already running, skipped");
                sink.notify(
                    &format!("Skipped {}: already running", step.path),
                    ProgressMode::Append,
                );
                StepOutcome::Skipped {
                    reason: "already running".into(),
                }
            }
            Attempt::Failed(e) => self.fail(index, step, e, sink),
        }
    }

    fn fail(
        &self,
        index: usize,
        step: &LaunchStep,
        err: LaunchError,
        sink: &dyn ProgressSink,
    ) -> StepOutcome {
        tracing::warn!(step = index, path = %step.path, error = %err, "launch failed");
        sink.notify(
            &format!("✗ Error launching {}: {err}", step.path),
            ProgressMode::Append,
        );
        StepOutcome::Failed {
            reason: err.to_string(),
        }
    }

    /// One overwrite tick per whole second, counting down from `ceil(delay)`, then a clear.
    async fn countdown(
        &self,
        delay: f64,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Countdown {
        let secs = delay.ceil() as u64;
        tracing::debug!(delay, secs, "waiting before next step");
        let mut end = Countdown::Elapsed;
        for remaining in (1..=secs).rev() {
            sink.notify(
                &format!("Waiting {remaining}s before next..."),
                ProgressMode::Overwrite,
            );
            tokio::select! {
                _ = cancel.cancelled() => {
                    end = Countdown::Cancelled;
                    break;
                }
                _ = tokio::time::sleep(self.opts.tick) => {}
            }
        }
        sink.notify("", ProgressMode::Overwrite);
        end
    }
}

fn report(index: usize, step: &LaunchStep, outcome: StepOutcome) -> StepReport {
    StepReport {
        index,
        path: step.path.clone(),
        window_mode: step.window_mode,
        outcome,
    }
}
