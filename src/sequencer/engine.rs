use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use super::job::{BatchItem, BatchJob, CancelFlag, LaunchFailurePolicy, Pass};
use super::report::BatchReport;
use crate::command::CommandSpec;
use crate::error::{PasslineError, Result};
use crate::event::{EventSink, ItemEnd, LineStatus, ProgressEvent};
use crate::logfile::{self, LogWriter};
use crate::parser::LoudnessStatistics;
use crate::runner::{PassExit, ProcessLauncher};

pub const DEFAULT_GRACE: Duration = Duration::from_secs(10);

enum ItemOutcome {
    Succeeded,
    Failed,
    Cancelled,
    Fatal(String),
}

struct PassRun {
    exit: PassExit,
    stats: LoudnessStatistics,
    cancelled: bool,
}

/// Drives the passes of a batch, one process at a time.
pub struct Sequencer {
    launcher: Arc<dyn ProcessLauncher>,
    sink: Arc<dyn EventSink>,
    log: Arc<dyn LogWriter>,
    grace: Duration,
}

/// Front-end side of a spawned batch.
pub struct JobHandle {
    cancel: CancelFlag,
    handle: JoinHandle<BatchReport>,
}

impl JobHandle {
    pub(crate) fn new(cancel: CancelFlag, handle: JoinHandle<BatchReport>) -> Self {
        Self { cancel, handle }
    }

    /// Asks the worker to stop. The in-flight pass gets a graceful stop.
    pub fn cancel(&self) {
        self.cancel.request();
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub async fn join(self) -> Result<BatchReport> {
        self.handle
            .await
            .map_err(|e| PasslineError::Worker(e.to_string()))
    }
}

impl Sequencer {
    pub fn new(
        launcher: Arc<dyn ProcessLauncher>,
        sink: Arc<dyn EventSink>,
        log: Arc<dyn LogWriter>,
    ) -> Self {
        Self {
            launcher,
            sink,
            log,
            grace: DEFAULT_GRACE,
        }
    }

    /// How long a stopped process may take to exit before it is killed.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Runs the batch on its own task.
    pub fn spawn(self, job: BatchJob) -> JobHandle {
        let cancel = job.cancel.clone();
        let handle = tokio::spawn(async move { self.run(job).await });
        JobHandle { cancel, handle }
    }

    /// Runs every item in order. Always ends with exactly one `End` event.
    pub async fn run(&self, job: BatchJob) -> BatchReport {
        let span = info_span!("batch", id = %job.id, plan = job.plan.name());
        self.run_batch(&job).instrument(span).await
    }

    async fn run_batch(&self, job: &BatchJob) -> BatchReport {
        let total = job.items.len();
        let mut report = BatchReport {
            total,
            ..Default::default()
        };
        info!("Starting batch of {} item(s)", total);

        for (index, item) in job.items.iter().enumerate() {
            if job.cancel.is_requested() {
                report.interrupted = true;
                break;
            }

            let label = format!("File {}/{}", index + 1, total);
            self.post_count(&label, item, ItemEnd::Started);

            match self.run_item(job, item, &label).await {
                ItemOutcome::Succeeded => {
                    if let Err(e) = job.plan.after_success(item) {
                        warn!("Post-processing of {} failed: {}", item.source.display(), e);
                        self.append_log(&logfile::error_block(&e.to_string()));
                    }
                    info!("{} done: {}", label, item.destination.display());
                    report.completed.push(item.destination.clone());
                    self.post_count(&label, item, ItemEnd::Done);
                }
                ItemOutcome::Failed => {
                    report.failed.push(item.source.clone());
                    self.post_count(&label, item, ItemEnd::Error);
                }
                ItemOutcome::Cancelled => {
                    report.interrupted = true;
                    self.post_count(&label, item, ItemEnd::Error);
                    break;
                }
                ItemOutcome::Fatal(reason) => {
                    report.failed.push(item.source.clone());
                    report.fatal = Some(reason);
                    self.post_count(&label, item, ItemEnd::Error);
                    break;
                }
            }
        }

        let completed = match report.fatal {
            Some(_) => None,
            None => Some(report.completed.clone()),
        };
        self.sink.post(ProgressEvent::End { completed });
        info!("Batch finished: {}", report.summary());
        report
    }

    async fn run_item(&self, job: &BatchJob, item: &BatchItem, label: &str) -> ItemOutcome {
        let passes = job.plan.pass_count(item).clamp(1, 2);
        let mut captured: Option<LoudnessStatistics> = None;

        for pass in [Pass::First, Pass::Second].into_iter().take(passes) {
            if job.cancel.is_requested() {
                return ItemOutcome::Cancelled;
            }

            let spec = match job.plan.build_pass(item, pass, captured.as_ref()) {
                Ok(spec) => spec,
                Err(e) => {
                    warn!("Cannot build pass {} for {}: {}", pass.number(), item.source.display(), e);
                    self.report_failure(&format!("{}: {}", item.source.display(), e), item.duration);
                    return ItemOutcome::Failed;
                }
            };

            let summary = format!(
                "{} pass {}/{}\nSource: {}\nDestination: {}",
                label,
                pass.number(),
                passes,
                item.source.display(),
                item.destination.display()
            );
            self.append_log(&logfile::command_block(&summary, &spec.command_line()));

            match self.run_pass(&spec, &job.cancel).await {
                Err(e) if e.is_launch() => {
                    warn!("{}", e);
                    let reason = e.to_string();
                    self.report_failure(&reason, spec.expected_duration);
                    return match job.plan.launch_failure_policy() {
                        LaunchFailurePolicy::SkipItem => ItemOutcome::Failed,
                        LaunchFailurePolicy::AbortBatch => ItemOutcome::Fatal(reason),
                    };
                }
                Err(e) => {
                    warn!("{} failed: {}", spec.description, e);
                    self.report_failure(&e.to_string(), spec.expected_duration);
                    return ItemOutcome::Failed;
                }
                Ok(run) if run.cancelled => {
                    let reason = format!("{}: {}", item.source.display(), PasslineError::Cancelled);
                    info!("{}", reason);
                    self.append_log(&logfile::error_block(&reason));
                    return ItemOutcome::Cancelled;
                }
                Ok(run) if !run.exit.success() => {
                    let failure = PasslineError::PassFailure {
                        description: spec.description.clone(),
                        code: run.exit.code(),
                    };
                    warn!("{}: {}", item.source.display(), failure);
                    self.append_log(&logfile::error_block(&format!(
                        "{}: {}",
                        item.source.display(),
                        failure
                    )));
                    return ItemOutcome::Failed;
                }
                Ok(run) => {
                    if spec.capture_stats {
                        captured = Some(run.stats);
                    }
                    if pass == Pass::First && passes == 2 {
                        self.post_count(label, item, ItemEnd::Continue);
                    }
                }
            }
        }

        ItemOutcome::Succeeded
    }

    async fn run_pass(&self, spec: &CommandSpec, cancel: &CancelFlag) -> Result<PassRun> {
        let mut process = self.launcher.start(spec).await?;
        let mut stats = LoudnessStatistics::new();
        let mut cancelled = false;

        loop {
            let next = tokio::select! {
                line = process.next_line() => Some(line),
                _ = cancel.cancelled() => None,
            };

            let line = match next {
                None => {
                    cancelled = true;
                    break;
                }
                Some(None) => break,
                Some(Some(line)) => line,
            };

            if spec.capture_stats && stats.observe(&line) {
                debug!("Captured statistic: {}", line.trim());
            }
            self.sink
                .post(ProgressEvent::output_line(&line, spec.expected_duration));

            if cancel.is_requested() {
                cancelled = true;
                break;
            }
        }

        let exit = if cancelled {
            info!("Stopping {}", spec.description);
            self.sink.post(ProgressEvent::status_line(
                "Stop requested",
                spec.expected_duration,
                LineStatus::Stop,
            ));
            if spec.graceful_stop {
                process.request_graceful_stop(self.grace).await?
            } else {
                process.kill_now().await?
            }
        } else {
            process.wait().await?
        };

        self.sink.post(ProgressEvent::status_line(
            format!("{} exited with code {}", spec.description, exit.code()),
            spec.expected_duration,
            LineStatus::Exited(exit.code()),
        ));

        Ok(PassRun {
            exit,
            stats,
            cancelled,
        })
    }

    fn post_count(&self, label: &str, item: &BatchItem, end: ItemEnd) {
        self.sink.post(ProgressEvent::Count {
            count: label.to_string(),
            source: item.source.to_string_lossy().to_string(),
            destination: item.destination.to_string_lossy().to_string(),
            duration: item.duration,
            end,
        });
    }

    fn report_failure(&self, reason: &str, duration: Option<u64>) {
        self.sink
            .post(ProgressEvent::status_line(reason, duration, LineStatus::Failed));
        self.append_log(&logfile::error_block(reason));
    }

    fn append_log(&self, text: &str) {
        if let Err(e) = self.log.append(text) {
            warn!("Could not write audit log: {}", e);
        }
    }
}
