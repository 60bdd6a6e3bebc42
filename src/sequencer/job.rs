use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::command::CommandSpec;
use crate::error::Result;
use crate::parser::LoudnessStatistics;

/// One source to process.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Media duration in milliseconds, `None` when unknown.
    pub duration: Option<u64>,
    /// Opaque extra arguments appended by the mode.
    pub extra: Vec<String>,
}

impl BatchItem {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(source: P, destination: Q) -> Self {
        Self {
            source: source.as_ref().to_path_buf(),
            destination: destination.as_ref().to_path_buf(),
            duration: None,
            extra: Vec::new(),
        }
    }

    pub fn with_duration(mut self, duration: Option<u64>) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_extra<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra.extend(extra.into_iter().map(Into::into));
        self
    }
}

/// Which pass of an item is being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    First,
    Second,
}

impl Pass {
    pub fn number(self) -> usize {
        match self {
            Pass::First => 1,
            Pass::Second => 2,
        }
    }
}

/// What a launch failure does to the rest of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchFailurePolicy {
    SkipItem,
    AbortBatch,
}

/// Per-mode hooks driving the generic sequencer.
pub trait PassPlan: Send + Sync {
    /// Short name used in log summaries and the audit file name.
    fn name(&self) -> &str;

    /// 1 or 2; evaluated per item because batches may mix both.
    fn pass_count(&self, item: &BatchItem) -> usize;

    /// Builds the command for `pass`. For the second pass, `captured` holds the
    /// statistics of a preceding capture pass, if there was one.
    fn build_pass(
        &self,
        item: &BatchItem,
        pass: Pass,
        captured: Option<&LoudnessStatistics>,
    ) -> Result<CommandSpec>;

    fn launch_failure_policy(&self) -> LaunchFailurePolicy {
        LaunchFailurePolicy::SkipItem
    }

    /// Runs after an item's final pass exits zero.
    fn after_success(&self, _item: &BatchItem) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct CancelState {
    requested: AtomicBool,
    notify: Notify,
}

/// Set-once cancel request shared between the front-end and a worker.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<CancelState>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.inner.requested.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Resolves once [`CancelFlag::request`] has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_requested() {
                return;
            }
            notified.await;
        }
    }
}

/// Everything one "start" action hands to a sequencer.
pub struct BatchJob {
    pub id: Uuid,
    pub items: Vec<BatchItem>,
    pub plan: Arc<dyn PassPlan>,
    pub cancel: CancelFlag,
}

impl BatchJob {
    pub fn new(items: Vec<BatchItem>, plan: Arc<dyn PassPlan>) -> Self {
        Self {
            id: Uuid::new_v4(),
            items,
            plan,
            cancel: CancelFlag::new(),
        }
    }
}
