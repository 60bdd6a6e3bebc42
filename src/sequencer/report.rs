use std::fmt;
use std::path::PathBuf;

/// What a finished batch produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub total: usize,
    /// Output files of successful items, in batch order. An item that
    /// succeeded without a known output file is not listed.
    pub completed: Vec<PathBuf>,
    /// Sources whose item failed.
    pub failed: Vec<PathBuf>,
    pub interrupted: bool,
    /// Set when a failure stopped the whole batch.
    pub fatal: Option<String>,
}

impl BatchReport {
    pub fn summary(&self) -> BatchSummary {
        if let Some(reason) = &self.fatal {
            BatchSummary::Fatal(reason.clone())
        } else if self.interrupted {
            BatchSummary::Interrupted
        } else if self.failed.is_empty() {
            BatchSummary::AllSucceeded
        } else if self.failed.len() >= self.total {
            BatchSummary::AllFailed
        } else {
            BatchSummary::SomeFailed {
                failed: self.failed.len(),
                total: self.total,
            }
        }
    }
}

/// End-of-batch notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchSummary {
    AllSucceeded,
    SomeFailed { failed: usize, total: usize },
    AllFailed,
    Fatal(String),
    Interrupted,
}

impl BatchSummary {
    pub fn is_success(&self) -> bool {
        matches!(self, BatchSummary::AllSucceeded)
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchSummary::AllSucceeded => write!(f, "Done! All tasks completed successfully."),
            BatchSummary::SomeFailed { failed, total } => write!(
                f,
                "Done! {} of {} tasks failed, check the log for details.",
                failed, total
            ),
            BatchSummary::AllFailed => write!(f, "Failed! No task completed, check the log."),
            BatchSummary::Fatal(reason) => write!(f, "Fatal error: {}", reason),
            BatchSummary::Interrupted => write!(f, "Interrupted by user."),
        }
    }
}
