//! Event vocabulary flowing from a worker to whatever renders progress.

use serde::{Serialize, Serializer};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::trace;

use crate::parser::{self, LineCategory};

/// Outcome attached to a `Line` event.
///
/// Serializes as `0` while running, the exit code once finished, or the
/// strings `"STOP"` and `"FAILED"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStatus {
    /// Ordinary output while the pass is running.
    Running,
    /// The pass finished with this exit code.
    Exited(i32),
    /// A cancel request was observed.
    Stop,
    /// The tool could not be launched.
    Failed,
}

impl Serialize for LineStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            LineStatus::Running => serializer.serialize_i32(0),
            LineStatus::Exited(code) => serializer.serialize_i32(*code),
            LineStatus::Stop => serializer.serialize_str("STOP"),
            LineStatus::Failed => serializer.serialize_str("FAILED"),
        }
    }
}

/// Per-item marker carried by `Count` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ItemEnd {
    #[serde(rename = "")]
    Started,
    #[serde(rename = "CONTINUE")]
    Continue,
    #[serde(rename = "DONE")]
    Done,
    #[serde(rename = "ERROR")]
    Error,
}

/// Parsed progress of a line carrying a `time=` token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineProgress {
    pub elapsed: u64,
    pub caption: String,
    pub eta: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressEvent {
    Line {
        output: String,
        duration: Option<u64>,
        status: LineStatus,
        category: LineCategory,
        progress: Option<LineProgress>,
    },
    Count {
        count: String,
        source: String,
        destination: String,
        duration: Option<u64>,
        end: ItemEnd,
    },
    #[serde(rename = "DOWNLOAD-LINE")]
    DownloadLine {
        percent: String,
        total_bytes: String,
        speed: String,
        eta: String,
    },
    End { completed: Option<Vec<PathBuf>> },
}

impl ProgressEvent {
    /// Builds a running `Line` event, parsing progress out of the raw text.
    pub fn output_line(line: &str, duration: Option<u64>) -> Self {
        let progress = parser::parse_time_progress(line).map(|elapsed| LineProgress {
            elapsed,
            caption: parser::format_caption(&parser::parse_key_value_pairs(line)),
            eta: duration
                .and_then(|total| parser::parse_estimated_remaining(line, elapsed, total))
                .map(|eta| eta.to_string()),
        });

        ProgressEvent::Line {
            output: line.to_string(),
            duration,
            status: LineStatus::Running,
            category: parser::classify_line(line),
            progress,
        }
    }

    pub fn status_line<S: Into<String>>(output: S, duration: Option<u64>, status: LineStatus) -> Self {
        let output = output.into();
        let category = match status {
            LineStatus::Failed => LineCategory::Error,
            LineStatus::Exited(code) if code != 0 => LineCategory::Error,
            _ => parser::classify_line(&output),
        };
        ProgressEvent::Line {
            output,
            duration,
            status,
            category,
            progress: None,
        }
    }

    pub fn is_line(&self) -> bool {
        matches!(self, ProgressEvent::Line { .. } | ProgressEvent::DownloadLine { .. })
    }
}

/// Asynchronous, order-preserving delivery of events. Must never block.
pub trait EventSink: Send + Sync {
    fn post(&self, event: ProgressEvent);
}

impl EventSink for mpsc::UnboundedSender<ProgressEvent> {
    fn post(&self, event: ProgressEvent) {
        if self.send(event).is_err() {
            trace!("Event receiver dropped, discarding event");
        }
    }
}

/// Convenience constructor for the usual channel-backed sink.
pub fn channel() -> (
    mpsc::UnboundedSender<ProgressEvent>,
    mpsc::UnboundedReceiver<ProgressEvent>,
) {
    mpsc::unbounded_channel()
}
