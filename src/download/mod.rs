// URL downloads through a pluggable backend, reported with the same event
// vocabulary as the media sequencer.
//
// - DownloadBackend / DownloadHooks: the callback interface a backend drives
// - DownloadAdapter: walks a URL list and turns hook calls into events
// - ytdlp: backend running the yt-dlp command line

pub mod ytdlp;

pub use ytdlp::*;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::event::{EventSink, ItemEnd, LineStatus, ProgressEvent};
use crate::logfile::{self, LogWriter};
use crate::parser::{self, LineCategory};
use crate::sequencer::{BatchReport, CancelFlag, JobHandle};

/// Progress exactly as the backend formats it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadProgress {
    pub percent: String,
    pub total_bytes: String,
    pub speed: String,
    pub eta: String,
}

/// Severity of a backend log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendLog {
    Debug,
    Warning,
    Error,
}

/// Callbacks a backend invokes while downloading one URL.
pub trait DownloadHooks: Send {
    fn log(&mut self, level: BackendLog, message: &str);

    fn progress(&mut self, progress: DownloadProgress);

    /// The download finished and post-processing starts. `filename` is the
    /// output file when the backend knows it.
    fn finished(&mut self, filename: Option<&str>);
}

#[async_trait]
pub trait DownloadBackend: Send + Sync {
    /// Printable form of what will be run for `url`, for the audit log.
    fn describe(&self, url: &str) -> String;

    /// Downloads one URL. Cancellation is not supported mid-download.
    async fn download(&self, url: &str, hooks: &mut dyn DownloadHooks) -> Result<()>;
}

struct EventHooks<'a> {
    sink: &'a dyn EventSink,
    label: &'a str,
    url: &'a str,
    filename: Option<String>,
}

impl DownloadHooks for EventHooks<'_> {
    fn log(&mut self, level: BackendLog, message: &str) {
        let category = match level {
            BackendLog::Debug => parser::classify_line(message),
            BackendLog::Warning => LineCategory::Warning,
            BackendLog::Error => LineCategory::Error,
        };
        self.sink.post(ProgressEvent::Line {
            output: message.to_string(),
            duration: None,
            status: LineStatus::Running,
            category,
            progress: None,
        });
    }

    fn progress(&mut self, progress: DownloadProgress) {
        self.sink.post(ProgressEvent::DownloadLine {
            percent: progress.percent,
            total_bytes: progress.total_bytes,
            speed: progress.speed,
            eta: progress.eta,
        });
    }

    fn finished(&mut self, filename: Option<&str>) {
        self.filename = filename.map(str::to_string);
        self.sink.post(ProgressEvent::Count {
            count: self.label.to_string(),
            source: self.url.to_string(),
            destination: filename.unwrap_or_default().to_string(),
            duration: None,
            end: ItemEnd::Continue,
        });
    }
}

/// Downloads URLs one at a time; one failed URL never stops the rest.
pub struct DownloadAdapter {
    backend: Arc<dyn DownloadBackend>,
    sink: Arc<dyn EventSink>,
    log: Arc<dyn LogWriter>,
}

impl DownloadAdapter {
    pub fn new(
        backend: Arc<dyn DownloadBackend>,
        sink: Arc<dyn EventSink>,
        log: Arc<dyn LogWriter>,
    ) -> Self {
        Self { backend, sink, log }
    }

    pub fn spawn(self, urls: Vec<String>, cancel: CancelFlag) -> JobHandle {
        let flag = cancel.clone();
        let handle = tokio::spawn(async move { self.run(&urls, &flag).await });
        JobHandle::new(cancel, handle)
    }

    /// The cancel flag is only looked at between URLs.
    pub async fn run(&self, urls: &[String], cancel: &CancelFlag) -> BatchReport {
        let span = info_span!("download", id = %Uuid::new_v4());
        self.run_urls(urls, cancel).instrument(span).await
    }

    async fn run_urls(&self, urls: &[String], cancel: &CancelFlag) -> BatchReport {
        let total = urls.len();
        let mut report = BatchReport {
            total,
            ..Default::default()
        };

        for (index, url) in urls.iter().enumerate() {
            if cancel.is_requested() {
                report.interrupted = true;
                break;
            }

            let label = format!("URL {}/{}", index + 1, total);
            self.post_count(&label, url, "", ItemEnd::Started);
            self.append_log(&logfile::command_block(&label, &self.backend.describe(url)));

            let mut hooks = EventHooks {
                sink: self.sink.as_ref(),
                label: &label,
                url,
                filename: None,
            };
            let result = self.backend.download(url, &mut hooks).await;
            let filename = hooks.filename.take();

            match result {
                Ok(()) => {
                    let destination = filename.unwrap_or_default();
                    if destination.is_empty() {
                        info!("{} done, no output file reported", label);
                    } else {
                        info!("{} done: {}", label, destination);
                        report.completed.push(PathBuf::from(&destination));
                    }
                    self.post_count(&label, url, &destination, ItemEnd::Done);
                }
                Err(e) => {
                    warn!("{} failed: {}", url, e);
                    let reason = format!("{}: {}", url, e);
                    self.sink
                        .post(ProgressEvent::status_line(&reason, None, LineStatus::Failed));
                    self.append_log(&logfile::error_block(&reason));
                    self.post_count(&label, url, "", ItemEnd::Error);
                    report.failed.push(PathBuf::from(url));
                }
            }
        }

        self.sink.post(ProgressEvent::End {
            completed: Some(report.completed.clone()),
        });
        info!("Downloads finished: {}", report.summary());
        report
    }

    fn post_count(&self, label: &str, url: &str, destination: &str, end: ItemEnd) {
        self.sink.post(ProgressEvent::Count {
            count: label.to_string(),
            source: url.to_string(),
            destination: destination.to_string(),
            duration: None,
            end,
        });
    }

    fn append_log(&self, text: &str) {
        if let Err(e) = self.log.append(text) {
            warn!("Could not write audit log: {}", e);
        }
    }
}
