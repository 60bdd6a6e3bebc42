use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use tracing::debug;

use super::{BackendLog, DownloadBackend, DownloadHooks, DownloadProgress};
use crate::command::{CommandSpec, OutputStream};
use crate::config::DownloadConfig;
use crate::error::{PasslineError, Result};
use crate::runner::ProcessLauncher;

/// Makes yt-dlp print one machine-readable line per progress update.
pub const PROGRESS_TEMPLATE: &str = "download:[progress] %(progress._percent_str)s|%(progress._total_bytes_str)s|%(progress._speed_str)s|%(progress._eta_str)s";

/// Post-processors whose first line means the download itself is over.
const POST_PROCESSORS: &[&str] = &[
    "Merger",
    "ExtractAudio",
    "VideoConvertor",
    "VideoRemuxer",
    "FixupM3u8",
    "FixupM4a",
    "FixupStretched",
    "EmbedSubtitle",
    "EmbedThumbnail",
    "Metadata",
    "ThumbnailsConvertor",
    "MoveFiles",
];

static PROGRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[progress\]\s*([^|]*)\|([^|]*)\|([^|]*)\|(.*)$").expect("valid progress regex")
});
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[(\w+)\]\s*(.*)$").expect("valid tag regex"));
static DESTINATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:Destination:\s+(.+)|Merging formats into "(.+)")$"#)
        .expect("valid destination regex")
});

/// What one line of yt-dlp output means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YtDlpLine {
    Progress(DownloadProgress),
    /// `[download] Destination: ...`
    Destination(String),
    PostProcess { output: Option<String> },
    Error(String),
    Warning(String),
    Other,
}

pub fn parse_ytdlp_line(line: &str) -> YtDlpLine {
    let line = line.trim();

    if let Some(caps) = PROGRESS_RE.captures(line) {
        return YtDlpLine::Progress(DownloadProgress {
            percent: caps[1].trim().to_string(),
            total_bytes: caps[2].trim().to_string(),
            speed: caps[3].trim().to_string(),
            eta: caps[4].trim().to_string(),
        });
    }
    if let Some(message) = line.strip_prefix("ERROR:") {
        return YtDlpLine::Error(message.trim().to_string());
    }
    if let Some(message) = line.strip_prefix("WARNING:") {
        return YtDlpLine::Warning(message.trim().to_string());
    }

    let Some(caps) = TAG_RE.captures(line) else {
        return YtDlpLine::Other;
    };
    let destination = DESTINATION_RE.captures(&caps[2]).and_then(|d| {
        d.get(1)
            .or_else(|| d.get(2))
            .map(|m| m.as_str().trim().to_string())
    });

    match &caps[1] {
        "download" => destination.map_or(YtDlpLine::Other, YtDlpLine::Destination),
        tag if POST_PROCESSORS.contains(&tag) => YtDlpLine::PostProcess {
            output: destination,
        },
        _ => YtDlpLine::Other,
    }
}

/// Runs the `yt-dlp` executable for each URL.
pub struct YtDlpBackend {
    launcher: Arc<dyn ProcessLauncher>,
    binary: String,
    output_dir: PathBuf,
    options: DownloadConfig,
}

impl YtDlpBackend {
    pub fn new<S: Into<String>, P: Into<PathBuf>>(
        launcher: Arc<dyn ProcessLauncher>,
        binary: S,
        output_dir: P,
        options: DownloadConfig,
    ) -> Self {
        Self {
            launcher,
            binary: binary.into(),
            output_dir: output_dir.into(),
            options,
        }
    }

    pub fn command(&self, url: &str) -> CommandSpec {
        let template = self.output_dir.join(&self.options.output_template);
        let mut cmd = CommandSpec::new(&self.binary, format!("yt-dlp {}", url))
            .args(["--newline", "--no-colors", "--progress-template", PROGRESS_TEMPLATE])
            .arg("-o")
            .arg(template.to_string_lossy());
        if let Some(format) = &self.options.format {
            cmd = cmd.arg("-f").arg(format);
        }
        cmd.args(self.options.extra_args.iter().cloned())
            .arg(url)
            .stream(OutputStream::Both)
            .without_graceful_stop()
    }
}

#[async_trait]
impl DownloadBackend for YtDlpBackend {
    fn describe(&self, url: &str) -> String {
        self.command(url).command_line()
    }

    async fn download(&self, url: &str, hooks: &mut dyn DownloadHooks) -> Result<()> {
        let spec = self.command(url);
        let mut process = self.launcher.start(&spec).await?;
        let mut filename: Option<String> = None;
        let mut finished = false;

        while let Some(line) = process.next_line().await {
            match parse_ytdlp_line(&line) {
                YtDlpLine::Progress(progress) => hooks.progress(progress),
                YtDlpLine::Destination(path) => {
                    debug!("Downloading into {}", path);
                    filename = Some(path);
                    hooks.log(BackendLog::Debug, &line);
                }
                YtDlpLine::PostProcess { output } => {
                    if !finished {
                        finished = true;
                        hooks.finished(filename.as_deref());
                    }
                    if output.is_some() {
                        filename = output;
                    }
                    hooks.log(BackendLog::Debug, &line);
                }
                YtDlpLine::Error(_) => hooks.log(BackendLog::Error, &line),
                YtDlpLine::Warning(_) => hooks.log(BackendLog::Warning, &line),
                YtDlpLine::Other => hooks.log(BackendLog::Debug, &line),
            }
        }

        let exit = process.wait().await?;
        if !exit.success() {
            return Err(PasslineError::PassFailure {
                description: spec.description,
                code: exit.code(),
            });
        }
        if !finished {
            hooks.finished(filename.as_deref());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{PassExit, RunningProcess};
    use std::collections::VecDeque;
    use std::time::Duration;

    #[test]
    fn test_parse_progress_line() {
        let line = "[progress]  50.0%|  10.00MiB|   1.00MiB/s|00:05";
        assert_eq!(
            parse_ytdlp_line(line),
            YtDlpLine::Progress(DownloadProgress {
                percent: "50.0%".to_string(),
                total_bytes: "10.00MiB".to_string(),
                speed: "1.00MiB/s".to_string(),
                eta: "00:05".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_tagged_lines() {
        assert_eq!(
            parse_ytdlp_line("[download] Destination: out/clip.f137.mp4"),
            YtDlpLine::Destination("out/clip.f137.mp4".to_string())
        );
        assert_eq!(
            parse_ytdlp_line(r#"[Merger] Merging formats into "out/clip.mp4""#),
            YtDlpLine::PostProcess {
                output: Some("out/clip.mp4".to_string())
            }
        );
        assert_eq!(
            parse_ytdlp_line("[Metadata] Adding metadata to \"out/clip.mp4\""),
            YtDlpLine::PostProcess { output: None }
        );
        assert_eq!(parse_ytdlp_line("[youtube] abc: Downloading webpage"), YtDlpLine::Other);
        assert_eq!(
            parse_ytdlp_line("ERROR: [generic] Unsupported URL"),
            YtDlpLine::Error("[generic] Unsupported URL".to_string())
        );
        assert_eq!(
            parse_ytdlp_line("WARNING: falling back"),
            YtDlpLine::Warning("falling back".to_string())
        );
    }

    #[test]
    fn test_command_line() {
        let options = DownloadConfig {
            format: Some("bv*+ba".to_string()),
            extra_args: vec!["--embed-metadata".to_string()],
            ..Default::default()
        };
        let backend = YtDlpBackend::new(Arc::new(ScriptLauncher::new(vec![], 0)), "yt-dlp", "out", options);
        let spec = backend.command("https://a.example/v");

        assert_eq!(spec.stream, OutputStream::Both);
        assert!(!spec.graceful_stop);
        assert!(spec.args.starts_with(&["--newline".to_string(), "--no-colors".to_string()]));
        assert!(spec.args.contains(&PROGRESS_TEMPLATE.to_string()));
        assert!(spec
            .command_line()
            .ends_with("-f bv*+ba --embed-metadata https://a.example/v"));
    }

    struct ScriptLauncher {
        lines: Vec<String>,
        exit: i32,
    }

    impl ScriptLauncher {
        fn new(lines: Vec<&str>, exit: i32) -> Self {
            Self {
                lines: lines.into_iter().map(String::from).collect(),
                exit,
            }
        }
    }

    struct ScriptProcess {
        lines: VecDeque<String>,
        exit: PassExit,
    }

    #[async_trait]
    impl ProcessLauncher for ScriptLauncher {
        async fn start(&self, _spec: &CommandSpec) -> Result<Box<dyn RunningProcess>> {
            Ok(Box::new(ScriptProcess {
                lines: self.lines.iter().cloned().collect(),
                exit: PassExit(self.exit),
            }))
        }
    }

    #[async_trait]
    impl RunningProcess for ScriptProcess {
        async fn next_line(&mut self) -> Option<String> {
            self.lines.pop_front()
        }

        async fn request_graceful_stop(&mut self, _grace: Duration) -> Result<PassExit> {
            Ok(self.exit)
        }

        async fn wait(&mut self) -> Result<PassExit> {
            Ok(self.exit)
        }

        async fn kill_now(&mut self) -> Result<PassExit> {
            Ok(PassExit::SIGNALLED)
        }
    }

    #[derive(Default)]
    struct Recorder {
        logs: Vec<(BackendLog, String)>,
        progress: Vec<DownloadProgress>,
        finished: Vec<Option<String>>,
    }

    impl DownloadHooks for Recorder {
        fn log(&mut self, level: BackendLog, message: &str) {
            self.logs.push((level, message.to_string()));
        }

        fn progress(&mut self, progress: DownloadProgress) {
            self.progress.push(progress);
        }

        fn finished(&mut self, filename: Option<&str>) {
            self.finished.push(filename.map(str::to_string));
        }
    }

    #[tokio::test]
    async fn test_download_drives_hooks() {
        let launcher = ScriptLauncher::new(
            vec![
                "[youtube] abc: Downloading webpage",
                "[download] Destination: out/clip.f137.mp4",
                "[progress]  50.0%|10.00MiB|1.00MiB/s|00:05",
                "[progress] 100.0%|10.00MiB|1.00MiB/s|00:00",
                r#"[Merger] Merging formats into "out/clip.mp4""#,
                "[Metadata] Adding metadata",
            ],
            0,
        );
        let backend = YtDlpBackend::new(Arc::new(launcher), "yt-dlp", "out", DownloadConfig::default());
        let mut hooks = Recorder::default();

        backend.download("https://a.example/v", &mut hooks).await.unwrap();

        assert_eq!(hooks.progress.len(), 2);
        assert_eq!(hooks.progress[0].percent, "50.0%");
        assert_eq!(hooks.finished, vec![Some("out/clip.f137.mp4".to_string())]);
        assert_eq!(hooks.logs.len(), 4);
    }

    #[tokio::test]
    async fn test_download_without_post_processing_finishes_once() {
        let launcher = ScriptLauncher::new(vec!["[download] Destination: out/a.webm"], 0);
        let backend = YtDlpBackend::new(Arc::new(launcher), "yt-dlp", "out", DownloadConfig::default());
        let mut hooks = Recorder::default();

        backend.download("https://a.example/a", &mut hooks).await.unwrap();
        assert_eq!(hooks.finished, vec![Some("out/a.webm".to_string())]);
    }

    #[tokio::test]
    async fn test_download_without_destination_reports_no_file() {
        let launcher = ScriptLauncher::new(vec!["[download] https://a.example/b has already been downloaded"], 0);
        let backend = YtDlpBackend::new(Arc::new(launcher), "yt-dlp", "out", DownloadConfig::default());
        let mut hooks = Recorder::default();

        backend.download("https://a.example/b", &mut hooks).await.unwrap();
        assert_eq!(hooks.finished, vec![None]);
    }

    #[tokio::test]
    async fn test_download_failure_is_error() {
        let launcher = ScriptLauncher::new(vec!["ERROR: [generic] Unsupported URL"], 1);
        let backend = YtDlpBackend::new(Arc::new(launcher), "yt-dlp", "out", DownloadConfig::default());
        let mut hooks = Recorder::default();

        let err = backend.download("https://a.example/x", &mut hooks).await.unwrap_err();
        assert!(matches!(err, PasslineError::PassFailure { code: 1, .. }));
        assert_eq!(hooks.logs[0].0, BackendLog::Error);
        assert!(hooks.finished.is_empty());
    }
}
