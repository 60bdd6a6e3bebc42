use serde::Serialize;
use std::path::{Path, PathBuf};

/// Platform discard target for passes that produce no deliverable.
#[cfg(windows)]
pub const NULL_DEVICE: &str = "NUL";
#[cfg(not(windows))]
pub const NULL_DEVICE: &str = "/dev/null";

/// Where the primary output of a pass lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum OutputSink {
    File(PathBuf),
    Discard,
}

impl OutputSink {
    pub fn as_arg(&self) -> String {
        match self {
            OutputSink::File(path) => path.to_string_lossy().to_string(),
            OutputSink::Discard => NULL_DEVICE.to_string(),
        }
    }
}

/// Which pipe of the child carries the lines worth streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputStream {
    #[default]
    Stderr,
    Stdout,
    /// Both pipes, interleaved in arrival order.
    Both,
}

/// One external process invocation.
///
/// Built fresh for every pass of every item and never changed afterwards.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub executable: String,
    pub args: Vec<String>,
    pub description: String,
    /// Progress denominator in milliseconds, `None` when indeterminate.
    pub expected_duration: Option<u64>,
    /// Scan every line for loudness statistics.
    pub capture_stats: bool,
    pub sink: OutputSink,
    /// The tool quits cleanly when it reads the stop token on stdin.
    pub graceful_stop: bool,
    pub stream: OutputStream,
}

impl CommandSpec {
    pub fn new<S1: Into<String>, S2: Into<String>>(executable: S1, description: S2) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            description: description.into(),
            expected_duration: None,
            capture_stats: false,
            sink: OutputSink::Discard,
            graceful_stop: true,
            stream: OutputStream::Stderr,
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Appends an opaque, whitespace separated parameter string.
    pub fn params(self, params: &str) -> Self {
        self.args(params.split_whitespace())
    }

    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    pub fn video_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-vf").arg(filter)
    }

    pub fn audio_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-af").arg(filter)
    }

    /// Final output argument: a real file.
    pub fn output<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        self.args.push(path.to_string_lossy().to_string());
        self.sink = OutputSink::File(path);
        self
    }

    /// Final output argument: the null muxer writing to the null device.
    pub fn discard(mut self) -> Self {
        self.args.extend(["-f".to_string(), "null".to_string()]);
        self.args.push(OutputSink::Discard.as_arg());
        self.sink = OutputSink::Discard;
        self
    }

    pub fn expected_duration(mut self, millis: Option<u64>) -> Self {
        self.expected_duration = millis.filter(|ms| *ms > 0);
        self
    }

    pub fn capture_stats(mut self) -> Self {
        self.capture_stats = true;
        self
    }

    pub fn without_graceful_stop(mut self) -> Self {
        self.graceful_stop = false;
        self
    }

    pub fn stream(mut self, stream: OutputStream) -> Self {
        self.stream = stream;
        self
    }

    /// Printable command line, arguments containing spaces are quoted.
    pub fn command_line(&self) -> String {
        std::iter::once(&self.executable)
            .chain(self.args.iter())
            .map(|part| {
                if part.is_empty() || part.contains(char::is_whitespace) {
                    format!("\"{}\"", part)
                } else {
                    part.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_output_sets_sink() {
        let spec = CommandSpec::new("ffmpeg", "Encode")
            .overwrite()
            .input("in.mkv")
            .params("-c:v libx264  -crf 23")
            .output("out dir/out.mp4");

        assert_eq!(
            spec.args,
            vec!["-y", "-i", "in.mkv", "-c:v", "libx264", "-crf", "23", "out dir/out.mp4"]
        );
        assert_eq!(spec.sink, OutputSink::File(PathBuf::from("out dir/out.mp4")));
        assert_eq!(
            spec.command_line(),
            "ffmpeg -y -i in.mkv -c:v libx264 -crf 23 \"out dir/out.mp4\""
        );
    }

    #[test]
    fn test_discard_pass() {
        let spec = CommandSpec::new("ffmpeg", "Analyse")
            .input("in.wav")
            .audio_filter("loudnorm=print_format=summary")
            .discard()
            .capture_stats();

        assert_eq!(spec.sink, OutputSink::Discard);
        assert!(spec.capture_stats);
        assert_eq!(spec.args.last().map(String::as_str), Some(NULL_DEVICE));
        assert!(spec.args.windows(2).any(|w| w[0] == "-f" && w[1] == "null"));
    }

    #[test]
    fn test_zero_duration_is_indeterminate() {
        let spec = CommandSpec::new("ffmpeg", "x").expected_duration(Some(0));
        assert_eq!(spec.expected_duration, None);
        let spec = CommandSpec::new("ffmpeg", "x").expected_duration(Some(1500));
        assert_eq!(spec.expected_duration, Some(1500));
    }
}
