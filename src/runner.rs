//! Lifecycle of one external process: launch, stream its output line by
//! line, stop it gracefully or forcefully, and read its exit code.

use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::command::{CommandSpec, OutputStream};
use crate::error::{PasslineError, Result};

/// Written to stdin to ask the media tool to finish its output and quit.
pub const STOP_TOKEN: &[u8] = b"q";

/// Lines buffered between the pipe readers and the consumer.
const LINE_QUEUE: usize = 1;

/// Exit code of a finished pass. Signal terminations map to `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassExit(pub i32);

impl PassExit {
    pub const SIGNALLED: PassExit = PassExit(-1);

    pub fn success(self) -> bool {
        self.0 == 0
    }

    pub fn code(self) -> i32 {
        self.0
    }
}

impl From<ExitStatus> for PassExit {
    fn from(status: ExitStatus) -> Self {
        status.code().map(PassExit).unwrap_or(PassExit::SIGNALLED)
    }
}

/// Starts processes. The seam the sequencer is tested through.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Fails with [`PasslineError::Launch`] when the executable is missing or
    /// the OS refuses to spawn it.
    async fn start(&self, spec: &CommandSpec) -> Result<Box<dyn RunningProcess>>;
}

/// A live process owned by exactly one caller.
#[async_trait]
pub trait RunningProcess: Send {
    /// Next raw output line, `None` once every streamed pipe is closed.
    async fn next_line(&mut self) -> Option<String>;

    /// Sends the stop token, then waits up to `grace` before killing.
    /// Safe to call more than once.
    async fn request_graceful_stop(&mut self, grace: Duration) -> Result<PassExit>;

    /// Blocks until exit. Later calls return the cached code.
    async fn wait(&mut self) -> Result<PassExit>;

    /// Immediate forced termination.
    async fn kill_now(&mut self) -> Result<PassExit>;
}

/// Reads lines terminated by `\n`, `\r` or `\r\n`.
///
/// The media tool redraws its status line with bare carriage returns, so a
/// plain `lines()` would hold every progress update until the pass ends.
/// Partial lines are kept in `pending`, which makes `next_line` cancel safe.
pub struct LineReader<R> {
    reader: R,
    pending: Vec<u8>,
    done: bool,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
            done: false,
        }
    }

    pub async fn next_line(&mut self) -> Option<String> {
        while !self.done {
            let buf = match self.reader.fill_buf().await {
                Ok(buf) => buf,
                Err(e) => {
                    debug!("Output pipe read failed: {}", e);
                    self.done = true;
                    break;
                }
            };

            if buf.is_empty() {
                self.done = true;
                break;
            }

            match buf.iter().position(|b| *b == b'\n' || *b == b'\r') {
                Some(pos) => {
                    self.pending.extend_from_slice(&buf[..pos]);
                    self.reader.consume(pos + 1);
                    if self.pending.is_empty() {
                        // second half of a CRLF, or a blank line
                        continue;
                    }
                    return Some(self.take_pending());
                }
                None => {
                    let len = buf.len();
                    self.pending.extend_from_slice(buf);
                    self.reader.consume(len);
                }
            }
        }

        if self.pending.is_empty() {
            None
        } else {
            Some(self.take_pending())
        }
    }

    fn take_pending(&mut self) -> String {
        let bytes = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

async fn pump<R: AsyncRead + Unpin>(reader: R, tx: mpsc::Sender<String>) {
    let mut lines = LineReader::new(BufReader::new(reader));
    while let Some(line) = lines.next_line().await {
        if tx.send(line).await.is_err() {
            break;
        }
    }
}

/// Launches real processes through `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct TokioLauncher;

impl TokioLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessLauncher for TokioLauncher {
    async fn start(&self, spec: &CommandSpec) -> Result<Box<dyn RunningProcess>> {
        debug!("Spawning {}", spec.command_line());

        let mut cmd = Command::new(&spec.executable);
        cmd.args(&spec.args)
            .stdin(Stdio::piped())
            .kill_on_drop(true);

        match spec.stream {
            OutputStream::Stderr => cmd.stdout(Stdio::null()).stderr(Stdio::piped()),
            OutputStream::Stdout => cmd.stdout(Stdio::piped()).stderr(Stdio::null()),
            OutputStream::Both => cmd.stdout(Stdio::piped()).stderr(Stdio::piped()),
        };

        let mut child = cmd.spawn().map_err(|source| PasslineError::Launch {
            program: spec.executable.clone(),
            source,
        })?;

        let (tx, rx) = mpsc::channel(LINE_QUEUE);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump(stderr, tx.clone()));
        }
        drop(tx);

        info!("Started {} (pid {:?})", spec.description, child.id());

        Ok(Box::new(ChildProcess {
            stdin: child.stdin.take(),
            child,
            lines: rx,
            exit: None,
            stop_sent: false,
        }))
    }
}

pub struct ChildProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    lines: mpsc::Receiver<String>,
    exit: Option<PassExit>,
    stop_sent: bool,
}

impl ChildProcess {
    fn record(&mut self, status: ExitStatus) -> PassExit {
        let exit = PassExit::from(status);
        self.exit = Some(exit);
        exit
    }
}

#[async_trait]
impl RunningProcess for ChildProcess {
    async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    async fn request_graceful_stop(&mut self, grace: Duration) -> Result<PassExit> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }

        if !self.stop_sent {
            self.stop_sent = true;
            if let Some(mut stdin) = self.stdin.take() {
                if let Err(e) = stdin.write_all(STOP_TOKEN).await {
                    debug!("Could not send stop token: {}", e);
                }
                let _ = stdin.flush().await;
            }
        }

        // Keep draining output while waiting, a full pipe would stall the tool.
        let lines = &mut self.lines;
        let child = &mut self.child;
        let finished = tokio::time::timeout(grace, async {
            while lines.recv().await.is_some() {}
            child.wait().await
        })
        .await;

        match finished {
            Ok(status) => Ok(self.record(status?)),
            Err(_) => {
                warn!("Process ignored stop token for {:?}, killing", grace);
                self.kill_now().await
            }
        }
    }

    async fn wait(&mut self) -> Result<PassExit> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }
        self.stdin.take();
        let status = self.child.wait().await?;
        Ok(self.record(status))
    }

    async fn kill_now(&mut self) -> Result<PassExit> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }
        if let Err(e) = self.child.start_kill() {
            debug!("Kill request failed, process may have exited: {}", e);
        }
        let status = self.child.wait().await?;
        Ok(self.record(status))
    }
}
