//! Append-only audit trail of every command issued and every failure seen
//! during a batch run.

use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use crate::error::{PasslineError, Result};

#[cfg(test)]
use mockall::automock;

#[cfg_attr(test, automock)]
pub trait LogWriter: Send + Sync {
    fn append(&self, text: &str) -> Result<()>;
}

/// `"<summary>\n\n[COMMAND]:\n<command line>\n\n"`
pub fn command_block(summary: &str, command_line: &str) -> String {
    format!("{}\n\n[COMMAND]:\n{}\n\n", summary, command_line)
}

/// `"...<error text>\n\n"`
pub fn error_block(text: &str) -> String {
    format!("...{}\n\n", text)
}

/// UTF-8 text file, opened in append mode for every entry.
pub struct FileLogWriter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileLogWriter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    /// One file per batch run: `<dir>/<prefix>_<YYYYmmdd_HHMMSS>.log`.
    pub fn for_run<P: AsRef<Path>>(dir: P, prefix: &str) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        Ok(Self::new(dir.join(format!("{}_{}.log", prefix, stamp))))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogWriter for FileLogWriter {
    fn append(&self, text: &str) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| PasslineError::Config("Log writer lock poisoned".to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(text.as_bytes())?;
        debug!("Appended {} bytes to {}", text.len(), self.path.display());
        Ok(())
    }
}

/// Discards everything; for callers that do not want an audit file.
pub struct NullLogWriter;

impl LogWriter for NullLogWriter {
    fn append(&self, _text: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_block_formats() {
        assert_eq!(
            command_block("File 1/2", "ffmpeg -i a b"),
            "File 1/2\n\n[COMMAND]:\nffmpeg -i a b\n\n"
        );
        assert_eq!(error_block("exit code 1"), "...exit code 1\n\n");
    }

    #[test]
    fn test_file_writer_appends() {
        let temp = assert_fs::TempDir::new().unwrap();
        let log = temp.child("run.log");
        let writer = FileLogWriter::new(log.path());

        writer.append(&command_block("one", "cmd 1")).unwrap();
        writer.append(&error_block("boom")).unwrap();

        log.assert("one\n\n[COMMAND]:\ncmd 1\n\n...boom\n\n");
    }

    #[test]
    fn test_for_run_names_file_by_prefix() {
        let temp = tempfile::tempdir().unwrap();
        let writer = FileLogWriter::for_run(temp.path().join("logs"), "loudnorm").unwrap();
        let name = writer.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("loudnorm_"));
        assert!(name.ends_with(".log"));
        assert!(temp.path().join("logs").is_dir());
    }
}
