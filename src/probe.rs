use std::path::Path;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{PasslineError, Result};

/// Media duration lookups through ffprobe.
#[derive(Debug, Clone)]
pub struct DurationProbe {
    ffprobe: String,
}

impl DurationProbe {
    pub fn new<S: Into<String>>(ffprobe: S) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }

    /// Container duration in milliseconds.
    pub async fn duration_ms<P: AsRef<Path>>(&self, media: P) -> Result<u64> {
        let media = media.as_ref();
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(media)
            .output()
            .await
            .map_err(|source| PasslineError::Launch {
                program: self.ffprobe.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PasslineError::Probe(format!(
                "{}: {}",
                media.display(),
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_seconds(&stdout).ok_or_else(|| {
            PasslineError::Probe(format!("{}: no duration in '{}'", media.display(), stdout.trim()))
        })
    }

    /// Like [`DurationProbe::duration_ms`], degrading to indeterminate.
    pub async fn duration_or_none<P: AsRef<Path>>(&self, media: P) -> Option<u64> {
        match self.duration_ms(&media).await {
            Ok(ms) => {
                debug!("{} lasts {} ms", media.as_ref().display(), ms);
                Some(ms)
            }
            Err(e) => {
                warn!("Duration unknown, progress will be indeterminate: {}", e);
                None
            }
        }
    }
}

/// Parses ffprobe's `12.345000` style output into milliseconds.
fn parse_seconds(raw: &str) -> Option<u64> {
    let secs: f64 = raw.lines().next()?.trim().parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some((secs * 1000.0).round() as u64)
    } else {
        None
    }
}
