use thiserror::Error;

/// Hint attached to every launch failure surfaced to the user.
pub const LAUNCH_HINT: &str = "is the tool installed?";

#[derive(Error, Debug)]
pub enum PasslineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to launch {program}: {source} ({hint})", hint = LAUNCH_HINT)]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{description} exited with code {code}")]
    PassFailure { description: String, code: i32 },

    #[error("Loudness capture incomplete, missing: {}", .missing.join(", "))]
    CaptureIncomplete { missing: Vec<String> },

    #[error("Cancelled by user")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Probe error: {0}")]
    Probe(String),

    #[error("Worker task failed: {0}")]
    Worker(String),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

impl PasslineError {
    /// True when the external tool could not be started at all.
    pub fn is_launch(&self) -> bool {
        matches!(self, PasslineError::Launch { .. })
    }
}

pub type Result<T> = std::result::Result<T, PasslineError>;
