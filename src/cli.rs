use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{PasslineError, Result};

/// Extensions picked up when an input is a directory.
pub const MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "mov", "avi", "webm", "wmv", "flv", "m4v", "ts", "mpg", "mp3", "wav", "flac",
    "m4a", "aac", "ogg", "opus",
];

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print progress events as JSON lines instead of progress bars
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert media files with an ffmpeg parameter string
    Convert {
        /// Input files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory (defaults to each input's directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Parameters passed to ffmpeg between input and output
        #[arg(short, long, default_value = "-c:v libx264 -crf 23 -c:a aac", allow_hyphen_values = true)]
        params: String,

        /// Output file extension
        #[arg(short, long, default_value = "mp4")]
        ext: String,

        /// Run a rate-controlled two-pass video encode
        #[arg(long)]
        two_pass: bool,
    },

    /// Normalize loudness with a measuring pass and a correcting pass
    Loudnorm {
        /// Input files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory (defaults to each input's directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Parameters for the correcting pass
        #[arg(short, long, default_value = "-c:v copy", allow_hyphen_values = true)]
        params: String,

        /// Output file extension (defaults to the input's)
        #[arg(short, long)]
        ext: Option<String>,
    },

    /// Stabilize shaky video
    Stabilize {
        /// Input files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory (defaults to each input's directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Detection shakiness, 1 to 10
        #[arg(long, default_value_t = 5)]
        shakiness: u8,

        /// Frames used for smoothing camera motion
        #[arg(long, default_value_t = 10)]
        smoothing: u32,

        /// Parameters for the transform pass
        #[arg(short, long, default_value = "-c:a copy", allow_hyphen_values = true)]
        params: String,

        /// Output file extension (defaults to the input's)
        #[arg(short, long)]
        ext: Option<String>,
    },

    /// Extract still frames from video files
    Frames {
        /// Input files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory (defaults to each input's directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Frames per second to extract
        #[arg(long, default_value_t = 1.0)]
        fps: f32,
    },

    /// Join files into one without re-encoding
    Concat {
        /// Files to join, in order
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Joined output file
        #[arg(short, long)]
        output: PathBuf,

        /// Parameters passed to ffmpeg
        #[arg(short, long, default_value = "-c copy", allow_hyphen_values = true)]
        params: String,
    },

    /// Build a video from an image sequence
    Slideshow {
        /// Image sequence pattern, e.g. img_%04d.png
        pattern: String,

        /// Output video file
        #[arg(short, long)]
        output: PathBuf,

        /// Images per second
        #[arg(long, default_value_t = 1.0)]
        framerate: f32,

        /// Parameters passed to ffmpeg
        #[arg(short, long, default_value = "-c:v libx264", allow_hyphen_values = true)]
        params: String,
    },

    /// Download media from URLs with yt-dlp
    Download {
        /// URLs to download
        #[arg(required = true)]
        urls: Vec<String>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Write the default configuration file
    InitConfig {
        /// Where to write it
        #[arg(short, long, default_value = "passline.toml")]
        output: PathBuf,
    },
}

fn is_media(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| MEDIA_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Expands directories into the media files they contain, keeping file
/// arguments as given.
pub fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for input in inputs {
        if input.is_dir() {
            for entry in WalkDir::new(input)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if entry.file_type().is_file() && is_media(entry.path()) {
                    files.push(entry.path().to_path_buf());
                }
            }
        } else if input.exists() {
            files.push(input.clone());
        } else {
            return Err(PasslineError::FileNotFound(input.display().to_string()));
        }
    }

    Ok(files)
}

/// `<dir>/<stem><suffix>.<ext>`, where `dir` defaults to the source's own
/// directory and `ext` to the source's extension.
pub fn destination_for(
    source: &Path,
    output_dir: Option<&Path>,
    suffix: &str,
    ext: Option<&str>,
) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let ext = ext
        .map(str::to_string)
        .or_else(|| source.extension().map(|e| e.to_string_lossy().to_string()))
        .unwrap_or_else(|| "mp4".to_string());
    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| source.parent().map(Path::to_path_buf))
        .unwrap_or_default();

    dir.join(format!("{}{}.{}", stem, suffix, ext.trim_start_matches('.')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_args_parse_convert() {
        let args = Args::try_parse_from([
            "passline", "--json", "convert", "a.mkv", "b.mkv", "--params", "-c:v libx265", "--two-pass",
        ])
        .unwrap();

        assert!(args.json);
        match args.command {
            Commands::Convert { inputs, params, two_pass, ext, .. } => {
                assert_eq!(inputs, vec![PathBuf::from("a.mkv"), PathBuf::from("b.mkv")]);
                assert_eq!(params, "-c:v libx265");
                assert!(two_pass);
                assert_eq!(ext, "mp4");
            }
            _ => panic!("expected convert"),
        }
    }

    #[test]
    fn test_args_require_inputs() {
        assert!(Args::try_parse_from(["passline", "loudnorm"]).is_err());
        assert!(Args::try_parse_from(["passline", "download"]).is_err());
    }

    #[test]
    fn test_collect_inputs_expands_directories() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("b.mkv").touch().unwrap();
        temp.child("a.MP4").touch().unwrap();
        temp.child("notes.txt").touch().unwrap();
        temp.child("nested/c.wav").touch().unwrap();

        let files = collect_inputs(&[temp.path().to_path_buf()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.MP4", "b.mkv", "c.wav"]);
    }

    #[test]
    fn test_collect_inputs_missing_file() {
        let err = collect_inputs(&[PathBuf::from("/no/such/clip.mp4")]).unwrap_err();
        assert!(matches!(err, PasslineError::FileNotFound(_)));
    }

    #[test]
    fn test_destination_for() {
        let source = Path::new("/media/in/clip.mov");
        assert_eq!(
            destination_for(source, None, "_converted", Some("mp4")),
            PathBuf::from("/media/in/clip_converted.mp4")
        );
        assert_eq!(
            destination_for(source, Some(Path::new("/out")), "_loudnorm", None),
            PathBuf::from("/out/clip_loudnorm.mov")
        );
        assert_eq!(
            destination_for(source, None, "", Some(".mkv")),
            PathBuf::from("/media/in/clip.mkv")
        );
    }
}
