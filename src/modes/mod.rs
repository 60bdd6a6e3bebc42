// Per-mode pass plans for the sequencer.
//
// Each mode only decides how many passes an item needs and how to build each
// pass's command; running them is the sequencer's job.
//
// - encode: single pass encodes, frame extraction, two-pass video encoding
// - loudness: two-pass EBU R128 normalization (pass 1 captures statistics)
// - stabilize: vidstab detect + transform
// - concat: single-invocation modes (concat demuxer, image slideshow)

pub mod concat;
pub mod encode;
pub mod loudness;
pub mod stabilize;

pub use concat::*;
pub use encode::*;
pub use loudness::*;
pub use stabilize::*;

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::command::CommandSpec;
use crate::sequencer::BatchItem;

/// Base ffmpeg invocation shared by every mode.
pub(crate) fn ffmpeg_command(binary: &str, description: String, item: &BatchItem) -> CommandSpec {
    CommandSpec::new(binary, description)
        .arg("-hide_banner")
        .overwrite()
        .expected_duration(item.duration)
}

/// `<dir>/<stem><suffix>` next to `destination`.
pub fn sidecar_path(destination: &Path, suffix: &str) -> PathBuf {
    let stem = destination
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    destination.with_file_name(format!("{}{}", stem, suffix))
}

/// Removes a scratch file, ignoring files that are already gone.
pub(crate) fn remove_scratch(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path(Path::new("/out/clip.mp4"), ".trf"),
            PathBuf::from("/out/clip.trf")
        );
        assert_eq!(
            sidecar_path(Path::new("clip.final.mkv"), "_passlog"),
            PathBuf::from("clip.final_passlog")
        );
    }

    #[test]
    fn test_remove_scratch_ignores_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.log");
        remove_scratch(&path).unwrap();
        std::fs::write(&path, "x").unwrap();
        remove_scratch(&path).unwrap();
        assert!(!path.exists());
    }
}
