use crate::command::CommandSpec;
use crate::error::Result;
use crate::parser::LoudnessStatistics;
use crate::sequencer::{BatchItem, Pass, PassPlan};

use super::{ffmpeg_command, remove_scratch, sidecar_path};

/// vid.stab stabilization: detect motion into a transforms file, then apply it.
#[derive(Debug, Clone)]
pub struct Stabilize {
    ffmpeg: String,
    shakiness: u8,
    smoothing: u32,
    params: String,
}

impl Stabilize {
    pub fn new<S: Into<String>>(ffmpeg: S, shakiness: u8, smoothing: u32, params: S) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            shakiness: shakiness.clamp(1, 10),
            smoothing,
            params: params.into(),
        }
    }

    fn transforms(item: &BatchItem) -> String {
        sidecar_path(&item.destination, ".trf")
            .to_string_lossy()
            .to_string()
    }
}

impl PassPlan for Stabilize {
    fn name(&self) -> &str {
        "stabilize"
    }

    fn pass_count(&self, _item: &BatchItem) -> usize {
        2
    }

    fn build_pass(
        &self,
        item: &BatchItem,
        pass: Pass,
        _captured: Option<&LoudnessStatistics>,
    ) -> Result<CommandSpec> {
        let description = format!("stabilize {} pass {}", item.source.display(), pass.number());
        let cmd = ffmpeg_command(&self.ffmpeg, description, item).input(&item.source);
        let transforms = Self::transforms(item);

        Ok(match pass {
            Pass::First => cmd
                .video_filter(format!(
                    "vidstabdetect=shakiness={}:result={}",
                    self.shakiness, transforms
                ))
                .discard(),
            Pass::Second => cmd
                .video_filter(format!(
                    "vidstabtransform=smoothing={}:input={}",
                    self.smoothing, transforms
                ))
                .params(&self.params)
                .args(item.extra.iter().cloned())
                .output(&item.destination),
        })
    }

    fn after_success(&self, item: &BatchItem) -> Result<()> {
        remove_scratch(std::path::Path::new(&Self::transforms(item)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::OutputSink;

    #[test]
    fn test_detect_then_transform() {
        let plan = Stabilize::new("ffmpeg", 12, 15, "-c:a copy");
        let item = BatchItem::new("shaky.mp4", "out/steady.mp4");

        let first = plan.build_pass(&item, Pass::First, None).unwrap();
        assert_eq!(first.sink, OutputSink::Discard);
        assert!(first.args.contains(&"vidstabdetect=shakiness=10:result=out/steady.trf".to_string()));

        let second = plan.build_pass(&item, Pass::Second, None).unwrap();
        assert!(second.args.contains(&"vidstabtransform=smoothing=15:input=out/steady.trf".to_string()));
        assert!(second.command_line().ends_with("-c:a copy out/steady.mp4"));
    }

    #[test]
    fn test_transforms_file_removed_after_success() {
        let dir = tempfile::tempdir().unwrap();
        let item = BatchItem::new("shaky.mp4", dir.path().join("steady.mp4"));
        let trf = dir.path().join("steady.trf");
        std::fs::write(&trf, "transforms").unwrap();

        Stabilize::new("ffmpeg", 5, 10, "").after_success(&item).unwrap();
        assert!(!trf.exists());
    }
}
