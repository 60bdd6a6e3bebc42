use crate::command::CommandSpec;
use crate::error::Result;
use crate::parser::LoudnessStatistics;
use crate::sequencer::{BatchItem, Pass, PassPlan};

use super::{ffmpeg_command, remove_scratch, sidecar_path};

/// One invocation per item: `ffmpeg -i <source> <params> <extra> <destination>`.
#[derive(Debug, Clone)]
pub struct OnePass {
    ffmpeg: String,
    name: String,
    params: String,
}

impl OnePass {
    pub fn new<S: Into<String>>(ffmpeg: S, params: S) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            name: "convert".to_string(),
            params: params.into(),
        }
    }

    /// Frame extraction; the destination is an image sequence pattern.
    pub fn extract_frames<S: Into<String>>(ffmpeg: S, fps: f32) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            name: "frames".to_string(),
            params: format!("-vf fps={}", fps),
        }
    }
}

impl PassPlan for OnePass {
    fn name(&self) -> &str {
        &self.name
    }

    fn pass_count(&self, _item: &BatchItem) -> usize {
        1
    }

    fn build_pass(
        &self,
        item: &BatchItem,
        _pass: Pass,
        _captured: Option<&LoudnessStatistics>,
    ) -> Result<CommandSpec> {
        Ok(ffmpeg_command(&self.ffmpeg, format!("{} {}", self.name, item.source.display()), item)
            .input(&item.source)
            .params(&self.params)
            .args(item.extra.iter().cloned())
            .output(&item.destination))
    }
}

/// Two-pass rate-controlled video encode. Pass 1 analyses into a pass log and
/// discards its output; pass 2 writes the deliverable.
#[derive(Debug, Clone)]
pub struct TwoPassEncode {
    ffmpeg: String,
    params: String,
}

impl TwoPassEncode {
    pub fn new<S: Into<String>>(ffmpeg: S, params: S) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            params: params.into(),
        }
    }

    /// Stream copies have nothing to analyse, so they run as a single pass.
    fn is_stream_copy(&self, item: &BatchItem) -> bool {
        let tokens: Vec<&str> = self
            .params
            .split_whitespace()
            .chain(item.extra.iter().map(String::as_str))
            .collect();
        tokens
            .windows(2)
            .any(|pair| matches!(pair[0], "-c:v" | "-vcodec" | "-c") && pair[1] == "copy")
    }

    fn passlog(item: &BatchItem) -> String {
        sidecar_path(&item.destination, "_passlog")
            .to_string_lossy()
            .to_string()
    }
}

impl PassPlan for TwoPassEncode {
    fn name(&self) -> &str {
        "twopass"
    }

    fn pass_count(&self, item: &BatchItem) -> usize {
        if self.is_stream_copy(item) { 1 } else { 2 }
    }

    fn build_pass(
        &self,
        item: &BatchItem,
        pass: Pass,
        _captured: Option<&LoudnessStatistics>,
    ) -> Result<CommandSpec> {
        let description = format!("twopass {} pass {}", item.source.display(), pass.number());
        let cmd = ffmpeg_command(&self.ffmpeg, description, item)
            .input(&item.source)
            .params(&self.params);

        if self.pass_count(item) == 1 {
            return Ok(cmd.args(item.extra.iter().cloned()).output(&item.destination));
        }

        let cmd = cmd
            .arg("-pass")
            .arg(pass.number().to_string())
            .arg("-passlogfile")
            .arg(Self::passlog(item));

        Ok(match pass {
            Pass::First => cmd.arg("-an").discard(),
            Pass::Second => cmd.args(item.extra.iter().cloned()).output(&item.destination),
        })
    }

    fn after_success(&self, item: &BatchItem) -> Result<()> {
        let prefix = Self::passlog(item);
        for suffix in ["-0.log", "-0.log.mbtree"] {
            remove_scratch(std::path::Path::new(&format!("{}{}", prefix, suffix)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{NULL_DEVICE, OutputSink};
    use std::path::PathBuf;

    fn item() -> BatchItem {
        BatchItem::new("in.mov", "out/in.mp4").with_duration(Some(90_000))
    }

    #[test]
    fn test_one_pass_command() {
        let plan = OnePass::new("ffmpeg", "-c:v libx264 -crf 20");
        let item = item().with_extra(["-metadata", "title=x"]);
        let spec = plan.build_pass(&item, Pass::First, None).unwrap();

        assert_eq!(plan.pass_count(&item), 1);
        assert_eq!(
            spec.command_line(),
            "ffmpeg -hide_banner -y -i in.mov -c:v libx264 -crf 20 -metadata title=x out/in.mp4"
        );
        assert_eq!(spec.expected_duration, Some(90_000));
        assert_eq!(spec.sink, OutputSink::File(PathBuf::from("out/in.mp4")));
    }

    #[test]
    fn test_extract_frames_params() {
        let plan = OnePass::extract_frames("ffmpeg", 2.0);
        let item = BatchItem::new("in.mov", "frames/img_%04d.png");
        let spec = plan.build_pass(&item, Pass::First, None).unwrap();
        assert!(spec.command_line().contains("-vf fps=2 frames/img_%04d.png"));
        assert_eq!(plan.name(), "frames");
    }

    #[test]
    fn test_two_pass_commands() {
        let plan = TwoPassEncode::new("ffmpeg", "-c:v libx264 -b:v 2M");
        let item = item();
        assert_eq!(plan.pass_count(&item), 2);

        let first = plan.build_pass(&item, Pass::First, None).unwrap();
        assert_eq!(first.sink, OutputSink::Discard);
        assert!(first.command_line().contains("-pass 1 -passlogfile out/in_passlog -an -f null"));
        assert_eq!(first.args.last().map(String::as_str), Some(NULL_DEVICE));

        let second = plan.build_pass(&item, Pass::Second, None).unwrap();
        assert!(second.command_line().ends_with("-pass 2 -passlogfile out/in_passlog out/in.mp4"));
    }

    #[test]
    fn test_stream_copy_is_single_pass() {
        let plan = TwoPassEncode::new("ffmpeg", "-c:a aac");
        let copy = item().with_extra(["-c:v", "copy"]);
        assert_eq!(plan.pass_count(&copy), 1);
        assert_eq!(plan.pass_count(&item()), 2);

        let spec = plan.build_pass(&copy, Pass::First, None).unwrap();
        assert!(!spec.args.contains(&"-pass".to_string()));
        assert_eq!(spec.sink, OutputSink::File(PathBuf::from("out/in.mp4")));
    }

    #[test]
    fn test_two_pass_cleans_pass_logs() {
        let dir = tempfile::tempdir().unwrap();
        let item = BatchItem::new("in.mov", dir.path().join("clip.mp4"));
        let log = dir.path().join("clip_passlog-0.log");
        std::fs::write(&log, "stats").unwrap();

        TwoPassEncode::new("ffmpeg", "").after_success(&item).unwrap();
        assert!(!log.exists());
    }
}
