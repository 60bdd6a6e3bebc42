use std::fmt::Write as _;
use std::path::Path;

use crate::command::CommandSpec;
use crate::error::Result;
use crate::parser::LoudnessStatistics;
use crate::sequencer::{BatchItem, LaunchFailurePolicy, Pass, PassPlan};

use super::ffmpeg_command;

/// Joins the files listed in each item's source (a concat demuxer list).
///
/// The whole batch is one logical unit, so a launch failure aborts it.
#[derive(Debug, Clone)]
pub struct Concat {
    ffmpeg: String,
    params: String,
}

impl Concat {
    pub fn new<S: Into<String>>(ffmpeg: S, params: S) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            params: params.into(),
        }
    }
}

impl PassPlan for Concat {
    fn name(&self) -> &str {
        "concat"
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
        Ok(ffmpeg_command(&self.ffmpeg, format!("concat {}", item.source.display()), item)
            .args(["-f", "concat", "-safe", "0"])
            .input(&item.source)
            .params(&self.params)
            .args(item.extra.iter().cloned())
            .output(&item.destination))
    }

    fn launch_failure_policy(&self) -> LaunchFailurePolicy {
        LaunchFailurePolicy::AbortBatch
    }
}

/// Builds a video from an image sequence pattern (`img_%04d.png`).
#[derive(Debug, Clone)]
pub struct Slideshow {
    ffmpeg: String,
    framerate: f32,
    params: String,
}

impl Slideshow {
    pub fn new<S: Into<String>>(ffmpeg: S, framerate: f32, params: S) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            framerate,
            params: params.into(),
        }
    }
}

impl PassPlan for Slideshow {
    fn name(&self) -> &str {
        "slideshow"
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
        Ok(ffmpeg_command(&self.ffmpeg, format!("slideshow {}", item.source.display()), item)
            .arg("-framerate")
            .arg(self.framerate.to_string())
            .input(&item.source)
            .params(&self.params)
            .args(["-pix_fmt", "yuv420p"])
            .args(item.extra.iter().cloned())
            .output(&item.destination))
    }

    fn launch_failure_policy(&self) -> LaunchFailurePolicy {
        LaunchFailurePolicy::AbortBatch
    }
}

/// Contents of a concat demuxer list for `files`.
pub fn concat_list<P: AsRef<Path>>(files: &[P]) -> String {
    let mut list = String::new();
    for file in files {
        let path = file.as_ref().to_string_lossy().replace('\'', r"'\''");
        let _ = writeln!(list, "file '{}'", path);
    }
    list
}

/// Writes [`concat_list`] to `path`.
pub fn write_concat_list<P: AsRef<Path>, Q: AsRef<Path>>(files: &[P], path: Q) -> Result<()> {
    std::fs::write(path, concat_list(files))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_command_and_policy() {
        let plan = Concat::new("ffmpeg", "-c copy");
        let item = BatchItem::new("list.txt", "joined.mkv");
        let spec = plan.build_pass(&item, Pass::First, None).unwrap();

        assert_eq!(
            spec.command_line(),
            "ffmpeg -hide_banner -y -f concat -safe 0 -i list.txt -c copy joined.mkv"
        );
        assert_eq!(plan.launch_failure_policy(), LaunchFailurePolicy::AbortBatch);
    }

    #[test]
    fn test_slideshow_command() {
        let plan = Slideshow::new("ffmpeg", 0.5, "-c:v libx264");
        let item = BatchItem::new("img_%04d.png", "show.mp4");
        let spec = plan.build_pass(&item, Pass::First, None).unwrap();

        assert!(spec.command_line().contains("-framerate 0.5 -i img_%04d.png -c:v libx264 -pix_fmt yuv420p show.mp4"));
        assert_eq!(plan.launch_failure_policy(), LaunchFailurePolicy::AbortBatch);
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = concat_list(&["a.mp4", "it's.mp4"]);
        assert_eq!(list, "file 'a.mp4'\nfile 'it'\\''s.mp4'\n");
    }

    #[test]
    fn test_write_concat_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.txt");
        write_concat_list(&["one.mkv", "two.mkv"], &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "file 'one.mkv'\nfile 'two.mkv'\n");
    }
}
