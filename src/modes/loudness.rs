use tracing::debug;

use crate::command::CommandSpec;
use crate::config::LoudnessConfig;
use crate::error::{PasslineError, Result};
use crate::parser::{LoudnessStatistics, StatKey};
use crate::sequencer::{BatchItem, Pass, PassPlan};

use super::ffmpeg_command;

/// Statistics the second pass cannot do without.
pub const REQUIRED_STATS: [StatKey; 5] = [
    StatKey::InputIntegrated,
    StatKey::InputTruePeak,
    StatKey::InputLra,
    StatKey::InputThreshold,
    StatKey::TargetOffset,
];

/// Two-pass EBU R128 loudness normalization.
///
/// Pass 1 runs the loudness filter in analysis mode against the null muxer and
/// captures its summary. Pass 2 feeds the measured values back into the filter
/// so it can normalize linearly. An item whose capture is missing any of
/// [`REQUIRED_STATS`] fails with [`PasslineError::CaptureIncomplete`] instead
/// of running pass 2 with placeholder values.
#[derive(Debug, Clone)]
pub struct LoudnessNormalize {
    ffmpeg: String,
    target: LoudnessConfig,
    params: String,
}

impl LoudnessNormalize {
    pub fn new<S: Into<String>>(ffmpeg: S, target: LoudnessConfig, params: S) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            target,
            params: params.into(),
        }
    }

    fn target_filter(&self) -> String {
        format!(
            "loudnorm=I={}:TP={}:LRA={}",
            self.target.integrated, self.target.true_peak, self.target.lra
        )
    }

    pub fn analysis_filter(&self) -> String {
        format!("{}:print_format=summary", self.target_filter())
    }

    pub fn apply_filter(&self, stats: &LoudnessStatistics) -> Result<String> {
        let missing = stats.missing(&REQUIRED_STATS);
        if !missing.is_empty() {
            return Err(PasslineError::CaptureIncomplete {
                missing: missing.iter().map(|key| key.label().to_string()).collect(),
            });
        }

        Ok(format!(
            "{}:measured_I={}:measured_TP={}:measured_LRA={}:measured_thresh={}:offset={}:linear=true:print_format=summary",
            self.target_filter(),
            stats.value_or_unset(StatKey::InputIntegrated),
            stats.value_or_unset(StatKey::InputTruePeak),
            stats.value_or_unset(StatKey::InputLra),
            stats.value_or_unset(StatKey::InputThreshold),
            stats.value_or_unset(StatKey::TargetOffset),
        ))
    }
}

impl PassPlan for LoudnessNormalize {
    fn name(&self) -> &str {
        "loudnorm"
    }

    fn pass_count(&self, _item: &BatchItem) -> usize {
        2
    }

    fn build_pass(
        &self,
        item: &BatchItem,
        pass: Pass,
        captured: Option<&LoudnessStatistics>,
    ) -> Result<CommandSpec> {
        let description = format!("loudnorm {} pass {}", item.source.display(), pass.number());
        let cmd = ffmpeg_command(&self.ffmpeg, description, item).input(&item.source);

        match pass {
            Pass::First => Ok(cmd
                .audio_filter(self.analysis_filter())
                .arg("-vn")
                .arg("-sn")
                .discard()
                .capture_stats()),
            Pass::Second => {
                let empty = LoudnessStatistics::new();
                let filter = self.apply_filter(captured.unwrap_or(&empty))?;
                debug!("Second pass filter: {}", filter);
                Ok(cmd
                    .audio_filter(filter)
                    .params(&self.params)
                    .args(item.extra.iter().cloned())
                    .output(&item.destination))
            }
        }
    }
}
