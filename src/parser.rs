//! Stateless extraction of progress and statistics from media tool output.
//!
//! Every function here looks at one line at a time. A line that carries no
//! progress information is not an error, it is just plain log text.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

const TIME_TOKEN: &str = "time=";
const SPEED_TOKEN: &str = "speed=";

/// Cosmetic category of a raw output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineCategory {
    Info,
    Warning,
    Error,
    Plain,
}

/// Estimated time left for the running pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eta {
    Remaining(Duration),
    /// Speed was zero, negative or not a number.
    Unavailable,
}

impl fmt::Display for Eta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eta::Remaining(left) => {
                let secs = left.as_secs();
                write!(f, "{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
            }
            Eta::Unavailable => write!(f, "N/A"),
        }
    }
}

/// Returns the whitespace-delimited value following `token`, if present.
fn token_value<'a>(line: &'a str, token: &str) -> Option<&'a str> {
    let start = line.find(token)? + token.len();
    line[start..].split_whitespace().next()
}

/// Converts `HH:MM:SS.ms` (hours may exceed two digits) into milliseconds.
pub fn timestamp_to_millis(stamp: &str) -> Option<u64> {
    let mut parts = stamp.trim().splitn(3, ':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if minutes >= 60 || !seconds.is_finite() || !(0.0..60.0).contains(&seconds) {
        return None;
    }
    hours
        .checked_mul(3_600_000)?
        .checked_add(minutes * 60_000)?
        .checked_add((seconds * 1000.0).round() as u64)
}

/// Formats milliseconds as `HH:MM:SS.mmm`.
pub fn format_millis(millis: u64) -> String {
    let hours = millis / 3_600_000;
    let minutes = (millis % 3_600_000) / 60_000;
    let secs = (millis % 60_000) / 1_000;
    let ms = millis % 1_000;
    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, ms)
}

/// Elapsed position reported by a `time=` token.
pub fn parse_time_progress(line: &str) -> Option<u64> {
    token_value(line, TIME_TOKEN).and_then(timestamp_to_millis)
}

/// Splits a status line such as `frame=  120 fps= 30 q=28.0` into key/value
/// pairs. Pairing is positional; an unpaired trailing token is dropped.
pub fn parse_key_value_pairs(line: &str) -> Vec<(String, String)> {
    let normalized = line.split_whitespace().collect::<Vec<_>>().join(" ");
    let normalized = normalized.replace("= ", "=");
    let tokens: Vec<&str> = normalized
        .split(|c| c == ' ' || c == '=')
        .filter(|token| !token.is_empty())
        .collect();

    tokens
        .chunks_exact(2)
        .map(|pair| (pair[0].to_string(), pair[1].to_string()))
        .collect()
}

/// Human readable caption built from [`parse_key_value_pairs`].
pub fn format_caption(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{}: {} |", key, value))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Remaining time derived from the `speed=<n>x` token.
///
/// Returns `None` when the line has no speed token at all.
pub fn parse_estimated_remaining(line: &str, elapsed_ms: u64, total_ms: u64) -> Option<Eta> {
    let raw = token_value(line, SPEED_TOKEN)?;
    let speed = raw
        .strip_suffix('x')
        .and_then(|number| number.parse::<f64>().ok())
        .filter(|speed| speed.is_finite() && *speed > 0.0);

    Some(match speed {
        Some(speed) => {
            let left_ms = total_ms.saturating_sub(elapsed_ms) as f64 / speed;
            if left_ms.is_finite() {
                Eta::Remaining(Duration::from_millis(left_ms.round() as u64))
            } else {
                Eta::Unavailable
            }
        }
        None => Eta::Unavailable,
    })
}

/// Heuristic colour-coding category. Never used for control flow.
pub fn classify_line(line: &str) -> LineCategory {
    let lower = line.to_lowercase();
    if lower.contains("error") || lower.contains("failed") {
        LineCategory::Error
    } else if lower.contains("warning") {
        LineCategory::Warning
    } else if lower.contains("info") {
        LineCategory::Info
    } else {
        LineCategory::Plain
    }
}

/// Named values printed by the loudness filter's summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatKey {
    InputIntegrated,
    InputTruePeak,
    InputLra,
    InputThreshold,
    OutputIntegrated,
    OutputTruePeak,
    OutputLra,
    OutputThreshold,
    NormalizationType,
    TargetOffset,
}

impl StatKey {
    pub const ALL: [StatKey; 10] = [
        StatKey::InputIntegrated,
        StatKey::InputTruePeak,
        StatKey::InputLra,
        StatKey::InputThreshold,
        StatKey::OutputIntegrated,
        StatKey::OutputTruePeak,
        StatKey::OutputLra,
        StatKey::OutputThreshold,
        StatKey::NormalizationType,
        StatKey::TargetOffset,
    ];

    /// Label as printed by the tool, without the trailing colon.
    pub fn label(self) -> &'static str {
        match self {
            StatKey::InputIntegrated => "Input Integrated",
            StatKey::InputTruePeak => "Input True Peak",
            StatKey::InputLra => "Input LRA",
            StatKey::InputThreshold => "Input Threshold",
            StatKey::OutputIntegrated => "Output Integrated",
            StatKey::OutputTruePeak => "Output True Peak",
            StatKey::OutputLra => "Output LRA",
            StatKey::OutputThreshold => "Output Threshold",
            StatKey::NormalizationType => "Normalization Type",
            StatKey::TargetOffset => "Target Offset",
        }
    }
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Matches `<label>: <value> ...` against the known keys.
pub fn match_statistics_key(line: &str, known: &[StatKey]) -> Option<(StatKey, String)> {
    let line = line.trim_start();
    known.iter().find_map(|key| {
        let rest = line.strip_prefix(key.label())?.strip_prefix(':')?;
        let value = rest.split_whitespace().next()?;
        Some((*key, value.to_string()))
    })
}

/// Placeholder text for a statistic the capture pass never printed.
pub const UNSET: &str = "unset";

/// Values captured during a statistics pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoudnessStatistics {
    values: [Option<String>; 10],
}

impl LoudnessStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(key: StatKey) -> usize {
        key as usize
    }

    /// Feeds one output line; returns true when it carried a statistic.
    pub fn observe(&mut self, line: &str) -> bool {
        match match_statistics_key(line, &StatKey::ALL) {
            Some((key, value)) => {
                self.values[Self::slot(key)] = Some(value);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: StatKey) -> Option<&str> {
        self.values[Self::slot(key)].as_deref()
    }

    /// The captured value, or [`UNSET`].
    pub fn value_or_unset(&self, key: StatKey) -> &str {
        self.get(key).unwrap_or(UNSET)
    }

    /// Keys out of `required` that were never captured.
    pub fn missing(&self, required: &[StatKey]) -> Vec<StatKey> {
        required
            .iter()
            .copied()
            .filter(|key| self.get(*key).is_none())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing(&StatKey::ALL).is_empty()
    }
}
