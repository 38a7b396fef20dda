//! Time reference units and render range modes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unit in which the user defines the render start and end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeReference {
    /// Musical bars, converted through the playback tempo.
    #[default]
    Bars,
    /// Wall-clock seconds.
    Seconds,
    /// Frames at the render frame rate.
    Frames,
}

/// Where the render range comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    /// Start and end as entered by the user.
    #[default]
    Custom,
    /// The playback loop range.
    Loop,
    /// The bounds of the main soundtrack clip.
    Soundtrack,
}

impl TimeReference {
    pub const ALL: [TimeReference; 3] = [Self::Bars, Self::Seconds, Self::Frames];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bars => "bars",
            Self::Seconds => "seconds",
            Self::Frames => "frames",
        }
    }
}

impl TimeRange {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Custom => "custom",
            Self::Loop => "loop",
            Self::Soundtrack => "soundtrack",
        }
    }
}

impl fmt::Display for TimeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeReference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bars" => Ok(Self::Bars),
            "seconds" | "secs" | "s" => Ok(Self::Seconds),
            "frames" | "f" => Ok(Self::Frames),
            other => Err(format!(
                "Unknown time reference: {other}. Use: bars, seconds, frames"
            )),
        }
    }
}

impl FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "custom" => Ok(Self::Custom),
            "loop" => Ok(Self::Loop),
            "soundtrack" => Ok(Self::Soundtrack),
            other => Err(format!(
                "Unknown time range: {other}. Use: custom, loop, soundtrack"
            )),
        }
    }
}
