//! Time values: plain seconds or tempo-relative notation.
//!
//! Notation follows the usual `<count><unit><modifier>` form: `"4n"` is a
//! quarter note, `"8n."` a dotted eighth, `"8t"` an eighth-note triplet and
//! `"2m"` two measures of 4/4. Notation resolves to seconds against a tempo.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::EngineError;

/// Beats per 4/4 measure.
const BEATS_PER_MEASURE: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// `n`: the count is a note division (4 = quarter).
    Note,
    /// `m`: the count is a number of measures.
    Measure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Modifier {
    #[default]
    Plain,
    Dotted,
    Triplet,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeSpec {
    Seconds(f64),
    Notation {
        count: u32,
        unit: Unit,
        modifier: Modifier,
    },
}

impl TimeSpec {
    pub const fn seconds(s: f64) -> Self {
        TimeSpec::Seconds(s)
    }

    pub const fn notes(division: u32) -> Self {
        TimeSpec::Notation {
            count: division,
            unit: Unit::Note,
            modifier: Modifier::Plain,
        }
    }

    pub const fn measures(count: u32) -> Self {
        TimeSpec::Notation {
            count,
            unit: Unit::Measure,
            modifier: Modifier::Plain,
        }
    }

    pub fn is_tempo_relative(&self) -> bool {
        matches!(self, TimeSpec::Notation { .. })
    }

    /// Length in seconds at `bpm` quarter notes per minute.
    pub fn resolve(&self, bpm: f64) -> f64 {
        match *self {
            TimeSpec::Seconds(s) => s,
            TimeSpec::Notation {
                count,
                unit,
                modifier,
            } => {
                let beat = 60.0 / bpm;
                let beats = match unit {
                    Unit::Note => BEATS_PER_MEASURE / count as f64,
                    Unit::Measure => count as f64 * BEATS_PER_MEASURE,
                };
                let scale = match modifier {
                    Modifier::Plain => 1.0,
                    Modifier::Dotted => 1.5,
                    Modifier::Triplet => 2.0 / 3.0,
                };
                beats * beat * scale
            }
        }
    }
}

impl From<f64> for TimeSpec {
    fn from(s: f64) -> Self {
        TimeSpec::Seconds(s)
    }
}

impl FromStr for TimeSpec {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let invalid = || EngineError::InvalidTime(s.to_string());

        if let Ok(seconds) = text.parse::<f64>() {
            return if seconds.is_finite() {
                Ok(TimeSpec::Seconds(seconds))
            } else {
                Err(invalid())
            };
        }

        let digits = text.chars().take_while(char::is_ascii_digit).count();
        let (count, rest) = text.split_at(digits);
        let count: u32 = count.parse().map_err(|_| invalid())?;
        if count == 0 {
            return Err(invalid());
        }

        let (unit, modifier) = match rest {
            "n" => (Unit::Note, Modifier::Plain),
            "n." => (Unit::Note, Modifier::Dotted),
            "t" => (Unit::Note, Modifier::Triplet),
            "m" => (Unit::Measure, Modifier::Plain),
            _ => return Err(invalid()),
        };
        Ok(TimeSpec::Notation {
            count,
            unit,
            modifier,
        })
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSpec::Seconds(s) => write!(f, "{s}"),
            TimeSpec::Notation {
                count,
                unit,
                modifier,
            } => {
                let suffix = match (unit, modifier) {
                    (Unit::Measure, _) => "m",
                    (Unit::Note, Modifier::Plain) => "n",
                    (Unit::Note, Modifier::Dotted) => "n.",
                    (Unit::Note, Modifier::Triplet) => "t",
                };
                write!(f, "{count}{suffix}")
            }
        }
    }
}

impl Serialize for TimeSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TimeSpec::Seconds(s) => serializer.serialize_f64(*s),
            notation => serializer.collect_str(notation),
        }
    }
}

impl<'de> Deserialize<'de> for TimeSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(s) => Ok(TimeSpec::Seconds(s)),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}
