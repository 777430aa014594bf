//! Upstream source formats.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream format of a raw observation file.
///
/// Determined once from the file key and carried on every staging row, so later
/// stages never re-derive it from the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// InfoClimat exports: one line holds an `hourly` block keyed by station
    /// code, each entry a list of hourly rows with their own station id and
    /// UTC timestamp. Values are already metric.
    InfoClimat,
    /// Weather Underground station pages: one line per hourly reading for a
    /// single station, values as unit-suffixed imperial strings.
    Wunderground,
    /// Anything else. Rows are passed through raw.
    Unknown,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::InfoClimat => "infoclimat",
            SourceFormat::Wunderground => "wunderground",
            SourceFormat::Unknown => "unknown",
        }
    }

    /// Parse the label produced by [`SourceFormat::as_str`].
    pub fn from_label(label: &str) -> Self {
        match label {
            "infoclimat" => SourceFormat::InfoClimat,
            "wunderground" => SourceFormat::Wunderground,
            _ => SourceFormat::Unknown,
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
