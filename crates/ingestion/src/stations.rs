//! Station lookup for per-line sources that carry no station id.

use std::collections::BTreeMap;

/// Maps case-insensitive key tokens to station ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationDirectory {
    entries: Vec<(String, String)>,
}

impl StationDirectory {
    /// Build from `(token, station_id)` pairs. Earlier tokens win when a
    /// key contains several.
    pub fn new<I, T, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (T, S)>,
        T: Into<String>,
        S: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(token, station)| (token.into().to_lowercase(), station.into()))
                .collect(),
        }
    }

    pub fn from_map(map: &BTreeMap<String, String>) -> Self {
        Self::new(map.iter().map(|(t, s)| (t.clone(), s.clone())))
    }

    /// Station id for the first token found in `source_key`.
    pub fn resolve(&self, source_key: &str) -> Option<&str> {
        let key = source_key.to_lowercase();
        self.entries
            .iter()
            .find(|(token, _)| key.contains(token.as_str()))
            .map(|(_, station)| station.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for StationDirectory {
    fn default() -> Self {
        Self::new([("ichtegem", "IICHTE19"), ("madeleine", "ILAMAD25")])
    }
}
