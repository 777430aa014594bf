//! Generators for whole raw files and seeded storage.

use bytes::Bytes;
use std::sync::Arc;

use storage::ObjectStorage;

use crate::fixtures::{infoclimat_line, IcReading, WuReading};

/// Join lines into a JSONL body.
pub fn jsonl<S: AsRef<str>>(lines: &[S]) -> Bytes {
    let body: Vec<&str> = lines.iter().map(AsRef::as_ref).collect();
    Bytes::from(body.join("\n"))
}

/// Twelve-hour clock label for an hour of the day (`0` → `"12:00 AM"`).
pub fn clock_label(hour: u32) -> String {
    let suffix = if hour < 12 { "AM" } else { "PM" };
    let h = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{}:00 {}", h, suffix)
}

/// A Weather Underground file with one valid reading per hour.
pub fn wunderground_file(hours: u32) -> Bytes {
    let lines: Vec<String> = (0..hours)
        .map(|h| WuReading::at(&clock_label(h)).to_line())
        .collect();
    jsonl(&lines)
}

/// An InfoClimat file with one line of `hours` rows per station.
pub fn infoclimat_file(stations: &[&str], hours: u32) -> Bytes {
    let lines: Vec<String> = stations
        .iter()
        .map(|station| {
            let rows: Vec<IcReading> = (0..hours)
                .map(|h| IcReading::new(station, &format!("2024-10-05 {:02}:00:00", h)))
                .collect();
            infoclimat_line(&rows)
        })
        .collect();
    jsonl(&lines)
}

/// In-memory object storage holding the given files.
pub async fn seeded_storage(files: &[(&str, Bytes)]) -> Arc<ObjectStorage> {
    let storage = Arc::new(ObjectStorage::in_memory());
    for (key, body) in files {
        storage
            .put(key, body.clone())
            .await
            .expect("seed in-memory storage");
    }
    storage
}
