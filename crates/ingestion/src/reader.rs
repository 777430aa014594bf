//! Lazy record stream over a raw JSONL file.

use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use storage::ObjectStorage;
use wx_common::SourceFormat;

use crate::detector::{detect_source, map_infoclimat, map_raw, map_wunderground, MappedRow};
use crate::error::{IngestionError, Result};

/// Wrapper field holding the payload of every line.
const PAYLOAD_FIELD: &str = "_airbyte_data";

/// Reads source files line by line and maps them to staging rows.
#[derive(Clone)]
pub struct RecordReader {
    storage: Arc<ObjectStorage>,
}

impl RecordReader {
    pub fn new(storage: Arc<ObjectStorage>) -> Self {
        Self { storage }
    }

    /// Stream the mapped rows of one file.
    ///
    /// The stream is finite and cannot be restarted. Malformed lines are
    /// skipped with a warning; a storage failure mid-file ends the stream
    /// with an error item.
    pub async fn records(&self, source_key: &str) -> Result<BoxStream<'static, Result<MappedRow>>> {
        let format = detect_source(source_key);
        info!(source_key = %source_key, format = %format, "Detected source");

        let lines = self.storage.stream_lines(source_key).await?;
        let key = source_key.to_string();

        let rows = lines.flat_map(move |line| {
            let items: Vec<Result<MappedRow>> = match line {
                Ok(line) => parse_line(&key, format, &line).into_iter().map(Ok).collect(),
                Err(e) => vec![Err(IngestionError::Stream {
                    source_key: key.clone(),
                    message: e.to_string(),
                })],
            };
            stream::iter(items)
        });

        Ok(rows.boxed())
    }
}

/// Map one raw line. Returns no rows for lines that cannot be used.
pub fn parse_line(source_key: &str, format: SourceFormat, line: &str) -> Vec<MappedRow> {
    let raw: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            let snippet: String = line.chars().take(200).collect();
            warn!(source_key = %source_key, error = %e, line = %snippet, "Invalid JSON line, skipping");
            return Vec::new();
        }
    };

    let Some(data) = raw.get(PAYLOAD_FIELD) else {
        warn!(source_key = %source_key, "Missing {} in line", PAYLOAD_FIELD);
        return Vec::new();
    };
    let Some(data) = data.as_object() else {
        warn!(source_key = %source_key, "{} is not an object", PAYLOAD_FIELD);
        return Vec::new();
    };

    match format {
        SourceFormat::Wunderground => vec![map_wunderground(data)],
        SourceFormat::InfoClimat => {
            let hourly = match data.get("hourly").and_then(Value::as_object) {
                Some(h) if !h.is_empty() => h,
                _ => {
                    warn!(source_key = %source_key, "No 'hourly' block in InfoClimat payload");
                    return Vec::new();
                }
            };

            let mut rows = Vec::new();
            for (station_code, station_rows) in hourly {
                if station_code == "_params" {
                    continue;
                }
                let Some(station_rows) = station_rows.as_array() else {
                    warn!(
                        source_key = %source_key,
                        station_code = %station_code,
                        "Hourly block is not a list, skipping"
                    );
                    continue;
                };
                rows.extend(
                    station_rows
                        .iter()
                        .filter_map(Value::as_object)
                        .map(map_infoclimat),
                );
            }
            rows
        }
        SourceFormat::Unknown => vec![map_raw(data)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::TryStreamExt;
    use wx_common::StagingFields;

    const IC_LINE: &str = r#"{"_airbyte_data":{"hourly":{"_params":{"x":1},"07015":[{"id_station":"07015","dh_utc":"2024-10-05 00:00:00","temperature":11.2},{"id_station":"07015","dh_utc":"2024-10-05 01:00:00","temperature":10.9}],"STATIC0010":[{"id_station":"STATIC0010","dh_utc":"2024-10-05 00:00:00","temperature":9.1}]}}}"#;

    #[test]
    fn test_parse_line_skips_bad_input() {
        let key = "raw/Ichtegem_011024/a.jsonl";
        assert!(parse_line(key, SourceFormat::Wunderground, "{not json").is_empty());
        assert!(parse_line(key, SourceFormat::Wunderground, r#"{"other":1}"#).is_empty());
        assert!(parse_line(key, SourceFormat::Wunderground, r#"{"_airbyte_data":3}"#).is_empty());
    }

    #[test]
    fn test_parse_line_flattens_infoclimat_stations() {
        let rows = parse_line("raw/InfoClimat/a.jsonl", SourceFormat::InfoClimat, IC_LINE);
        assert_eq!(rows.len(), 3);
        assert!(rows
            .iter()
            .all(|r| matches!(r.fields, StagingFields::InfoClimat(_))));
    }

    #[test]
    fn test_parse_line_without_hourly_block() {
        let rows = parse_line(
            "raw/InfoClimat/a.jsonl",
            SourceFormat::InfoClimat,
            r#"{"_airbyte_data":{"hourly":{}}}"#,
        );
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_records_stream_in_order() {
        let storage = Arc::new(ObjectStorage::in_memory());
        let body = [
            r#"{"_airbyte_data":{"Time":"12:04 AM","Temperature":"50 °F"}}"#,
            "garbage",
            r#"{"_airbyte_data":{"Time":"1:04 AM","Temperature":"49 °F"}}"#,
        ]
        .join("\n");
        let key = "raw/Ichtegem_011024/Ichtegem.jsonl";
        storage.put(key, Bytes::from(body)).await.unwrap();

        let reader = RecordReader::new(storage);
        let rows: Vec<MappedRow> = reader.records(key).await.unwrap().try_collect().await.unwrap();

        assert_eq!(rows.len(), 2);
        let times: Vec<_> = rows
            .iter()
            .map(|r| r.fields.get("time_local").map(str::to_string))
            .collect();
        assert_eq!(
            times,
            vec![Some("12:04 AM".to_string()), Some("1:04 AM".to_string())]
        );
    }
}
