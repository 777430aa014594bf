//! Main Ingester struct: raw files into staging rows.

use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use storage::{FinalStore, ObjectStorage, StagingStore};
use wx_common::{SourceFormat, StagingRecord};

use crate::detector::detect_source;
use crate::error::{IngestionError, Result};
use crate::reader::RecordReader;
use crate::stations::StationDirectory;
use crate::tracker::{IngestDecision, IngestionTracker};

/// Options for batch ingestion.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Key prefix to list under
    pub prefix: String,
    /// Only keys ending with this extension are ingested
    pub extension: String,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            extension: ".jsonl".to_string(),
        }
    }
}

/// Outcome of one batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionReport {
    pub ingested: Vec<String>,
    pub skipped: Vec<String>,
    /// `(source_key, error message)`
    pub failed: Vec<(String, String)>,
    /// Staging rows written across all ingested files
    pub rows_staged: usize,
}

/// Loads raw observation files into staging.
pub struct Ingester {
    storage: Arc<ObjectStorage>,
    reader: RecordReader,
    tracker: IngestionTracker,
    staging: Arc<dyn StagingStore>,
    finals: Arc<dyn FinalStore>,
    stations: StationDirectory,
}

impl Ingester {
    pub fn new(
        storage: Arc<ObjectStorage>,
        tracker: IngestionTracker,
        staging: Arc<dyn StagingStore>,
        finals: Arc<dyn FinalStore>,
        stations: StationDirectory,
    ) -> Self {
        Self {
            reader: RecordReader::new(storage.clone()),
            storage,
            tracker,
            staging,
            finals,
            stations,
        }
    }

    pub fn tracker(&self) -> &IngestionTracker {
        &self.tracker
    }

    /// Ingest one file into staging, returning the number of rows written.
    ///
    /// Any failure is recorded on the tracker before being returned.
    pub async fn ingest_file(&self, source_key: &str) -> Result<usize> {
        self.ingest_with_hash(source_key, None).await
    }

    /// List, decide and ingest every matching file.
    ///
    /// Per-file errors are logged and collected; the batch continues.
    pub async fn ingest_all(&self, options: &IngestOptions) -> Result<IngestionReport> {
        let keys = self
            .storage
            .list_matching_files(&options.prefix, &options.extension)
            .await?;
        info!(files = keys.len(), prefix = %options.prefix, "Raw files found");

        let known = self.tracker.register_known().await?;
        let mut report = IngestionReport::default();

        for key in keys {
            let current_hash = match self.storage.content_hash(&key).await {
                Ok(hash) => hash,
                Err(e) => {
                    error!(source_key = %key, error = %e, "Failed to hash file");
                    report.failed.push((key, e.to_string()));
                    continue;
                }
            };

            let decision = self.tracker.decide(&key, &current_hash, &known).await?;
            match decision {
                IngestDecision::New => info!(source_key = %key, "New file, ingesting"),
                IngestDecision::Modified => info!(source_key = %key, "Modified file, re-ingesting"),
                IngestDecision::Retry => info!(source_key = %key, "Failed file, retrying"),
                IngestDecision::Skip => {
                    info!(source_key = %key, "Already processed, skipping");
                    report.skipped.push(key);
                    continue;
                }
            }

            match self.ingest_with_hash(&key, Some(current_hash)).await {
                Ok(rows) => {
                    report.rows_staged += rows;
                    report.ingested.push(key);
                }
                Err(e) => report.failed.push((key, e.to_string())),
            }
        }

        info!(
            ingested = report.ingested.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            rows = report.rows_staged,
            outcome = "success",
            "Staging ingestion complete"
        );

        Ok(report)
    }

    #[instrument(skip(self, content_hash))]
    async fn ingest_with_hash(&self, source_key: &str, content_hash: Option<String>) -> Result<usize> {
        info!("Starting ingestion");
        self.tracker.start(source_key).await?;

        match self.stage_file(source_key, content_hash).await {
            Ok(rows) => Ok(rows),
            Err(e) => {
                error!(error = %e, "Ingestion failed");
                if let Err(tracker_err) = self.tracker.mark_failure(source_key, &e.to_string()).await {
                    warn!(error = %tracker_err, "Failed to record ingestion failure");
                }
                Err(e)
            }
        }
    }

    async fn stage_file(&self, source_key: &str, content_hash: Option<String>) -> Result<usize> {
        let format = detect_source(source_key);
        let injected = self.stations.resolve(source_key).map(str::to_string);
        if format == SourceFormat::Wunderground && injected.is_none() {
            return Err(IngestionError::MissingStation(source_key.to_string()));
        }

        // A re-ingested file replaces its previous rows, promotions and verdict
        let removed = self.staging.delete_by_source(source_key).await?;
        if removed > 0 {
            info!(removed, "Removed staging rows from previous ingestion");
        }
        let demoted = self.finals.delete_by_source(source_key).await?;
        if demoted > 0 {
            info!(demoted, "Removed final records from previous ingestion");
        }
        self.tracker.reset_quality(source_key).await?;

        let mut records = self.reader.records(source_key).await?;
        let mut rows = Vec::new();

        while let Some(mapped) = records.next().await {
            let mapped = mapped?;
            let station_id = match (&injected, mapped.station_id) {
                (Some(station), _) => station.clone(),
                (None, Some(station)) => station,
                (None, None) => {
                    return Err(IngestionError::MissingStationId(source_key.to_string()))
                }
            };
            rows.push(StagingRecord::new(
                station_id,
                source_key,
                mapped.observation_time,
                mapped.fields,
            ));
        }

        let count = rows.len();
        if count == 0 {
            warn!("No rows read from file");
        } else {
            let inserted = self.staging.insert_many(rows).await?;
            info!(rows = inserted, outcome = "success", "Inserted rows into staging");
        }

        let content_hash = match content_hash {
            Some(hash) => hash,
            None => self.storage.content_hash(source_key).await?,
        };
        self.tracker
            .mark_success(source_key, Some(count as u64), Some(content_hash))
            .await?;

        info!(outcome = "success", "Ingestion complete");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::collections::HashSet;
    use storage::{MemoryStore, TrackerStore, TrackerUpdate};
    use wx_common::{FinalDraft, FinalRecord, IngestionRecord, WxError, WxResult};

    const WU_KEY: &str = "raw/Ichtegem_011024/Ichtegem.jsonl";

    fn wu_body(temps: &[&str]) -> Bytes {
        let lines: Vec<String> = temps
            .iter()
            .enumerate()
            .map(|(i, t)| {
                format!(
                    r#"{{"_airbyte_data":{{"Time":"{}:00 AM","Temperature":"{} °F"}}}}"#,
                    i + 1,
                    t
                )
            })
            .collect();
        Bytes::from(lines.join("\n"))
    }

    async fn setup() -> (Arc<ObjectStorage>, Arc<MemoryStore>, Ingester) {
        let storage = Arc::new(ObjectStorage::in_memory());
        let store = Arc::new(MemoryStore::new());
        let ingester = Ingester::new(
            storage.clone(),
            IngestionTracker::new(store.clone()),
            store.clone(),
            store.clone(),
            StationDirectory::default(),
        );
        (storage, store, ingester)
    }

    #[tokio::test]
    async fn test_ingest_file_injects_station_and_records_success() {
        let (storage, store, ingester) = setup().await;
        storage.put(WU_KEY, wu_body(&["50", "51"])).await.unwrap();

        let rows = ingester.ingest_file(WU_KEY).await.unwrap();
        assert_eq!(rows, 2);

        let staged = store.find_by_source(WU_KEY).await.unwrap();
        assert!(staged.iter().all(|r| r.station_id == "IICHTE19"));
        assert_eq!(staged[0].fields.get("temperature_f"), Some("50 °F"));

        let record = ingester.tracker().get(WU_KEY).await.unwrap().unwrap();
        assert!(record.success);
        assert_eq!(record.lines_read, Some(2));
        assert_eq!(
            record.content_hash,
            Some(storage.content_hash(WU_KEY).await.unwrap())
        );
    }

    #[tokio::test]
    async fn test_missing_station_id_fails_file() {
        let (storage, _store, ingester) = setup().await;
        let key = "raw/unknown/feed.jsonl";
        storage
            .put(key, Bytes::from(r#"{"_airbyte_data":{"value":1}}"#))
            .await
            .unwrap();

        let err = ingester.ingest_file(key).await.unwrap_err();
        assert!(matches!(err, IngestionError::MissingStationId(_)));

        let record = ingester.tracker().get(key).await.unwrap().unwrap();
        assert!(!record.success);
        assert!(record.error_message.unwrap().contains("id_station"));
    }

    #[tokio::test]
    async fn test_unconfigured_per_line_station_fails_file() {
        let storage = Arc::new(ObjectStorage::in_memory());
        let store = Arc::new(MemoryStore::new());
        let ingester = Ingester::new(
            storage.clone(),
            IngestionTracker::new(store.clone()),
            store.clone(),
            store.clone(),
            StationDirectory::new([("madeleine", "ILAMAD25")]),
        );
        storage.put(WU_KEY, wu_body(&["50"])).await.unwrap();

        let err = ingester.ingest_file(WU_KEY).await.unwrap_err();
        assert!(matches!(err, IngestionError::MissingStation(_)));
        assert_eq!(ingester.tracker().pending_or_failed().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ingest_all_skips_unchanged_and_replaces_modified() {
        let (storage, store, ingester) = setup().await;
        storage.put(WU_KEY, wu_body(&["50", "51"])).await.unwrap();
        storage
            .put("raw/notes.txt", Bytes::from("not jsonl"))
            .await
            .unwrap();
        let options = IngestOptions {
            prefix: "raw".into(),
            ..Default::default()
        };

        let first = ingester.ingest_all(&options).await.unwrap();
        assert_eq!(first.ingested, vec![WU_KEY.to_string()]);
        assert_eq!(first.rows_staged, 2);

        store
            .update(
                WU_KEY,
                TrackerUpdate::Quality {
                    validated: true,
                    at: chrono::Utc::now(),
                },
            )
            .await
            .unwrap();

        let second = ingester.ingest_all(&options).await.unwrap();
        assert_eq!(second.skipped, vec![WU_KEY.to_string()]);
        assert!(second.ingested.is_empty());
        assert_eq!(StagingStore::count_by_source(&*store, WU_KEY).await.unwrap(), 2);

        storage.put(WU_KEY, wu_body(&["40", "41", "42"])).await.unwrap();
        let third = ingester.ingest_all(&options).await.unwrap();
        assert_eq!(third.ingested, vec![WU_KEY.to_string()]);
        assert_eq!(StagingStore::count_by_source(&*store, WU_KEY).await.unwrap(), 3);

        let record = store.get(WU_KEY).await.unwrap().unwrap();
        assert!(!record.quality_validated);
        assert_eq!(record.quality_run_at, None);
    }

    #[tokio::test]
    async fn test_infoclimat_rows_keep_their_station() {
        let (storage, store, ingester) = setup().await;
        storage
            .put(
                test_utils::fixtures::keys::INFOCLIMAT,
                test_utils::generators::infoclimat_file(&["07015", "STATIC0010"], 2),
            )
            .await
            .unwrap();

        let rows = ingester
            .ingest_file(test_utils::fixtures::keys::INFOCLIMAT)
            .await
            .unwrap();
        assert_eq!(rows, 4);

        let staged = store.staging_rows().await;
        assert_eq!(staged.iter().filter(|r| r.station_id == "STATIC0010").count(), 2);
        assert!(staged.iter().all(|r| r.observation_time.is_some()));
    }

    /// Tracker whose failure writes are rejected.
    struct RejectFailures(MemoryStore);

    #[async_trait::async_trait]
    impl TrackerStore for RejectFailures {
        async fn known_keys(&self) -> WxResult<HashSet<String>> {
            self.0.known_keys().await
        }

        async fn get(&self, source_key: &str) -> WxResult<Option<IngestionRecord>> {
            self.0.get(source_key).await
        }

        async fn insert_if_absent(&self, record: IngestionRecord) -> WxResult<bool> {
            self.0.insert_if_absent(record).await
        }

        async fn update(
            &self,
            source_key: &str,
            update: TrackerUpdate,
        ) -> WxResult<Option<IngestionRecord>> {
            match update {
                TrackerUpdate::Failure { .. } => {
                    Err(WxError::DatabaseError("connection reset".into()))
                }
                other => self.0.update(source_key, other).await,
            }
        }

        async fn delete(&self, source_key: &str) -> WxResult<bool> {
            self.0.delete(source_key).await
        }

        async fn find_by_success(&self, success: bool) -> WxResult<Vec<IngestionRecord>> {
            self.0.find_by_success(success).await
        }

        async fn find_awaiting_quality(&self) -> WxResult<Vec<IngestionRecord>> {
            self.0.find_awaiting_quality().await
        }

        async fn keys_with_quality(&self, validated: bool) -> WxResult<Vec<String>> {
            self.0.keys_with_quality(validated).await
        }
    }

    #[tokio::test]
    async fn test_tracker_write_failure_keeps_ingestion_error() {
        let storage = Arc::new(ObjectStorage::in_memory());
        let store = Arc::new(MemoryStore::new());
        let ingester = Ingester::new(
            storage.clone(),
            IngestionTracker::new(Arc::new(RejectFailures(MemoryStore::new()))),
            store.clone(),
            store.clone(),
            StationDirectory::default(),
        );
        let key = "raw/unknown/feed.jsonl";
        storage
            .put(key, Bytes::from(r#"{"_airbyte_data":{"value":1}}"#))
            .await
            .unwrap();

        let err = ingester.ingest_file(key).await.unwrap_err();
        assert!(matches!(err, IngestionError::MissingStationId(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_reingestion_removes_previous_final_records() {
        let (storage, store, ingester) = setup().await;
        storage.put(WU_KEY, wu_body(&["50", "51"])).await.unwrap();
        ingester.ingest_file(WU_KEY).await.unwrap();

        let promoted = FinalRecord::from_draft(FinalDraft {
            station_id: Some("IICHTE19".into()),
            observation_time_utc: Some(chrono::Utc::now()),
            source_key: Some(WU_KEY.into()),
            ..Default::default()
        })
        .unwrap();
        store.insert(promoted).await.unwrap();
        let other = FinalRecord::from_draft(FinalDraft {
            station_id: Some("07015".into()),
            observation_time_utc: Some(chrono::Utc::now()),
            source_key: Some("raw/InfoClimat/a.jsonl".into()),
            ..Default::default()
        })
        .unwrap();
        store.insert(other).await.unwrap();

        storage.put(WU_KEY, wu_body(&["40", "41", "42"])).await.unwrap();
        ingester.ingest_file(WU_KEY).await.unwrap();

        assert_eq!(FinalStore::count_by_source(&*store, WU_KEY).await.unwrap(), 0);
        assert_eq!(
            FinalStore::count_by_source(&*store, "raw/InfoClimat/a.jsonl").await.unwrap(),
            1
        );
    }
}
