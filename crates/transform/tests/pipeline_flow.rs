//! Ingest → validate → transform → consistency against in-memory stores.

use chrono::{TimeZone, Utc};
use std::sync::Arc;

use ingestion::{IngestOptions, Ingester, IngestionTracker, StationDirectory};
use quality::{ConsistencyChecker, QualityValidator};
use storage::{FinalStore, MemoryStore, ObjectStorage, TrackerStore};
use test_utils::assert_approx_eq;
use test_utils::fixtures::{envelope, infoclimat_line, keys, stations, IcReading};
use test_utils::generators::{infoclimat_file, jsonl, seeded_storage, wunderground_file};
use transform::Transformer;

struct Pipeline {
    storage: Arc<ObjectStorage>,
    store: Arc<MemoryStore>,
}

impl Pipeline {
    async fn seeded() -> Self {
        let unknown = jsonl(&[envelope(serde_json::json!({ "id_station": "X1", "v": 1 }))]);
        let storage = seeded_storage(&[
            (keys::ICHTEGEM, wunderground_file(3)),
            (keys::INFOCLIMAT, infoclimat_file(&[stations::INFOCLIMAT], 3)),
            (keys::UNKNOWN, unknown),
        ])
        .await;
        Self {
            storage,
            store: Arc::new(MemoryStore::new()),
        }
    }

    fn ingester(&self) -> Ingester {
        Ingester::new(
            self.storage.clone(),
            IngestionTracker::new(self.store.clone()),
            self.store.clone(),
            self.store.clone(),
            StationDirectory::default(),
        )
    }

    fn validator(&self) -> QualityValidator {
        QualityValidator::new(self.store.clone(), self.store.clone())
    }

    fn transformer(&self) -> Transformer {
        Transformer::new(self.store.clone(), self.store.clone(), self.store.clone())
    }

    fn checker(&self) -> ConsistencyChecker {
        ConsistencyChecker::new(self.store.clone(), self.store.clone(), self.store.clone())
    }
}

fn options() -> IngestOptions {
    IngestOptions {
        prefix: "raw/".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_full_pipeline_run() {
    let pipeline = Pipeline::seeded().await;

    let ingest = pipeline.ingester().ingest_all(&options()).await.unwrap();
    assert_eq!(ingest.ingested.len(), 3);
    assert!(ingest.failed.is_empty(), "{:?}", ingest.failed);
    assert_eq!(ingest.rows_staged, 7);

    let validation = pipeline.validator().validate_pending_files().await.unwrap();
    assert_eq!(validation.valid_files(), 2, "{:?}", validation.files);
    assert_eq!(validation.unvalidated, vec![keys::UNKNOWN.to_string()]);

    let summary = pipeline.transformer().transform_validated_rows().await.unwrap();
    assert_eq!(summary.copied, 3);
    assert_eq!(summary.transformed, 3);
    assert_eq!(summary.errors, 0);

    let finals = pipeline.store.final_records().await;
    assert_eq!(finals.len(), 6);

    // Local midnight in Paris on 1 October 2024 is 22:00 UTC the day before
    let midnight = Utc.with_ymd_and_hms(2024, 9, 30, 22, 0, 0).unwrap();
    let first = finals
        .iter()
        .find(|r| r.station_id == stations::ICHTEGEM && r.observation_time_utc == midnight)
        .expect("first Ichtegem hour promoted");
    assert_approx_eq!(first.measurements.temperature_c.unwrap(), 13.777, 0.01);

    let report = pipeline.checker().run().await.unwrap();
    assert!(report.is_consistent(), "{:?}", report);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let pipeline = Pipeline::seeded().await;
    pipeline.ingester().ingest_all(&options()).await.unwrap();
    pipeline.validator().validate_pending_files().await.unwrap();
    pipeline.transformer().transform_validated_rows().await.unwrap();

    let ingest = pipeline.ingester().ingest_all(&options()).await.unwrap();
    assert!(ingest.ingested.is_empty());
    assert_eq!(ingest.skipped.len(), 3);

    let validation = pipeline.validator().validate_pending_files().await.unwrap();
    assert!(validation.files.is_empty());

    let summary = pipeline.transformer().transform_validated_rows().await.unwrap();
    assert_eq!(summary.copied + summary.transformed, 0);
    assert_eq!(summary.duplicates, 6);
    assert_eq!(pipeline.store.final_records().await.len(), 6);
}

#[tokio::test]
async fn test_modified_file_is_revalidated_and_promoted() {
    let pipeline = Pipeline::seeded().await;
    pipeline.ingester().ingest_all(&options()).await.unwrap();
    pipeline.validator().validate_pending_files().await.unwrap();
    pipeline.transformer().transform_validated_rows().await.unwrap();

    pipeline
        .storage
        .put(keys::INFOCLIMAT, infoclimat_file(&[stations::INFOCLIMAT], 4))
        .await
        .unwrap();

    let ingest = pipeline.ingester().ingest_all(&options()).await.unwrap();
    assert_eq!(ingest.ingested, vec![keys::INFOCLIMAT.to_string()]);
    assert_eq!(ingest.rows_staged, 4);

    let record = pipeline.store.get(keys::INFOCLIMAT).await.unwrap().unwrap();
    assert!(!record.quality_validated);

    let validation = pipeline.validator().validate_pending_files().await.unwrap();
    assert_eq!(validation.valid_files(), 1);

    // Earlier promotions were removed with the old rows, so all four hours are copied
    let summary = pipeline.transformer().transform_validated_rows().await.unwrap();
    assert_eq!(summary.copied, 4);
    assert_eq!(summary.duplicates, 3);
    assert_eq!(
        FinalStore::count_by_source(&*pipeline.store, keys::INFOCLIMAT).await.unwrap(),
        4
    );

    let report = pipeline.checker().run().await.unwrap();
    assert!(report.is_consistent(), "{:?}", report);
}

#[tokio::test]
async fn test_modified_file_failing_quality_leaves_final() {
    let pipeline = Pipeline::seeded().await;
    pipeline.ingester().ingest_all(&options()).await.unwrap();
    pipeline.validator().validate_pending_files().await.unwrap();
    pipeline.transformer().transform_validated_rows().await.unwrap();
    assert_eq!(
        FinalStore::count_by_source(&*pipeline.store, keys::INFOCLIMAT).await.unwrap(),
        3
    );

    let mut hot = IcReading::new(stations::INFOCLIMAT, "2024-10-05 00:00:00");
    hot.temperature = 999.0;
    let cool = IcReading::new(stations::INFOCLIMAT, "2024-10-05 01:00:00");
    pipeline
        .storage
        .put(keys::INFOCLIMAT, jsonl(&[infoclimat_line(&[hot, cool])]))
        .await
        .unwrap();

    pipeline.ingester().ingest_all(&options()).await.unwrap();
    let validation = pipeline.validator().validate_pending_files().await.unwrap();
    assert_eq!(validation.invalid_files(), 1);

    let summary = pipeline.transformer().transform_validated_rows().await.unwrap();
    assert_eq!(summary.copied, 0);
    assert_eq!(
        FinalStore::count_by_source(&*pipeline.store, keys::INFOCLIMAT).await.unwrap(),
        0
    );

    let report = pipeline.checker().run().await.unwrap();
    assert!(report.invalid_in_final.is_empty(), "{:?}", report);
    assert!(report.is_consistent(), "{:?}", report);
}

