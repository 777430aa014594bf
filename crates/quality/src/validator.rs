//! File-level quality validation of staged rows.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use storage::{StagingStore, TrackerStore, TrackerUpdate};
use wx_common::WxResult;

use crate::schemas::schema_for;

/// Verdict for one validated file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileVerdict {
    pub source_key: String,
    pub valid_rows: usize,
    pub invalid_rows: usize,
    pub validated: bool,
}

/// Outcome of one validation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub files: Vec<FileVerdict>,
    /// Files without a schema for their format; left pending.
    pub unvalidated: Vec<String>,
}

impl ValidationReport {
    pub fn valid_files(&self) -> usize {
        self.files.iter().filter(|f| f.validated).count()
    }

    pub fn invalid_files(&self) -> usize {
        self.files.len() - self.valid_files()
    }
}

/// Marks staging rows and files as passing or failing quality.
pub struct QualityValidator {
    tracker: Arc<dyn TrackerStore>,
    staging: Arc<dyn StagingStore>,
}

impl QualityValidator {
    pub fn new(tracker: Arc<dyn TrackerStore>, staging: Arc<dyn StagingStore>) -> Self {
        Self { tracker, staging }
    }

    /// Validate every file that ingested successfully and is not yet
    /// quality-validated, including files previously found invalid.
    pub async fn validate_pending_files(&self) -> WxResult<ValidationReport> {
        let pending = self.tracker.find_awaiting_quality().await?;
        info!(files = pending.len(), "Files pending quality validation");

        let mut report = ValidationReport::default();
        for record in pending {
            match self.validate_file(&record.source_key).await? {
                Some(verdict) => report.files.push(verdict),
                None => report.unvalidated.push(record.source_key),
            }
        }

        info!(
            valid = report.valid_files(),
            invalid = report.invalid_files(),
            unvalidated = report.unvalidated.len(),
            outcome = "success",
            "Quality validation finished"
        );
        Ok(report)
    }

    /// Validate one file's staging rows and write the file verdict.
    ///
    /// Returns `None` when no schema exists for the file's format. A file
    /// without staging rows is written as invalid.
    #[instrument(skip(self))]
    pub async fn validate_file(&self, source_key: &str) -> WxResult<Option<FileVerdict>> {
        let rows = self.staging.find_by_source(source_key).await?;

        if rows.is_empty() {
            warn!("No staging rows, marking file invalid");
            self.write_verdict(source_key, false).await?;
            return Ok(Some(FileVerdict {
                source_key: source_key.to_string(),
                valid_rows: 0,
                invalid_rows: 0,
                validated: false,
            }));
        }

        let format = rows[0].format();
        let Some(schema) = schema_for(format) else {
            error!(format = %format, "Schema not found for source");
            return Ok(None);
        };
        debug!(schema = schema.name, rows = rows.len(), "Validating file");

        let results = schema.validate_batch(&rows);
        let mut valid_rows = 0;
        let mut invalid_rows = 0;

        for (row, failures) in rows.iter().zip(results) {
            if failures.is_empty() {
                self.staging.set_quality(row.id, true, None).await?;
                valid_rows += 1;
            } else {
                self.staging.set_quality(row.id, false, Some(true)).await?;
                invalid_rows += 1;
                let cases = serde_json::to_string(&failures).unwrap_or_default();
                debug!(row_id = %row.id, failure_cases = %cases, "Row failed quality checks");
            }
        }

        let validated = invalid_rows == 0;
        self.write_verdict(source_key, validated).await?;

        if validated {
            info!(rows = valid_rows, outcome = "success", "File valid");
        } else {
            error!(invalid_rows, valid_rows, "File invalid");
        }

        Ok(Some(FileVerdict {
            source_key: source_key.to_string(),
            valid_rows,
            invalid_rows,
            validated,
        }))
    }

    async fn write_verdict(&self, source_key: &str, validated: bool) -> WxResult<()> {
        let update = TrackerUpdate::Quality {
            validated,
            at: Utc::now(),
        };
        if self.tracker.update(source_key, update).await?.is_none() {
            warn!(source_key = %source_key, "Quality verdict for untracked file");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::MemoryStore;
    use wx_common::{IngestionRecord, StagingFields, StagingRecord, WundergroundFields};

    const KEY: &str = "raw/Ichtegem_011024/Ichtegem.jsonl";

    fn row(time: &str, humidity: &str) -> StagingRecord {
        let fields = WundergroundFields {
            time_local: Some(time.into()),
            humidity_pct: Some(humidity.into()),
            ..Default::default()
        };
        StagingRecord::new("IICHTE19", KEY, None, StagingFields::Wunderground(fields))
    }

    async fn ingested(store: &MemoryStore, key: &str, rows: Vec<StagingRecord>) {
        store
            .insert_if_absent(IngestionRecord::started(key, Utc::now()))
            .await
            .unwrap();
        store
            .update(
                key,
                TrackerUpdate::Success {
                    at: Utc::now(),
                    lines_read: Some(rows.len() as u64),
                    content_hash: Some("h".into()),
                },
            )
            .await
            .unwrap();
        store.insert_many(rows).await.unwrap();
    }

    fn validator(store: &Arc<MemoryStore>) -> QualityValidator {
        QualityValidator::new(store.clone(), store.clone())
    }

    #[tokio::test]
    async fn test_valid_file() {
        let store = Arc::new(MemoryStore::new());
        ingested(&store, KEY, vec![row("1:00 AM", "80 %"), row("2:00 AM", "81 %")]).await;

        let report = validator(&store).validate_pending_files().await.unwrap();
        assert_eq!(report.valid_files(), 1);

        let record = store.get(KEY).await.unwrap().unwrap();
        assert!(record.quality_validated);
        assert!(record.quality_run_at.is_some());
        assert!(store
            .find_by_source(KEY)
            .await
            .unwrap()
            .iter()
            .all(|r| r.quality_checked && r.quality_error.is_none()));

        // Nothing left pending
        let again = validator(&store).validate_pending_files().await.unwrap();
        assert!(again.files.is_empty());
    }

    #[tokio::test]
    async fn test_one_bad_row_invalidates_file() {
        let store = Arc::new(MemoryStore::new());
        ingested(&store, KEY, vec![row("1:00 AM", "80 %"), row("2:00 AM", "180 %")]).await;

        let verdict = validator(&store).validate_file(KEY).await.unwrap().unwrap();
        assert_eq!(verdict.valid_rows, 1);
        assert_eq!(verdict.invalid_rows, 1);
        assert!(!verdict.validated);

        let rows = store.find_by_source(KEY).await.unwrap();
        assert!(rows[0].passed_quality());
        assert!(!rows[1].quality_checked);
        assert_eq!(rows[1].quality_error, Some(true));

        let record = store.get(KEY).await.unwrap().unwrap();
        assert!(!record.quality_validated);
        assert!(record.quality_run_at.is_some());

        // Invalid files stay pending and are revalidated
        let again = validator(&store).validate_pending_files().await.unwrap();
        assert_eq!(again.invalid_files(), 1);
    }

    #[tokio::test]
    async fn test_empty_file_is_invalid() {
        let store = Arc::new(MemoryStore::new());
        ingested(&store, KEY, vec![]).await;

        let verdict = validator(&store).validate_file(KEY).await.unwrap().unwrap();
        assert!(!verdict.validated);
        let record = store.get(KEY).await.unwrap().unwrap();
        assert!(record.quality_run_at.is_some());
    }

    #[tokio::test]
    async fn test_unknown_format_left_pending() {
        let store = Arc::new(MemoryStore::new());
        let key = "raw/other/file.jsonl";
        let raw = StagingRecord::new("X1", key, None, StagingFields::Raw(Default::default()));
        ingested(&store, key, vec![raw]).await;

        let report = validator(&store).validate_pending_files().await.unwrap();
        assert_eq!(report.unvalidated, vec![key.to_string()]);
        assert_eq!(store.get(key).await.unwrap().unwrap().quality_run_at, None);
    }
}
