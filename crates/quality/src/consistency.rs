//! Staging-to-final consistency checks.
//!
//! Read-only: findings are logged and returned, nothing is repaired.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info, warn};

use storage::{DuplicateGroup, FinalStore, StagingStore, TrackerStore};
use wx_common::{SourceFormat, WxResult};

/// Maximum keys listed per finding in the log.
const LOG_SAMPLE: usize = 20;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsistencyReport {
    /// Quality-validated files with no final records.
    pub validated_missing_in_final: Vec<String>,
    /// Quality-invalid files with final records.
    pub invalid_in_final: Vec<String>,
    /// (station, time) pairs held by more than one final record.
    pub duplicate_groups: Vec<DuplicateGroup>,
    /// Formats present among validated files but absent from the final store.
    pub formats_missing_in_final: Vec<SourceFormat>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.validated_missing_in_final.is_empty()
            && self.invalid_in_final.is_empty()
            && self.duplicate_groups.is_empty()
            && self.formats_missing_in_final.is_empty()
    }
}

pub struct ConsistencyChecker {
    tracker: Arc<dyn TrackerStore>,
    staging: Arc<dyn StagingStore>,
    finals: Arc<dyn FinalStore>,
}

impl ConsistencyChecker {
    pub fn new(
        tracker: Arc<dyn TrackerStore>,
        staging: Arc<dyn StagingStore>,
        finals: Arc<dyn FinalStore>,
    ) -> Self {
        Self {
            tracker,
            staging,
            finals,
        }
    }

    pub async fn run(&self) -> WxResult<ConsistencyReport> {
        info!("Running staging to final consistency check");
        let mut report = ConsistencyReport::default();

        let valid_files = self.tracker.keys_with_quality(true).await?;
        for key in &valid_files {
            if self.finals.count_by_source(key).await? == 0 {
                report.validated_missing_in_final.push(key.clone());
            }
        }
        log_keys(
            &report.validated_missing_in_final,
            "Validated files missing in final",
            "All validated files appear in final",
        );

        for key in self.tracker.keys_with_quality(false).await? {
            if self.finals.count_by_source(&key).await? > 0 {
                report.invalid_in_final.push(key);
            }
        }
        log_keys(
            &report.invalid_in_final,
            "Invalid files present in final",
            "No invalid file leaked into final",
        );

        report.duplicate_groups = self.finals.duplicate_groups().await?;
        if report.duplicate_groups.is_empty() {
            info!(outcome = "success", "No duplicate (station, time) groups in final");
        } else {
            error!(
                groups = report.duplicate_groups.len(),
                "Duplicate (station, time) groups in final"
            );
            for group in report.duplicate_groups.iter().take(LOG_SAMPLE) {
                warn!(
                    station_id = %group.station_id,
                    observation_time = %group.observation_time_utc,
                    count = group.count,
                    "Duplicate group"
                );
            }
        }

        let validated_formats = self.formats_of(&valid_files).await?;
        let final_formats = self
            .formats_of(&self.finals.distinct_sources().await?)
            .await?;
        report.formats_missing_in_final = validated_formats
            .difference(&final_formats)
            .copied()
            .collect();
        for format in &report.formats_missing_in_final {
            error!(format = %format, "Source appears in validated staging but not in final");
        }

        info!(consistent = report.is_consistent(), "Consistency check completed");
        Ok(report)
    }

    /// Formats of the given files, read from their staging rows.
    async fn formats_of(&self, keys: &[String]) -> WxResult<BTreeSet<SourceFormat>> {
        let mut formats = BTreeSet::new();
        for key in keys {
            if let Some(row) = self.staging.find_by_source(key).await?.first() {
                formats.insert(row.format());
            }
        }
        Ok(formats)
    }
}

fn log_keys(keys: &[String], problem: &str, ok: &str) {
    if keys.is_empty() {
        info!(outcome = "success", "{}", ok);
        return;
    }
    error!(files = keys.len(), "{}", problem);
    for key in keys.iter().take(LOG_SAMPLE) {
        warn!(source_key = %key, "{}", problem);
    }
}
