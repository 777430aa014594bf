//! Persistence interfaces for the three record kinds.
//!
//! Every operation is a single-record atomic read or write; there are no
//! multi-record transactions. Callers assume a single writer per source key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

use wx_common::{FinalRecord, IngestionRecord, StagingRecord, WxResult};

/// Partial update applied to an [`IngestionRecord`].
///
/// Each variant touches only the fields it names.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerUpdate {
    /// Sets `success`, clears `error_message`; `lines_read` and
    /// `content_hash` are only written when present.
    Success {
        at: DateTime<Utc>,
        lines_read: Option<u64>,
        content_hash: Option<String>,
    },
    /// Clears `success` and records the message.
    Failure { at: DateTime<Utc>, message: String },
    /// File-level quality verdict.
    Quality { validated: bool, at: DateTime<Utc> },
    /// Forget a previous quality verdict so the file is validated again.
    ResetQuality,
}

impl TrackerUpdate {
    /// Apply this update to an in-memory record.
    pub fn apply(&self, record: &mut IngestionRecord) {
        match self {
            TrackerUpdate::Success {
                at,
                lines_read,
                content_hash,
            } => {
                record.last_processed = *at;
                record.success = true;
                record.error_message = None;
                if let Some(lines) = lines_read {
                    record.lines_read = Some(*lines);
                }
                if let Some(hash) = content_hash {
                    record.content_hash = Some(hash.clone());
                }
            }
            TrackerUpdate::Failure { at, message } => {
                record.last_processed = *at;
                record.success = false;
                record.error_message = Some(message.clone());
            }
            TrackerUpdate::Quality { validated, at } => {
                record.quality_validated = *validated;
                record.quality_run_at = Some(*at);
            }
            TrackerUpdate::ResetQuality => {
                record.quality_validated = false;
                record.quality_run_at = None;
            }
        }
    }
}

/// Outcome of inserting a final record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record with the same (station, time, source key) already exists.
    Duplicate,
}

/// A (station, time) pair held by more than one final record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub station_id: String,
    pub observation_time_utc: DateTime<Utc>,
    pub count: u64,
}

/// Storage for per-file ingestion state, keyed by source key.
#[async_trait]
pub trait TrackerStore: Send + Sync {
    /// All tracked source keys.
    async fn known_keys(&self) -> WxResult<HashSet<String>>;

    async fn get(&self, source_key: &str) -> WxResult<Option<IngestionRecord>>;

    /// Insert unless a record with the same key exists. Returns whether a
    /// record was created; an existing record is never modified.
    async fn insert_if_absent(&self, record: IngestionRecord) -> WxResult<bool>;

    /// Apply a partial update, returning the record after the update.
    async fn update(
        &self,
        source_key: &str,
        update: TrackerUpdate,
    ) -> WxResult<Option<IngestionRecord>>;

    /// Remove a record. Returns whether one existed.
    async fn delete(&self, source_key: &str) -> WxResult<bool>;

    async fn find_by_success(&self, success: bool) -> WxResult<Vec<IngestionRecord>>;

    /// Records that ingested successfully and are not quality-validated.
    async fn find_awaiting_quality(&self) -> WxResult<Vec<IngestionRecord>>;

    /// Keys whose quality verdict was written and equals `validated`.
    async fn keys_with_quality(&self, validated: bool) -> WxResult<Vec<String>>;
}

/// Storage for staging rows.
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Bulk insert, preserving order. Returns the number of rows written.
    async fn insert_many(&self, rows: Vec<StagingRecord>) -> WxResult<usize>;

    /// Rows of one file in insertion order.
    async fn find_by_source(&self, source_key: &str) -> WxResult<Vec<StagingRecord>>;

    /// Rows with `quality_checked` set and no quality error, in insertion order.
    async fn find_quality_passed(&self) -> WxResult<Vec<StagingRecord>>;

    async fn set_quality(&self, id: Uuid, checked: bool, error: Option<bool>) -> WxResult<()>;

    /// Remove every row of one file. Returns the number removed.
    async fn delete_by_source(&self, source_key: &str) -> WxResult<u64>;

    async fn count_by_source(&self, source_key: &str) -> WxResult<u64>;
}

/// Storage for final records, unique on (station, time, source key).
#[async_trait]
pub trait FinalStore: Send + Sync {
    async fn insert(&self, record: FinalRecord) -> WxResult<InsertOutcome>;

    async fn count_by_source(&self, source_key: &str) -> WxResult<u64>;

    /// Remove every record promoted from one file. Returns the number removed.
    async fn delete_by_source(&self, source_key: &str) -> WxResult<u64>;

    async fn distinct_sources(&self) -> WxResult<Vec<String>>;

    /// (station, time) groups with more than one record.
    async fn duplicate_groups(&self) -> WxResult<Vec<DuplicateGroup>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_update_keeps_absent_fields() {
        let now = Utc::now();
        let mut record = IngestionRecord::started("k", now);
        record.lines_read = Some(10);
        record.content_hash = Some("abc".into());
        record.error_message = Some("old".into());

        TrackerUpdate::Success {
            at: now,
            lines_read: None,
            content_hash: None,
        }
        .apply(&mut record);

        assert!(record.success);
        assert_eq!(record.error_message, None);
        assert_eq!(record.lines_read, Some(10));
        assert_eq!(record.content_hash.as_deref(), Some("abc"));
    }

    #[test]
    fn test_failure_update_keeps_hash() {
        let now = Utc::now();
        let mut record = IngestionRecord::started("k", now);
        record.success = true;
        record.content_hash = Some("abc".into());

        TrackerUpdate::Failure {
            at: now,
            message: "boom".into(),
        }
        .apply(&mut record);

        assert!(!record.success);
        assert_eq!(record.error_message.as_deref(), Some("boom"));
        assert_eq!(record.content_hash.as_deref(), Some("abc"));
    }

    #[test]
    fn test_quality_then_reset() {
        let now = Utc::now();
        let mut record = IngestionRecord::started("k", now);
        TrackerUpdate::Quality { validated: true, at: now }.apply(&mut record);
        assert!(record.quality_validated);
        assert_eq!(record.quality_run_at, Some(now));

        TrackerUpdate::ResetQuality.apply(&mut record);
        assert!(!record.quality_validated);
        assert_eq!(record.quality_run_at, None);
    }
}
