//! Per-file ingestion state.
//!
//! One [`IngestionRecord`] per source key decides whether a file is
//! (re)processed. Content hashes are the change signal; storage metadata such
//! as ETags or modification times is not trusted.

use chrono::Utc;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use storage::{TrackerStore, TrackerUpdate};
use wx_common::{IngestionRecord, WxResult};

/// What to do with a listed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestDecision {
    /// Never seen before.
    New,
    /// Known, but its content hash changed.
    Modified,
    /// Known, previous attempt did not succeed.
    Retry,
    /// Already processed with identical content.
    Skip,
}

impl IngestDecision {
    pub fn should_ingest(&self) -> bool {
        !matches!(self, IngestDecision::Skip)
    }
}

impl fmt::Display for IngestDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IngestDecision::New => "new",
            IngestDecision::Modified => "modified",
            IngestDecision::Retry => "retry",
            IngestDecision::Skip => "skip",
        };
        f.write_str(label)
    }
}

/// Owns the lifecycle of ingestion records.
#[derive(Clone)]
pub struct IngestionTracker {
    store: Arc<dyn TrackerStore>,
}

impl IngestionTracker {
    pub fn new(store: Arc<dyn TrackerStore>) -> Self {
        Self { store }
    }

    /// All tracked keys.
    pub async fn register_known(&self) -> WxResult<HashSet<String>> {
        self.store.known_keys().await
    }

    pub async fn get(&self, source_key: &str) -> WxResult<Option<IngestionRecord>> {
        self.store.get(source_key).await
    }

    /// Last recorded content digest.
    pub async fn get_content_hash(&self, source_key: &str) -> WxResult<Option<String>> {
        Ok(self
            .store
            .get(source_key)
            .await?
            .and_then(|record| record.content_hash))
    }

    pub async fn was_successful(&self, source_key: &str) -> WxResult<bool> {
        Ok(self
            .store
            .get(source_key)
            .await?
            .map(|record| record.success)
            .unwrap_or(false))
    }

    /// Create the sentinel record for a first attempt. Existing records are
    /// left untouched.
    pub async fn start(&self, source_key: &str) -> WxResult<()> {
        let created = self
            .store
            .insert_if_absent(IngestionRecord::started(source_key, Utc::now()))
            .await?;
        if created {
            debug!(source_key = %source_key, "Tracking new file");
        }
        Ok(())
    }

    pub async fn mark_success(
        &self,
        source_key: &str,
        lines_read: Option<u64>,
        content_hash: Option<String>,
    ) -> WxResult<()> {
        let update = TrackerUpdate::Success {
            at: Utc::now(),
            lines_read,
            content_hash,
        };
        if self.store.update(source_key, update).await?.is_none() {
            warn!(source_key = %source_key, "Success recorded for untracked file");
        }
        Ok(())
    }

    pub async fn mark_failure(&self, source_key: &str, error_message: &str) -> WxResult<()> {
        let update = TrackerUpdate::Failure {
            at: Utc::now(),
            message: error_message.to_string(),
        };
        if self.store.update(source_key, update).await?.is_none() {
            warn!(source_key = %source_key, "Failure recorded for untracked file");
        }
        Ok(())
    }

    /// Forget the quality verdict so the file is validated again.
    pub async fn reset_quality(&self, source_key: &str) -> WxResult<()> {
        self.store
            .update(source_key, TrackerUpdate::ResetQuality)
            .await?;
        Ok(())
    }

    /// Delete the record entirely. Returns whether one existed.
    pub async fn reset(&self, source_key: &str) -> WxResult<bool> {
        let removed = self.store.delete(source_key).await?;
        if removed {
            info!(source_key = %source_key, "Tracker record reset");
        } else {
            warn!(source_key = %source_key, "No tracker record to reset");
        }
        Ok(removed)
    }

    /// Records whose last attempt did not succeed.
    pub async fn pending_or_failed(&self) -> WxResult<Vec<IngestionRecord>> {
        self.store.find_by_success(false).await
    }

    /// Apply the NEW / MODIFIED / FAILED / SKIP policy.
    ///
    /// `known` is the key set from [`register_known`](Self::register_known),
    /// loaded once per batch.
    pub async fn decide(
        &self,
        source_key: &str,
        current_hash: &str,
        known: &HashSet<String>,
    ) -> WxResult<IngestDecision> {
        if !known.contains(source_key) {
            return Ok(IngestDecision::New);
        }

        let record = self.store.get(source_key).await?;
        let previous_hash = record.as_ref().and_then(|r| r.content_hash.as_deref());
        if previous_hash.is_some_and(|h| h != current_hash) {
            return Ok(IngestDecision::Modified);
        }

        if !record.map(|r| r.success).unwrap_or(false) {
            return Ok(IngestDecision::Retry);
        }

        Ok(IngestDecision::Skip)
    }
}
