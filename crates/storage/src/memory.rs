//! In-process store for the tracker, staging and final record kinds.
//!
//! Backs tests and runs without a database URL. Each collection sits behind its
//! own `RwLock`, which gives the same per-record atomicity as the database.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use wx_common::{FinalRecord, IngestionRecord, StagingRecord, WxResult};

use crate::store::{
    DuplicateGroup, FinalStore, InsertOutcome, StagingStore, TrackerStore, TrackerUpdate,
};

#[derive(Default)]
pub struct MemoryStore {
    tracker: RwLock<BTreeMap<String, IngestionRecord>>,
    staging: RwLock<Vec<StagingRecord>>,
    finals: RwLock<Vec<FinalRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every staging row.
    pub async fn staging_rows(&self) -> Vec<StagingRecord> {
        self.staging.read().await.clone()
    }

    /// Snapshot of every final record.
    pub async fn final_records(&self) -> Vec<FinalRecord> {
        self.finals.read().await.clone()
    }
}

#[async_trait]
impl TrackerStore for MemoryStore {
    async fn known_keys(&self) -> WxResult<HashSet<String>> {
        Ok(self.tracker.read().await.keys().cloned().collect())
    }

    async fn get(&self, source_key: &str) -> WxResult<Option<IngestionRecord>> {
        Ok(self.tracker.read().await.get(source_key).cloned())
    }

    async fn insert_if_absent(&self, record: IngestionRecord) -> WxResult<bool> {
        let mut tracker = self.tracker.write().await;
        if tracker.contains_key(&record.source_key) {
            return Ok(false);
        }
        tracker.insert(record.source_key.clone(), record);
        Ok(true)
    }

    async fn update(
        &self,
        source_key: &str,
        update: TrackerUpdate,
    ) -> WxResult<Option<IngestionRecord>> {
        let mut tracker = self.tracker.write().await;
        Ok(tracker.get_mut(source_key).map(|record| {
            update.apply(record);
            record.clone()
        }))
    }

    async fn delete(&self, source_key: &str) -> WxResult<bool> {
        Ok(self.tracker.write().await.remove(source_key).is_some())
    }

    async fn find_by_success(&self, success: bool) -> WxResult<Vec<IngestionRecord>> {
        Ok(self
            .tracker
            .read()
            .await
            .values()
            .filter(|r| r.success == success)
            .cloned()
            .collect())
    }

    async fn find_awaiting_quality(&self) -> WxResult<Vec<IngestionRecord>> {
        Ok(self
            .tracker
            .read()
            .await
            .values()
            .filter(|r| r.awaiting_quality())
            .cloned()
            .collect())
    }

    async fn keys_with_quality(&self, validated: bool) -> WxResult<Vec<String>> {
        Ok(self
            .tracker
            .read()
            .await
            .values()
            .filter(|r| r.quality_run_at.is_some() && r.quality_validated == validated)
            .map(|r| r.source_key.clone())
            .collect())
    }
}

#[async_trait]
impl StagingStore for MemoryStore {
    async fn insert_many(&self, rows: Vec<StagingRecord>) -> WxResult<usize> {
        let count = rows.len();
        self.staging.write().await.extend(rows);
        Ok(count)
    }

    async fn find_by_source(&self, source_key: &str) -> WxResult<Vec<StagingRecord>> {
        Ok(self
            .staging
            .read()
            .await
            .iter()
            .filter(|r| r.source_key == source_key)
            .cloned()
            .collect())
    }

    async fn find_quality_passed(&self) -> WxResult<Vec<StagingRecord>> {
        Ok(self
            .staging
            .read()
            .await
            .iter()
            .filter(|r| r.passed_quality())
            .cloned()
            .collect())
    }

    async fn set_quality(&self, id: Uuid, checked: bool, error: Option<bool>) -> WxResult<()> {
        let mut staging = self.staging.write().await;
        if let Some(row) = staging.iter_mut().find(|r| r.id == id) {
            row.quality_checked = checked;
            row.quality_error = error;
        }
        Ok(())
    }

    async fn delete_by_source(&self, source_key: &str) -> WxResult<u64> {
        let mut staging = self.staging.write().await;
        let before = staging.len();
        staging.retain(|r| r.source_key != source_key);
        Ok((before - staging.len()) as u64)
    }

    async fn count_by_source(&self, source_key: &str) -> WxResult<u64> {
        Ok(self
            .staging
            .read()
            .await
            .iter()
            .filter(|r| r.source_key == source_key)
            .count() as u64)
    }
}

#[async_trait]
impl FinalStore for MemoryStore {
    async fn insert(&self, record: FinalRecord) -> WxResult<InsertOutcome> {
        let mut finals = self.finals.write().await;
        let exists = finals.iter().any(|r| {
            r.station_id == record.station_id
                && r.observation_time_utc == record.observation_time_utc
                && r.source_key == record.source_key
        });
        if exists {
            return Ok(InsertOutcome::Duplicate);
        }
        finals.push(record);
        Ok(InsertOutcome::Inserted)
    }

    async fn count_by_source(&self, source_key: &str) -> WxResult<u64> {
        Ok(self
            .finals
            .read()
            .await
            .iter()
            .filter(|r| r.source_key == source_key)
            .count() as u64)
    }

    async fn delete_by_source(&self, source_key: &str) -> WxResult<u64> {
        let mut finals = self.finals.write().await;
        let before = finals.len();
        finals.retain(|r| r.source_key != source_key);
        Ok((before - finals.len()) as u64)
    }

    async fn distinct_sources(&self) -> WxResult<Vec<String>> {
        let finals = self.finals.read().await;
        let mut seen = HashSet::new();
        Ok(finals
            .iter()
            .filter(|r| seen.insert(r.source_key.as_str()))
            .map(|r| r.source_key.clone())
            .collect())
    }

    async fn duplicate_groups(&self) -> WxResult<Vec<DuplicateGroup>> {
        let finals = self.finals.read().await;
        let mut counts: HashMap<(&str, _), u64> = HashMap::new();
        for r in finals.iter() {
            *counts
                .entry((r.station_id.as_str(), r.observation_time_utc))
                .or_default() += 1;
        }

        let mut groups: Vec<DuplicateGroup> = counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|((station_id, observation_time_utc), count)| DuplicateGroup {
                station_id: station_id.to_string(),
                observation_time_utc,
                count,
            })
            .collect();
        groups.sort_by(|a, b| {
            (&a.station_id, a.observation_time_utc).cmp(&(&b.station_id, b.observation_time_utc))
        });
        Ok(groups)
    }
}
