//! PostgreSQL-backed store for tracker, staging and final records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, types::Json, FromRow, PgPool};
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

use wx_common::{
    FinalRecord, IngestionRecord, StagingFields, StagingRecord, WxError, WxResult,
};

use crate::store::{
    DuplicateGroup, FinalStore, InsertOutcome, StagingStore, TrackerStore, TrackerUpdate,
};

/// Database connection pool and record operations.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store from a database URL.
    pub async fn connect(database_url: &str) -> WxResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await
            .map_err(|e| WxError::DatabaseError(format!("Connection failed: {}", e)))?;

        Ok(Self { pool })
    }

    /// Create tables and indexes. Safe to run repeatedly.
    pub async fn migrate(&self) -> WxResult<()> {
        // Split SQL statements and execute them individually
        for statement in SCHEMA_SQL.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| WxError::DatabaseError(format!("Migration failed: {}", e)))?;
            }
        }

        Ok(())
    }
}

fn query_failed(e: sqlx::Error) -> WxError {
    WxError::DatabaseError(format!("Query failed: {}", e))
}

#[async_trait]
impl TrackerStore for PgStore {
    async fn known_keys(&self) -> WxResult<HashSet<String>> {
        let keys = sqlx::query_scalar::<_, String>("SELECT source_key FROM ingestion_tracker")
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;

        Ok(keys.into_iter().collect())
    }

    async fn get(&self, source_key: &str) -> WxResult<Option<IngestionRecord>> {
        let row = sqlx::query_as::<_, TrackerRow>(
            "SELECT * FROM ingestion_tracker WHERE source_key = $1",
        )
        .bind(source_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed)?;

        Ok(row.map(Into::into))
    }

    async fn insert_if_absent(&self, record: IngestionRecord) -> WxResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO ingestion_tracker (
                source_key, first_seen, last_processed, success, error_message,
                lines_read, content_hash, quality_validated, quality_run_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(&record.source_key)
        .bind(record.first_seen)
        .bind(record.last_processed)
        .bind(record.success)
        .bind(&record.error_message)
        .bind(record.lines_read.map(|n| n as i64))
        .bind(&record.content_hash)
        .bind(record.quality_validated)
        .bind(record.quality_run_at)
        .execute(&self.pool)
        .await
        .map_err(|e| WxError::DatabaseError(format!("Insert failed: {}", e)))?;

        Ok(result.rows_affected() == 1)
    }

    async fn update(
        &self,
        source_key: &str,
        update: TrackerUpdate,
    ) -> WxResult<Option<IngestionRecord>> {
        let query = match &update {
            TrackerUpdate::Success {
                at,
                lines_read,
                content_hash,
            } => sqlx::query_as::<_, TrackerRow>(
                "UPDATE ingestion_tracker SET last_processed = $2, success = TRUE, \
                 error_message = NULL, lines_read = COALESCE($3, lines_read), \
                 content_hash = COALESCE($4, content_hash) \
                 WHERE source_key = $1 RETURNING *",
            )
            .bind(source_key)
            .bind(*at)
            .bind(lines_read.map(|n| n as i64))
            .bind(content_hash.clone()),
            TrackerUpdate::Failure { at, message } => sqlx::query_as::<_, TrackerRow>(
                "UPDATE ingestion_tracker SET last_processed = $2, success = FALSE, \
                 error_message = $3 WHERE source_key = $1 RETURNING *",
            )
            .bind(source_key)
            .bind(*at)
            .bind(message.clone()),
            TrackerUpdate::Quality { validated, at } => sqlx::query_as::<_, TrackerRow>(
                "UPDATE ingestion_tracker SET quality_validated = $2, quality_run_at = $3 \
                 WHERE source_key = $1 RETURNING *",
            )
            .bind(source_key)
            .bind(*validated)
            .bind(*at),
            TrackerUpdate::ResetQuality => sqlx::query_as::<_, TrackerRow>(
                "UPDATE ingestion_tracker SET quality_validated = FALSE, quality_run_at = NULL \
                 WHERE source_key = $1 RETURNING *",
            )
            .bind(source_key),
        };

        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| WxError::DatabaseError(format!("Update failed: {}", e)))?;

        Ok(row.map(Into::into))
    }

    async fn delete(&self, source_key: &str) -> WxResult<bool> {
        let result = sqlx::query("DELETE FROM ingestion_tracker WHERE source_key = $1")
            .bind(source_key)
            .execute(&self.pool)
            .await
            .map_err(|e| WxError::DatabaseError(format!("Delete failed: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_success(&self, success: bool) -> WxResult<Vec<IngestionRecord>> {
        let rows = sqlx::query_as::<_, TrackerRow>(
            "SELECT * FROM ingestion_tracker WHERE success = $1 ORDER BY source_key",
        )
        .bind(success)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_awaiting_quality(&self) -> WxResult<Vec<IngestionRecord>> {
        let rows = sqlx::query_as::<_, TrackerRow>(
            "SELECT * FROM ingestion_tracker \
             WHERE success = TRUE AND quality_validated = FALSE ORDER BY source_key",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn keys_with_quality(&self, validated: bool) -> WxResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT source_key FROM ingestion_tracker \
             WHERE quality_run_at IS NOT NULL AND quality_validated = $1 ORDER BY source_key",
        )
        .bind(validated)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)
    }
}

#[async_trait]
impl StagingStore for PgStore {
    async fn insert_many(&self, rows: Vec<StagingRecord>) -> WxResult<usize> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| WxError::DatabaseError(format!("Begin failed: {}", e)))?;

        let count = rows.len();
        for row in &rows {
            sqlx::query(
                r#"
                INSERT INTO hourly_staging (
                    id, station_id, source_key, observation_time,
                    quality_checked, quality_error, fields
                ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(row.id)
            .bind(&row.station_id)
            .bind(&row.source_key)
            .bind(row.observation_time)
            .bind(row.quality_checked)
            .bind(row.quality_error)
            .bind(Json(&row.fields))
            .execute(&mut *tx)
            .await
            .map_err(|e| WxError::DatabaseError(format!("Insert failed: {}", e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| WxError::DatabaseError(format!("Commit failed: {}", e)))?;

        Ok(count)
    }

    async fn find_by_source(&self, source_key: &str) -> WxResult<Vec<StagingRecord>> {
        let rows = sqlx::query_as::<_, StagingRow>(
            "SELECT id, station_id, source_key, observation_time, quality_checked, \
             quality_error, fields FROM hourly_staging WHERE source_key = $1 ORDER BY seq",
        )
        .bind(source_key)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_quality_passed(&self) -> WxResult<Vec<StagingRecord>> {
        let rows = sqlx::query_as::<_, StagingRow>(
            "SELECT id, station_id, source_key, observation_time, quality_checked, \
             quality_error, fields FROM hourly_staging \
             WHERE quality_checked = TRUE AND (quality_error IS NULL OR quality_error = FALSE) \
             ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn set_quality(&self, id: Uuid, checked: bool, error: Option<bool>) -> WxResult<()> {
        sqlx::query(
            "UPDATE hourly_staging SET quality_checked = $2, quality_error = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(checked)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| WxError::DatabaseError(format!("Update failed: {}", e)))?;

        Ok(())
    }

    async fn delete_by_source(&self, source_key: &str) -> WxResult<u64> {
        let result = sqlx::query("DELETE FROM hourly_staging WHERE source_key = $1")
            .bind(source_key)
            .execute(&self.pool)
            .await
            .map_err(|e| WxError::DatabaseError(format!("Delete failed: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn count_by_source(&self, source_key: &str) -> WxResult<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM hourly_staging WHERE source_key = $1",
        )
        .bind(source_key)
        .fetch_one(&self.pool)
        .await
        .map_err(query_failed)?;

        Ok(count as u64)
    }
}

#[async_trait]
impl FinalStore for PgStore {
    async fn insert(&self, record: FinalRecord) -> WxResult<InsertOutcome> {
        let m = &record.measurements;
        let result = sqlx::query(
            r#"
            INSERT INTO hourly_measurements (
                station_id, observation_time_utc, source_key,
                temperature_c, pressure_hpa, humidity_pct, dew_point_c, visibility_m,
                wind_mean_kmh, wind_gust_kmh, wind_direction_deg,
                rain_3h_mm, rain_1h_mm, snow_depth_cm, cloud_cover_okta, weather_code,
                precip_rate_mm, precip_accum_mm, uv_index, solar_wm2
            ) VALUES (
                $1, $2, $3,
                $4, $5, $6, $7, $8,
                $9, $10, $11,
                $12, $13, $14, $15, $16,
                $17, $18, $19, $20
            )
            ON CONFLICT (station_id, observation_time_utc, source_key) DO NOTHING
            "#,
        )
        .bind(&record.station_id)
        .bind(record.observation_time_utc)
        .bind(&record.source_key)
        .bind(m.temperature_c)
        .bind(m.pressure_hpa)
        .bind(m.humidity_pct)
        .bind(m.dew_point_c)
        .bind(m.visibility_m)
        .bind(m.wind_mean_kmh)
        .bind(m.wind_gust_kmh)
        .bind(m.wind_direction_deg)
        .bind(m.rain_3h_mm)
        .bind(m.rain_1h_mm)
        .bind(m.snow_depth_cm)
        .bind(m.cloud_cover_okta)
        .bind(m.weather_code)
        .bind(m.precip_rate_mm)
        .bind(m.precip_accum_mm)
        .bind(m.uv_index)
        .bind(m.solar_wm2)
        .execute(&self.pool)
        .await
        .map_err(|e| WxError::DatabaseError(format!("Insert failed: {}", e)))?;

        Ok(if result.rows_affected() == 0 {
            InsertOutcome::Duplicate
        } else {
            InsertOutcome::Inserted
        })
    }

    async fn count_by_source(&self, source_key: &str) -> WxResult<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM hourly_measurements WHERE source_key = $1",
        )
        .bind(source_key)
        .fetch_one(&self.pool)
        .await
        .map_err(query_failed)?;

        Ok(count as u64)
    }

    async fn delete_by_source(&self, source_key: &str) -> WxResult<u64> {
        let result = sqlx::query("DELETE FROM hourly_measurements WHERE source_key = $1")
            .bind(source_key)
            .execute(&self.pool)
            .await
            .map_err(|e| WxError::DatabaseError(format!("Delete failed: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn distinct_sources(&self) -> WxResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT source_key FROM hourly_measurements ORDER BY source_key",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)
    }

    async fn duplicate_groups(&self) -> WxResult<Vec<DuplicateGroup>> {
        let rows = sqlx::query_as::<_, (String, DateTime<Utc>, i64)>(
            "SELECT station_id, observation_time_utc, COUNT(*) FROM hourly_measurements \
             GROUP BY station_id, observation_time_utc HAVING COUNT(*) > 1 \
             ORDER BY station_id, observation_time_utc",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        Ok(rows
            .into_iter()
            .map(|(station_id, observation_time_utc, count)| DuplicateGroup {
                station_id,
                observation_time_utc,
                count: count as u64,
            })
            .collect())
    }
}

/// Internal row type for tracker queries.
#[derive(FromRow)]
struct TrackerRow {
    source_key: String,
    first_seen: DateTime<Utc>,
    last_processed: DateTime<Utc>,
    success: bool,
    error_message: Option<String>,
    lines_read: Option<i64>,
    content_hash: Option<String>,
    quality_validated: bool,
    quality_run_at: Option<DateTime<Utc>>,
}

impl From<TrackerRow> for IngestionRecord {
    fn from(row: TrackerRow) -> Self {
        IngestionRecord {
            source_key: row.source_key,
            first_seen: row.first_seen,
            last_processed: row.last_processed,
            success: row.success,
            error_message: row.error_message,
            lines_read: row.lines_read.map(|n| n as u64),
            content_hash: row.content_hash,
            quality_validated: row.quality_validated,
            quality_run_at: row.quality_run_at,
        }
    }
}

/// Internal row type for staging queries.
#[derive(FromRow)]
struct StagingRow {
    id: Uuid,
    station_id: String,
    source_key: String,
    observation_time: Option<DateTime<Utc>>,
    quality_checked: bool,
    quality_error: Option<bool>,
    fields: Json<StagingFields>,
}

impl From<StagingRow> for StagingRecord {
    fn from(row: StagingRow) -> Self {
        StagingRecord {
            id: row.id,
            station_id: row.station_id,
            source_key: row.source_key,
            observation_time: row.observation_time,
            quality_checked: row.quality_checked,
            quality_error: row.quality_error,
            fields: row.fields.0,
        }
    }
}

/// Database schema SQL.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS ingestion_tracker (
    source_key TEXT PRIMARY KEY,
    first_seen TIMESTAMPTZ NOT NULL,
    last_processed TIMESTAMPTZ NOT NULL,
    success BOOLEAN NOT NULL DEFAULT FALSE,
    error_message TEXT,
    lines_read BIGINT,
    content_hash TEXT,
    quality_validated BOOLEAN NOT NULL DEFAULT FALSE,
    quality_run_at TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS idx_tracker_success ON ingestion_tracker(success);

CREATE TABLE IF NOT EXISTS hourly_staging (
    id UUID PRIMARY KEY,
    seq BIGSERIAL,
    station_id TEXT NOT NULL,
    source_key TEXT NOT NULL,
    observation_time TIMESTAMPTZ,
    quality_checked BOOLEAN NOT NULL DEFAULT FALSE,
    quality_error BOOLEAN,
    fields JSONB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_staging_source_key ON hourly_staging(source_key);
CREATE INDEX IF NOT EXISTS idx_staging_quality ON hourly_staging(quality_checked, quality_error);

CREATE TABLE IF NOT EXISTS hourly_measurements (
    station_id TEXT NOT NULL,
    observation_time_utc TIMESTAMPTZ NOT NULL,
    source_key TEXT NOT NULL,
    temperature_c DOUBLE PRECISION,
    pressure_hpa DOUBLE PRECISION,
    humidity_pct DOUBLE PRECISION,
    dew_point_c DOUBLE PRECISION,
    visibility_m DOUBLE PRECISION,
    wind_mean_kmh DOUBLE PRECISION,
    wind_gust_kmh DOUBLE PRECISION,
    wind_direction_deg DOUBLE PRECISION,
    rain_3h_mm DOUBLE PRECISION,
    rain_1h_mm DOUBLE PRECISION,
    snow_depth_cm DOUBLE PRECISION,
    cloud_cover_okta INTEGER,
    weather_code INTEGER,
    precip_rate_mm DOUBLE PRECISION,
    precip_accum_mm DOUBLE PRECISION,
    uv_index DOUBLE PRECISION,
    solar_wm2 DOUBLE PRECISION,
    inserted_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    UNIQUE(station_id, observation_time_utc, source_key)
);

CREATE INDEX IF NOT EXISTS idx_measurements_source_key ON hourly_measurements(source_key)
"#;
