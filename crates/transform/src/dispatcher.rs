//! Routes quality-passed staging rows to their normalization path and writes
//! canonical final records.

use chrono_tz::Tz;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use storage::{FinalStore, InsertOutcome, StagingStore, TrackerStore};
use wx_common::{
    FinalDraft, FinalRecord, InfoClimatFields, Measurements, StagingFields, StagingRecord,
    WundergroundFields, WxResult,
};

use crate::time::{extract_key_date, local_time_to_utc, DEFAULT_SOURCE_TIMEZONE};
use crate::units::{
    compass_to_degrees, f_to_c, inches_to_mm, inhg_to_hpa, mph_to_kmh, parse_float_strict,
    parse_int, parse_okta,
};

/// Counters for one transform run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransformSummary {
    /// InfoClimat rows copied into the final store.
    pub copied: usize,
    /// Per-line rows converted and inserted.
    pub transformed: usize,
    /// Rows already present in the final store.
    pub duplicates: usize,
    /// Rows of unknown format or of files not quality-validated.
    pub skipped: usize,
    /// Rows rejected by final-record shape validation.
    pub errors: usize,
}

/// Promotes staging rows into the final store.
pub struct Transformer {
    tracker: Arc<dyn TrackerStore>,
    staging: Arc<dyn StagingStore>,
    finals: Arc<dyn FinalStore>,
    timezone: Tz,
}

impl Transformer {
    pub fn new(
        tracker: Arc<dyn TrackerStore>,
        staging: Arc<dyn StagingStore>,
        finals: Arc<dyn FinalStore>,
    ) -> Self {
        Self {
            tracker,
            staging,
            finals,
            timezone: DEFAULT_SOURCE_TIMEZONE,
        }
    }

    /// Time zone used to read per-line local times.
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Transform every quality-passed row of every quality-validated file.
    ///
    /// Shape failures are counted and skipped; store failures propagate.
    /// Re-running is idempotent: rows already promoted count as duplicates.
    pub async fn transform_validated_rows(&self) -> WxResult<TransformSummary> {
        let start = Instant::now();
        info!("Starting hourly transform");

        let validated: HashSet<String> = self
            .tracker
            .keys_with_quality(true)
            .await?
            .into_iter()
            .collect();
        let rows = self.staging.find_quality_passed().await?;
        info!(rows = rows.len(), files = validated.len(), "Rows matching quality gate");

        let mut summary = TransformSummary::default();

        for row in &rows {
            if !validated.contains(&row.source_key) {
                debug!(
                    source_key = %row.source_key,
                    row_id = %row.id,
                    "File not quality-validated, skipping row"
                );
                summary.skipped += 1;
                continue;
            }

            let Some(draft) = transform_row(row, self.timezone) else {
                debug!(
                    source_key = %row.source_key,
                    format = %row.format(),
                    "No transform for source format, skipping row"
                );
                summary.skipped += 1;
                continue;
            };

            let record = match FinalRecord::from_draft(draft) {
                Ok(record) => record,
                Err(errors) => {
                    warn!(
                        station_id = %row.station_id,
                        source_key = %row.source_key,
                        error = %errors,
                        "Final record validation failed"
                    );
                    summary.errors += 1;
                    continue;
                }
            };

            match self.finals.insert(record).await? {
                InsertOutcome::Inserted => match row.fields {
                    StagingFields::InfoClimat(_) => summary.copied += 1,
                    _ => summary.transformed += 1,
                },
                InsertOutcome::Duplicate => summary.duplicates += 1,
            }
        }

        info!(
            copied = summary.copied,
            transformed = summary.transformed,
            duplicates = summary.duplicates,
            skipped = summary.skipped,
            errors = summary.errors,
            duration_ms = start.elapsed().as_millis() as u64,
            outcome = "success",
            "Hourly transform finished"
        );

        Ok(summary)
    }
}

/// Build the final draft for one staging row.
///
/// Returns `None` for formats without a transform.
pub fn transform_row(row: &StagingRecord, timezone: Tz) -> Option<FinalDraft> {
    let measurements = match &row.fields {
        StagingFields::InfoClimat(fields) => infoclimat_measurements(fields),
        StagingFields::Wunderground(fields) => wunderground_measurements(fields),
        StagingFields::Raw(_) => return None,
    };

    let observation_time_utc = match &row.fields {
        StagingFields::Wunderground(fields) => local_time_to_utc(
            fields.time_local.as_deref(),
            extract_key_date(&row.source_key),
            timezone,
        ),
        _ => row.observation_time,
    };

    Some(FinalDraft {
        station_id: Some(row.station_id.clone()),
        observation_time_utc,
        source_key: Some(row.source_key.clone()),
        measurements,
    })
}

fn strict(value: &Option<String>) -> Option<f64> {
    value.as_deref().and_then(parse_float_strict)
}

/// Values are already in canonical units.
fn infoclimat_measurements(f: &InfoClimatFields) -> Measurements {
    Measurements {
        temperature_c: strict(&f.temperature_c),
        pressure_hpa: strict(&f.pressure_hpa),
        humidity_pct: strict(&f.humidity_pct),
        dew_point_c: strict(&f.dew_point_c),
        visibility_m: strict(&f.visibility_m),
        wind_mean_kmh: strict(&f.wind_mean_kmh),
        wind_gust_kmh: strict(&f.wind_gust_kmh),
        wind_direction_deg: strict(&f.wind_direction_deg),
        rain_3h_mm: strict(&f.rain_3h_mm),
        rain_1h_mm: strict(&f.rain_1h_mm),
        snow_depth_cm: strict(&f.snow_depth_cm),
        cloud_cover_okta: f.cloud_cover_okta.as_deref().and_then(parse_okta),
        weather_code: f.weather_code.as_deref().and_then(parse_int),
        ..Default::default()
    }
}

fn wunderground_measurements(f: &WundergroundFields) -> Measurements {
    Measurements {
        temperature_c: f_to_c(strict(&f.temperature_f)),
        dew_point_c: f_to_c(strict(&f.dew_point_f)),
        humidity_pct: strict(&f.humidity_pct),
        wind_mean_kmh: mph_to_kmh(strict(&f.wind_speed_mph)),
        wind_gust_kmh: mph_to_kmh(strict(&f.wind_gust_mph)),
        wind_direction_deg: f.wind_direction_text.as_deref().and_then(compass_to_degrees),
        pressure_hpa: inhg_to_hpa(strict(&f.pressure_inhg)),
        precip_rate_mm: inches_to_mm(strict(&f.precip_rate_in)),
        precip_accum_mm: inches_to_mm(strict(&f.precip_accum_in)),
        solar_wm2: strict(&f.solar_wm2),
        uv_index: strict(&f.uv_index),
        ..Default::default()
    }
}
