//! Record shapes persisted by the pipeline.
//!
//! Three kinds exist: one [`IngestionRecord`] per source file, one
//! [`StagingRecord`] per normalized source row (string-typed, unit-naive), and
//! one [`FinalRecord`] per validated, unit-converted observation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::source::SourceFormat;

// ============================================================================
// Ingestion tracking
// ============================================================================

/// Tracking state for one source file key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionRecord {
    pub source_key: String,
    pub first_seen: DateTime<Utc>,
    pub last_processed: DateTime<Utc>,
    pub success: bool,
    pub error_message: Option<String>,
    pub lines_read: Option<u64>,
    pub content_hash: Option<String>,
    pub quality_validated: bool,
    pub quality_run_at: Option<DateTime<Utc>>,
}

impl IngestionRecord {
    /// Sentinel written on the first ingestion attempt.
    pub fn started(source_key: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            source_key: source_key.into(),
            first_seen: now,
            last_processed: now,
            success: false,
            error_message: None,
            lines_read: None,
            content_hash: None,
            quality_validated: false,
            quality_run_at: None,
        }
    }

    /// Ingested successfully but not (yet) quality-validated.
    pub fn awaiting_quality(&self) -> bool {
        self.success && !self.quality_validated
    }
}

// ============================================================================
// Staging
// ============================================================================

/// InfoClimat row, values kept as the source wrote them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfoClimatFields {
    pub temperature_c: Option<String>,
    pub pressure_hpa: Option<String>,
    pub humidity_pct: Option<String>,
    pub dew_point_c: Option<String>,
    pub visibility_m: Option<String>,
    pub wind_mean_kmh: Option<String>,
    pub wind_gust_kmh: Option<String>,
    pub wind_direction_deg: Option<String>,
    pub rain_3h_mm: Option<String>,
    pub rain_1h_mm: Option<String>,
    pub snow_depth_cm: Option<String>,
    pub cloud_cover_okta: Option<String>,
    /// WMO present-weather code
    pub weather_code: Option<String>,
}

/// Weather Underground row, unit-suffixed imperial strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WundergroundFields {
    pub time_local: Option<String>,
    #[serde(rename = "temperature_F")]
    pub temperature_f: Option<String>,
    #[serde(rename = "dew_point_F")]
    pub dew_point_f: Option<String>,
    pub humidity_pct: Option<String>,
    pub wind_direction_text: Option<String>,
    pub wind_speed_mph: Option<String>,
    pub wind_gust_mph: Option<String>,
    #[serde(rename = "pressure_inHg")]
    pub pressure_inhg: Option<String>,
    pub precip_rate_in: Option<String>,
    pub precip_accum_in: Option<String>,
    pub uv_index: Option<String>,
    pub solar_wm2: Option<String>,
}

/// Source-specific measurement fields of a staging row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum StagingFields {
    InfoClimat(InfoClimatFields),
    Wunderground(WundergroundFields),
    /// Unrecognized source, the raw payload as read.
    Raw(Map<String, Value>),
}

impl StagingFields {
    pub fn format(&self) -> SourceFormat {
        match self {
            StagingFields::InfoClimat(_) => SourceFormat::InfoClimat,
            StagingFields::Wunderground(_) => SourceFormat::Wunderground,
            StagingFields::Raw(_) => SourceFormat::Unknown,
        }
    }

    /// Look up a column by its staging name.
    ///
    /// Raw rows only expose string values.
    pub fn get(&self, column: &str) -> Option<&str> {
        let value = match self {
            StagingFields::InfoClimat(f) => match column {
                "temperature_c" => &f.temperature_c,
                "pressure_hpa" => &f.pressure_hpa,
                "humidity_pct" => &f.humidity_pct,
                "dew_point_c" => &f.dew_point_c,
                "visibility_m" => &f.visibility_m,
                "wind_mean_kmh" => &f.wind_mean_kmh,
                "wind_gust_kmh" => &f.wind_gust_kmh,
                "wind_direction_deg" => &f.wind_direction_deg,
                "rain_3h_mm" => &f.rain_3h_mm,
                "rain_1h_mm" => &f.rain_1h_mm,
                "snow_depth_cm" => &f.snow_depth_cm,
                "cloud_cover_okta" => &f.cloud_cover_okta,
                "weather_code" => &f.weather_code,
                _ => return None,
            },
            StagingFields::Wunderground(f) => match column {
                "time_local" => &f.time_local,
                "temperature_f" => &f.temperature_f,
                "dew_point_f" => &f.dew_point_f,
                "humidity_pct" => &f.humidity_pct,
                "wind_direction_text" => &f.wind_direction_text,
                "wind_speed_mph" => &f.wind_speed_mph,
                "wind_gust_mph" => &f.wind_gust_mph,
                "pressure_inhg" => &f.pressure_inhg,
                "precip_rate_in" => &f.precip_rate_in,
                "precip_accum_in" => &f.precip_accum_in,
                "uv_index" => &f.uv_index,
                "solar_wm2" => &f.solar_wm2,
                _ => return None,
            },
            StagingFields::Raw(map) => return map.get(column).and_then(Value::as_str),
        };
        value.as_deref()
    }
}

/// One normalized source row awaiting quality validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingRecord {
    pub id: Uuid,
    pub station_id: String,
    /// Lineage: the source file this row came from.
    pub source_key: String,
    pub observation_time: Option<DateTime<Utc>>,
    pub quality_checked: bool,
    pub quality_error: Option<bool>,
    pub fields: StagingFields,
}

impl StagingRecord {
    pub fn new(
        station_id: impl Into<String>,
        source_key: impl Into<String>,
        observation_time: Option<DateTime<Utc>>,
        fields: StagingFields,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            station_id: station_id.into(),
            source_key: source_key.into(),
            observation_time,
            quality_checked: false,
            quality_error: None,
            fields,
        }
    }

    pub fn format(&self) -> SourceFormat {
        self.fields.format()
    }

    /// Checked and not flagged.
    pub fn passed_quality(&self) -> bool {
        self.quality_checked && self.quality_error != Some(true)
    }
}

// ============================================================================
// Final
// ============================================================================

/// Canonical measurements: °C, hPa, %, m, km/h, degrees, mm, cm, okta, W/m².
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    pub temperature_c: Option<f64>,
    pub pressure_hpa: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub dew_point_c: Option<f64>,
    pub visibility_m: Option<f64>,
    pub wind_mean_kmh: Option<f64>,
    pub wind_gust_kmh: Option<f64>,
    pub wind_direction_deg: Option<f64>,
    pub rain_3h_mm: Option<f64>,
    pub rain_1h_mm: Option<f64>,
    pub snow_depth_cm: Option<f64>,
    pub cloud_cover_okta: Option<i32>,
    pub weather_code: Option<i32>,
    pub precip_rate_mm: Option<f64>,
    pub precip_accum_mm: Option<f64>,
    pub uv_index: Option<f64>,
    pub solar_wm2: Option<f64>,
}

impl Measurements {
    fn float_fields(&self) -> [(&'static str, Option<f64>); 15] {
        [
            ("temperature_c", self.temperature_c),
            ("pressure_hpa", self.pressure_hpa),
            ("humidity_pct", self.humidity_pct),
            ("dew_point_c", self.dew_point_c),
            ("visibility_m", self.visibility_m),
            ("wind_mean_kmh", self.wind_mean_kmh),
            ("wind_gust_kmh", self.wind_gust_kmh),
            ("wind_direction_deg", self.wind_direction_deg),
            ("rain_3h_mm", self.rain_3h_mm),
            ("rain_1h_mm", self.rain_1h_mm),
            ("snow_depth_cm", self.snow_depth_cm),
            ("precip_rate_mm", self.precip_rate_mm),
            ("precip_accum_mm", self.precip_accum_mm),
            ("uv_index", self.uv_index),
            ("solar_wm2", self.solar_wm2),
        ]
    }
}

/// Unvalidated final record as produced by a transform.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinalDraft {
    pub station_id: Option<String>,
    pub observation_time_utc: Option<DateTime<Utc>>,
    pub source_key: Option<String>,
    pub measurements: Measurements,
}

/// A validated, fully typed observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalRecord {
    pub station_id: String,
    pub observation_time_utc: DateTime<Utc>,
    pub source_key: String,
    #[serde(flatten)]
    pub measurements: Measurements,
}

/// A single field that failed shape validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// All field errors of a rejected draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordErrors(pub Vec<FieldError>);

impl RecordErrors {
    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }
}

impl fmt::Display for RecordErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "invalid final record ({})", parts.join("; "))
    }
}

impl std::error::Error for RecordErrors {}

impl FinalRecord {
    /// Validate a draft against the canonical shape.
    pub fn from_draft(draft: FinalDraft) -> Result<Self, RecordErrors> {
        let mut errors = Vec::new();

        let station_id = draft.station_id.filter(|s| !s.trim().is_empty());
        if station_id.is_none() {
            errors.push(FieldError::new("station_id", "missing"));
        }
        if draft.observation_time_utc.is_none() {
            errors.push(FieldError::new("observation_time_utc", "missing"));
        }
        let source_key = draft.source_key.filter(|s| !s.trim().is_empty());
        if source_key.is_none() {
            errors.push(FieldError::new("source_key", "missing"));
        }

        for (field, value) in draft.measurements.float_fields() {
            if let Some(v) = value {
                if !v.is_finite() {
                    errors.push(FieldError::new(field, format!("not a finite number: {}", v)));
                }
            }
        }
        if let Some(okta) = draft.measurements.cloud_cover_okta {
            if !(0..=8).contains(&okta) {
                errors.push(FieldError::new(
                    "cloud_cover_okta",
                    format!("out of range 0..=8: {}", okta),
                ));
            }
        }

        match (station_id, draft.observation_time_utc, source_key) {
            (Some(station_id), Some(observation_time_utc), Some(source_key)) if errors.is_empty() => {
                Ok(Self {
                    station_id,
                    observation_time_utc,
                    source_key,
                    measurements: draft.measurements,
                })
            }
            _ => Err(RecordErrors(errors)),
        }
    }
}
