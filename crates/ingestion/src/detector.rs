//! Source format detection and raw-row field mapping.
//!
//! Sources are recognised from their storage key:
//!
//! - keys naming Ichtegem or La Madeleine are per-line Weather Underground
//!   scrapes, one flat hourly row per line with unit-suffixed strings
//! - keys naming InfoClimat are per-station batches, each line holding an
//!   `hourly` block keyed by station code
//!
//! Mappers only rename and clean; units are left untouched.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

use wx_common::{
    parse_utc_timestamp, InfoClimatFields, SourceFormat, StagingFields, WundergroundFields,
};

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// One raw row mapped to the staging shape.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRow {
    /// Station id carried by the row itself, if any.
    pub station_id: Option<String>,
    pub observation_time: Option<DateTime<Utc>>,
    pub fields: StagingFields,
}

/// Classify a source file from its key (case-insensitive).
pub fn detect_source(source_key: &str) -> SourceFormat {
    let key = source_key.to_lowercase();

    if key.contains("ichtegem") || key.contains("la_madeleine") {
        return SourceFormat::Wunderground;
    }
    if key.contains("infoclimat") {
        return SourceFormat::InfoClimat;
    }

    warn!(source_key = %source_key, "Unknown source, falling back to raw passthrough");
    SourceFormat::Unknown
}

/// Replace non-breaking spaces, collapse whitespace runs and trim.
pub fn clean_value(value: &str) -> String {
    let replaced = value.replace('\u{a0}', " ");
    WHITESPACE_RE.replace_all(&replaced, " ").trim().to_string()
}

/// Cleaned string form of a raw value.
///
/// Strings are cleaned, other scalars keep their JSON text. Null and
/// values that clean to nothing are absent.
fn staged(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::Null => return None,
        Value::String(s) => clean_value(s),
        other => other.to_string(),
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Map one Weather Underground row.
pub fn map_wunderground(data: &Map<String, Value>) -> MappedRow {
    let field = |name: &str| staged(data.get(name));

    let fields = WundergroundFields {
        time_local: field("Time"),
        temperature_f: field("Temperature"),
        dew_point_f: field("Dew Point"),
        humidity_pct: field("Humidity"),
        wind_direction_text: field("Wind"),
        wind_speed_mph: field("Speed"),
        wind_gust_mph: field("Gust"),
        pressure_inhg: field("Pressure"),
        precip_rate_in: field("Precip. Rate."),
        precip_accum_in: field("Precip. Accum."),
        uv_index: field("UV"),
        solar_wm2: field("Solar"),
    };

    // Station id is injected from the key; time needs the key date
    MappedRow {
        station_id: None,
        observation_time: None,
        fields: StagingFields::Wunderground(fields),
    }
}

/// Map one InfoClimat hourly row.
pub fn map_infoclimat(row: &Map<String, Value>) -> MappedRow {
    let field = |name: &str| staged(row.get(name));

    let fields = InfoClimatFields {
        temperature_c: field("temperature"),
        pressure_hpa: field("pression"),
        humidity_pct: field("humidite"),
        dew_point_c: field("point_de_rosee"),
        visibility_m: field("visibilite"),
        wind_mean_kmh: field("vent_moyen"),
        wind_gust_kmh: field("vent_rafales"),
        wind_direction_deg: field("vent_direction"),
        rain_3h_mm: field("pluie_3h"),
        rain_1h_mm: field("pluie_1h"),
        snow_depth_cm: field("neige_au_sol"),
        cloud_cover_okta: field("nebulosite"),
        weather_code: field("temps_omm"),
    };

    MappedRow {
        station_id: field("id_station"),
        observation_time: field("dh_utc").as_deref().and_then(parse_utc_timestamp),
        fields: StagingFields::InfoClimat(fields),
    }
}

/// Pass an unrecognised payload through unchanged.
pub fn map_raw(data: &Map<String, Value>) -> MappedRow {
    let station_id = staged(data.get("id_station")).or_else(|| staged(data.get("station_id")));
    let observation_time = staged(data.get("dh_utc"))
        .or_else(|| staged(data.get("observation_time")))
        .as_deref()
        .and_then(parse_utc_timestamp);

    MappedRow {
        station_id,
        observation_time,
        fields: StagingFields::Raw(data.clone()),
    }
}
