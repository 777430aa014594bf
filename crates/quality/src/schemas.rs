//! Validation schemas for the two known source formats.

use once_cell::sync::Lazy;
use regex::Regex;

use wx_common::SourceFormat;

use crate::schema::{ColumnRule, Schema, UniqueKey};

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("schema pattern")
}

static NUMBER: Lazy<Regex> = Lazy::new(|| re(r"^-?\d+(\.\d+)?$"));

static TIME_LOCAL: Lazy<Regex> = Lazy::new(|| re(r"^[0-9]{1,2}:[0-9]{2} [AP]M$"));
static TEMPERATURE_F: Lazy<Regex> = Lazy::new(|| re(r"^-?\d+(\.\d+)?\s*[°º˚░]F$"));
static HUMIDITY_PCT: Lazy<Regex> = Lazy::new(|| re(r"^[0-9]+ %$"));
static PRESSURE_IN: Lazy<Regex> = Lazy::new(|| re(r"^[0-9]+(\.[0-9]+)? in$"));
static WIND_MPH: Lazy<Regex> = Lazy::new(|| re(r"^[0-9]+(\.[0-9]+)? mph$"));
static PRECIP_IN: Lazy<Regex> = Lazy::new(|| re(r"^[0-9]+(\.[0-9]+)? in$"));
static SOLAR_WM2: Lazy<Regex> = Lazy::new(|| re(r"^[0-9]+(\.[0-9]+)? w/m²$"));
static UV_INDEX: Lazy<Regex> = Lazy::new(|| re(r"^[0-9]+(\.[0-9]+)?( UV)?$"));

/// 16-point compass plus English long forms.
pub const WIND_DIRECTIONS: &[&str] = &[
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW", "North", "South", "East", "West",
];

/// hPa per inHg, as used for the pressure envelope.
const HPA_PER_INHG: f64 = 33.864;

/// InfoClimat: metric values written as bare numbers.
pub static INFOCLIMAT_SCHEMA: Lazy<Schema> = Lazy::new(|| Schema {
    name: "infoclimat",
    format: SourceFormat::InfoClimat,
    require_observation_time: true,
    columns: vec![
        ColumnRule::new("temperature_c").pattern(&NUMBER).range(-60.0, 60.0),
        ColumnRule::new("pressure_hpa").pattern(&NUMBER).range(850.0, 1100.0),
        ColumnRule::new("humidity_pct").pattern(&NUMBER).range(0.0, 100.0),
        ColumnRule::new("dew_point_c").pattern(&NUMBER).range(-60.0, 60.0),
        ColumnRule::new("wind_mean_kmh").pattern(&NUMBER),
        ColumnRule::new("wind_gust_kmh").pattern(&NUMBER),
        ColumnRule::new("visibility_m").pattern(&NUMBER).min(0.0),
        ColumnRule::new("snow_depth_cm").pattern(&NUMBER).min(0.0),
        ColumnRule::new("cloud_cover_okta").integer_range(0, 8),
        ColumnRule::new("wind_direction_deg").pattern(&NUMBER).range(0.0, 360.0),
        ColumnRule::new("rain_3h_mm").pattern(&NUMBER).min(0.0),
        ColumnRule::new("rain_1h_mm").pattern(&NUMBER).min(0.0),
    ],
    gust_check: Some(("wind_gust_kmh", "wind_mean_kmh")),
    unique_on: UniqueKey::ObservationTime,
});

/// Weather Underground: unit-suffixed imperial strings.
pub static WUNDERGROUND_SCHEMA: Lazy<Schema> = Lazy::new(|| Schema {
    name: "wunderground",
    format: SourceFormat::Wunderground,
    require_observation_time: false,
    columns: vec![
        ColumnRule::new("time_local").pattern(&TIME_LOCAL),
        ColumnRule::new("temperature_f")
            .pattern(&TEMPERATURE_F)
            .range(-100.0, 140.0),
        ColumnRule::new("dew_point_f")
            .pattern(&TEMPERATURE_F)
            .range(-95.0, 95.0),
        ColumnRule::new("humidity_pct")
            .pattern(&HUMIDITY_PCT)
            .range(0.0, 100.0),
        ColumnRule::new("pressure_inhg")
            .pattern(&PRESSURE_IN)
            .range(850.0 / HPA_PER_INHG, 1100.0 / HPA_PER_INHG),
        ColumnRule::new("wind_speed_mph").pattern(&WIND_MPH),
        ColumnRule::new("wind_gust_mph").pattern(&WIND_MPH),
        ColumnRule::new("precip_rate_in").pattern(&PRECIP_IN),
        ColumnRule::new("precip_accum_in").pattern(&PRECIP_IN),
        ColumnRule::new("solar_wm2").pattern(&SOLAR_WM2),
        ColumnRule::new("uv_index").pattern(&UV_INDEX),
        ColumnRule::new("wind_direction_text").one_of(WIND_DIRECTIONS),
    ],
    gust_check: Some(("wind_gust_mph", "wind_speed_mph")),
    unique_on: UniqueKey::Column("time_local"),
});

/// Schema for a source format, if one exists.
pub fn schema_for(format: SourceFormat) -> Option<&'static Schema> {
    match format {
        SourceFormat::InfoClimat => Some(&*INFOCLIMAT_SCHEMA),
        SourceFormat::Wunderground => Some(&*WUNDERGROUND_SCHEMA),
        SourceFormat::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wx_common::{
        parse_utc_timestamp, InfoClimatFields, StagingFields, StagingRecord, WundergroundFields,
    };

    fn wu(fields: WundergroundFields) -> StagingRecord {
        StagingRecord::new(
            "IICHTE19",
            "raw/Ichtegem_011024/a.jsonl",
            None,
            StagingFields::Wunderground(fields),
        )
    }

    fn ic(fields: InfoClimatFields) -> StagingRecord {
        StagingRecord::new(
            "07015",
            "raw/InfoClimat/a.jsonl",
            parse_utc_timestamp("2024-10-05 00:00:00"),
            StagingFields::InfoClimat(fields),
        )
    }

    fn good_wu() -> WundergroundFields {
        WundergroundFields {
            time_local: Some("12:04 AM".into()),
            temperature_f: Some("56.8 °F".into()),
            dew_point_f: Some("52 °F".into()),
            humidity_pct: Some("87 %".into()),
            wind_direction_text: Some("WSW".into()),
            wind_speed_mph: Some("5 mph".into()),
            wind_gust_mph: Some("8 mph".into()),
            pressure_inhg: Some("29.47 in".into()),
            precip_rate_in: Some("0.00 in".into()),
            precip_accum_in: Some("0.00 in".into()),
            uv_index: Some("0".into()),
            solar_wm2: Some("0 w/m²".into()),
        }
    }

    #[test]
    fn test_wunderground_accepts_typical_row() {
        assert!(WUNDERGROUND_SCHEMA.validate_row(&wu(good_wu())).is_empty());
    }

    #[test]
    fn test_wunderground_rejects_bad_values() {
        let cases = [
            WundergroundFields {
                temperature_f: Some("56.8".into()),
                ..good_wu()
            },
            WundergroundFields {
                temperature_f: Some("150 °F".into()),
                ..good_wu()
            },
            WundergroundFields {
                humidity_pct: Some("87%".into()),
                ..good_wu()
            },
            WundergroundFields {
                pressure_inhg: Some("35.00 in".into()),
                ..good_wu()
            },
            WundergroundFields {
                wind_direction_text: Some("Calm".into()),
                ..good_wu()
            },
            WundergroundFields {
                wind_gust_mph: Some("2 mph".into()),
                ..good_wu()
            },
            WundergroundFields {
                time_local: Some("00:04".into()),
                ..good_wu()
            },
        ];
        for fields in cases {
            let failures = WUNDERGROUND_SCHEMA.validate_row(&wu(fields.clone()));
            assert!(!failures.is_empty(), "expected failure for {:?}", fields);
        }
    }

    #[test]
    fn test_wunderground_gust_only_checked_when_both_present() {
        let fields = WundergroundFields {
            wind_speed_mph: None,
            wind_gust_mph: Some("2 mph".into()),
            ..good_wu()
        };
        assert!(WUNDERGROUND_SCHEMA.validate_row(&wu(fields)).is_empty());
    }

    #[test]
    fn test_infoclimat_rules() {
        let good = InfoClimatFields {
            temperature_c: Some("11.2".into()),
            pressure_hpa: Some("1013.7".into()),
            humidity_pct: Some("87".into()),
            wind_mean_kmh: Some("10".into()),
            wind_gust_kmh: Some("25.9".into()),
            cloud_cover_okta: Some("8".into()),
            wind_direction_deg: Some("230".into()),
            ..Default::default()
        };
        assert!(INFOCLIMAT_SCHEMA.validate_row(&ic(good.clone())).is_empty());

        let bad_okta = InfoClimatFields {
            cloud_cover_okta: Some("9".into()),
            ..good.clone()
        };
        assert_eq!(INFOCLIMAT_SCHEMA.validate_row(&ic(bad_okta)).len(), 1);

        let gust_below_mean = InfoClimatFields {
            wind_gust_kmh: Some("5".into()),
            ..good.clone()
        };
        assert_eq!(INFOCLIMAT_SCHEMA.validate_row(&ic(gust_below_mean)).len(), 1);

        let mut no_time = ic(good);
        no_time.observation_time = None;
        let failures = INFOCLIMAT_SCHEMA.validate_row(&no_time);
        assert_eq!(failures[0].column, "observation_time");
    }

    #[test]
    fn test_schema_for_unknown() {
        assert!(schema_for(SourceFormat::Unknown).is_none());
        assert_eq!(
            schema_for(SourceFormat::InfoClimat).map(|s| s.name),
            Some("infoclimat")
        );
    }
}
