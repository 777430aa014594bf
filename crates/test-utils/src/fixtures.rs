//! Common test fixtures for pipeline tests.
//!
//! Raw lines are wrapped in the `_airbyte_data` envelope the readers expect.

use serde_json::{json, Map, Value};

/// Storage keys following the upstream naming conventions.
pub mod keys {
    /// Weather Underground, Ichtegem, 1 October 2024
    pub const ICHTEGEM: &str = "raw/Ichtegem_011024/Ichtegem.jsonl";

    /// Weather Underground, La Madeleine, 1 October 2024
    pub const LA_MADELEINE: &str = "raw/La_Madeleine_011024/La_Madeleine.jsonl";

    /// InfoClimat hourly export
    pub const INFOCLIMAT: &str = "raw/InfoClimat/2024-10-05.jsonl";

    /// A source no detector recognises
    pub const UNKNOWN: &str = "raw/other/feed.jsonl";
}

/// Station ids the default station directory injects.
pub mod stations {
    pub const ICHTEGEM: &str = "IICHTE19";
    pub const LA_MADELEINE: &str = "ILAMAD25";
    pub const INFOCLIMAT: &str = "07015";
}

/// Wrap a payload in the line envelope.
pub fn envelope(data: Value) -> String {
    json!({ "_airbyte_data": data }).to_string()
}

/// One Weather Underground reading as scraped (unit-suffixed strings).
#[derive(Debug, Clone)]
pub struct WuReading {
    pub time: String,
    pub temperature: String,
    pub dew_point: String,
    pub humidity: String,
    pub wind: String,
    pub speed: String,
    pub gust: String,
    pub pressure: String,
    pub precip_rate: String,
    pub precip_accum: String,
    pub uv: String,
    pub solar: String,
}

impl Default for WuReading {
    fn default() -> Self {
        Self {
            time: "12:04 AM".into(),
            temperature: "56.8\u{a0}°F".into(),
            dew_point: "52.1\u{a0}°F".into(),
            humidity: "87\u{a0}%".into(),
            wind: "WSW".into(),
            speed: "5\u{a0}mph".into(),
            gust: "8\u{a0}mph".into(),
            pressure: "29.47\u{a0}in".into(),
            precip_rate: "0.00\u{a0}in".into(),
            precip_accum: "0.00\u{a0}in".into(),
            uv: "0".into(),
            solar: "0\u{a0}w/m²".into(),
        }
    }
}

impl WuReading {
    pub fn at(time: &str) -> Self {
        Self {
            time: time.into(),
            ..Default::default()
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "Time": self.time,
            "Temperature": self.temperature,
            "Dew Point": self.dew_point,
            "Humidity": self.humidity,
            "Wind": self.wind,
            "Speed": self.speed,
            "Gust": self.gust,
            "Pressure": self.pressure,
            "Precip. Rate.": self.precip_rate,
            "Precip. Accum.": self.precip_accum,
            "UV": self.uv,
            "Solar": self.solar,
        })
    }

    pub fn to_line(&self) -> String {
        envelope(self.to_json())
    }
}

/// One InfoClimat hourly row (numbers as JSON numbers).
#[derive(Debug, Clone)]
pub struct IcReading {
    pub station: String,
    pub dh_utc: String,
    pub temperature: f64,
    pub pressure: f64,
    pub humidity: f64,
    pub wind_mean: f64,
    pub wind_gust: f64,
    pub wind_direction: f64,
    pub cloud_cover: Option<i64>,
}

impl IcReading {
    pub fn new(station: &str, dh_utc: &str) -> Self {
        Self {
            station: station.into(),
            dh_utc: dh_utc.into(),
            temperature: 11.2,
            pressure: 1013.7,
            humidity: 87.0,
            wind_mean: 10.0,
            wind_gust: 22.0,
            wind_direction: 230.0,
            cloud_cover: Some(6),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id_station": self.station,
            "dh_utc": self.dh_utc,
            "temperature": self.temperature,
            "pression": self.pressure,
            "humidite": self.humidity,
            "vent_moyen": self.wind_mean,
            "vent_rafales": self.wind_gust,
            "vent_direction": self.wind_direction,
            "nebulosite": self.cloud_cover.map(|c| c.to_string()).unwrap_or_default(),
            "temps_omm": null,
        })
    }
}

/// One InfoClimat line holding the given rows grouped by station.
pub fn infoclimat_line(rows: &[IcReading]) -> String {
    let mut hourly = Map::new();
    hourly.insert("_params".into(), json!({ "unit": "metric" }));
    for row in rows {
        let entry = hourly
            .entry(row.station.clone())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(list) = entry {
            list.push(row.to_json());
        }
    }
    envelope(json!({ "hourly": hourly }))
}
