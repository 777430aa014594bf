//! Defensive numeric parsing and physical unit conversions.
//!
//! Source strings arrive in mixed locales (comma decimals), with stray
//! symbols from upstream scrapers and unit suffixes. Every parser here returns
//! `None` instead of failing, and every conversion propagates `None`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// First signed decimal or scientific-notation number, sign may be separated.
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[-+]?\s*[0-9]*[.,]?[0-9]+(?:[eE][-+]?[0-9]+)?").expect("number pattern")
});

static NON_INT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9-]").expect("int pattern"));

static NON_NUMERIC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^0-9.,-]").expect("numeric pattern"));

const MPH_TO_KMH: f64 = 1.609344;
const INHG_TO_HPA: f64 = 33.8638866667;
const INCH_TO_MM: f64 = 25.4;

// ============================================================================
// Parsing
// ============================================================================

/// Extract the first number found anywhere in `value`.
///
/// Tolerates stray symbols (`"▓13.5"`), a sign separated by spaces
/// (`"- 5.2"`), comma decimals (`"12,4"`) and unit suffixes (`"12W/m2"`).
pub fn parse_float(value: &str) -> Option<f64> {
    let s = value.trim();
    if s.is_empty() {
        return None;
    }

    let found = NUMBER_RE.find(s)?;
    let number: String = found
        .as_str()
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    number.parse::<f64>().ok()
}

/// [`parse_float`] for raw JSON values. Numbers pass through unchanged.
pub fn parse_float_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_float(s),
        _ => None,
    }
}

/// Strip everything except digits and minus signs, then parse.
///
/// Decimal points are stripped too, so `"12.5"` parses as `125`.
pub fn parse_int(value: &str) -> Option<i32> {
    let s = value.trim();
    if s.is_empty() {
        return None;
    }
    NON_INT_RE.replace_all(s, "").parse::<i32>().ok()
}

/// Keep only digits, dots, commas and minus signs, treat comma as decimal
/// point, then parse the remainder as a whole.
///
/// Stricter than [`parse_float`]: `"1.013,5"` or a lone `"-"` yield `None`.
pub fn parse_float_strict(value: &str) -> Option<f64> {
    let s = value.trim();
    if s.is_empty() {
        return None;
    }
    NON_NUMERIC_RE
        .replace_all(s, "")
        .replace(',', ".")
        .parse::<f64>()
        .ok()
}

/// Cloud cover in okta: a whole number, possibly written as `"8.0"`.
pub fn parse_okta(value: &str) -> Option<i32> {
    let v = parse_float_strict(value)?;
    if v.fract() == 0.0 && v.abs() <= i32::MAX as f64 {
        Some(v as i32)
    } else {
        None
    }
}

// ============================================================================
// Conversions
// ============================================================================

/// A value that may hold a plain number.
///
/// Strings must be a bare number; empty strings and the literal `"null"`
/// read as absent.
pub trait AsMeasurement {
    fn as_measurement(&self) -> Option<f64>;
}

impl AsMeasurement for f64 {
    fn as_measurement(&self) -> Option<f64> {
        Some(*self)
    }
}

impl AsMeasurement for i32 {
    fn as_measurement(&self) -> Option<f64> {
        Some(*self as f64)
    }
}

impl AsMeasurement for i64 {
    fn as_measurement(&self) -> Option<f64> {
        Some(*self as f64)
    }
}

impl AsMeasurement for str {
    fn as_measurement(&self) -> Option<f64> {
        let s = self.trim();
        if s.is_empty() || s == "null" {
            return None;
        }
        s.parse::<f64>().ok()
    }
}

impl AsMeasurement for String {
    fn as_measurement(&self) -> Option<f64> {
        self.as_str().as_measurement()
    }
}

impl<T: AsMeasurement + ?Sized> AsMeasurement for &T {
    fn as_measurement(&self) -> Option<f64> {
        (**self).as_measurement()
    }
}

impl<T: AsMeasurement> AsMeasurement for Option<T> {
    fn as_measurement(&self) -> Option<f64> {
        self.as_ref().and_then(AsMeasurement::as_measurement)
    }
}

/// Fahrenheit to Celsius.
pub fn f_to_c(value: impl AsMeasurement) -> Option<f64> {
    value.as_measurement().map(|f| (f - 32.0) * 5.0 / 9.0)
}

/// Miles per hour to kilometres per hour.
pub fn mph_to_kmh(value: impl AsMeasurement) -> Option<f64> {
    value.as_measurement().map(|v| v * MPH_TO_KMH)
}

/// Inches of mercury to hectopascals.
pub fn inhg_to_hpa(value: impl AsMeasurement) -> Option<f64> {
    value.as_measurement().map(|v| v * INHG_TO_HPA)
}

/// Inches to millimetres.
pub fn inches_to_mm(value: impl AsMeasurement) -> Option<f64> {
    value.as_measurement().map(|v| v * INCH_TO_MM)
}

/// 16-point compass abbreviation or English cardinal name to degrees.
pub fn compass_to_degrees(text: &str) -> Option<f64> {
    let degrees = match text.trim() {
        "N" | "North" => 0.0,
        "NNE" => 22.5,
        "NE" => 45.0,
        "ENE" => 67.5,
        "E" | "East" => 90.0,
        "ESE" => 112.5,
        "SE" => 135.0,
        "SSE" => 157.5,
        "S" | "South" => 180.0,
        "SSW" => 202.5,
        "SW" => 225.0,
        "WSW" => 247.5,
        "W" | "West" => 270.0,
        "WNW" => 292.5,
        "NW" => 315.0,
        "NNW" => 337.5,
        _ => return None,
    };
    Some(degrees)
}
