//! Staging-to-final transformation for weather observations.
//!
//! Two layers:
//!
//! - [`units`]: defensive parsing of noisy numeric strings and physical unit
//!   conversions (°F→°C, mph→km/h, inHg→hPa, in→mm, compass→degrees)
//! - [`dispatcher`]: routes quality-passed staging rows to the normalization
//!   path of their source format and writes canonical final records
//!
//! Local-time handling for per-line sources lives in [`time`].

pub mod dispatcher;
pub mod time;
pub mod units;

pub use dispatcher::{transform_row, TransformSummary, Transformer};
pub use time::{extract_key_date, local_time_to_utc, DEFAULT_SOURCE_TIMEZONE};
pub use units::{
    compass_to_degrees, f_to_c, inches_to_mm, inhg_to_hpa, mph_to_kmh, parse_float,
    parse_float_strict, parse_float_value, parse_int, parse_okta, AsMeasurement,
};
