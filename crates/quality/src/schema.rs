//! Declarative row and batch validation rules.
//!
//! A [`Schema`] is a list of column rules (presence, shape, range, vocabulary)
//! plus an optional gust-vs-mean cross check and a uniqueness key for the
//! batch. Absent values pass every column rule unless the column is required.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

use wx_common::{SourceFormat, StagingRecord};

static EMBEDDED_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+(\.\d+)?").expect("embedded number pattern"));

/// First number inside a possibly unit-suffixed value (`"56.8 °F"` → 56.8).
pub fn embedded_number(value: &str) -> Option<f64> {
    EMBEDDED_NUMBER_RE.find(value)?.as_str().parse().ok()
}

/// One failed check on one row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureCase {
    pub column: String,
    pub check: String,
    pub value: Option<String>,
}

impl FailureCase {
    fn new(column: &str, check: impl Into<String>, value: Option<&str>) -> Self {
        Self {
            column: column.to_string(),
            check: check.into(),
            value: value.map(str::to_string),
        }
    }
}

/// Rules for one staging column.
#[derive(Debug, Clone)]
pub struct ColumnRule {
    pub column: &'static str,
    pub required: bool,
    pub pattern: Option<Regex>,
    /// Inclusive bounds on the embedded number.
    pub range: Option<(f64, f64)>,
    /// Value must be a whole number within these inclusive bounds.
    pub integer_range: Option<(i64, i64)>,
    pub allowed: Option<&'static [&'static str]>,
}

impl ColumnRule {
    pub fn new(column: &'static str) -> Self {
        Self {
            column,
            required: false,
            pattern: None,
            range: None,
            integer_range: None,
            allowed: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn pattern(mut self, pattern: &Regex) -> Self {
        self.pattern = Some(pattern.clone());
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }

    pub fn min(self, min: f64) -> Self {
        self.range(min, f64::INFINITY)
    }

    pub fn integer_range(mut self, min: i64, max: i64) -> Self {
        self.integer_range = Some((min, max));
        self
    }

    pub fn one_of(mut self, allowed: &'static [&'static str]) -> Self {
        self.allowed = Some(allowed);
        self
    }

    fn check(&self, value: Option<&str>, failures: &mut Vec<FailureCase>) {
        let Some(value) = value else {
            if self.required {
                failures.push(FailureCase::new(self.column, "not_nullable", None));
            }
            return;
        };

        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(value) {
                failures.push(FailureCase::new(
                    self.column,
                    format!("str_matches('{}')", pattern.as_str()),
                    Some(value),
                ));
            }
        }

        if let Some((min, max)) = self.range {
            let in_range = embedded_number(value).is_some_and(|v| v >= min && v <= max);
            if !in_range {
                failures.push(FailureCase::new(
                    self.column,
                    format!("in_range({}, {})", min, max),
                    Some(value),
                ));
            }
        }

        if let Some((min, max)) = self.integer_range {
            let ok = value
                .trim()
                .parse::<i64>()
                .is_ok_and(|v| v >= min && v <= max);
            if !ok {
                failures.push(FailureCase::new(
                    self.column,
                    format!("integer_in_range({}, {})", min, max),
                    Some(value),
                ));
            }
        }

        if let Some(allowed) = self.allowed {
            if !allowed.contains(&value) {
                failures.push(FailureCase::new(self.column, "isin", Some(value)));
            }
        }
    }
}

/// Columns forming the per-batch uniqueness key alongside the station id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueKey {
    ObservationTime,
    Column(&'static str),
}

/// Validation rules for one source format.
#[derive(Debug, Clone)]
pub struct Schema {
    pub name: &'static str,
    pub format: SourceFormat,
    pub require_observation_time: bool,
    pub columns: Vec<ColumnRule>,
    /// `(gust, mean)`: gust must be ≥ mean when both parse.
    pub gust_check: Option<(&'static str, &'static str)>,
    pub unique_on: UniqueKey,
}

impl Schema {
    /// Row-local checks.
    pub fn validate_row(&self, row: &StagingRecord) -> Vec<FailureCase> {
        let mut failures = Vec::new();

        if row.format() != self.format {
            failures.push(FailureCase::new(
                "format",
                format!("equal_to({})", self.format),
                Some(row.format().as_str()),
            ));
            return failures;
        }

        if row.station_id.trim().is_empty() {
            failures.push(FailureCase::new("station_id", "not_nullable", None));
        }
        if self.require_observation_time && row.observation_time.is_none() {
            failures.push(FailureCase::new("observation_time", "not_nullable", None));
        }

        for rule in &self.columns {
            rule.check(row.fields.get(rule.column), &mut failures);
        }

        if let Some((gust_col, mean_col)) = self.gust_check {
            let gust = row.fields.get(gust_col).and_then(embedded_number);
            let mean = row.fields.get(mean_col).and_then(embedded_number);
            if let (Some(gust), Some(mean)) = (gust, mean) {
                if gust < mean {
                    failures.push(FailureCase::new(
                        gust_col,
                        format!("{} >= {}", gust_col, mean_col),
                        row.fields.get(gust_col),
                    ));
                }
            }
        }

        failures
    }

    /// Validate a whole file's rows. Returns failures per row, in order.
    ///
    /// Every row of a duplicated `(station, key)` group fails.
    pub fn validate_batch(&self, rows: &[StagingRecord]) -> Vec<Vec<FailureCase>> {
        let mut results: Vec<Vec<FailureCase>> =
            rows.iter().map(|row| self.validate_row(row)).collect();

        let mut groups: HashMap<(&str, Option<String>), Vec<usize>> = HashMap::new();
        for (idx, row) in rows.iter().enumerate() {
            let key = match self.unique_on {
                UniqueKey::ObservationTime => row.observation_time.map(|t| t.to_rfc3339()),
                UniqueKey::Column(column) => row.fields.get(column).map(str::to_string),
            };
            groups
                .entry((row.station_id.as_str(), key))
                .or_default()
                .push(idx);
        }

        let check = match self.unique_on {
            UniqueKey::ObservationTime => "unique(station_id, observation_time)".to_string(),
            UniqueKey::Column(column) => format!("unique(station_id, {})", column),
        };
        for ((station, key), members) in groups {
            if members.len() < 2 {
                continue;
            }
            let value = format!("{}|{}", station, key.as_deref().unwrap_or("null"));
            for idx in members {
                results[idx].push(FailureCase::new("station_id", check.clone(), Some(&value)));
            }
        }

        results
    }
}
