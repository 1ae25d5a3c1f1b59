use crate::error::{Result, TrendError};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Name of the key column in the hosted CSV.
pub const SNAPSHOT_COLUMN: &str = "date";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A calendar day in the monitored repository's history. Row key of the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotId(NaiveDate);

impl SnapshotId {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn today() -> Self {
        Self(Utc::now().date_naive())
    }

    pub fn from_timestamp(timestamp: &DateTime<Utc>) -> Self {
        Self(timestamp.date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Last instant of the day, used to pick the repository state "as of" this snapshot.
    pub fn end_of_day(&self) -> DateTime<Utc> {
        self.0
            .and_hms_opt(23, 59, 59)
            .unwrap_or_else(|| self.0.and_time(NaiveTime::MIN))
            .and_utc()
    }
}

impl FromStr for SnapshotId {
    type Err = TrendError;

    fn from_str(s: &str) -> Result<Self> {
        NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
            .map(Self)
            .map_err(|e| TrendError::InvalidSnapshot(format!("'{s}' is not a YYYY-MM-DD date: {e}")))
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_FORMAT))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
}

impl MetricValue {
    /// Parse one CSV cell. Empty cells are missing values.
    pub fn parse_cell(cell: &str) -> Result<Option<Self>> {
        let cell = cell.trim();
        if cell.is_empty() {
            return Ok(None);
        }
        if let Ok(v) = cell.parse::<i64>() {
            return Ok(Some(MetricValue::Int(v)));
        }
        cell.parse::<f64>()
            .map(|v| Some(MetricValue::Float(v)))
            .map_err(|_| TrendError::Dataset(format!("non-numeric value '{cell}'")))
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            MetricValue::Int(v) => v as f64,
            MetricValue::Float(v) => v,
        }
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Int(v)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MetricValue::Int(v) => write!(f, "{v}"),
            // floats keep a decimal point so they read back as floats
            MetricValue::Float(v) if v.is_finite() && v.fract() == 0.0 => {
                write!(f, "{v:.1}")
            }
            MetricValue::Float(v) => write!(f, "{v}"),
        }
    }
}

/// One summarized record of metrics for a single snapshot.
///
/// Values keep insertion order; it decides the column order of a fresh dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    pub snapshot: SnapshotId,
    pub values: Vec<(String, MetricValue)>,
}

impl AggregateRow {
    pub fn new(snapshot: SnapshotId) -> Self {
        Self {
            snapshot,
            values: Vec::new(),
        }
    }

    pub fn insert<V: Into<MetricValue>>(&mut self, name: &str, value: V) {
        let value = value.into();
        match self.values.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<MetricValue> {
        self.values.iter().find(|(k, _)| k == name).map(|(_, v)| *v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(k, _)| k.as_str())
    }

    /// Same values under a different key.
    pub fn with_snapshot(&self, snapshot: SnapshotId) -> Self {
        Self {
            snapshot,
            values: self.values.clone(),
        }
    }
}

/// Column names a row must (or may) carry before it is merged.
#[derive(Debug, Clone)]
pub struct MetricSchema {
    pub required: Vec<String>,
    pub optional: Vec<String>,
}

impl MetricSchema {
    pub fn new<R, O>(required: R, optional: O) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
            optional: optional.into_iter().map(Into::into).collect(),
        }
    }

    /// The aggregate statistics plus the optional cloc line counts.
    pub fn standard() -> Self {
        Self::new(
            crate::aggregate::REQUIRED_COLUMNS.iter().copied(),
            crate::cloc::CLOC_COLUMNS.iter().copied(),
        )
    }

    pub fn validate(&self, row: &AggregateRow) -> Result<()> {
        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|c| row.get(c).is_none())
            .cloned()
            .collect();
        let unexpected: Vec<String> = row
            .columns()
            .filter(|c| !self.required.iter().any(|r| r == c) && !self.optional.iter().any(|o| o == c))
            .map(str::to_string)
            .collect();

        if missing.is_empty() && unexpected.is_empty() {
            Ok(())
        } else {
            Err(TrendError::SchemaMismatch { missing, unexpected })
        }
    }
}
