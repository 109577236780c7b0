use crate::error::{PipelineError, Result};
use chrono::{Duration, NaiveDate};
use serde::{Serialize, Serializer};
use std::fmt;

/// A single cell as read from the source or produced by the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Date(NaiveDate),
    Duration(Duration),
}

impl Value {
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Real(f) => f.is_nan(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of the cell. Text is parsed, nulls map to `Ok(None)`.
    pub fn to_f64(&self) -> std::result::Result<Option<f64>, String> {
        match self {
            Value::Null => Ok(None),
            Value::Integer(i) => Ok(Some(*i as f64)),
            Value::Real(f) if f.is_nan() => Ok(None),
            Value::Real(f) => Ok(Some(*f)),
            Value::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| format!("'{}' is not numeric", s)),
            other => Err(format!("{} is not numeric", other.type_name())),
        }
    }

    /// Integer view of the cell, truncating any fractional part.
    pub fn to_i64(&self) -> std::result::Result<Option<i64>, String> {
        match self {
            Value::Integer(i) => Ok(Some(*i)),
            other => match other.to_f64()? {
                Some(f) if f.is_finite() => Ok(Some(f.trunc() as i64)),
                Some(f) => Err(format!("{} cannot be truncated to an integer", f)),
                None => Ok(None),
            },
        }
    }

    /// Text view used for string-typed columns; numbers are rendered the way they print.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Real(f) if f.is_nan() => None,
            Value::Text(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Date(_) => "date",
            Value::Duration(_) => "duration",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Duration(d) => write!(f, "{}", format_duration(d)),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Real(r) if r.is_nan() => serializer.serialize_none(),
            Value::Real(r) => serializer.serialize_f64(*r),
            Value::Text(s) => serializer.serialize_str(s),
            other => serializer.serialize_str(&other.to_string()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<Duration> for Value {
    fn from(v: Duration) -> Self {
        Value::Duration(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Renders a duration as `D days HH:MM:SS[.ffffff]`
pub fn format_duration(d: &Duration) -> String {
    const MICROS_PER_DAY: i64 = 86_400_000_000;
    let total = d.num_microseconds().unwrap_or(i64::MAX);
    let sign = if total < 0 { "-" } else { "" };
    let total = total.unsigned_abs() as i64;
    let days = total / MICROS_PER_DAY;
    let rem = total % MICROS_PER_DAY;
    let hours = rem / 3_600_000_000;
    let minutes = (rem / 60_000_000) % 60;
    let seconds = (rem / 1_000_000) % 60;
    let micros = rem % 1_000_000;
    if micros == 0 {
        format!("{}{} days {:02}:{:02}:{:02}", sign, days, hours, minutes, seconds)
    } else {
        format!(
            "{}{} days {:02}:{:02}:{:02}.{:06}",
            sign, days, hours, minutes, seconds, micros
        )
    }
}

/// An ordered, named set of rows exactly as the source returned them
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RawTable {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Convenience constructor used by tests and in-memory sources
    pub fn from_rows(name: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut table = Self::new(name, columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(PipelineError::schema(
                &self.name,
                format!(
                    "row {} has {} cells but the table has {} columns",
                    self.rows.len(),
                    row.len(),
                    self.columns.len()
                ),
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn require_column(&self, column: &str) -> Result<usize> {
        self.column_index(column).ok_or_else(|| {
            PipelineError::schema(&self.name, format!("expected column '{}' is absent", column))
        })
    }
}
