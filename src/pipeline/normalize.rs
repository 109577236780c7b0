//! Cleans and reshapes the student table.
//!
//! The steps run in a fixed order because later steps read columns the
//! earlier ones derive or rename:
//!
//! 1. parse `dob` into a date (unparsable or future dates become null)
//! 2. derive `age` in whole years (days / 365.25, truncated)
//! 3. derive `age_group` as the age's decade
//! 4. rename `dob` to `date_of_birth`
//! 5. parse the serialized `contact_info` mapping
//! 6. flatten its keys into top-level columns
//! 7. split `mailing_address` into `address_line_1`, `city`, `state`, `zip_code`
//! 8. fill the remaining nulls according to the [`FillPolicy`]
//! 9. coerce `job_id`, `num_course_taken`, `current_career_path_id` to integers
//! 10. coerce `time_spent_hrs` to a float
//! 11. derive the `time_spent` duration and drop the hours column
//! 12. split `name` into `first_name` and `last_name`

use crate::config::{ContactInfoPolicy, FillPolicy, PipelineConfig};
use crate::constants::{COL_EMAIL, COL_MAILING_ADDRESS, DAYS_PER_YEAR, DOB_DATETIME_FORMATS, DOB_FORMATS};
use crate::domain::{RawStudent, Student, StudentTable};
use crate::error::{PipelineError, Result};
use crate::pipeline::literal::parse_literal;
use crate::pipeline::report::{FindingKind, QualityReport};
use crate::types::Value;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use serde_json::Map;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, instrument};

const MICROS_PER_HOUR: f64 = 3_600_000_000.0;

/// Normalizes raw student rows relative to a fixed reference date
#[derive(Debug, Clone)]
pub struct StudentNormalizer {
    reference_date: NaiveDate,
    fill_policy: FillPolicy,
    contact_info_policy: ContactInfoPolicy,
}

/// Row state after steps 1-7, before any null has been filled
#[derive(Debug, Clone)]
struct StagedStudent {
    uuid: i64,
    name: Option<String>,
    sex: Option<String>,
    date_of_birth: Option<NaiveDate>,
    age: Option<i64>,
    age_group: Option<i64>,
    email: Option<String>,
    contact_extras: BTreeMap<String, Value>,
    address: [Option<String>; 4],
    job_id: Option<f64>,
    current_career_path_id: Option<f64>,
    num_course_taken: Option<f64>,
    time_spent_hrs: Option<f64>,
}

impl StudentNormalizer {
    pub fn new(
        reference_date: NaiveDate,
        fill_policy: FillPolicy,
        contact_info_policy: ContactInfoPolicy,
    ) -> Self {
        Self {
            reference_date,
            fill_policy,
            contact_info_policy,
        }
    }

    pub fn from_config(config: &PipelineConfig, reference_date: NaiveDate) -> Self {
        Self::new(reference_date, config.fill_policy, config.contact_info_policy)
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.reference_date
    }

    /// Runs all twelve steps over an owned copy of the rows
    #[instrument(skip_all, fields(rows = students.len(), as_of = %self.reference_date))]
    pub fn normalize(&self, students: &[RawStudent], report: &mut QualityReport) -> Result<StudentTable> {
        info!("Managing students table...");

        let staged = students
            .iter()
            .map(|raw| self.stage(raw, report))
            .collect::<Result<Vec<_>>>()?;

        // Every key seen in any row becomes a column
        let extra_contact_columns: Vec<String> = staged
            .iter()
            .flat_map(|s| s.contact_extras.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        debug!(columns = ?extra_contact_columns, "Flattened contact_info keys");

        let rows = staged
            .into_iter()
            .map(|s| self.finish(s, &extra_contact_columns, report))
            .collect::<Vec<_>>();

        crate::metrics::normalize::students_normalized(rows.len());
        Ok(StudentTable {
            extra_contact_columns,
            rows,
        })
    }

    /// Steps 1-7
    fn stage(&self, raw: &RawStudent, report: &mut QualityReport) -> Result<StagedStudent> {
        let date_of_birth = self.date_of_birth(raw, report);
        let age = date_of_birth.map(|dob| age_in_years(dob, self.reference_date));
        let age_group = age.map(age_group);

        let contact = self.contact_info(raw, report)?;
        let mut contact_extras = contact.map(flatten_contact_info).unwrap_or_default();
        let email = contact_extras.remove(COL_EMAIL).and_then(|v| v.to_text());
        let mailing_address = contact_extras
            .remove(COL_MAILING_ADDRESS)
            .and_then(|v| v.to_text());

        let address = match mailing_address {
            Some(addr) => {
                let (parts, segments) = split_address(&addr);
                if segments != 4 {
                    report.record(
                        FindingKind::MalformedAddress,
                        raw.uuid,
                        format!("mailing_address has {} comma-separated segments, expected 4", segments),
                    );
                }
                parts
            }
            None => Default::default(),
        };

        Ok(StagedStudent {
            uuid: raw.uuid,
            name: raw.name.clone(),
            sex: raw.sex.clone(),
            date_of_birth,
            age,
            age_group,
            email,
            contact_extras,
            address,
            job_id: raw.job_id,
            current_career_path_id: raw.current_career_path_id,
            num_course_taken: raw.num_course_taken,
            time_spent_hrs: raw.time_spent_hrs,
        })
    }

    /// Steps 8-12
    fn finish(&self, staged: StagedStudent, extra_columns: &[String], report: &mut QualityReport) -> Student {
        let fill = self.fill_policy;
        let mut contact_extras = BTreeMap::new();
        for column in extra_columns {
            let value = staged.contact_extras.get(column).cloned().unwrap_or(Value::Null);
            contact_extras.insert(column.clone(), fill_value(value, fill));
        }
        let [address_line_1, city, state, zip_code] = staged.address;

        let time_spent_hrs = staged.time_spent_hrs.unwrap_or(0.0);
        let time_spent = match hours_to_duration(time_spent_hrs) {
            Some(d) => d,
            None => {
                report.record(
                    FindingKind::InvalidTimeSpent,
                    staged.uuid,
                    format!("time_spent_hrs {} cannot be a duration, using 0h", time_spent_hrs),
                );
                Duration::zero()
            }
        };

        let (first_name, last_name) = match staged.name.as_deref() {
            Some(name) => {
                let (first, last, extra) = split_name(name);
                if extra > 0 {
                    report.record(
                        FindingKind::ExtraNameTokens,
                        staged.uuid,
                        format!("name '{}' has {} token(s) past the last name that are dropped", name, extra),
                    );
                }
                (Some(first), last)
            }
            None => (None, None),
        };

        Student {
            uuid: staged.uuid,
            sex: fill_text(staged.sex, fill),
            date_of_birth: staged.date_of_birth,
            job_id: truncate(staged.job_id.unwrap_or(0.0)),
            current_career_path_id: truncate(staged.current_career_path_id.unwrap_or(0.0)),
            num_course_taken: truncate(staged.num_course_taken.unwrap_or(0.0)),
            age: staged.age.unwrap_or(0),
            age_group: staged.age_group.unwrap_or(0),
            email: fill_text(staged.email, fill),
            contact_extras,
            address_line_1: fill_text(address_line_1, fill),
            city: fill_text(city, fill),
            state: fill_text(state, fill),
            zip_code: fill_text(zip_code, fill),
            time_spent,
            first_name,
            last_name,
        }
    }

    fn date_of_birth(&self, raw: &RawStudent, report: &mut QualityReport) -> Option<NaiveDate> {
        let text = raw.dob.as_deref()?;
        match parse_date_of_birth(text) {
            Some(dob) if dob > self.reference_date => {
                report.record(
                    FindingKind::FutureDateOfBirth,
                    raw.uuid,
                    format!("dob {} is after {}", dob, self.reference_date),
                );
                None
            }
            Some(dob) => Some(dob),
            None => {
                report.record(
                    FindingKind::UnparsableDateOfBirth,
                    raw.uuid,
                    format!("dob '{}' is not a recognised date", text),
                );
                None
            }
        }
    }

    fn contact_info(
        &self,
        raw: &RawStudent,
        report: &mut QualityReport,
    ) -> Result<Option<Map<String, serde_json::Value>>> {
        match parse_contact_info(raw.contact_info.as_deref()) {
            Ok(map) => Ok(Some(map)),
            Err(reason) => match self.contact_info_policy {
                ContactInfoPolicy::Strict => Err(PipelineError::MalformedContactInfo {
                    uuid: raw.uuid.to_string(),
                    reason,
                }),
                ContactInfoPolicy::Lenient => {
                    report.record(FindingKind::MalformedContactInfo, raw.uuid, reason);
                    Ok(None)
                }
            },
        }
    }
}

/// Accepts plain dates, naive datetimes and RFC 3339 timestamps
pub fn parse_date_of_birth(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    DOB_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DOB_DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive()))
}

/// Whole years between the two dates, counting 365.25 days per year and truncating
pub fn age_in_years(dob: NaiveDate, as_of: NaiveDate) -> i64 {
    let days = (as_of - dob).num_days();
    (days as f64 / DAYS_PER_YEAR).floor() as i64
}

pub fn age_group(age: i64) -> i64 {
    age.div_euclid(10) * 10
}

/// Parses the serialized contact mapping, as JSON or as a single-quoted literal.
/// Anything other than a mapping is malformed.
pub fn parse_contact_info(raw: Option<&str>) -> std::result::Result<Map<String, serde_json::Value>, String> {
    let raw = raw.ok_or_else(|| "contact_info is null".to_string())?;
    let parsed = serde_json::from_str::<serde_json::Value>(raw).or_else(|json_err| {
        parse_literal(raw).map_err(|literal_err| format!("{} (as a literal: {})", json_err, literal_err))
    })?;
    match parsed {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(format!("expected a mapping, found {}", json_type(&other))),
    }
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a list",
        serde_json::Value::Object(_) => "a mapping",
    }
}

/// Nested mappings become dotted column names, e.g. `phone.mobile`
pub fn flatten_contact_info(map: Map<String, serde_json::Value>) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    flatten_into(&mut out, None, map);
    out
}

fn flatten_into(out: &mut BTreeMap<String, Value>, prefix: Option<&str>, map: Map<String, serde_json::Value>) {
    for (key, value) in map {
        let column = match prefix {
            Some(p) => format!("{}.{}", p, key),
            None => key,
        };
        match value {
            serde_json::Value::Object(nested) => flatten_into(out, Some(&column), nested),
            serde_json::Value::Null => {
                out.insert(column, Value::Null);
            }
            serde_json::Value::Bool(b) => {
                out.insert(column, Value::Text(b.to_string()));
            }
            serde_json::Value::Number(n) => {
                let v = n
                    .as_i64()
                    .map(Value::Integer)
                    .unwrap_or_else(|| Value::from(n.as_f64()));
                out.insert(column, v);
            }
            serde_json::Value::String(s) => {
                out.insert(column, Value::Text(s));
            }
            array @ serde_json::Value::Array(_) => {
                out.insert(column, Value::Text(array.to_string()));
            }
        }
    }
}

/// Splits on commas into the four address fields, trimming each.
/// Returns the fields and the number of segments found; missing fields are `None`.
pub fn split_address(address: &str) -> ([Option<String>; 4], usize) {
    let segments: Vec<&str> = address.split(',').collect();
    let mut parts: [Option<String>; 4] = Default::default();
    for (slot, segment) in parts.iter_mut().zip(segments.iter()) {
        *slot = Some(segment.trim().to_string());
    }
    (parts, segments.len())
}

/// Splits on single spaces; only the first two tokens are kept.
/// Returns the first name, the last name if any, and how many tokens were dropped.
pub fn split_name(name: &str) -> (String, Option<String>, usize) {
    let mut tokens = name.split(' ');
    let first = tokens.next().unwrap_or_default().to_string();
    let last = tokens.next().map(str::to_string);
    let dropped = tokens.count();
    (first, last, dropped)
}

/// `None` for negative, non-finite or out-of-range hour counts
pub fn hours_to_duration(hours: f64) -> Option<Duration> {
    if !hours.is_finite() || hours < 0.0 {
        return None;
    }
    let micros = (hours * MICROS_PER_HOUR).round();
    if micros > i64::MAX as f64 {
        return None;
    }
    Some(Duration::microseconds(micros as i64))
}

fn truncate(value: f64) -> i64 {
    value.trunc() as i64
}

fn fill_text(value: Option<String>, policy: FillPolicy) -> String {
    value.unwrap_or_else(|| match policy {
        FillPolicy::LiteralZero => "0".to_string(),
        FillPolicy::Typed => String::new(),
    })
}

/// Null-fill for cells whose type is unknown ahead of time
pub fn fill_value(value: Value, policy: FillPolicy) -> Value {
    if !value.is_null() {
        return value;
    }
    match policy {
        FillPolicy::LiteralZero => Value::Integer(0),
        FillPolicy::Typed => Value::Text(String::new()),
    }
}
