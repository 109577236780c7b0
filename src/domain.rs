//! Typed rows for the three cademycode tables.
//!
//! Source tables arrive as [`RawTable`]s; the decoders here check that the
//! columns the transform needs exist and that numeric columns really hold
//! numbers, so type problems surface at the reader boundary instead of deep
//! inside the normalizer.

use crate::constants::*;
use crate::error::{PipelineError, Result};
use crate::types::{RawTable, Value};
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

/// A student row as stored in the source, before normalization
#[derive(Debug, Clone, PartialEq)]
pub struct RawStudent {
    pub uuid: i64,
    pub name: Option<String>,
    pub sex: Option<String>,
    pub dob: Option<String>,
    pub contact_info: Option<String>,
    pub job_id: Option<f64>,
    pub current_career_path_id: Option<f64>,
    pub num_course_taken: Option<f64>,
    pub time_spent_hrs: Option<f64>,
}

impl RawStudent {
    pub fn decode_table(table: &RawTable) -> Result<Vec<RawStudent>> {
        let uuid = table.require_column(COL_UUID)?;
        let name = table.require_column(COL_NAME)?;
        let sex = table.require_column(COL_SEX)?;
        let dob = table.require_column(COL_DOB)?;
        let contact_info = table.require_column(COL_CONTACT_INFO)?;
        let job_id = table.require_column(COL_JOB_ID)?;
        let career_path = table.require_column(COL_CAREER_PATH_FK)?;
        let courses_taken = table.require_column(COL_NUM_COURSE_TAKEN)?;
        let hours = table.require_column(COL_TIME_SPENT_HRS)?;

        table
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let uuid = row[uuid]
                    .to_i64()
                    .map_err(|e| numeric_violation(table, i, COL_UUID, e))?
                    .ok_or_else(|| {
                        PipelineError::schema(&table.name, format!("row {} has a null {}", i, COL_UUID))
                    })?;
                Ok(RawStudent {
                    uuid,
                    name: row[name].to_text(),
                    sex: row[sex].to_text(),
                    dob: match &row[dob] {
                        Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
                        other => other.to_text(),
                    },
                    contact_info: row[contact_info].to_text(),
                    job_id: numeric(table, i, COL_JOB_ID, &row[job_id])?,
                    current_career_path_id: numeric(table, i, COL_CAREER_PATH_FK, &row[career_path])?,
                    num_course_taken: numeric(table, i, COL_NUM_COURSE_TAKEN, &row[courses_taken])?,
                    time_spent_hrs: numeric(table, i, COL_TIME_SPENT_HRS, &row[hours])?,
                })
            })
            .collect()
    }
}

fn numeric(table: &RawTable, row: usize, column: &str, value: &Value) -> Result<Option<f64>> {
    value
        .to_f64()
        .map_err(|e| numeric_violation(table, row, column, e))
}

fn numeric_violation(table: &RawTable, row: usize, column: &str, detail: String) -> PipelineError {
    PipelineError::schema(
        &table.name,
        format!("row {} column '{}' must be numeric: {}", row, column, detail),
    )
}

/// A student row after normalization
#[derive(Debug, Clone, PartialEq)]
pub struct Student {
    pub uuid: i64,
    pub sex: String,
    pub date_of_birth: Option<NaiveDate>,
    pub job_id: i64,
    pub current_career_path_id: i64,
    pub num_course_taken: i64,
    pub age: i64,
    pub age_group: i64,
    pub email: String,
    /// Contact-info keys other than `email` and `mailing_address`, flattened
    pub contact_extras: BTreeMap<String, Value>,
    pub address_line_1: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub time_spent: Duration,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Normalized students plus the union of extra contact columns seen across rows
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StudentTable {
    pub extra_contact_columns: Vec<String>,
    pub rows: Vec<Student>,
}

impl StudentTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> Vec<String> {
        student_columns(&self.extra_contact_columns)
    }
}

/// Normalized student column names with the extra contact columns spliced in after `email`
pub fn student_columns(extra_contact_columns: &[String]) -> Vec<String> {
    student_leading_columns()
        .into_iter()
        .map(String::from)
        .chain(extra_contact_columns.iter().cloned())
        .chain(student_trailing_columns().into_iter().map(String::from))
        .collect()
}

impl Student {
    /// One row's cells, aligned with [`student_columns`]
    pub fn values(&self, extra_contact_columns: &[String]) -> Vec<Value> {
        let mut values = vec![
            Value::Integer(self.uuid),
            Value::Text(self.sex.clone()),
            Value::from(self.date_of_birth),
            Value::Integer(self.job_id),
            Value::Integer(self.current_career_path_id),
            Value::Integer(self.num_course_taken),
            Value::Integer(self.age),
            Value::Integer(self.age_group),
            Value::Text(self.email.clone()),
        ];
        for column in extra_contact_columns {
            values.push(self.contact_extras.get(column).cloned().unwrap_or(Value::Null));
        }
        values.extend([
            Value::Text(self.address_line_1.clone()),
            Value::Text(self.city.clone()),
            Value::Text(self.state.clone()),
            Value::Text(self.zip_code.clone()),
            Value::Duration(self.time_spent),
            Value::from(self.first_name.clone()),
            Value::from(self.last_name.clone()),
        ]);
        values
    }
}

/// A career path from the course reference table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Course {
    pub career_path_id: i64,
    pub career_path_name: Option<String>,
    pub hours_to_complete: Option<i64>,
}

impl Course {
    /// The join target for students without an assigned career path
    pub fn not_applicable() -> Self {
        Course {
            career_path_id: SENTINEL_CAREER_PATH_ID,
            career_path_name: Some(SENTINEL_CAREER_PATH_NAME.to_string()),
            hours_to_complete: Some(SENTINEL_HOURS_TO_COMPLETE),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        *self == Course::not_applicable()
    }

    pub fn values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.career_path_id),
            Value::from(self.career_path_name.clone()),
            Value::from(self.hours_to_complete),
        ]
    }

    pub fn decode_table(table: &RawTable) -> Result<Vec<Course>> {
        let id = table.require_column(COL_CAREER_PATH_ID)?;
        let name = table.require_column(COL_CAREER_PATH_NAME)?;
        let hours = table.require_column(COL_HOURS_TO_COMPLETE)?;

        table
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                Ok(Course {
                    career_path_id: join_key(table, i, COL_CAREER_PATH_ID, &row[id])?,
                    career_path_name: row[name].to_text(),
                    hours_to_complete: row[hours]
                        .to_i64()
                        .map_err(|e| numeric_violation(table, i, COL_HOURS_TO_COMPLETE, e))?,
                })
            })
            .collect()
    }
}

/// A job row; everything but the key is carried through untouched
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub job_id: i64,
    pub attributes: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobTable {
    /// Source column names other than `job_id`, in source order
    pub attribute_columns: Vec<String>,
    pub rows: Vec<Job>,
}

impl JobTable {
    pub fn decode(table: &RawTable) -> Result<JobTable> {
        let key = table.require_column(COL_JOB_ID)?;
        let attribute_columns = table
            .columns
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != key)
            .map(|(_, c)| c.clone())
            .collect();

        let rows = table
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                Ok(Job {
                    job_id: join_key(table, i, COL_JOB_ID, &row[key])?,
                    attributes: row
                        .iter()
                        .enumerate()
                        .filter(|(c, _)| *c != key)
                        .map(|(_, v)| v.clone())
                        .collect(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(JobTable {
            attribute_columns,
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Right-side join keys must be present and integral
fn join_key(table: &RawTable, row: usize, column: &str, value: &Value) -> Result<i64> {
    value
        .to_i64()
        .map_err(|e| numeric_violation(table, row, column, e))?
        .ok_or_else(|| {
            PipelineError::schema(
                &table.name,
                format!("row {} has a null join key '{}'", row, column),
            )
        })
}
