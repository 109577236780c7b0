//! Two-stage left-outer join: students → courses → jobs.
//!
//! Every student row comes out exactly once. Right-side keys must be unique;
//! a repeated `career_path_id` or `job_id` would multiply student rows, so it
//! is checked before either join runs.

use crate::config::DuplicateKeyPolicy;
use crate::constants::{course_columns, COL_CAREER_PATH_ID, COL_JOB_ID};
use crate::domain::{student_columns, Course, Job, JobTable, Student, StudentTable};
use crate::error::{PipelineError, Result};
use crate::pipeline::report::{FindingKind, QualityReport};
use crate::types::Value;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use tracing::{debug, info, instrument};

const JOINED_TABLE: &str = "joined";

/// One student with its matched course and job, if any
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRecord {
    pub student: Student,
    pub course: Option<Course>,
    pub job: Option<Job>,
}

/// The flat output: student columns, then course columns, then job columns
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JoinedTable {
    extra_contact_columns: Vec<String>,
    job_attribute_columns: Vec<String>,
    records: Vec<JoinedRecord>,
}

impl JoinedTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[JoinedRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<JoinedRecord> {
        self.records
    }

    pub fn columns(&self) -> Vec<String> {
        flat_columns(&self.extra_contact_columns, &self.job_attribute_columns)
    }

    /// Flat cells for one record; unmatched course/job columns are null
    pub fn row_values(&self, record: &JoinedRecord) -> Vec<Value> {
        let mut values = record.student.values(&self.extra_contact_columns);
        match &record.course {
            Some(course) => values.extend(course.values()),
            None => values.extend(std::iter::repeat(Value::Null).take(course_columns().len())),
        }
        match &record.job {
            Some(job) => values.extend(job.attributes.iter().cloned()),
            None => values.extend(
                std::iter::repeat(Value::Null).take(self.job_attribute_columns.len()),
            ),
        }
        values
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<Value>> + '_ {
        self.records.iter().map(move |r| self.row_values(r))
    }

    /// Value of `column` in row `index`, mostly for callers poking at a single cell
    pub fn cell(&self, index: usize, column: &str) -> Option<Value> {
        let position = self.columns().iter().position(|c| c == column)?;
        let record = self.records.get(index)?;
        self.row_values(record).into_iter().nth(position)
    }

    /// One JSON object per line, keys in column order
    pub fn write_json_lines<W: Write>(&self, mut writer: W, limit: Option<usize>) -> Result<()> {
        let columns = self.columns();
        for values in self.rows().take(limit.unwrap_or(usize::MAX)) {
            serde_json::to_writer(&mut writer, &FlatRow { columns: &columns, values: &values })?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_csv<W: Write>(&self, writer: W, limit: Option<usize>) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(self.columns())?;
        for values in self.rows().take(limit.unwrap_or(usize::MAX)) {
            csv_writer.write_record(values.iter().map(|v| v.to_string()))?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

struct FlatRow<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl Serialize for FlatRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

fn flat_columns(extra_contact_columns: &[String], job_attribute_columns: &[String]) -> Vec<String> {
    let mut columns = student_columns(extra_contact_columns);
    columns.extend(course_columns().into_iter().map(String::from));
    columns.extend(job_attribute_columns.iter().cloned());
    columns
}

/// Joins the normalized students to the augmented courses and the jobs
#[derive(Debug, Clone, Default)]
pub struct Joiner {
    duplicate_key_policy: DuplicateKeyPolicy,
}

impl Joiner {
    pub fn new(duplicate_key_policy: DuplicateKeyPolicy) -> Self {
        Self {
            duplicate_key_policy,
        }
    }

    #[instrument(skip_all, fields(students = students.len(), courses = courses.len(), jobs = jobs.len()))]
    pub fn join(
        &self,
        students: StudentTable,
        courses: &[Course],
        jobs: &JobTable,
        report: &mut QualityReport,
    ) -> Result<JoinedTable> {
        info!("Joining tables...");

        let columns = flat_columns(&students.extra_contact_columns, &jobs.attribute_columns);
        let mut seen = HashSet::new();
        if let Some(dup) = columns.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(PipelineError::schema(
                JOINED_TABLE,
                format!("column '{}' appears on both sides of a join", dup),
            ));
        }

        let course_index = unique_index(
            "courses",
            COL_CAREER_PATH_ID,
            courses,
            |c| c.career_path_id,
            self.duplicate_key_policy,
            report,
        )?;
        let job_index = unique_index(
            "jobs",
            COL_JOB_ID,
            &jobs.rows,
            |j| j.job_id,
            self.duplicate_key_policy,
            report,
        )?;
        debug!(courses = course_index.len(), jobs = job_index.len(), "Built join indexes");

        let expected = students.len();
        let records = students
            .rows
            .into_iter()
            .map(|student| {
                let course = course_index.get(&student.current_career_path_id).map(|&i| courses[i].clone());
                if course.is_none() {
                    report.record(
                        FindingKind::UnmatchedCareerPath,
                        student.uuid,
                        format!("no course with career_path_id {}", student.current_career_path_id),
                    );
                }
                let job = job_index.get(&student.job_id).map(|&i| jobs.rows[i].clone());
                if job.is_none() && student.job_id != 0 {
                    report.record(
                        FindingKind::UnmatchedJob,
                        student.uuid,
                        format!("no job with job_id {}", student.job_id),
                    );
                }
                JoinedRecord { student, course, job }
            })
            .collect::<Vec<_>>();

        if records.len() != expected {
            return Err(PipelineError::schema(
                JOINED_TABLE,
                format!("join produced {} rows from {} students", records.len(), expected),
            ));
        }

        crate::metrics::join::rows_joined(records.len());
        Ok(JoinedTable {
            extra_contact_columns: students.extra_contact_columns,
            job_attribute_columns: jobs.attribute_columns.clone(),
            records,
        })
    }
}

/// Maps each key to its row position, enforcing uniqueness
fn unique_index<T, F>(
    table: &str,
    column: &str,
    rows: &[T],
    key: F,
    policy: DuplicateKeyPolicy,
    report: &mut QualityReport,
) -> Result<HashMap<i64, usize>>
where
    T: PartialEq,
    F: Fn(&T) -> i64,
{
    let mut index: HashMap<i64, usize> = HashMap::with_capacity(rows.len());
    for (position, row) in rows.iter().enumerate() {
        let k = key(row);
        match index.get(&k) {
            None => {
                index.insert(k, position);
            }
            Some(&first) => {
                let identical = rows[first] == *row;
                match policy {
                    DuplicateKeyPolicy::DropIdentical if identical => {
                        report.record(
                            FindingKind::DuplicateJoinKey,
                            format!("{}.{}={}", table, column, k),
                            format!("row {} repeats row {} exactly and was dropped", position, first),
                        );
                    }
                    _ => {
                        return Err(PipelineError::schema(
                            table,
                            format!(
                                "{} {} is not unique (rows {} and {}{})",
                                column,
                                k,
                                first,
                                position,
                                if identical { ", identical" } else { "" }
                            ),
                        ));
                    }
                }
            }
        }
    }
    Ok(index)
}
