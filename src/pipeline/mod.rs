// Batch pipeline: read -> normalize students / augment courses -> join

pub mod augment;
pub mod join;
pub mod literal;
pub mod normalize;
pub mod report;

pub use augment::augment_courses;
pub use join::{JoinedRecord, JoinedTable, Joiner};
pub use normalize::StudentNormalizer;
pub use report::{Finding, FindingKind, QualityReport};

use crate::config::PipelineConfig;
use crate::domain::{Course, JobTable, RawStudent};
use crate::error::Result;
use crate::source::{SqliteSource, TableSource};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, info_span};
use uuid::Uuid;

/// Row counts per stage for one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStats {
    pub run_id: Uuid,
    pub as_of: NaiveDate,
    pub students_read: usize,
    pub courses_read: usize,
    pub jobs_read: usize,
    pub students_normalized: usize,
    pub courses_augmented: usize,
    pub rows_joined: usize,
    pub elapsed_ms: u64,
}

/// Everything a successful run hands back to the caller
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub table: JoinedTable,
    pub report: QualityReport,
    pub stats: RunStats,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    reference_date: NaiveDate,
}

impl Pipeline {
    /// Ages are computed relative to today's UTC date unless overridden
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            reference_date: Utc::now().date_naive(),
        }
    }

    pub fn with_reference_date(mut self, reference_date: NaiveDate) -> Self {
        self.reference_date = reference_date;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs against the SQLite database named in the config
    pub fn run(&self) -> Result<PipelineOutput> {
        let source = SqliteSource::new(&self.config.database);
        self.run_with_source(&source)
    }

    /// Any stage failure aborts the run; no partial output is returned
    pub fn run_with_source(&self, source: &dyn TableSource) -> Result<PipelineOutput> {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline_run", %run_id, source = %source.identifier());
        let _enter = span.enter();
        let started = Instant::now();

        info!("Running pipeline...");
        let result = self.execute(source, run_id, started);
        let secs = started.elapsed().as_secs_f64();
        match &result {
            Ok(output) => {
                info!(
                    rows = output.table.len(),
                    findings = output.report.len(),
                    elapsed_ms = output.stats.elapsed_ms,
                    "Pipeline finished"
                );
                crate::metrics::run::completed("success", secs);
            }
            Err(e) => {
                error!(kind = e.kind(), "Pipeline failed: {}", e);
                crate::metrics::run::completed("failure", secs);
            }
        }
        result
    }

    fn execute(&self, source: &dyn TableSource, run_id: Uuid, started: Instant) -> Result<PipelineOutput> {
        // The connection is scoped to this call and already released when it returns
        let tables = source.read_tables(&self.config.tables)?;

        let raw_students = RawStudent::decode_table(&tables.students)?;
        let courses = Course::decode_table(&tables.courses)?;
        let jobs = JobTable::decode(&tables.jobs)?;
        let (students_read, courses_read, jobs_read) = (raw_students.len(), courses.len(), jobs.len());

        let mut report = QualityReport::new();
        let students = StudentNormalizer::from_config(&self.config, self.reference_date)
            .normalize(&raw_students, &mut report)?;
        let students_normalized = students.len();

        let courses = augment_courses(courses);
        let courses_augmented = courses.len();

        let table = Joiner::new(self.config.duplicate_key_policy).join(students, &courses, &jobs, &mut report)?;

        let stats = RunStats {
            run_id,
            as_of: self.reference_date,
            students_read,
            courses_read,
            jobs_read,
            students_normalized,
            courses_augmented,
            rows_joined: table.len(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        Ok(PipelineOutput { table, report, stats })
    }
}

/// Single entry point: reads the store at `database` with default settings and
/// returns the flat table.
pub fn run<P: AsRef<Path>>(database: P) -> Result<JoinedTable> {
    let config = PipelineConfig {
        database: database.as_ref().to_path_buf(),
        ..PipelineConfig::default()
    };
    Ok(Pipeline::new(config).run()?.table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;
    use crate::error::PipelineError;
    use crate::source::InMemorySource;
    use crate::types::{RawTable, Value};

    fn source(contact_info: &str) -> InMemorySource {
        let students = RawTable::from_rows(
            STUDENTS_TABLE,
            &[
                COL_UUID,
                COL_NAME,
                COL_SEX,
                COL_DOB,
                COL_CONTACT_INFO,
                COL_JOB_ID,
                COL_CAREER_PATH_FK,
                COL_NUM_COURSE_TAKEN,
                COL_TIME_SPENT_HRS,
            ],
            vec![
                vec![
                    Value::from(1i64),
                    Value::from("Jane Doe"),
                    Value::from("F"),
                    Value::from("1990-01-01"),
                    Value::from(contact_info),
                    Value::Null,
                    Value::Null,
                    Value::Null,
                    Value::Null,
                ],
                vec![
                    Value::from(2i64),
                    Value::from("John Doe"),
                    Value::from("M"),
                    Value::from("1990-10-31"),
                    Value::from(r#"{"mailing_address": "456 Main St, Sometown, Nevada, 12345", "email": "j@d.com"}"#),
                    Value::from("1.0"),
                    Value::from("2.0"),
                    Value::from("4.0"),
                    Value::from("10.5"),
                ],
            ],
        )
        .unwrap();
        let courses = RawTable::from_rows(
            COURSES_TABLE,
            &[COL_CAREER_PATH_ID, COL_CAREER_PATH_NAME, COL_HOURS_TO_COMPLETE],
            vec![
                vec![Value::from(1i64), Value::from("data scientist"), Value::from(20i64)],
                vec![Value::from(2i64), Value::from("data engineer"), Value::from(20i64)],
            ],
        )
        .unwrap();
        let jobs = RawTable::from_rows(
            JOBS_TABLE,
            &[COL_JOB_ID, "job_category", "avg_salary"],
            vec![vec![Value::from(1i64), Value::from("analytics"), Value::from(86000i64)]],
        )
        .unwrap();
        InMemorySource::new("memory")
            .with_table(students)
            .with_table(courses)
            .with_table(jobs)
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(PipelineConfig::default())
            .with_reference_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    }

    #[test]
    fn test_run_produces_one_row_per_student() {
        let contact = r#"{"mailing_address": "123 Main St, Anytown, New York, 12345", "email": "a@b.com"}"#;
        let output = pipeline().run_with_source(&source(contact)).unwrap();

        assert_eq!(output.table.len(), 2);
        assert_eq!(output.stats.students_read, 2);
        assert_eq!(output.stats.courses_read, 2);
        assert_eq!(output.stats.courses_augmented, 3);
        assert_eq!(output.stats.rows_joined, 2);
        assert!(output.report.is_empty());

        assert_eq!(output.table.cell(0, "career_path_name"), Some(Value::from("not applicable")));
        assert_eq!(output.table.cell(0, "job_category"), Some(Value::Null));
        assert_eq!(output.table.cell(1, "career_path_name"), Some(Value::from("data engineer")));
        assert_eq!(output.table.cell(1, "job_category"), Some(Value::from("analytics")));
        assert_eq!(
            output.table.cell(1, "time_spent"),
            Some(Value::Duration(chrono::Duration::minutes(630)))
        );
    }

    #[test]
    fn test_pipeline_debug_shows_reference_date_and_database() {
        let rendered = format!("{:?}", pipeline());
        assert!(rendered.contains("2024-01-01"));
        assert!(rendered.contains("cademycode.db"));
    }

    #[test]
    fn test_single_quoted_contact_info_runs_end_to_end() {
        let contact = "{'mailing_address': '123 Main St, Anytown, New York, 12345', 'email': 'a@b.com'}";
        let output = pipeline().run_with_source(&source(contact)).unwrap();
        assert_eq!(output.table.len(), 2);
        assert_eq!(output.table.cell(0, "state"), Some(Value::from("New York")));
        assert!(output.report.is_empty());
    }

    #[test]
    fn test_malformed_contact_info_aborts_the_run() {
        let err = pipeline().run_with_source(&source("{not a mapping")).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedContactInfo { .. }));
    }
}
